//! # Watch Loop
//!
//! Runs the kube-runtime controller over Gitea resources and the Secrets,
//! Deployments and Services they own, until SIGINT or SIGTERM.
//!
//! Gitea events pass a generation filter: status writes, including the
//! controller's own, never trigger an attempt. Retries and drift checks come
//! from the requeue directive and from changes to owned objects.

use crate::config::ControllerConfig;
use crate::constants::{FIELD_MANAGER, LABEL_MANAGED_BY};
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::Gitea;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::runtime::initialization::scoped_api;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::api::Api;
use kube::Client;
use kube_runtime::{predicates, reflector, watcher, Controller, WatchStreamExt};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, Instrument};

/// Watch Gitea resources and their subordinates until shutdown.
///
/// Readiness is reported while the controller runs. In-flight attempts finish
/// before this returns.
pub async fn run_watch_loop(
    client: Client,
    giteas: Api<Gitea>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    config: &ControllerConfig,
) {
    let restart_delay = config.watch_restart_delay();
    let owned = watcher::Config::default().labels(&format!("{LABEL_MANAGED_BY}={FIELD_MANAGER}"));
    let watch_span = tracing::info_span!("controller.watch", operation = "watch_loop");

    let (reader, writer) = reflector::store();
    let giteas = reflector(writer, watcher(giteas, watcher::Config::default().any_semantic()))
        .default_backoff()
        .applied_objects()
        .predicate_filter(predicates::generation);

    info!("Starting controller watch loop...");
    server_state.is_ready.store(true, Ordering::Relaxed);

    Controller::for_stream(giteas, reader)
        .owns(scoped_api::<Secret>(client.clone(), config), owned.clone())
        .owns(scoped_api::<Deployment>(client.clone(), config), owned.clone())
        .owns(scoped_api::<Service>(client, config), owned)
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .filter_map(move |result| async move {
            let error_string = match &result {
                Ok((object, _action)) => {
                    debug!("watch.event.success: {}", object.name);
                    None
                }
                Err(e) => Some(format!("{e:?}")),
            };
            match error_string {
                None => Some(result),
                Some(error_string) => handle_watch_stream_error(&error_string, restart_delay)
                    .await
                    .map(|()| result),
            }
        })
        .for_each(|_| futures::future::ready(()))
        .instrument(watch_span)
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller stopped gracefully");
}
