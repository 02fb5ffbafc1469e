//! # Gitea Operator
//!
//! A Kubernetes operator that reconciles `Gitea` resources.
//!
//! - **External mode**: a `secretRef` points at the URL and credentials of an
//!   existing Gitea; the operator mirrors the credential and checks that the
//!   instance is reachable.
//! - **Internal mode**: the operator runs Gitea itself as a Deployment with a
//!   Service in front of it.
//!
//! Switching a resource between modes creates what the new mode needs before
//! removing what only the old one used.

use anyhow::Result;
use gitea_operator::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    run_watch_loop(
        init.client,
        init.giteas,
        init.reconciler,
        init.server_state,
        &init.config,
    )
    .await;

    Ok(())
}
