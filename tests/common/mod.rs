//! Common test utilities for reconciler integration tests
//!
//! Builds Gitea resources, a reconciler context over [`MemoryStore`] and a
//! prober that replays scripted outcomes.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gitea_operator::controller::backoff::ExponentialBackoff;
use gitea_operator::controller::reconciler::credential::Credential;
use gitea_operator::controller::reconciler::probe::{ConnectivityProber, ProbeOutcome};
use gitea_operator::controller::reconciler::{
    reconcile_once, AttemptReport, Reconciler, ReconcilerError, RequeuePolicy,
};
use gitea_operator::controller::reconciler::subordinate::{
    OwnerRef, SubordinateKind, SubordinateObject,
};
use gitea_operator::crd::{Gitea, GiteaSpec, GiteaStatus, SecretRef};
use gitea_operator::store::{MemoryStore, ObjectStore, StoreError};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "default";
pub const UID: &str = "6f1c2a9e-docs";
pub const EXTERNAL_SECRET: &str = "ext-secret";
pub const EXTERNAL_URL: &str = "https://git.example.com";

pub fn policy() -> RequeuePolicy {
    RequeuePolicy {
        backoff: ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(300)),
        steady_state: Duration::from_secs(600),
        retry_budget: 3,
    }
}

/// A `Gitea` named `name` in [`NAMESPACE`] at generation 1
pub fn gitea(name: &str, spec: GiteaSpec) -> Gitea {
    let mut gitea = Gitea::new(name, spec);
    gitea.metadata.namespace = Some(NAMESPACE.to_string());
    gitea.metadata.uid = Some(UID.to_string());
    gitea.metadata.generation = Some(1);
    gitea
}

/// Point `gitea` at the external instance as a new generation
pub fn switch_to_external(gitea: &mut Gitea) {
    gitea.spec.secret_ref = Some(SecretRef {
        name: EXTERNAL_SECRET.to_string(),
    });
    bump_generation(gitea);
}

pub fn switch_to_internal(gitea: &mut Gitea) {
    gitea.spec.secret_ref = None;
    bump_generation(gitea);
}

pub fn bump_generation(gitea: &mut Gitea) {
    gitea.metadata.generation = Some(gitea.metadata.generation.unwrap_or_default() + 1);
}

pub fn external_secret_data() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("url".to_string(), EXTERNAL_URL.to_string()),
        ("token".to_string(), "s3cr3t".to_string()),
    ])
}

/// Prober that returns queued outcomes, then a fallback
pub struct ScriptedProber {
    queued: Mutex<VecDeque<ProbeOutcome>>,
    fallback: ProbeOutcome,
    probed: Mutex<Vec<String>>,
}

impl ScriptedProber {
    pub fn reachable() -> Self {
        Self::always(ProbeOutcome::Reachable {
            version: "1.22.3".to_string(),
        })
    }

    pub fn always(fallback: ProbeOutcome) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            fallback,
            probed: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, outcome: ProbeOutcome) {
        self.queued.lock().unwrap().push_back(outcome);
    }

    /// URLs probed so far
    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectivityProber for ScriptedProber {
    async fn probe(&self, credential: &Credential) -> ProbeOutcome {
        self.probed.lock().unwrap().push(credential.url.clone());
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Store whose creates of one kind never finish; everything else goes to `inner`
pub struct StallingStore {
    pub inner: Arc<MemoryStore>,
    pub stall: SubordinateKind,
}

#[async_trait]
impl ObjectStore for StallingStore {
    async fn get(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SubordinateObject>, StoreError> {
        self.inner.get(kind, namespace, name).await
    }

    async fn create(&self, object: &SubordinateObject) -> Result<SubordinateObject, StoreError> {
        if object.kind() == self.stall {
            std::future::pending::<()>().await;
        }
        self.inner.create(object).await
    }

    async fn update(
        &self,
        object: &SubordinateObject,
        expected_version: &str,
    ) -> Result<SubordinateObject, StoreError> {
        self.inner.update(object, expected_version).await
    }

    async fn delete(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        self.inner.delete(kind, namespace, name).await
    }

    async fn list(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        owner: &OwnerRef,
    ) -> Result<Vec<SubordinateObject>, StoreError> {
        self.inner.list(kind, namespace, owner).await
    }

    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        self.inner.get_secret_data(namespace, name).await
    }

    async fn write_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GiteaStatus,
    ) -> Result<(), StoreError> {
        self.inner.write_status(namespace, name, status).await
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub prober: Arc<ScriptedProber>,
    pub reconciler: Reconciler,
    /// Seconds past the first attempt; every attempt runs one second later
    clock: AtomicI64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_prober(ScriptedProber::reachable())
    }

    pub fn with_prober(prober: ScriptedProber) -> Self {
        let store = Arc::new(MemoryStore::new());
        store.insert_secret(NAMESPACE, EXTERNAL_SECRET, external_secret_data());
        let prober = Arc::new(prober);
        let reconciler = Reconciler::new(
            store.clone(),
            prober.clone(),
            policy(),
            "gitea/gitea:1.22",
            Duration::from_secs(30),
        );
        Self {
            store,
            prober,
            reconciler,
            clock: AtomicI64::new(0),
        }
    }

    /// Time of the next attempt
    pub fn tick(&self) -> DateTime<Utc> {
        let offset = self.clock.fetch_add(1, Ordering::Relaxed);
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 0, 0).unwrap() + chrono::Duration::seconds(offset)
    }

    /// One attempt, then feed the persisted status back into `gitea` the way
    /// the next watch event would.
    pub async fn run(&self, gitea: &mut Gitea) -> Result<AttemptReport, ReconcilerError> {
        let report = reconcile_once(&self.reconciler, gitea, self.tick()).await?;
        let name = gitea.metadata.name.clone().unwrap_or_default();
        gitea.status = self.store.status(NAMESPACE, &name);
        Ok(report)
    }
}

/// Operations of an attempt as "verb kind name"
pub fn operations(report: &AttemptReport) -> Vec<String> {
    report
        .plan
        .operations()
        .iter()
        .map(ToString::to_string)
        .collect()
}
