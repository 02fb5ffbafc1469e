//! # Memory Store
//!
//! In-process [`ObjectStore`] with resource versions and fault injection.
//! Drives the reconciler in tests and dry runs without an API server.

use super::{ObjectStore, StoreError};
use crate::controller::reconciler::subordinate::{
    OwnerRef, SubordinateKind, SubordinateObject, SubordinateSpec,
};
use crate::crd::GiteaStatus;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Store operations that faults can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Get,
    Create,
    Update,
    Delete,
    List,
    GetSecret,
    WriteStatus,
}

/// One successful mutation, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub op: StoreOp,
    pub kind: SubordinateKind,
    pub name: String,
}

type ObjectKey = (SubordinateKind, String, String);
type FaultKey = (Option<SubordinateKind>, StoreOp);

#[derive(Default)]
struct State {
    objects: BTreeMap<ObjectKey, SubordinateObject>,
    secrets: BTreeMap<(String, String), BTreeMap<String, String>>,
    statuses: BTreeMap<(String, String), GiteaStatus>,
    one_shot_faults: HashMap<FaultKey, VecDeque<StoreError>>,
    sticky_faults: HashMap<FaultKey, StoreError>,
    writes: Vec<WriteRecord>,
    status_writes: usize,
    version: u64,
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    /// Pending fault for `op`, kind-specific faults first
    fn take_fault(&mut self, kind: Option<SubordinateKind>, op: StoreOp) -> Option<StoreError> {
        let mut keys = vec![(kind, op)];
        if kind.is_some() {
            keys.push((None, op));
        }
        for key in keys {
            if let Some(err) = self
                .one_shot_faults
                .get_mut(&key)
                .and_then(VecDeque::pop_front)
            {
                return Some(err);
            }
            if let Some(err) = self.sticky_faults.get(&key) {
                return Some(err.clone());
            }
        }
        None
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed an object as if another actor had created it. Returns the stored copy.
    pub fn insert(&self, object: SubordinateObject) -> SubordinateObject {
        let mut state = self.lock();
        let mut object = object;
        object.resource_version = Some(state.next_version());
        let key = (object.kind(), object.namespace.clone(), object.name.clone());
        state.objects.insert(key, object.clone());
        object
    }

    /// Seed a user-provided Secret
    pub fn insert_secret(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        self.lock()
            .secrets
            .insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn remove_secret(&self, namespace: &str, name: &str) {
        self.lock()
            .secrets
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Edit an object out of band, bumping its version like a concurrent writer would
    pub fn edit(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
        edit: impl FnOnce(&mut SubordinateSpec),
    ) -> bool {
        let mut state = self.lock();
        let version = state.next_version();
        match state
            .objects
            .get_mut(&(kind, namespace.to_string(), name.to_string()))
        {
            Some(object) => {
                edit(&mut object.spec);
                object.resource_version = Some(version);
                true
            }
            None => false,
        }
    }

    /// Fail the next `op` (on `kind`, or on any kind when `None`) with `err`
    pub fn fail_next(&self, kind: Option<SubordinateKind>, op: StoreOp, err: StoreError) {
        self.lock()
            .one_shot_faults
            .entry((kind, op))
            .or_default()
            .push_back(err);
    }

    /// Fail every `op` until [`MemoryStore::clear_faults`] is called
    pub fn fail_always(&self, kind: Option<SubordinateKind>, op: StoreOp, err: StoreError) {
        self.lock().sticky_faults.insert((kind, op), err);
    }

    pub fn clear_faults(&self) {
        let mut state = self.lock();
        state.one_shot_faults.clear();
        state.sticky_faults.clear();
    }

    #[must_use]
    pub fn object(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
    ) -> Option<SubordinateObject> {
        self.lock()
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Every subordinate in `namespace`, ordered by kind then name
    #[must_use]
    pub fn objects(&self, namespace: &str) -> Vec<SubordinateObject> {
        self.lock()
            .objects
            .values()
            .filter(|o| o.namespace == namespace)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn status(&self, namespace: &str, name: &str) -> Option<GiteaStatus> {
        self.lock()
            .statuses
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Successful mutations since creation or the last [`MemoryStore::clear_writes`]
    #[must_use]
    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        let mut state = self.lock();
        state.writes.clear();
        state.status_writes = 0;
    }

    /// Successful `write_status` calls since creation or the last `clear_writes`
    pub fn status_writes(&self) -> usize {
        self.lock().status_writes
    }
}

fn describe(kind: SubordinateKind, namespace: &str, name: &str) -> String {
    format!("{kind} {namespace}/{name}")
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<SubordinateObject>, StoreError> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault(Some(kind), StoreOp::Get) {
            return Err(err);
        }
        Ok(state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, object: &SubordinateObject) -> Result<SubordinateObject, StoreError> {
        let mut state = self.lock();
        let kind = object.kind();
        if let Some(err) = state.take_fault(Some(kind), StoreOp::Create) {
            return Err(err);
        }
        let key = (kind, object.namespace.clone(), object.name.clone());
        if state.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(describe(
                kind,
                &object.namespace,
                &object.name,
            )));
        }
        let mut stored = object.clone();
        stored.resource_version = Some(state.next_version());
        state.objects.insert(key, stored.clone());
        state.writes.push(WriteRecord {
            op: StoreOp::Create,
            kind,
            name: object.name.clone(),
        });
        Ok(stored)
    }

    async fn update(
        &self,
        object: &SubordinateObject,
        expected_version: &str,
    ) -> Result<SubordinateObject, StoreError> {
        let mut state = self.lock();
        let kind = object.kind();
        if let Some(err) = state.take_fault(Some(kind), StoreOp::Update) {
            return Err(err);
        }
        let key = (kind, object.namespace.clone(), object.name.clone());
        let current_version = match state.objects.get(&key) {
            Some(current) => current.resource_version.clone(),
            None => {
                return Err(StoreError::NotFound(describe(
                    kind,
                    &object.namespace,
                    &object.name,
                )))
            }
        };
        if current_version.as_deref() != Some(expected_version) {
            return Err(StoreError::Conflict(format!(
                "{} was modified (expected version {expected_version})",
                describe(kind, &object.namespace, &object.name)
            )));
        }
        let mut stored = object.clone();
        stored.resource_version = Some(state.next_version());
        state.objects.insert(key, stored.clone());
        state.writes.push(WriteRecord {
            op: StoreOp::Update,
            kind,
            name: object.name.clone(),
        });
        Ok(stored)
    }

    async fn delete(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault(Some(kind), StoreOp::Delete) {
            return Err(err);
        }
        if state
            .objects
            .remove(&(kind, namespace.to_string(), name.to_string()))
            .is_some()
        {
            state.writes.push(WriteRecord {
                op: StoreOp::Delete,
                kind,
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn list(
        &self,
        kind: SubordinateKind,
        namespace: &str,
        owner: &OwnerRef,
    ) -> Result<Vec<SubordinateObject>, StoreError> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault(Some(kind), StoreOp::List) {
            return Err(err);
        }
        Ok(state
            .objects
            .values()
            .filter(|o| o.kind() == kind && o.namespace == namespace && o.is_owned_by(owner))
            .cloned()
            .collect())
    }

    async fn get_secret_data(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<BTreeMap<String, String>>, StoreError> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault(None, StoreOp::GetSecret) {
            return Err(err);
        }
        Ok(state
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn write_status(
        &self,
        namespace: &str,
        name: &str,
        status: &GiteaStatus,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        if let Some(err) = state.take_fault(None, StoreOp::WriteStatus) {
            return Err(err);
        }
        state
            .statuses
            .insert((namespace.to_string(), name.to_string()), status.clone());
        state.status_writes += 1;
        Ok(())
    }
}
