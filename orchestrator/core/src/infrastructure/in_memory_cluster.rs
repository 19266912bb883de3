// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Cluster
//!
//! A `ClusterResourceAdapter` that keeps workloads, endpoints, namespaces and
//! events in process memory. Used by the `in-memory` cluster backend for local
//! development and by the test suites.
//!
//! Besides the adapter contract it exposes test controls:
//! - per-operation failure injection (`fail_next`, `fail_always`)
//! - call counters (`calls`, `mutation_calls`)
//! - state shaping (`set_available_replicas`, `assign_address`, `record_event`)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::domain::cluster::{
    derive_status, format_age, format_recent_events, ClusterError, ClusterEvent, ClusterResourceAdapter,
    EndpointSpec, Provisioned, Removed, WorkloadSpec, WorkloadView,
};

/// Adapter operations that can be counted and made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterOp {
    CreateNamespace,
    CreateWorkload,
    CreateEndpoint,
    GetWorkload,
    GetEndpointAddress,
    UpdateWorkload,
    DeleteWorkload,
    DeleteEndpoint,
    List,
    ClusterVersion,
    RecentEvents,
}

impl ClusterOp {
    pub fn is_mutation(self) -> bool {
        matches!(
            self,
            ClusterOp::CreateNamespace
                | ClusterOp::CreateWorkload
                | ClusterOp::CreateEndpoint
                | ClusterOp::UpdateWorkload
                | ClusterOp::DeleteWorkload
                | ClusterOp::DeleteEndpoint
        )
    }
}

#[derive(Debug, Clone, Copy)]
enum FailureMode {
    Times(u32),
    Always,
}

#[derive(Debug, Clone)]
struct StoredWorkload {
    spec: WorkloadSpec,
    available: i32,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct StoredEndpoint {
    spec: EndpointSpec,
    host: Option<String>,
}

type Key = (String, String);

#[derive(Debug)]
struct State {
    namespaces: BTreeSet<String>,
    workloads: BTreeMap<Key, StoredWorkload>,
    endpoints: BTreeMap<Key, StoredEndpoint>,
    events: Vec<(String, ClusterEvent)>,
    nodes: Vec<String>,
    version: String,
    failures: HashMap<ClusterOp, FailureMode>,
    calls: HashMap<ClusterOp, usize>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            namespaces: BTreeSet::from(["default".to_string()]),
            workloads: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            events: Vec::new(),
            nodes: vec!["local-node".to_string()],
            version: "v1.32.0-inmemory".to_string(),
            failures: HashMap::new(),
            calls: HashMap::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct InMemoryCluster {
    state: Arc<Mutex<State>>,
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a namespace without counting a call.
    pub fn with_namespace(self, namespace: &str) -> Self {
        self.state.lock().namespaces.insert(namespace.to_string());
        self
    }

    /// Fail the next `times` invocations of `op` with `Unavailable`.
    pub fn fail_next(&self, op: ClusterOp, times: u32) {
        self.state.lock().failures.insert(op, FailureMode::Times(times));
    }

    pub fn fail_always(&self, op: ClusterOp) {
        self.state.lock().failures.insert(op, FailureMode::Always);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn calls(&self, op: ClusterOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn mutation_calls(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|(op, _)| op.is_mutation())
            .map(|(_, n)| n)
            .sum()
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.state.lock().namespaces.contains(namespace)
    }

    pub fn has_workload(&self, namespace: &str, name: &str) -> bool {
        self.state.lock().workloads.contains_key(&key(namespace, name))
    }

    pub fn has_endpoint(&self, namespace: &str, name: &str) -> bool {
        self.state.lock().endpoints.contains_key(&key(namespace, name))
    }

    /// Current `(image, replicas)` of a stored workload.
    pub fn workload_spec(&self, namespace: &str, name: &str) -> Option<(String, i32)> {
        self.state
            .lock()
            .workloads
            .get(&key(namespace, name))
            .map(|w| (w.spec.image.clone(), w.spec.replicas))
    }

    pub fn set_available_replicas(&self, namespace: &str, name: &str, available: i32) {
        if let Some(workload) = self.state.lock().workloads.get_mut(&key(namespace, name)) {
            workload.available = available;
        }
    }

    /// Simulates the load balancer assigning an ingress IP or hostname.
    pub fn assign_address(&self, namespace: &str, name: &str, host: &str) {
        if let Some(endpoint) = self.state.lock().endpoints.get_mut(&key(namespace, name)) {
            endpoint.host = Some(host.to_string());
        }
    }

    pub fn record_event(&self, namespace: &str, event: ClusterEvent) {
        let mut state = self.state.lock();
        state.namespaces.insert(namespace.to_string());
        state.events.push((namespace.to_string(), event));
    }

    /// Counts the call, then applies any injected failure.
    fn enter(&self, op: ClusterOp) -> Result<parking_lot::MutexGuard<'_, State>, ClusterError> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_insert(0) += 1;

        match state.failures.get(&op).copied() {
            Some(FailureMode::Always) => Err(injected(op)),
            Some(FailureMode::Times(n)) if n > 0 => {
                if n == 1 {
                    state.failures.remove(&op);
                } else {
                    state.failures.insert(op, FailureMode::Times(n - 1));
                }
                Err(injected(op))
            }
            _ => Ok(state),
        }
    }
}

fn require_namespace(state: &State, namespace: &str) -> Result<(), ClusterError> {
    if state.namespaces.contains(namespace) {
        Ok(())
    } else {
        Err(ClusterError::NotFound {
            kind: "namespace",
            namespace: namespace.to_string(),
            name: namespace.to_string(),
        })
    }
}

fn injected(op: ClusterOp) -> ClusterError {
    ClusterError::Unavailable(format!("injected failure on {:?}", op))
}

fn view(workload: &StoredWorkload, now: DateTime<Utc>) -> WorkloadView {
    let spec = &workload.spec;
    WorkloadView {
        name: spec.name.clone(),
        namespace: spec.namespace.clone(),
        desired_replicas: spec.replicas,
        current_replicas: spec.replicas,
        available_replicas: workload.available,
        status: derive_status(spec.replicas, workload.available),
        age: format_age(Some(workload.created_at), now),
        image: spec.image.clone(),
        created_at: Some(workload.created_at),
        spec: serde_json::json!({
            "replicas": spec.replicas,
            "image": spec.image,
            "containerPort": spec.container_port,
        }),
    }
}

#[async_trait]
impl ClusterResourceAdapter for InMemoryCluster {
    async fn create_namespace(&self, name: &str) -> Result<Provisioned, ClusterError> {
        let mut state = self.enter(ClusterOp::CreateNamespace)?;
        if state.namespaces.insert(name.to_string()) {
            Ok(Provisioned::Created)
        } else {
            Ok(Provisioned::Existing)
        }
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let mut state = self.enter(ClusterOp::CreateWorkload)?;
        require_namespace(&state, &spec.namespace)?;
        let k = key(&spec.namespace, &spec.name);
        if state.workloads.contains_key(&k) {
            return Err(ClusterError::AlreadyExists {
                kind: "deployment",
                namespace: spec.namespace.clone(),
                name: spec.name.clone(),
            });
        }
        state.workloads.insert(
            k,
            StoredWorkload {
                spec: spec.clone(),
                available: spec.replicas,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<Provisioned, ClusterError> {
        let mut state = self.enter(ClusterOp::CreateEndpoint)?;
        require_namespace(&state, &spec.namespace)?;
        let k = key(&spec.namespace, &spec.name);
        if state.endpoints.contains_key(&k) {
            return Ok(Provisioned::Existing);
        }
        state.endpoints.insert(
            k,
            StoredEndpoint {
                spec: spec.clone(),
                host: None,
            },
        );
        Ok(Provisioned::Created)
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<WorkloadView, ClusterError> {
        let state = self.enter(ClusterOp::GetWorkload)?;
        state
            .workloads
            .get(&key(namespace, name))
            .map(|w| view(w, Utc::now()))
            .ok_or_else(|| ClusterError::NotFound {
                kind: "deployment",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn get_endpoint_address(&self, namespace: &str, name: &str) -> Result<String, ClusterError> {
        let state = self.enter(ClusterOp::GetEndpointAddress)?;
        let endpoint = state.endpoints.get(&key(namespace, name)).ok_or_else(|| ClusterError::NotFound {
            kind: "service",
            namespace: namespace.to_string(),
            name: name.to_string(),
        })?;
        match &endpoint.host {
            Some(host) => Ok(format!("http://{}:{}", host, endpoint.spec.port)),
            None => Err(ClusterError::NoAddressAvailable {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
        }
    }

    async fn update_replicas_and_image(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
        image: &str,
    ) -> Result<(), ClusterError> {
        let mut state = self.enter(ClusterOp::UpdateWorkload)?;
        let workload = state
            .workloads
            .get_mut(&key(namespace, name))
            .ok_or_else(|| ClusterError::NotFound {
                kind: "deployment",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        workload.spec.replicas = replicas;
        workload.spec.image = image.to_string();
        workload.available = replicas;
        Ok(())
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<Removed, ClusterError> {
        let mut state = self.enter(ClusterOp::DeleteWorkload)?;
        Ok(match state.workloads.remove(&key(namespace, name)) {
            Some(_) => Removed::Deleted,
            None => Removed::Absent,
        })
    }

    async fn delete_endpoint(&self, namespace: &str, name: &str) -> Result<Removed, ClusterError> {
        let mut state = self.enter(ClusterOp::DeleteEndpoint)?;
        Ok(match state.endpoints.remove(&key(namespace, name)) {
            Some(_) => Removed::Deleted,
            None => Removed::Absent,
        })
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadView>, ClusterError> {
        let state = self.enter(ClusterOp::List)?;
        let now = Utc::now();
        Ok(state
            .workloads
            .values()
            .filter(|w| w.spec.namespace == namespace)
            .map(|w| view(w, now))
            .collect())
    }

    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<String>, ClusterError> {
        let state = self.enter(ClusterOp::List)?;
        Ok(state
            .endpoints
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect())
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<String>, ClusterError> {
        let state = self.enter(ClusterOp::List)?;
        Ok(state
            .workloads
            .values()
            .filter(|w| w.spec.namespace == namespace)
            .flat_map(|w| (0..w.available.max(0)).map(move |i| format!("{}-{}", w.spec.name, i)))
            .collect())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        let state = self.enter(ClusterOp::List)?;
        Ok(state.namespaces.iter().cloned().collect())
    }

    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let state = self.enter(ClusterOp::List)?;
        Ok(state.nodes.clone())
    }

    async fn cluster_version(&self) -> Result<String, ClusterError> {
        let state = self.enter(ClusterOp::ClusterVersion)?;
        Ok(state.version.clone())
    }

    async fn recent_events(&self, namespace: &str, top_k: usize) -> Result<Vec<String>, ClusterError> {
        let state = self.enter(ClusterOp::RecentEvents)?;
        let events = state
            .events
            .iter()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, e)| e.clone())
            .collect();
        Ok(format_recent_events(events, top_k))
    }
}
