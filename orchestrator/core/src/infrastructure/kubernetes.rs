// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Kubernetes Cluster Adapter
//!
//! `ClusterResourceAdapter` backed by the Kubernetes API server through
//! `kube`. Workloads are `apps/v1 Deployment`s, endpoints are `v1 Service`s
//! of type `LoadBalancer`.
//!
//! Every API call runs under the configured deadline. An expired deadline
//! surfaces as [`ClusterError::Timeout`]. Status codes 404 and 409 map to
//! `NotFound` and `AlreadyExists`. Every other failure is `Unavailable`.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Cluster-side adapter for the workload lifecycle

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy, RollingUpdateDeployment};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, Event, Namespace, Node, Pod, PodSpec, PodTemplateSpec,
    ResourceRequirements, SecurityContext, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::domain::cluster::{
    derive_status, format_age, format_recent_events, ClusterError, ClusterEvent, ClusterResourceAdapter,
    EndpointSpec, Provisioned, Removed, WorkloadSpec, WorkloadView, APP_LABEL, CPU_LIMIT, MAX_SURGE,
    MAX_UNAVAILABLE, MEMORY_LIMIT, SCRATCH_MOUNT_PATH, SCRATCH_VOLUME_NAME,
};

const DEPLOYMENT: &str = "deployment";
const SERVICE: &str = "service";

pub struct KubernetesClusterAdapter {
    client: Client,
    timeout: Duration,
}

impl KubernetesClusterAdapter {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Builds a client from the named kubeconfig context, or from the
    /// inferred in-cluster/kubeconfig configuration when none is given.
    pub async fn connect(context: Option<&str>, timeout: Duration) -> Result<Self, ClusterError> {
        let config = match context {
            Some(ctx) => Config::from_kubeconfig(&KubeConfigOptions {
                context: Some(ctx.to_string()),
                ..Default::default()
            })
            .await
            .map_err(|e| ClusterError::Unavailable(format!("failed to load kubeconfig context '{}': {}", ctx, e)))?,
            None => Config::infer()
                .await
                .map_err(|e| ClusterError::Unavailable(format!("failed to infer cluster config: {}", e)))?,
        };
        let client = Client::try_from(config).map_err(|e| ClusterError::Unavailable(e.to_string()))?;
        info!(context = ?context, "Connected to Kubernetes API server");
        Ok(Self::new(client, timeout))
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }

    /// Applies the per-call deadline. The inner result is left to the caller
    /// so status codes can be matched.
    async fn guarded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, kube::Error>>,
    ) -> Result<Result<T, kube::Error>, ClusterError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| ClusterError::Timeout {
                operation,
                timeout_secs: self.timeout.as_secs(),
            })
    }

    /// Deadline plus plain error mapping, for calls with no special status handling.
    async fn call<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, kube::Error>>,
    ) -> Result<T, ClusterError> {
        self.guarded(operation, call).await?.map_err(unavailable)
    }
}

fn unavailable(err: kube::Error) -> ClusterError {
    ClusterError::Unavailable(err.to_string())
}

fn not_found(kind: &'static str, namespace: &str, name: &str) -> ClusterError {
    ClusterError::NotFound {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
    }
}

fn app_labels(name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(APP_LABEL.to_string(), name.to_string())])
}

/// Translates a workload intent into a Deployment manifest.
pub fn build_deployment(spec: &WorkloadSpec) -> Deployment {
    let labels = app_labels(&spec.name);

    let container = Container {
        name: spec.name.clone(),
        image: Some(spec.image.clone()),
        ports: Some(vec![ContainerPort {
            container_port: spec.container_port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            limits: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(CPU_LIMIT.to_string())),
                ("memory".to_string(), Quantity(MEMORY_LIMIT.to_string())),
            ])),
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity(spec.cpu_request.clone())),
                ("memory".to_string(), Quantity(spec.memory_request.clone())),
            ])),
            ..Default::default()
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: SCRATCH_VOLUME_NAME.to_string(),
            mount_path: SCRATCH_MOUNT_PATH.to_string(),
            ..Default::default()
        }]),
        security_context: Some(SecurityContext {
            read_only_root_filesystem: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(spec.replicas),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("RollingUpdate".to_string()),
                rolling_update: Some(RollingUpdateDeployment {
                    max_surge: Some(IntOrString::Int(MAX_SURGE)),
                    max_unavailable: Some(IntOrString::Int(MAX_UNAVAILABLE)),
                }),
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![Volume {
                        name: SCRATCH_VOLUME_NAME.to_string(),
                        empty_dir: Some(EmptyDirVolumeSource {
                            medium: Some("Memory".to_string()),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Translates an endpoint intent into a LoadBalancer Service manifest.
pub fn build_service(spec: &EndpointSpec) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(spec.name.clone()),
            namespace: Some(spec.namespace.clone()),
            labels: Some(app_labels(&spec.target_workload)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            selector: Some(app_labels(&spec.target_workload)),
            ports: Some(vec![ServicePort {
                port: spec.port,
                target_port: Some(IntOrString::Int(spec.target_port)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Reads a live Deployment into a typed view.
pub fn deployment_view(deployment: &Deployment, now: chrono::DateTime<Utc>) -> WorkloadView {
    let spec = deployment.spec.as_ref();
    let status = deployment.status.as_ref();

    let desired = spec.and_then(|s| s.replicas).unwrap_or(0);
    let current = status.and_then(|s| s.replicas).unwrap_or(0);
    let available = status.and_then(|s| s.available_replicas).unwrap_or(0);
    let image = spec
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
        .and_then(|c| c.image.clone())
        .unwrap_or_default();
    let created_at = deployment.metadata.creation_timestamp.as_ref().map(|t| t.0);

    WorkloadView {
        name: deployment.metadata.name.clone().unwrap_or_default(),
        namespace: deployment.metadata.namespace.clone().unwrap_or_default(),
        desired_replicas: desired,
        current_replicas: current,
        available_replicas: available,
        status: derive_status(desired, available),
        age: format_age(created_at, now),
        image,
        created_at,
        spec: spec
            .and_then(|s| serde_json::to_value(s).ok())
            .unwrap_or(serde_json::Value::Null),
    }
}

/// `http://<ip-or-hostname>:<port>` from the first ingress entry, if any.
pub fn service_address(service: &Service) -> Option<String> {
    let ingress = service
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .and_then(|i| i.first())?;

    let host = match ingress.ip.as_deref() {
        Some(ip) if !ip.is_empty() => ip.to_string(),
        _ => ingress.hostname.clone().filter(|h| !h.is_empty())?,
    };
    let port = service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_ref())
        .and_then(|p| p.first())
        .map(|p| p.port)?;

    Some(format!("http://{}:{}", host, port))
}

fn object_names<K: kube::Resource>(items: Vec<K>) -> Vec<String> {
    items.into_iter().filter_map(|o| o.meta().name.clone()).collect()
}

#[async_trait]
impl ClusterResourceAdapter for KubernetesClusterAdapter {
    async fn create_namespace(&self, name: &str) -> Result<Provisioned, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        if self.call("get_namespace", api.get_opt(name)).await?.is_some() {
            debug!(namespace = name, "Namespace already exists");
            return Ok(Provisioned::Existing);
        }

        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match self
            .guarded("create_namespace", api.create(&PostParams::default(), &namespace))
            .await?
        {
            Ok(_) => Ok(Provisioned::Created),
            // Lost a race with another creator.
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(Provisioned::Existing),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), ClusterError> {
        let deployment = build_deployment(spec);
        match self
            .guarded(
                "create_workload",
                self.deployments(&spec.namespace).create(&PostParams::default(), &deployment),
            )
            .await?
        {
            Ok(_) => {
                info!(namespace = %spec.namespace, workload = %spec.name, "Created deployment");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Err(ClusterError::AlreadyExists {
                kind: DEPLOYMENT,
                namespace: spec.namespace.clone(),
                name: spec.name.clone(),
            }),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(not_found("namespace", &spec.namespace, &spec.namespace)),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn create_endpoint(&self, spec: &EndpointSpec) -> Result<Provisioned, ClusterError> {
        let api = self.services(&spec.namespace);
        if self.call("get_endpoint", api.get_opt(&spec.name)).await?.is_some() {
            debug!(namespace = %spec.namespace, endpoint = %spec.name, "Service already exists");
            return Ok(Provisioned::Existing);
        }

        match self
            .guarded("create_endpoint", api.create(&PostParams::default(), &build_service(spec)))
            .await?
        {
            Ok(_) => {
                info!(namespace = %spec.namespace, endpoint = %spec.name, "Created service");
                Ok(Provisioned::Created)
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(Provisioned::Existing),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<WorkloadView, ClusterError> {
        let deployment = self
            .call("get_workload", self.deployments(namespace).get_opt(name))
            .await?
            .ok_or_else(|| not_found(DEPLOYMENT, namespace, name))?;
        Ok(deployment_view(&deployment, Utc::now()))
    }

    async fn get_endpoint_address(&self, namespace: &str, name: &str) -> Result<String, ClusterError> {
        let service = self
            .call("get_endpoint", self.services(namespace).get_opt(name))
            .await?
            .ok_or_else(|| not_found(SERVICE, namespace, name))?;
        service_address(&service).ok_or_else(|| ClusterError::NoAddressAvailable {
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }

    async fn update_replicas_and_image(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
        image: &str,
    ) -> Result<(), ClusterError> {
        let api = self.deployments(namespace);
        let mut deployment = self
            .call("get_workload", api.get_opt(name))
            .await?
            .ok_or_else(|| not_found(DEPLOYMENT, namespace, name))?;

        let spec = deployment
            .spec
            .as_mut()
            .ok_or_else(|| ClusterError::Unavailable(format!("deployment '{}' has no spec", name)))?;
        spec.replicas = Some(replicas);
        if let Some(container) = spec
            .template
            .spec
            .as_mut()
            .and_then(|p| p.containers.first_mut())
        {
            container.image = Some(image.to_string());
        }
        // Unconditional write: last writer wins.
        deployment.metadata.resource_version = None;
        deployment.status = None;

        match self
            .guarded("update_workload", api.replace(name, &PostParams::default(), &deployment))
            .await?
        {
            Ok(_) => {
                info!(namespace, workload = name, replicas, image, "Updated deployment");
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(not_found(DEPLOYMENT, namespace, name)),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn delete_workload(&self, namespace: &str, name: &str) -> Result<Removed, ClusterError> {
        match self
            .guarded("delete_workload", self.deployments(namespace).delete(name, &DeleteParams::default()))
            .await?
        {
            Ok(_) => Ok(Removed::Deleted),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(Removed::Absent),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn delete_endpoint(&self, namespace: &str, name: &str) -> Result<Removed, ClusterError> {
        match self
            .guarded("delete_endpoint", self.services(namespace).delete(name, &DeleteParams::default()))
            .await?
        {
            Ok(_) => Ok(Removed::Deleted),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(Removed::Absent),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadView>, ClusterError> {
        let list = self
            .call("list_workloads", self.deployments(namespace).list(&ListParams::default()))
            .await?;
        let now = Utc::now();
        Ok(list.items.iter().map(|d| deployment_view(d, now)).collect())
    }

    async fn list_endpoints(&self, namespace: &str) -> Result<Vec<String>, ClusterError> {
        let list = self
            .call("list_endpoints", self.services(namespace).list(&ListParams::default()))
            .await?;
        Ok(object_names(list.items))
    }

    async fn list_pods(&self, namespace: &str) -> Result<Vec<String>, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = self.call("list_pods", api.list(&ListParams::default())).await?;
        Ok(object_names(list.items))
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ClusterError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = self.call("list_namespaces", api.list(&ListParams::default())).await?;
        Ok(object_names(list.items))
    }

    async fn list_nodes(&self) -> Result<Vec<String>, ClusterError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = self.call("list_nodes", api.list(&ListParams::default())).await?;
        Ok(object_names(list.items))
    }

    async fn cluster_version(&self) -> Result<String, ClusterError> {
        let info = self.call("cluster_version", self.client.apiserver_version()).await?;
        Ok(info.git_version)
    }

    async fn recent_events(&self, namespace: &str, top_k: usize) -> Result<Vec<String>, ClusterError> {
        let api: Api<Event> = Api::namespaced(self.client.clone(), namespace);
        let list = self.call("recent_events", api.list(&ListParams::default())).await?;

        let events = list
            .items
            .into_iter()
            .map(|e| ClusterEvent {
                name: e.metadata.name.unwrap_or_default(),
                reason: e.reason.unwrap_or_default(),
                message: e.message.unwrap_or_default(),
                last_timestamp: e.last_timestamp.map(|t| t.0).or(e.event_time.map(|t| t.0)),
            })
            .collect();
        Ok(format_recent_events(events, top_k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::{DerivedStatus, CPU_REQUEST, MEMORY_REQUEST};
    use k8s_openapi::api::apps::v1::DeploymentStatus;
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn workload_spec() -> WorkloadSpec {
        WorkloadSpec {
            namespace: "tenant-a".to_string(),
            name: "web".to_string(),
            image: "nginx:1.27".to_string(),
            replicas: 3,
            container_port: 8080,
            cpu_request: CPU_REQUEST.to_string(),
            memory_request: MEMORY_REQUEST.to_string(),
        }
    }

    #[test]
    fn test_build_deployment() {
        let deployment = build_deployment(&workload_spec());
        let spec = deployment.spec.as_ref().unwrap();

        assert_eq!(deployment.metadata.name.as_deref(), Some("web"));
        assert_eq!(spec.replicas, Some(3));
        assert_eq!(
            spec.selector.match_labels.as_ref().unwrap().get("app").map(String::as_str),
            Some("web")
        );

        let rolling = spec.strategy.as_ref().unwrap().rolling_update.as_ref().unwrap();
        assert_eq!(rolling.max_surge, Some(IntOrString::Int(1)));
        assert_eq!(rolling.max_unavailable, Some(IntOrString::Int(1)));

        let pod = spec.template.spec.as_ref().unwrap();
        let volume = &pod.volumes.as_ref().unwrap()[0];
        assert_eq!(volume.name, "tmpfs-storage");
        assert_eq!(volume.empty_dir.as_ref().unwrap().medium.as_deref(), Some("Memory"));

        let container = &pod.containers[0];
        assert_eq!(container.name, "web");
        assert_eq!(container.image.as_deref(), Some("nginx:1.27"));
        assert_eq!(container.ports.as_ref().unwrap()[0].container_port, 8080);
        assert_eq!(container.volume_mounts.as_ref().unwrap()[0].mount_path, "/tmp");

        let resources = container.resources.as_ref().unwrap();
        let limits = resources.limits.as_ref().unwrap();
        assert_eq!(limits["cpu"], Quantity("0.5".to_string()));
        assert_eq!(limits["memory"], Quantity("0.5Gi".to_string()));
        let requests = resources.requests.as_ref().unwrap();
        assert_eq!(requests["cpu"], Quantity("50m".to_string()));
        assert_eq!(requests["memory"], Quantity("0.2Gi".to_string()));
    }

    #[test]
    fn test_build_service() {
        let service = build_service(&EndpointSpec {
            namespace: "tenant-a".to_string(),
            name: "web-service".to_string(),
            target_workload: "web".to_string(),
            port: 80,
            target_port: 8080,
        });
        let spec = service.spec.unwrap();

        assert_eq!(service.metadata.name.as_deref(), Some("web-service"));
        assert_eq!(spec.type_.as_deref(), Some("LoadBalancer"));
        assert_eq!(spec.selector.unwrap().get("app").map(String::as_str), Some("web"));
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.port, 80);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
        assert_eq!(port.protocol.as_deref(), Some("TCP"));
    }

    #[test]
    fn test_deployment_view() {
        let now = Utc::now();
        let mut deployment = build_deployment(&workload_spec());
        deployment.metadata.creation_timestamp = Some(Time(now - chrono::Duration::minutes(5)));
        deployment.status = Some(DeploymentStatus {
            replicas: Some(3),
            available_replicas: Some(2),
            ..Default::default()
        });

        let view = deployment_view(&deployment, now);
        assert_eq!(view.desired_replicas, 3);
        assert_eq!(view.current_replicas, 3);
        assert_eq!(view.available_replicas, 2);
        assert_eq!(view.status, DerivedStatus::Progressing);
        assert_eq!(view.age, "5 minutes ago");
        assert_eq!(view.image, "nginx:1.27");
        assert_eq!(view.spec["replicas"], serde_json::json!(3));
    }

    fn service_with_ingress(ingress: Option<LoadBalancerIngress>) -> Service {
        let mut service = build_service(&EndpointSpec {
            namespace: "tenant-a".to_string(),
            name: "web-service".to_string(),
            target_workload: "web".to_string(),
            port: 80,
            target_port: 8080,
        });
        service.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: ingress.map(|i| vec![i]),
            }),
            ..Default::default()
        });
        service
    }

    #[test]
    fn test_service_address_prefers_ip_then_hostname() {
        let by_ip = service_with_ingress(Some(LoadBalancerIngress {
            ip: Some("203.0.113.7".to_string()),
            hostname: Some("lb.example.com".to_string()),
            ..Default::default()
        }));
        assert_eq!(service_address(&by_ip).as_deref(), Some("http://203.0.113.7:80"));

        let by_host = service_with_ingress(Some(LoadBalancerIngress {
            ip: Some(String::new()),
            hostname: Some("lb.example.com".to_string()),
            ..Default::default()
        }));
        assert_eq!(service_address(&by_host).as_deref(), Some("http://lb.example.com:80"));

        assert_eq!(service_address(&service_with_ingress(None)), None);
    }
}
