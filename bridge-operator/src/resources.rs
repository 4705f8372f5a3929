//! Dependent resource construction.
//!
//! Turns a desired resource into the Deployment and Service that run it. The
//! builders are pure: the same spec and owner always produce the same
//! objects. Fields the orchestrator fills in (cluster IP, resource version,
//! status, server-side defaults) are never set here and are ignored by the
//! `*_matches` comparisons.

use bridge_core::DesiredObject;
use bridge_core::naming::{COMPONENT_LABEL, INSTANCE_LABEL, MANAGED_BY, MANAGED_BY_LABEL};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvFromSource, EnvVar, PodSpec, PodTemplateSpec,
    ResourceRequirements, SecretEnvSource, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Port the workload container listens on.
pub const CONTAINER_PORT: i32 = 8080;

/// Name of the container and of its port.
const CONTAINER_NAME: &str = "bridge";
const PORT_NAME: &str = "http";

/// Replica count of every workload.
pub const REPLICAS: i32 = 1;

/// Objects built for one desired resource.
#[derive(Debug, Clone, PartialEq)]
pub struct DependentResources {
    /// Workload running the bridge component.
    pub deployment: Deployment,
    /// Service in front of the workload.
    pub service: Service,
    /// Name of the tenant secret injected into the workload.
    pub secret_name: String,
}

/// Build every dependent object for `desired`.
pub fn build(desired: &DesiredObject, owner: &OwnerReference) -> DependentResources {
    DependentResources {
        deployment: build_deployment(desired, owner),
        service: build_service(desired, owner),
        secret_name: desired.secret_name(),
    }
}

/// Labels the Deployment selector and the Service select on.
///
/// Exactly one label, so the selector stays stable across spec changes.
pub fn selector_labels(desired: &DesiredObject) -> BTreeMap<String, String> {
    BTreeMap::from([(INSTANCE_LABEL.to_string(), desired.name())])
}

/// Labels set on every built object and on the pod template.
pub fn labels(desired: &DesiredObject) -> BTreeMap<String, String> {
    let mut labels = selector_labels(desired);
    labels.insert(
        COMPONENT_LABEL.to_string(),
        desired.kind().component().to_string(),
    );
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    labels
}

/// Build the Deployment for `desired`.
pub fn build_deployment(desired: &DesiredObject, owner: &OwnerReference) -> Deployment {
    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(desired.image().to_string()),
        env: Some(environment(desired)),
        env_from: Some(vec![EnvFromSource {
            secret_ref: Some(SecretEnvSource {
                name: desired.secret_name(),
                optional: Some(false),
            }),
            ..Default::default()
        }]),
        ports: Some(vec![ContainerPort {
            name: Some(PORT_NAME.to_string()),
            container_port: CONTAINER_PORT,
            ..Default::default()
        }]),
        resources: Some(ResourceRequirements {
            requests: Some(BTreeMap::from([
                ("cpu".to_string(), Quantity("100m".to_string())),
                ("memory".to_string(), Quantity("128Mi".to_string())),
            ])),
            limits: Some(BTreeMap::from([(
                "memory".to_string(),
                Quantity("512Mi".to_string()),
            )])),
            ..Default::default()
        }),
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(desired, owner),
        spec: Some(DeploymentSpec {
            replicas: Some(REPLICAS),
            selector: LabelSelector {
                match_labels: Some(selector_labels(desired)),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels(desired)),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Build the Service for `desired`.
pub fn build_service(desired: &DesiredObject, owner: &OwnerReference) -> Service {
    Service {
        metadata: object_meta(desired, owner),
        spec: Some(ServiceSpec {
            selector: Some(selector_labels(desired)),
            ports: Some(vec![ServicePort {
                name: Some(PORT_NAME.to_string()),
                port: CONTAINER_PORT,
                target_port: Some(IntOrString::String(PORT_NAME.to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// In-cluster URL of a service built by [`build_service`].
pub fn service_endpoint(namespace: &str, name: &str) -> String {
    format!(
        "http://{}.{}.svc.cluster.local:{}",
        name, namespace, CONTAINER_PORT
    )
}

/// Whether the live Deployment selector differs from the built one.
///
/// The selector is immutable, so a difference forces delete and create.
pub fn selector_differs(built: &Deployment, live: &Deployment) -> bool {
    let selector = |d: &Deployment| d.spec.as_ref().map(|s| s.selector.clone());
    selector(built) != selector(live)
}

/// Structural equality over the Deployment fields the builder owns.
pub fn deployment_matches(built: &Deployment, live: &Deployment) -> bool {
    DeploymentProjection::of(built) == DeploymentProjection::of(live)
}

/// Structural equality over the Service fields the builder owns.
pub fn service_matches(built: &Service, live: &Service) -> bool {
    ServiceProjection::of(built) == ServiceProjection::of(live)
}

fn object_meta(desired: &DesiredObject, owner: &OwnerReference) -> ObjectMeta {
    ObjectMeta {
        name: Some(desired.name()),
        namespace: desired.meta().namespace.clone(),
        labels: Some(labels(desired)),
        owner_references: Some(vec![owner.clone()]),
        ..Default::default()
    }
}

fn environment(desired: &DesiredObject) -> Vec<EnvVar> {
    let var = |name: &str, value: &str| EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    };

    let mut env = vec![
        var("BRIDGE_ID", desired.bridge_id()),
        var("CUSTOMER_ID", desired.customer_id()),
    ];
    if let DesiredObject::Executor(executor) = desired {
        env.push(var("PROCESSOR_ID", &executor.spec.processor_id));
        env.push(var("PROCESSOR_DEFINITION", &executor.spec.definition));
    }
    env
}

#[derive(Debug, PartialEq)]
struct ContainerProjection {
    name: String,
    image: Option<String>,
    env: Option<Vec<EnvVar>>,
    env_from: Option<Vec<EnvFromSource>>,
    ports: Vec<(Option<String>, i32)>,
    requests: Option<BTreeMap<String, Quantity>>,
    limits: Option<BTreeMap<String, Quantity>>,
}

#[derive(Debug, PartialEq)]
struct DeploymentProjection {
    labels: Option<BTreeMap<String, String>>,
    owners: Vec<String>,
    replicas: Option<i32>,
    selector: Option<LabelSelector>,
    template_labels: Option<BTreeMap<String, String>>,
    containers: Vec<ContainerProjection>,
}

impl DeploymentProjection {
    fn of(deployment: &Deployment) -> Self {
        let spec = deployment.spec.as_ref();
        let template = spec.map(|s| &s.template);
        let containers = template
            .and_then(|t| t.spec.as_ref())
            .map(|p| p.containers.iter().map(project_container).collect())
            .unwrap_or_default();

        Self {
            labels: deployment.metadata.labels.clone(),
            owners: owner_uids(&deployment.metadata),
            replicas: spec.and_then(|s| s.replicas),
            selector: spec.map(|s| s.selector.clone()),
            template_labels: template
                .and_then(|t| t.metadata.as_ref())
                .and_then(|m| m.labels.clone()),
            containers,
        }
    }
}

fn project_container(container: &Container) -> ContainerProjection {
    ContainerProjection {
        name: container.name.clone(),
        image: container.image.clone(),
        env: container.env.clone(),
        env_from: container.env_from.clone(),
        ports: container
            .ports
            .iter()
            .flatten()
            .map(|p| (p.name.clone(), p.container_port))
            .collect(),
        requests: container.resources.as_ref().and_then(|r| r.requests.clone()),
        limits: container.resources.as_ref().and_then(|r| r.limits.clone()),
    }
}

#[derive(Debug, PartialEq)]
struct ServiceProjection {
    labels: Option<BTreeMap<String, String>>,
    owners: Vec<String>,
    selector: Option<BTreeMap<String, String>>,
    ports: Vec<(Option<String>, i32, Option<IntOrString>)>,
}

impl ServiceProjection {
    fn of(service: &Service) -> Self {
        let spec = service.spec.as_ref();
        Self {
            labels: service.metadata.labels.clone(),
            owners: owner_uids(&service.metadata),
            selector: spec.and_then(|s| s.selector.clone()),
            ports: spec
                .and_then(|s| s.ports.as_ref())
                .into_iter()
                .flatten()
                .map(|p| (p.name.clone(), p.port, p.target_port.clone()))
                .collect(),
        }
    }
}

fn owner_uids(meta: &ObjectMeta) -> Vec<String> {
    meta.owner_references
        .iter()
        .flatten()
        .map(|r| r.uid.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::crd::{BridgeExecutor, BridgeExecutorSpec, BridgeIngress, BridgeIngressSpec};

    fn ingress() -> DesiredObject {
        let mut ingress = BridgeIngress::new(
            "ob-bridge-1",
            BridgeIngressSpec {
                image: "ingress:1".to_string(),
                bridge_id: "bridge-1".to_string(),
                customer_id: "acme".to_string(),
                bridge_name: "orders".to_string(),
            },
        );
        ingress.metadata.namespace = Some("ob-acme".to_string());
        ingress.metadata.uid = Some("uid-1".to_string());
        DesiredObject::Ingress(ingress)
    }

    fn executor() -> DesiredObject {
        let mut executor = BridgeExecutor::new(
            "ob-proc-1",
            BridgeExecutorSpec {
                image: "executor:1".to_string(),
                bridge_id: "bridge-1".to_string(),
                customer_id: "acme".to_string(),
                processor_id: "proc-1".to_string(),
                processor_name: "to-kafka".to_string(),
                definition: r#"{"action":{"type":"KafkaTopicAction"}}"#.to_string(),
            },
        );
        executor.metadata.namespace = Some("ob-acme".to_string());
        executor.metadata.uid = Some("uid-2".to_string());
        DesiredObject::Executor(executor)
    }

    fn owner(desired: &DesiredObject) -> OwnerReference {
        desired.owner_reference().unwrap()
    }

    #[test]
    fn deployment_is_owned_and_selects_one_label() {
        let desired = ingress();
        let deployment = build_deployment(&desired, &owner(&desired));

        let owners = deployment.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "BridgeIngress");
        assert_eq!(owners[0].controller, Some(true));

        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(REPLICAS));
        assert_eq!(spec.selector.match_labels.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn deployment_references_secret_named_like_resource() {
        let desired = ingress();
        let deployment = build_deployment(&desired, &owner(&desired));
        let container = &deployment.spec.unwrap().template.spec.unwrap().containers[0];

        let secret_ref = container.env_from.as_ref().unwrap()[0]
            .secret_ref
            .as_ref()
            .unwrap();
        assert_eq!(secret_ref.name, "ob-bridge-1");
        assert_eq!(container.image.as_deref(), Some("ingress:1"));
    }

    #[test]
    fn executor_environment_carries_processor_definition() {
        let desired = executor();
        let deployment = build_deployment(&desired, &owner(&desired));
        let env = deployment.spec.unwrap().template.spec.unwrap().containers[0]
            .env
            .clone()
            .unwrap();

        let value = |name: &str| {
            env.iter()
                .find(|e| e.name == name)
                .and_then(|e| e.value.clone())
        };
        assert_eq!(value("PROCESSOR_ID").as_deref(), Some("proc-1"));
        assert!(value("PROCESSOR_DEFINITION").unwrap().contains("KafkaTopicAction"));
        assert_eq!(value("BRIDGE_ID").as_deref(), Some("bridge-1"));
    }

    #[test]
    fn service_selects_deployment_pods() {
        let desired = ingress();
        let built = build(&desired, &owner(&desired));

        let service_selector = built.service.spec.as_ref().unwrap().selector.clone();
        let deployment_selector = built
            .deployment
            .spec
            .as_ref()
            .unwrap()
            .selector
            .match_labels
            .clone();
        assert_eq!(service_selector, deployment_selector);
        assert_eq!(built.secret_name, "ob-bridge-1");
    }

    #[test]
    fn build_is_deterministic() {
        let desired = executor();
        assert_eq!(
            build(&desired, &owner(&desired)),
            build(&desired, &owner(&desired))
        );
    }

    #[test]
    fn server_filled_fields_do_not_break_matching() {
        let desired = ingress();
        let built = build(&desired, &owner(&desired));

        let mut live_deployment = built.deployment.clone();
        live_deployment.metadata.resource_version = Some("42".to_string());
        if let Some(spec) = live_deployment.spec.as_mut() {
            spec.revision_history_limit = Some(10);
            if let Some(pod) = spec.template.spec.as_mut() {
                pod.dns_policy = Some("ClusterFirst".to_string());
                pod.containers[0].image_pull_policy = Some("IfNotPresent".to_string());
                if let Some(port) = pod.containers[0].ports.as_mut() {
                    port[0].protocol = Some("TCP".to_string());
                }
            }
        }
        assert!(deployment_matches(&built.deployment, &live_deployment));

        let mut live_service = built.service.clone();
        if let Some(spec) = live_service.spec.as_mut() {
            spec.cluster_ip = Some("10.96.0.7".to_string());
        }
        assert!(service_matches(&built.service, &live_service));
    }

    #[test]
    fn image_change_breaks_matching_but_not_selector() {
        let desired = ingress();
        let built = build_deployment(&desired, &owner(&desired));

        let mut changed = built.clone();
        if let Some(pod) = changed.spec.as_mut().and_then(|s| s.template.spec.as_mut()) {
            pod.containers[0].image = Some("ingress:2".to_string());
        }

        assert!(!deployment_matches(&built, &changed));
        assert!(!selector_differs(&built, &changed));
    }

    #[test]
    fn endpoint_points_at_service() {
        assert_eq!(
            service_endpoint("ob-acme", "ob-bridge-1"),
            "http://ob-bridge-1.ob-acme.svc.cluster.local:8080"
        );
    }
}
