use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, PodSpec, PodTemplateSpec,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use kube::ResourceExt;

use crate::crd::balancer::{
    Balancer, COMPONENT_PROXY, CONFIG_HASH_ANNOTATION,
};

use super::{config_map_name, deployment_name, derived_meta, proxy_pod_labels};

/// Path where the rendered configuration lands inside the proxy container.
pub const CONFIG_MOUNT_PATH: &str = "/etc/nginx/nginx.conf";

const CONFIG_VOLUME: &str = "proxy-config";

/// Synthesize the single-replica proxy Deployment.
///
/// The pod template carries `config_hash` as an annotation so that a change
/// to the rendered configuration rolls the proxy pods even when the rest of
/// the Deployment spec is unchanged.
pub fn proxy(balancer: &Balancer, image: &str, config_hash: &str) -> Deployment {
    let name = balancer.name_any();
    let pod_labels = proxy_pod_labels(&name);

    let container = Container {
        name: "nginx".to_string(),
        image: Some(image.to_string()),
        ports: Some(
            balancer
                .spec
                .ports
                .iter()
                .map(|p| ContainerPort {
                    name: Some(p.name.clone()),
                    container_port: i32::from(p.port),
                    protocol: Some(p.protocol().as_str().to_string()),
                    ..Default::default()
                })
                .collect(),
        ),
        volume_mounts: Some(vec![VolumeMount {
            name: CONFIG_VOLUME.to_string(),
            mount_path: CONFIG_MOUNT_PATH.to_string(),
            sub_path: Some(super::config_map::CONFIG_KEY.to_string()),
            read_only: Some(true),
            ..Default::default()
        }]),
        ..Default::default()
    };

    let volume = Volume {
        name: CONFIG_VOLUME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: config_map_name(&name),
            ..Default::default()
        }),
        ..Default::default()
    };

    Deployment {
        metadata: derived_meta(balancer, deployment_name(&name), COMPONENT_PROXY),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(pod_labels.clone()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    annotations: Some(BTreeMap::from([(
                        CONFIG_HASH_ANNOTATION.to_string(),
                        config_hash.to_string(),
                    )])),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![volume]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Fingerprint recorded in an observed Deployment's pod template, if any.
pub fn observed_config_hash(dep: &Deployment) -> Option<&str> {
    dep.spec
        .as_ref()?
        .template
        .metadata
        .as_ref()?
        .annotations
        .as_ref()?
        .get(CONFIG_HASH_ANNOTATION)
        .map(String::as_str)
}
