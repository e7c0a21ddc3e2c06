use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;

use crate::crd::balancer::{
    Balancer, COMPONENT_BACKEND, COMPONENT_FRONTEND,
};

use super::{
    backend_service_name, derived_meta, frontend_service_name, proxy_pod_labels,
};

/// Map the Balancer ports onto ServicePorts. The front end leaves
/// `targetPort` unset (the proxy listens on the exposed port itself);
/// backend Services carry the pods' target port.
fn service_ports(balancer: &Balancer, with_target: bool) -> Vec<ServicePort> {
    balancer
        .spec
        .ports
        .iter()
        .map(|p| ServicePort {
            name: Some(p.name.clone()),
            protocol: Some(p.protocol().as_str().to_string()),
            port: i32::from(p.port),
            target_port: if with_target {
                p.target_port.map(|t| IntOrString::Int(i32::from(t)))
            } else {
                None
            },
            ..Default::default()
        })
        .collect()
}

/// The single front-end Service exposing every declared port and selecting
/// the proxy pods.
pub fn frontend(balancer: &Balancer) -> Service {
    let name = balancer.name_any();
    Service {
        metadata: derived_meta(
            balancer,
            frontend_service_name(&name),
            COMPONENT_FRONTEND,
        ),
        spec: Some(ServiceSpec {
            selector: Some(proxy_pod_labels(&name)),
            type_: Some("ClusterIP".to_string()),
            ports: Some(service_ports(balancer, false)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// One Service per backend entry, selecting pods via the base selector merged
/// with the backend's own selector (backend keys win).
pub fn backends(balancer: &Balancer) -> Vec<Service> {
    let name = balancer.name_any();
    balancer
        .spec
        .backends
        .iter()
        .map(|backend| {
            let mut selector: BTreeMap<String, String> =
                balancer.spec.selector.clone();
            selector.extend(
                backend.selector.iter().map(|(k, v)| (k.clone(), v.clone())),
            );
            Service {
                metadata: derived_meta(
                    balancer,
                    backend_service_name(&name, &backend.name),
                    COMPONENT_BACKEND,
                ),
                spec: Some(ServiceSpec {
                    selector: Some(selector),
                    type_: Some("ClusterIP".to_string()),
                    ports: Some(service_ports(balancer, true)),
                    ..Default::default()
                }),
                ..Default::default()
            }
        })
        .collect()
}
