//! Partitioning of desired vs observed backend Services.
//!
//! Identity is `(namespace, name)` only. Content differences (ports,
//! selector) never move a Service between partitions; they are a secondary
//! per-resource check done when applying the `active` partition.

use std::collections::HashMap;

use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

/// An observed Service whose identity also appears in the desired set,
/// paired with its freshly synthesized counterpart.
#[derive(Debug, Clone)]
pub struct ActivePair {
    pub observed: Service,
    pub desired: Service,
}

/// Disjoint, complete partitioning of `observed ∪ desired`.
#[derive(Debug, Clone, Default)]
pub struct BackendDiff {
    pub to_create: Vec<Service>,
    pub to_delete: Vec<Service>,
    pub active: Vec<ActivePair>,
}

fn identity(svc: &Service) -> (String, String) {
    (
        svc.metadata.namespace.clone().unwrap_or_default(),
        svc.metadata.name.clone().unwrap_or_default(),
    )
}

/// Partition by identity key using a single map lookup per observed object.
pub fn partition(desired: Vec<Service>, observed: Vec<Service>) -> BackendDiff {
    let mut desired_by_key: HashMap<(String, String), Service> = desired
        .into_iter()
        .map(|svc| (identity(&svc), svc))
        .collect();

    let mut diff = BackendDiff::default();
    for obs in observed {
        match desired_by_key.remove(&identity(&obs)) {
            Some(des) => diff.active.push(ActivePair {
                observed: obs,
                desired: des,
            }),
            None => diff.to_delete.push(obs),
        }
    }
    diff.to_create = desired_by_key.into_values().collect();
    // Map draining is unordered; keep create order stable for logs and tests.
    diff.to_create.sort_by(identity_cmp);
    diff
}

fn identity_cmp(a: &Service, b: &Service) -> std::cmp::Ordering {
    identity(a).cmp(&identity(b))
}

/// Secondary content check for `active` Services: does the observed object
/// need an update to match the desired one?
///
/// Only the fields the operator owns are compared. Observed objects come
/// back from the API server with defaulted fields (clusterIP, nodePort,
/// targetPort falling back to port), so ports are compared on a normalized
/// projection rather than structurally.
pub fn needs_update(observed: &Service, desired: &Service) -> bool {
    let obs_spec = observed.spec.as_ref();
    let des_spec = desired.spec.as_ref();

    let obs_selector = obs_spec.and_then(|s| s.selector.as_ref());
    let des_selector = des_spec.and_then(|s| s.selector.as_ref());
    if obs_selector != des_selector {
        return true;
    }

    let normalize = |spec: Option<&k8s_openapi::api::core::v1::ServiceSpec>| {
        spec.and_then(|s| s.ports.as_ref())
            .map(|ports| ports.iter().map(port_projection).collect::<Vec<_>>())
            .unwrap_or_default()
    };
    normalize(obs_spec) != normalize(des_spec)
}

type PortProjection = (Option<String>, Option<String>, i32, IntOrString);

fn port_projection(p: &ServicePort) -> PortProjection {
    (
        p.name.clone(),
        p.protocol.clone(),
        p.port,
        p.target_port
            .clone()
            .unwrap_or(IntOrString::Int(p.port)),
    )
}
