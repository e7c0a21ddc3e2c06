//! Synthesis of the cluster resources derived from a Balancer.
//!
//! Everything here is a pure function of the Balancer object: no clocks, no
//! randomness. Naming and labeling are contracts shared with the reconciler's
//! list/diff queries, so they live together in this module.

pub mod config_map;
pub mod deployment;
pub mod services;

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::balancer::{
    BALANCER_LABEL, Balancer, COMPONENT_LABEL, COMPONENT_PROXY,
};

pub fn backend_service_name(balancer: &str, backend: &str) -> String {
    format!("{balancer}-{backend}-backend")
}

pub fn frontend_service_name(balancer: &str) -> String {
    balancer.to_string()
}

pub fn deployment_name(balancer: &str) -> String {
    format!("{balancer}-proxy")
}

pub fn config_map_name(balancer: &str) -> String {
    format!("{balancer}-proxy-config")
}

/// Identity + role labels stamped on every derived resource.
pub fn identity_labels(balancer: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (BALANCER_LABEL.to_string(), balancer.to_string()),
        (COMPONENT_LABEL.to_string(), component.to_string()),
    ])
}

/// Labels on the proxy pods; the front-end Service selects on these.
pub fn proxy_pod_labels(balancer: &str) -> BTreeMap<String, String> {
    identity_labels(balancer, COMPONENT_PROXY)
}

/// Controller owner reference pointing back at the Balancer. `None` while the
/// object has no UID yet (e.g. in pure synthesis tests).
pub fn owner_ref(balancer: &Balancer) -> Option<OwnerReference> {
    balancer.controller_owner_ref(&())
}

/// Common metadata for a derived resource: name, namespace, labels, ownership.
pub(crate) fn derived_meta(
    balancer: &Balancer,
    name: String,
    component: &str,
) -> ObjectMeta {
    ObjectMeta {
        name: Some(name),
        namespace: balancer.namespace(),
        labels: Some(identity_labels(&balancer.name_any(), component)),
        owner_references: owner_ref(balancer).map(|o| vec![o]),
        ..Default::default()
    }
}
