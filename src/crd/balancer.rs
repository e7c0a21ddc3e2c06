use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label carried by every resource derived from a Balancer. The value is the
/// Balancer name, so cleanup and observed-set queries can select on it.
pub const BALANCER_LABEL: &str = "exposer.io/balancer";

/// Distinguishes the roles of derived resources behind [`BALANCER_LABEL`].
pub const COMPONENT_LABEL: &str = "exposer.io/component";
pub const COMPONENT_BACKEND: &str = "backend";
pub const COMPONENT_FRONTEND: &str = "frontend";
pub const COMPONENT_PROXY: &str = "proxy";
pub const COMPONENT_PROXY_CONFIG: &str = "proxy-config";

/// Pod-template annotation holding the fingerprint of the rendered
/// `nginx.conf`. A content change rolls the proxy pods even though the
/// Deployment spec is otherwise unchanged.
pub const CONFIG_HASH_ANNOTATION: &str = "balancer.exposer.io/config-hash";

pub const FINALIZER: &str = "exposer.io/finalizer";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    group = "exposer.io",
    version = "v1alpha1",
    kind = "Balancer",
    plural = "balancers",
    namespaced,
    status = "BalancerStatus"
)]
pub struct BalancerSpec {
    /// Weighted backend groups eligible to receive forwarded traffic.
    /// An empty list is allowed and yields zero backend Services.
    #[serde(default)]
    pub backends: Vec<BackendSpec>,

    /// Base pod selector merged under every backend's own selector.
    /// Backend-specific keys win on conflict.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,

    /// Ports exposed by the balancer front end. Names must be unique
    /// within the list (enforced by admission, assumed here).
    pub ports: Vec<BalancerPort>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
pub struct BackendSpec {
    pub name: String,

    /// Relative traffic weight, >= 1.
    pub weight: i32,

    /// Backend-specific pod selector, merged over the base selector.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub selector: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalancerPort {
    pub name: String,

    /// Omitted means TCP.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,

    /// Port exposed by the balancer.
    pub port: u16,

    /// Port used by the selected pods.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
}

impl BalancerPort {
    pub fn protocol(&self) -> Protocol {
        self.protocol.unwrap_or_default()
    }
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

#[derive(
    Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq, Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct BalancerStatus {
    /// Backend Services currently running and still implied by the spec.
    #[serde(default)]
    pub active_backends: i32,

    /// Backend Services scheduled for deletion in the latest pass.
    #[serde(default)]
    pub obsolete_backends: i32,
}
