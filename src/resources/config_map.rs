use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::ResourceExt;

use crate::crd::balancer::{Balancer, COMPONENT_PROXY_CONFIG};
use crate::proxy;

use super::{config_map_name, derived_meta};

/// Data key under which the rendered proxy configuration is stored.
pub const CONFIG_KEY: &str = "nginx.conf";

/// Synthesize the proxy ConfigMap and the fingerprint of its content.
pub fn render(balancer: &Balancer) -> (ConfigMap, String) {
    let name = balancer.name_any();
    let conf = proxy::render(&name, &balancer.spec);
    let hash = proxy::fingerprint(&conf);
    let cm = ConfigMap {
        metadata: derived_meta(
            balancer,
            config_map_name(&name),
            COMPONENT_PROXY_CONFIG,
        ),
        data: Some(BTreeMap::from([(CONFIG_KEY.to_string(), conf)])),
        ..Default::default()
    };
    (cm, hash)
}
