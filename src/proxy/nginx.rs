//! Rendering of the nginx `stream` configuration for a Balancer.
//!
//! Rendering is a pure function of the spec: the same spec (including the
//! declaration order of ports and backends) always yields byte-identical
//! output. The change-detection path compares fingerprints of this text, so
//! nothing here may depend on time, randomness or map iteration order.

use crate::crd::balancer::{BalancerSpec, Protocol};
use crate::resources::backend_service_name;

use std::fmt::Write;

/// One `server { ... }` block inside `stream`.
struct ServerBlock {
    listen: u16,
    udp: bool,
    upstream: String,
}

/// One `upstream <name> { ... }` block inside `stream`.
struct UpstreamBlock {
    name: String,
    port: u16,
    servers: Vec<(String, i32)>,
}

impl ServerBlock {
    fn write(&self, out: &mut String) {
        out.push_str("    server {\n");
        if self.udp {
            let _ = writeln!(out, "        listen {} udp;", self.listen);
        } else {
            let _ = writeln!(out, "        listen {};", self.listen);
        }
        let _ = writeln!(out, "        proxy_pass {};", self.upstream);
        out.push_str("    }\n");
    }
}

impl UpstreamBlock {
    fn write(&self, out: &mut String) {
        let _ = writeln!(out, "    upstream {} {{", self.name);
        for (host, weight) in &self.servers {
            let _ = writeln!(
                out,
                "        server {}:{} weight={};",
                host, self.port, weight
            );
        }
        out.push_str("    }\n");
    }
}

/// Render the full `nginx.conf` for a Balancer named `name`.
///
/// Every backend serves every port: each port gets one server block that
/// forwards to `upstream_<port name>`, and each upstream lists all backend
/// Services with their weights, in declaration order.
pub fn render(name: &str, spec: &BalancerSpec) -> String {
    let servers: Vec<ServerBlock> = spec
        .ports
        .iter()
        .map(|p| ServerBlock {
            listen: p.port,
            udp: p.protocol() == Protocol::Udp,
            upstream: format!("upstream_{}", p.name),
        })
        .collect();

    let backends: Vec<(String, i32)> = spec
        .backends
        .iter()
        .map(|b| (backend_service_name(name, &b.name), b.weight))
        .collect();

    let upstreams: Vec<UpstreamBlock> = spec
        .ports
        .iter()
        .map(|p| UpstreamBlock {
            name: format!("upstream_{}", p.name),
            port: p.port,
            servers: backends.clone(),
        })
        .collect();

    let mut out = String::new();
    out.push_str("events {\n");
    out.push_str("    worker_connections 1024;\n");
    out.push_str("}\n");
    out.push_str("stream {\n");
    for s in &servers {
        s.write(&mut out);
    }
    for us in &upstreams {
        us.write(&mut out);
    }
    out.push_str("}\n");
    out
}

/// Content fingerprint: FNV-1a 32-bit over the rendered bytes, lowercase hex.
///
/// This string is a naming/format contract: it is stored in the proxy pod
/// template annotation and compared against re-rendered content to decide
/// whether the ConfigMap and the proxy pods need an update.
pub fn fingerprint(content: &str) -> String {
    format!("{:08x}", fnv32a(content.as_bytes()))
}

fn fnv32a(bytes: &[u8]) -> u32 {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    bytes
        .iter()
        .fold(OFFSET_BASIS, |h, b| (h ^ u32::from(*b)).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::balancer::{BackendSpec, BalancerPort};
    use std::collections::BTreeMap;

    fn spec(backends: Vec<(&str, i32)>, ports: Vec<(&str, u16, Option<Protocol>)>) -> BalancerSpec {
        BalancerSpec {
            backends: backends
                .into_iter()
                .map(|(n, w)| BackendSpec {
                    name: n.into(),
                    weight: w,
                    selector: BTreeMap::new(),
                })
                .collect(),
            selector: BTreeMap::new(),
            ports: ports
                .into_iter()
                .map(|(n, p, proto)| BalancerPort {
                    name: n.into(),
                    protocol: proto,
                    port: p,
                    target_port: None,
                })
                .collect(),
        }
    }

    #[test]
    fn renders_weighted_upstream_for_tcp_port() {
        let s = spec(vec![("v1", 40), ("v2", 60)], vec![("http", 80, None)]);
        let conf = render("bal", &s);

        assert!(conf.contains("listen 80;\n"), "tcp listen has no protocol token:\n{conf}");
        assert!(conf.contains("proxy_pass upstream_http;"));
        assert!(conf.contains("upstream upstream_http {"));
        let v1 = conf.find("server bal-v1-backend:80 weight=40;").expect("v1 line");
        let v2 = conf.find("server bal-v2-backend:80 weight=60;").expect("v2 line");
        assert!(v1 < v2, "backends must appear in declaration order");
    }

    #[test]
    fn udp_port_carries_protocol_token() {
        let s = spec(vec![("v1", 1)], vec![("dns", 53, Some(Protocol::Udp))]);
        let conf = render("bal", &s);
        assert!(conf.contains("listen 53 udp;"));
    }

    #[test]
    fn empty_ports_renders_bare_wrapper() {
        let s = spec(vec![("v1", 1)], vec![]);
        let conf = render("bal", &s);
        assert_eq!(
            conf,
            "events {\n    worker_connections 1024;\n}\nstream {\n}\n"
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let s = spec(
            vec![("v1", 40), ("v2", 20), ("v3", 40)],
            vec![("http", 80, None), ("dns", 53, Some(Protocol::Udp))],
        );
        assert_eq!(render("bal", &s), render("bal", &s));
        assert_eq!(fingerprint(&render("bal", &s)), fingerprint(&render("bal", &s)));
    }

    #[test]
    fn fingerprint_tracks_content_changes() {
        let a = spec(vec![("v1", 40)], vec![("http", 80, None)]);
        let b = spec(vec![("v1", 50)], vec![("http", 80, None)]);
        assert_ne!(
            fingerprint(&render("bal", &a)),
            fingerprint(&render("bal", &b)),
            "weight edits must change the fingerprint"
        );
    }

    #[test]
    fn fnv32a_matches_reference_vectors() {
        // Standard FNV-1a 32-bit test vectors.
        assert_eq!(fnv32a(b""), 0x811c9dc5);
        assert_eq!(fnv32a(b"a"), 0xe40c292c);
        assert_eq!(fnv32a(b"foobar"), 0xbf9cf968);
    }
}
