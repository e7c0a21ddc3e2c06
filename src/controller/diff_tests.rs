use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::diff::{needs_update, partition};

fn svc(name: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([(
                "app".to_string(),
                "test".to_string(),
            )])),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                protocol: Some("TCP".to_string()),
                port: 80,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn names(svcs: &[Service]) -> Vec<&str> {
    svcs.iter()
        .filter_map(|s| s.metadata.name.as_deref())
        .collect()
}

#[test]
fn splits_by_identity_key() {
    let desired = vec![svc("bal-v1-backend"), svc("bal-v2-backend")];
    let observed = vec![svc("bal-v1-backend"), svc("bal-v3-backend")];

    let diff = partition(desired, observed);

    assert_eq!(names(&diff.to_create), vec!["bal-v2-backend"]);
    assert_eq!(names(&diff.to_delete), vec!["bal-v3-backend"]);
    assert_eq!(diff.active.len(), 1);
    assert_eq!(
        diff.active[0].observed.metadata.name.as_deref(),
        Some("bal-v1-backend")
    );
}

#[test]
fn partitions_cover_the_union_exactly_once() {
    let desired = vec![svc("a"), svc("b"), svc("c")];
    let observed = vec![svc("b"), svc("c"), svc("d"), svc("e")];

    let union: BTreeSet<&str> =
        names(&desired).into_iter().chain(names(&observed)).collect();

    let diff = partition(desired.clone(), observed.clone());
    let mut seen: Vec<&str> = names(&diff.to_create);
    seen.extend(names(&diff.to_delete));
    seen.extend(
        diff.active
            .iter()
            .filter_map(|p| p.observed.metadata.name.as_deref()),
    );
    seen.sort_unstable();

    assert_eq!(seen.len(), union.len(), "no element appears twice");
    assert_eq!(seen.into_iter().collect::<BTreeSet<_>>(), union);
}

#[test]
fn zero_desired_backends_deletes_every_observed_service() {
    let observed = vec![svc("bal-v1-backend"), svc("bal-v2-backend")];
    let diff = partition(vec![], observed);

    assert!(diff.to_create.is_empty());
    assert!(diff.active.is_empty());
    assert_eq!(diff.to_delete.len(), 2);
}

#[test]
fn same_namespace_is_part_of_identity() {
    let mut other_ns = svc("bal-v1-backend");
    other_ns.metadata.namespace = Some("staging".to_string());

    let diff = partition(vec![svc("bal-v1-backend")], vec![other_ns]);
    assert_eq!(diff.to_create.len(), 1);
    assert_eq!(diff.to_delete.len(), 1);
    assert!(diff.active.is_empty());
}

#[test]
fn content_difference_stays_in_active_but_flags_update() {
    let desired = {
        let mut s = svc("bal-v1-backend");
        s.spec.as_mut().unwrap().selector =
            Some(BTreeMap::from([("version".to_string(), "v2".to_string())]));
        s
    };
    let observed = svc("bal-v1-backend");

    let diff = partition(vec![desired], vec![observed]);
    assert_eq!(diff.active.len(), 1);
    assert!(needs_update(&diff.active[0].observed, &diff.active[0].desired));
}

#[test]
fn server_side_port_defaulting_is_not_an_update() {
    let desired = svc("bal-v1-backend");
    let mut observed = svc("bal-v1-backend");
    {
        let spec = observed.spec.as_mut().unwrap();
        // Fields the API server fills in on its own.
        spec.cluster_ip = Some("10.0.0.17".to_string());
        spec.ports.as_mut().unwrap()[0].target_port = Some(IntOrString::Int(80));
    }
    assert!(!needs_update(&observed, &desired));
}

#[test]
fn port_change_flags_update() {
    let desired = {
        let mut s = svc("bal-v1-backend");
        s.spec.as_mut().unwrap().ports.as_mut().unwrap()[0].port = 8080;
        s
    };
    let observed = svc("bal-v1-backend");
    assert!(needs_update(&observed, &desired));
}
