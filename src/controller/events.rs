use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};

pub const REASON_SYNCED: &str = "Synced";
pub const REASON_CLEANED_UP: &str = "CleanedUp";

pub fn build_obj_ref(ns: &str, name: &str, uid: Option<&str>) -> ObjectReference {
    ObjectReference {
        api_version: Some("exposer.io/v1alpha1".to_string()),
        kind: Some("Balancer".to_string()),
        namespace: Some(ns.to_string()),
        name: Some(name.to_string()),
        uid: uid.map(|u| u.to_string()),
        ..Default::default()
    }
}

pub async fn emit_event(
    recorder: &Recorder,
    ns: &str,
    name: &str,
    uid: Option<&str>,
    reason: &str,
    action: &str,
    note: Option<String>,
) {
    let _ = recorder
        .publish(
            &Event {
                type_: EventType::Normal,
                reason: reason.into(),
                note,
                action: action.into(),
                secondary: None,
            },
            &build_obj_ref(ns, name, uid),
        )
        .await;
}
