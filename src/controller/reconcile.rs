//! One reconciliation pass for a single Balancer.
//!
//! Every step is idempotent: a pass that fails part-way is retried wholesale
//! and already-converged resources become no-ops. Writes are only issued when
//! synthesized content differs from observed content.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{
    Resource, ResourceExt,
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    runtime::controller::Action,
};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::crd::balancer::{
    BALANCER_LABEL, Balancer, COMPONENT_BACKEND, COMPONENT_LABEL, FINALIZER,
};
use crate::resources::{config_map, deployment, services};

use super::{ControllerContext, ReconcileErr, diff, events, status};

fn apply_params() -> PatchParams {
    PatchParams::apply("balancer-operator").force()
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

fn is_already_exists(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists")
}

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_else(|| "default".into()), name = %obj.name_any()))]
pub async fn reconcile(
    obj: Arc<Balancer>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let ns = obj.namespace().unwrap_or_else(|| "default".to_string());
    let name = obj.name_any();
    let uid = obj.meta().uid.clone();
    let balancer_api: Api<Balancer> = Api::namespaced(ctx.client.clone(), &ns);

    // Balancer is being deleted: explicitly remove every labeled child, then
    // release the finalizer. No reliance on cluster-side cascade collection.
    if obj.meta().deletion_timestamp.is_some() {
        info!("deletion requested; cleaning up derived resources");
        delete_children(&ctx, &ns, &name).await?;
        events::emit_event(
            &ctx.recorder,
            &ns,
            &name,
            uid.as_deref(),
            events::REASON_CLEANED_UP,
            "Delete",
            Some(format!("Removed derived resources of {name}")),
        )
        .await;
        remove_finalizer(&balancer_api, &obj, &name).await?;
        return Ok(Action::await_change());
    }

    ensure_finalizer(&balancer_api, &obj, &name).await?;

    // The fingerprint of the rendered config threads through the Deployment
    // step so a content change rolls the proxy pods.
    let config_hash = sync_config_map(&ctx, &obj, &ns).await?;
    sync_deployment(&ctx, &obj, &ns, &config_hash).await?;
    sync_frontend_service(&ctx, &obj, &ns).await?;
    let backend_diff = sync_backend_services(&ctx, &obj, &ns, &name).await?;
    sync_status(&balancer_api, &obj, &name, &backend_diff).await?;

    events::emit_event(
        &ctx.recorder,
        &ns,
        &name,
        uid.as_deref(),
        events::REASON_SYNCED,
        "Sync",
        Some(format!("Synced derived resources of {name}")),
    )
    .await;

    Ok(Action::requeue(tokio::time::Duration::from_secs(
        ctx.cfg.requeue_secs,
    )))
}

async fn ensure_finalizer(
    api: &Api<Balancer>,
    obj: &Balancer,
    name: &str,
) -> Result<(), ReconcileErr> {
    let present = obj
        .meta()
        .finalizers
        .as_ref()
        .map(|f| f.iter().any(|x| x == FINALIZER))
        .unwrap_or(false);
    if present {
        return Ok(());
    }
    let mut finalizers = obj.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(FINALIZER.to_string());
    let patch = json!({"metadata": {"finalizers": finalizers}});
    api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

async fn remove_finalizer(
    api: &Api<Balancer>,
    obj: &Balancer,
    name: &str,
) -> Result<(), ReconcileErr> {
    let Some(finalizers) = obj.meta().finalizers.as_ref() else {
        return Ok(());
    };
    if !finalizers.iter().any(|f| f == FINALIZER) {
        return Ok(());
    }
    let remaining: Vec<String> = finalizers
        .iter()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect();
    let patch = json!({"metadata": {"finalizers": remaining}});
    match api
        .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        // Object already gone upstream: terminal success.
        Err(e) if is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Create the ConfigMap if absent, replace its data when the stored content
/// fingerprint differs, otherwise leave it alone. Returns the fingerprint of
/// the desired content.
async fn sync_config_map(
    ctx: &ControllerContext,
    obj: &Balancer,
    ns: &str,
) -> Result<String, ReconcileErr> {
    let (cm, hash) = config_map::render(obj);
    let cm_name = cm.name_any();
    let api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), ns);

    match api.get_opt(&cm_name).await? {
        None => {
            api.create(&PostParams::default(), &cm).await?;
            info!(%cm_name, "created proxy ConfigMap");
        }
        Some(found) => {
            let observed_hash = found
                .data
                .as_ref()
                .and_then(|d| d.get(config_map::CONFIG_KEY))
                .map(|content| crate::proxy::fingerprint(content));
            if observed_hash.as_deref() != Some(hash.as_str()) {
                api.patch(&cm_name, &apply_params(), &Patch::Apply(&cm))
                    .await?;
                info!(%cm_name, "updated proxy ConfigMap content");
            } else {
                debug!(%cm_name, "proxy ConfigMap up to date");
            }
        }
    }
    Ok(hash)
}

/// Create the proxy Deployment if absent; when present, update it only if the
/// pod-template fingerprint annotation no longer matches the rendered config.
async fn sync_deployment(
    ctx: &ControllerContext,
    obj: &Balancer,
    ns: &str,
    config_hash: &str,
) -> Result<(), ReconcileErr> {
    let dep = deployment::proxy(obj, &ctx.cfg.proxy_image, config_hash);
    let dep_name = dep.name_any();
    let api: Api<Deployment> = Api::namespaced(ctx.client.clone(), ns);

    match api.get_opt(&dep_name).await? {
        None => {
            api.create(&PostParams::default(), &dep).await?;
            info!(%dep_name, "created proxy Deployment");
        }
        Some(found) => {
            if deployment::observed_config_hash(&found) != Some(config_hash) {
                api.patch(&dep_name, &apply_params(), &Patch::Apply(&dep))
                    .await?;
                info!(%dep_name, %config_hash, "rolled proxy Deployment for new config");
            } else {
                debug!(%dep_name, "proxy Deployment up to date");
            }
        }
    }
    Ok(())
}

async fn sync_frontend_service(
    ctx: &ControllerContext,
    obj: &Balancer,
    ns: &str,
) -> Result<(), ReconcileErr> {
    let svc = services::frontend(obj);
    let svc_name = svc.name_any();
    let api: Api<Service> = Api::namespaced(ctx.client.clone(), ns);

    match api.get_opt(&svc_name).await? {
        None => {
            api.create(&PostParams::default(), &svc).await?;
            info!(%svc_name, "created front-end Service");
        }
        Some(found) => {
            if diff::needs_update(&found, &svc) {
                api.patch(&svc_name, &apply_params(), &Patch::Apply(&svc))
                    .await?;
                info!(%svc_name, "updated front-end Service");
            } else {
                debug!(%svc_name, "front-end Service up to date");
            }
        }
    }
    Ok(())
}

/// Diff desired backend Services against the label-selected observed set and
/// apply the result: drain all deletions first, then run creations and
/// content-driven updates. Each phase fans out with bounded concurrency,
/// joins every unit, and surfaces the first error.
async fn sync_backend_services(
    ctx: &ControllerContext,
    obj: &Balancer,
    ns: &str,
    name: &str,
) -> Result<diff::BackendDiff, ReconcileErr> {
    let api: Api<Service> = Api::namespaced(ctx.client.clone(), ns);
    let selector = format!(
        "{BALANCER_LABEL}={name},{COMPONENT_LABEL}={COMPONENT_BACKEND}"
    );
    let observed = api
        .list(&ListParams::default().labels(&selector))
        .await?
        .items;
    let desired = services::backends(obj);
    let backend_diff = diff::partition(desired, observed);

    let limit = ctx.cfg.apply_concurrency.max(1);

    // Delete phase. Fully drained before any create is issued, so a create
    // never races a delete of the same identity.
    //
    // The per-unit futures are built from owned values: closures borrowing
    // `backend_diff` held across an await trip rustc's "implementation of
    // `FnOnce` is not general enough" limitation (rust-lang/rust#89976).
    let delete_names: Vec<String> = backend_diff
        .to_delete
        .iter()
        .map(ResourceExt::name_any)
        .collect();
    let deletions = delete_names.into_iter().map(|svc_name| {
        let api = api.clone();
        async move {
            match api.delete(&svc_name, &DeleteParams::default()).await {
                Ok(_) => {
                    info!(%svc_name, "deleted obsolete backend Service");
                    Ok(())
                }
                Err(e) if is_not_found(&e) => Ok(()),
                Err(e) => Err(ReconcileErr::from(e)),
            }
        }
    });
    join_first_err(stream::iter(deletions).buffer_unordered(limit)).await?;

    // Create/update phase. Active Services are only touched when their
    // synthesized content differs from what is observed.
    let mut upsert_items: Vec<(Service, bool)> = backend_diff
        .to_create
        .iter()
        .cloned()
        .map(|svc| (svc, true))
        .collect();
    upsert_items.extend(
        backend_diff
            .active
            .iter()
            .filter(|pair| diff::needs_update(&pair.observed, &pair.desired))
            .map(|pair| (pair.desired.clone(), false)),
    );
    let upserts = upsert_items.into_iter().map(|(svc, create)| {
        let api = api.clone();
        async move {
            let svc_name = svc.name_any();
            if create {
                match api.create(&PostParams::default(), &svc).await {
                    Ok(_) => {
                        info!(%svc_name, "created backend Service");
                        Ok(())
                    }
                    // Lost a race with a concurrent pass; retry will converge.
                    Err(e) if is_already_exists(&e) => Ok(()),
                    Err(e) => Err(ReconcileErr::from(e)),
                }
            } else {
                api.patch(&svc_name, &apply_params(), &Patch::Apply(&svc))
                    .await?;
                info!(%svc_name, "updated backend Service");
                Ok(())
            }
        }
    });
    join_first_err(stream::iter(upserts).buffer_unordered(limit)).await?;

    Ok(backend_diff)
}

/// Run a phase to completion and report the first error observed, if any.
async fn join_first_err(
    mut results: impl futures_util::Stream<Item = Result<(), ReconcileErr>> + Unpin,
) -> Result<(), ReconcileErr> {
    let mut first_err = None;
    while let Some(res) = results.next().await {
        if let Err(e) = res {
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Recompute status from the same diff the backend sync used; only write it
/// when it differs from the stored status.
async fn sync_status(
    api: &Api<Balancer>,
    obj: &Balancer,
    name: &str,
    backend_diff: &diff::BackendDiff,
) -> Result<(), ReconcileErr> {
    let desired = status::from_diff(backend_diff);
    if !status::changed(obj.status.as_ref(), &desired) {
        debug!("status unchanged; skipping patch");
        return Ok(());
    }
    let patch = json!({ "status": desired });
    api.patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    info!(
        active = desired.active_backends,
        obsolete = desired.obsolete_backends,
        "updated Balancer status"
    );
    Ok(())
}

/// Delete every resource carrying this Balancer's identity label.
async fn delete_children(
    ctx: &ControllerContext,
    ns: &str,
    name: &str,
) -> Result<(), ReconcileErr> {
    let lp = ListParams::default().labels(&format!("{BALANCER_LABEL}={name}"));

    let svc_api: Api<Service> = Api::namespaced(ctx.client.clone(), ns);
    for svc in svc_api.list(&lp).await?.items {
        let n = svc.name_any();
        match svc_api.delete(&n, &DeleteParams::default()).await {
            Ok(_) => info!(service = %n, "deleted derived Service"),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let dep_api: Api<Deployment> = Api::namespaced(ctx.client.clone(), ns);
    for dep in dep_api.list(&lp).await?.items {
        let n = dep.name_any();
        match dep_api.delete(&n, &DeleteParams::default()).await {
            Ok(_) => info!(deployment = %n, "deleted proxy Deployment"),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let cm_api: Api<ConfigMap> = Api::namespaced(ctx.client.clone(), ns);
    for cm in cm_api.list(&lp).await?.items {
        let n = cm.name_any();
        match cm_api.delete(&n, &DeleteParams::default()).await {
            Ok(_) => info!(configmap = %n, "deleted proxy ConfigMap"),
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
