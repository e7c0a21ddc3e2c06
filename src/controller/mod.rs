pub mod diff;
pub mod events;
pub mod reconcile;
pub mod status;

#[cfg(test)]
mod diff_tests;

use std::sync::Arc;

use futures_util::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service};
use kube::{
    Client, ResourceExt,
    api::Api,
    runtime::{
        Controller,
        controller::Action,
        events::{Recorder, Reporter},
        watcher,
    },
};
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::config::OperatorConfig;
use crate::crd::balancer::Balancer;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub cfg: OperatorConfig,
    pub recorder: Recorder,
}

/// Run the Balancer controller until the watch streams end.
///
/// Changes to owned ConfigMaps, Services and Deployments re-enqueue the
/// owning Balancer, so drift in derived resources is converged without
/// waiting for the periodic requeue.
pub async fn run_controller(
    client: Client,
    cfg: OperatorConfig,
) -> anyhow::Result<()> {
    let api: Api<Balancer> = Api::all(client.clone());
    let recorder = Recorder::new(
        client.clone(),
        Reporter {
            controller: "balancer-operator".into(),
            instance: None,
        },
    );
    let ctx = Arc::new(ControllerContext {
        client: client.clone(),
        cfg,
        recorder,
    });

    Controller::new(api, watcher::Config::default())
        .owns(
            Api::<ConfigMap>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<Service>::all(client.clone()),
            watcher::Config::default(),
        )
        .owns(
            Api::<Deployment>::all(client.clone()),
            watcher::Config::default(),
        )
        .run(reconcile::reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => {
                    info!(name = %obj.name, "reconciled: requeue={:?}", action)
                }
                Err(e) => error!(error = ?e, "reconcile error"),
            }
        })
        .await;

    warn!("controller stream ended");
    Ok(())
}

fn error_policy(
    obj: Arc<Balancer>,
    error: &ReconcileErr,
    ctx: Arc<ControllerContext>,
) -> Action {
    warn!(name = %obj.name_any(), %error, "reconcile failed; requeueing");
    Action::requeue(Duration::from_secs(ctx.cfg.error_requeue_secs))
}
