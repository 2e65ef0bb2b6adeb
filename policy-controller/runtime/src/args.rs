use crate::{
    core::{merge::HierarchyDirection, MergeOptions, POLICY_CONTROLLER_NAME},
    index, k8s, status,
    translate::{ProcessValidator, ValidationMode, Validator},
    validation::StrictValidation,
    Policies,
};
use anyhow::{bail, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use std::{path::PathBuf, sync::Arc};
use tokio::{sync::mpsc, time::Duration};
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "gateway-policy-controller",
    about = "Compiles traffic policies into data plane configuration"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "gateway_policy_controller=info,warn",
        env = "GATEWAY_POLICY_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// The field manager used when writing resource status.
    #[clap(long, default_value = POLICY_CONTROLLER_NAME)]
    controller_name: String,

    /// Either `standard`, which validates each policy locally, or `strict`,
    /// which also has the data plane validate each policy's configuration.
    #[clap(long, default_value = "standard")]
    validation_mode: ValidationMode,

    /// The data plane binary used for strict validation.
    #[clap(long, conflicts_with = "validator_image")]
    validator_path: Option<PathBuf>,

    /// A data plane container image used for strict validation.
    #[clap(long)]
    validator_image: Option<String>,

    #[clap(long, default_value = "10000")]
    validation_timeout_ms: u64,

    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,

    /// The number of times a failed status patch is retried.
    #[clap(long, default_value = "3")]
    patch_retries: u32,

    /// The delay before the first retry of a status patch, doubled for each
    /// subsequent retry.
    #[clap(long, default_value = "500")]
    patch_backoff_ms: u64,

    /// Whether higher (the default) or lower hierarchical priorities identify
    /// more specific attachment targets.
    #[clap(long, default_value = "higher-is-deeper")]
    hierarchy_direction: HierarchyDirection,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            controller_name,
            validation_mode,
            validator_path,
            validator_image,
            validation_timeout_ms,
            patch_timeout_ms,
            patch_retries,
            patch_backoff_ms,
            hierarchy_direction: direction,
        } = self;

        let validator = match validation_mode {
            ValidationMode::Standard => None,
            ValidationMode::Strict => {
                let timeout = Duration::from_millis(validation_timeout_ms);
                let validator: Arc<dyn Validator> = match (validator_path, validator_image) {
                    (Some(path), _) => Arc::new(ProcessValidator::binary(path, timeout)),
                    (None, Some(image)) => Arc::new(ProcessValidator::container(image, timeout)),
                    (None, None) => {
                        bail!("strict validation requires --validator-path or --validator-image")
                    }
                };
                Some(validator)
            }
        };

        let mut prom = <Registry>::default();
        let status_metrics =
            status::ControllerMetrics::register(prom.sub_registry_with_prefix("resource_status"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        // The index publishes status updates as policies are rebuilt. In
        // strict mode they pass through the validator before reaching the
        // status controller.
        let (index_tx, index_rx) = mpsc::unbounded_channel();
        let (index, updates_rx) = match validator {
            None => (index::Index::shared(index_tx), index_rx),
            Some(validator) => {
                let index = index::Index::shared_strict(index_tx);
                let (validated_tx, validated_rx) = mpsc::unbounded_channel();
                let validation = StrictValidation::new(index.clone(), validator);
                tokio::spawn(
                    validation
                        .run(index_rx, validated_tx)
                        .instrument(info_span!("strict_validation")),
                );
                (index, validated_rx)
            }
        };
        let policies = Policies::new(index.clone(), MergeOptions { direction });

        // Spawn resource watches.

        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), services).instrument(info_span!("services")),
        );

        let secrets = runtime.watch_all::<k8s::Secret>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), secrets).instrument(info_span!("secrets")),
        );

        let extensions = runtime.watch_all::<k8s::GatewayExtension>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), extensions)
                .instrument(info_span!("gatewayextensions")),
        );

        let traffic_policies = runtime.watch_all::<k8s::TrafficPolicy>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(index.clone(), traffic_policies)
                .instrument(info_span!("trafficpolicies")),
        );

        let patcher = status::KubePatcher::new(
            runtime.client(),
            controller_name,
            Duration::from_millis(patch_timeout_ms),
        );
        let retry = status::Retry {
            retries: patch_retries,
            backoff: Duration::from_millis(patch_backoff_ms),
        };
        let status_controller =
            status::Controller::new(patcher, updates_rx, retry, status_metrics);
        tokio::spawn(
            status_controller
                .process_updates()
                .instrument(info_span!("status_controller")),
        );

        info!(?validation_mode, direction = ?policies.options().direction, "Controller started");

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}
