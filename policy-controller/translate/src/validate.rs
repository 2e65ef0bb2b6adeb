//! Standard and strict validation of constructed policies.
//!
//! Standard validation checks each facet locally. Strict validation also
//! translates the policy exactly as it would be translated for distribution and
//! has the data plane check the result.

use crate::{TranslationPass, AI_EXT_PROC_CLUSTER};
use async_trait::async_trait;
use gateway_policy_controller_core::{
    extension::ExtensionProvider,
    facets::ExtAuthIr,
    xds::{Route, RouteConfiguration, VirtualHost},
    GatewayExtensionIr, PolicyError, TrafficPolicy,
};
use anyhow::Context;
use std::{
    collections::BTreeSet,
    io,
    path::PathBuf,
    process::{Output, Stdio},
    str::FromStr,
    time::Duration,
};
use tokio::io::AsyncWriteExt;

const VALIDATION_CHAIN: &str = "validation";
const VALIDATION_CLUSTER: &str = "validation";

/// Checks a serialized configuration fragment.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, config: &str) -> Result<(), ValidateError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// The data plane rejected the configuration. The message is its output.
    #[error("{0}")]
    Rejected(String),

    /// The configuration could not be checked.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ValidationMode {
    #[default]
    Standard,
    Strict,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ValidationState {
    #[default]
    Unvalidated,
    StandardValid,
    StrictValid,
    Rejected(PolicyError),
}

/// Runs a data plane binary in validation mode, or a container image of one,
/// feeding it the configuration on stdin.
#[derive(Clone, Debug)]
pub struct ProcessValidator {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid validation mode {0:?}; expected 'standard' or 'strict'")]
pub struct InvalidMode(String);

// === impl ValidationMode ===

impl FromStr for ValidationMode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" => Ok(Self::Standard),
            "strict" => Ok(Self::Strict),
            s => Err(InvalidMode(s.to_string())),
        }
    }
}

// === impl ValidationState ===

impl ValidationState {
    /// Checks every facet locally, failing on the first invalid one.
    pub fn standard(policy: &TrafficPolicy) -> Self {
        match policy.validate() {
            Ok(()) => Self::StandardValid,
            Err(error) => Self::Rejected(error),
        }
    }

    /// Validates a policy locally and, if it passes, has the data plane check
    /// its translation. Only failures to run the validator are returned as
    /// errors; a rejection is a state.
    pub async fn strict(
        policy: &TrafficPolicy,
        validator: &dyn Validator,
    ) -> Result<Self, ValidateError> {
        let state = Self::standard(policy);
        if state != Self::StandardValid {
            return Ok(state);
        }

        let config = bootstrap(policy)?;
        match validator.validate(&config).await {
            Ok(()) => Ok(Self::StrictValid),
            Err(ValidateError::Rejected(message)) => {
                Ok(Self::Rejected(PolicyError::Rejected(message)))
            }
            Err(error) => Err(error),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::StandardValid | Self::StrictValid)
    }

    pub fn error(&self) -> Option<&PolicyError> {
        match self {
            Self::Rejected(error) => Some(error),
            _ => None,
        }
    }
}

// === impl ProcessValidator ===

impl ProcessValidator {
    const VALIDATE_ARGS: [&'static str; 4] = ["--mode", "validate", "--config-path", "/dev/stdin"];

    /// Runs a local data plane binary.
    pub fn binary(path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: path.into(),
            args: Self::VALIDATE_ARGS.iter().map(|a| a.to_string()).collect(),
            timeout,
        }
    }

    /// Runs a data plane image with docker.
    pub fn container(image: impl Into<String>, timeout: Duration) -> Self {
        let mut args = vec![
            "run".to_string(),
            "--rm".to_string(),
            "-i".to_string(),
            image.into(),
        ];
        args.extend(Self::VALIDATE_ARGS.iter().map(|a| a.to_string()));
        Self {
            program: PathBuf::from("docker"),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Validator for ProcessValidator {
    async fn validate(&self, config: &str) -> Result<(), ValidateError> {
        // Spawning, feeding and waiting on the validator share one deadline.
        let (written, output) = tokio::time::timeout(self.timeout, self.run(config))
            .await
            .map_err(|_| anyhow::anyhow!("validator timed out after {:?}", self.timeout))??;

        if output.status.success() {
            // A validator that accepts a configuration it could not fully read
            // has not checked it.
            written.context("failed to write configuration")?;
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        tracing::debug!(status = %output.status, %message, "Configuration rejected");
        Err(ValidateError::Rejected(message))
    }
}

impl ProcessValidator {
    /// Runs the validator to completion, writing the configuration to its
    /// stdin while its output is collected.
    async fn run(&self, config: &str) -> anyhow::Result<(io::Result<()>, Output)> {
        let mut child = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to run {}", self.program.display()))?;

        let stdin = child.stdin.take();
        let write = async move {
            let Some(mut stdin) = stdin else {
                return Ok(());
            };
            match stdin.write_all(config.as_bytes()).await {
                // The validator may exit before reading all of its input.
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                result => result,
            }
            // Dropping stdin closes it so the validator sees the end of input.
        };
        let (written, output) = tokio::join!(write, child.wait_with_output());
        let output = output.context("failed to wait for validator")?;
        Ok((written, output))
    }
}

/// Translates a policy onto a single route and wraps the result, along with
/// the filter chain it requires, in a minimal bootstrap document.
pub fn bootstrap(policy: &TrafficPolicy) -> anyhow::Result<String> {
    let mut pass = TranslationPass::new();
    let mut route = Route::new(VALIDATION_CHAIN, VALIDATION_CLUSTER);
    pass.apply_route(VALIDATION_CHAIN, policy, &mut route);
    let chain = pass.filter_chain(VALIDATION_CHAIN);

    let route_config = RouteConfiguration {
        name: VALIDATION_CHAIN.to_string(),
        virtual_hosts: vec![VirtualHost {
            name: VALIDATION_CHAIN.to_string(),
            domains: vec!["*".to_string()],
            routes: vec![route],
            ..VirtualHost::default()
        }],
        ..RouteConfiguration::default()
    };

    // Every cluster the configuration refers to must exist, though none needs
    // endpoints.
    let ext_auth = match &policy.ext_auth {
        Some(ExtAuthIr::Provider { provider, .. }) => Some(provider),
        Some(ExtAuthIr::DisableAll) | None => None,
    };
    let mut grpc_clusters = ext_auth
        .into_iter()
        .chain(policy.ext_proc.as_ref().map(|ep| &ep.provider))
        .chain(policy.global_rate_limit.as_ref().map(|rl| &rl.provider))
        .filter_map(|ext| grpc_cluster(ext))
        .collect::<BTreeSet<_>>();
    if policy.ai.is_some() {
        grpc_clusters.insert(AI_EXT_PROC_CLUSTER.to_string());
    }

    let clusters = std::iter::once(cluster(VALIDATION_CLUSTER, false))
        .chain(grpc_clusters.iter().map(|name| cluster(name, true)))
        .collect::<Vec<_>>();

    let bootstrap = serde_json::json!({
        "static_resources": {
            "listeners": [{
                "name": VALIDATION_CHAIN,
                "address": {
                    "socket_address": { "address": "0.0.0.0", "port_value": 8080 },
                },
                "filter_chains": [{
                    "name": chain.name,
                    "filters": [{
                        "name": "envoy.filters.network.http_connection_manager",
                        "typed_config": {
                            "@type": "type.googleapis.com/envoy.extensions.filters.network.http_connection_manager.v3.HttpConnectionManager",
                            "stat_prefix": VALIDATION_CHAIN,
                            "route_config": route_config,
                            "http_filters": chain.http_filters,
                        },
                    }],
                }],
            }],
            "clusters": clusters,
        },
    });
    Ok(serde_json::to_string(&bootstrap)?)
}

fn grpc_cluster(ext: &GatewayExtensionIr) -> Option<String> {
    let grpc = match ext.provider.as_ref().ok()? {
        ExtensionProvider::ExtAuth(c) => &c.grpc_service,
        ExtensionProvider::ExtProc(c) => &c.grpc_service,
        ExtensionProvider::RateLimit(c) => &c.rate_limit_service.grpc_service,
    };
    Some(grpc.envoy_grpc.cluster_name.clone())
}

fn cluster(name: &str, grpc: bool) -> serde_json::Value {
    let mut cluster = serde_json::json!({
        "name": name,
        "type": "STATIC",
        "load_assignment": { "cluster_name": name, "endpoints": [] },
    });
    if grpc {
        cluster["typed_extension_protocol_options"] = serde_json::json!({
            "envoy.extensions.upstreams.http.v3.HttpProtocolOptions": {
                "@type": "type.googleapis.com/envoy.extensions.upstreams.http.v3.HttpProtocolOptions",
                "explicit_http_config": { "http2_protocol_options": {} },
            },
        });
    }
    cluster
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(script: &str, timeout: Duration) -> ProcessValidator {
        ProcessValidator {
            program: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            timeout,
        }
    }

    /// Larger than any pipe buffer, so writing it blocks until it is read.
    fn large_config() -> String {
        "x".repeat(4 * 1024 * 1024)
    }

    #[tokio::test]
    async fn accepts_on_success() {
        let validator = script("cat > /dev/null", Duration::from_secs(10));
        validator
            .validate(&large_config())
            .await
            .expect("configuration must be accepted");
    }

    #[tokio::test]
    async fn rejects_without_reading_input() {
        let validator = script("echo 'unknown field' >&2; exit 1", Duration::from_secs(10));
        match validator.validate(&large_config()).await {
            Err(ValidateError::Rejected(message)) => assert_eq!(message, "unknown field"),
            result => panic!("expected a rejection, got {result:?}"),
        }
    }

    #[tokio::test]
    async fn deadline_covers_writing_input() {
        let validator = script("exec sleep 30", Duration::from_millis(200));
        let start = std::time::Instant::now();
        let result = validator.validate(&large_config()).await;
        assert!(
            matches!(result, Err(ValidateError::Internal(_))),
            "{result:?}"
        );
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn missing_validators_are_internal_errors() {
        let validator =
            ProcessValidator::binary("/nonexistent/envoy", Duration::from_secs(1));
        assert!(matches!(
            validator.validate("{}").await,
            Err(ValidateError::Internal(_))
        ));
    }
}
