use crate::duration::Duration;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Describes an external service that policies delegate to: an authorization
/// server, an external processor, or a rate-limit service.
///
/// The provider field matching `type` must be set.
#[derive(Clone, Debug, PartialEq, Eq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "policy.gateway.dev",
    version = "v1alpha1",
    kind = "GatewayExtension",
    status = "GatewayExtensionStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GatewayExtensionSpec {
    #[serde(rename = "type")]
    pub type_: GatewayExtensionType,
    pub ext_auth: Option<ExtAuthProvider>,
    pub ext_proc: Option<ExtProcProvider>,
    pub rate_limit: Option<RateLimitProvider>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum GatewayExtensionType {
    ExtAuth,
    ExtProc,
    RateLimit,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct GatewayExtensionStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtAuthProvider {
    pub grpc_service: GrpcService,
    #[serde(default)]
    pub fail_open: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtProcProvider {
    pub grpc_service: GrpcService,
    #[serde(default)]
    pub fail_open: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitProvider {
    pub grpc_service: GrpcService,
    pub domain: String,
    /// When set, requests are allowed if the rate-limit service is
    /// unavailable.
    #[serde(default)]
    pub fail_open: bool,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrpcService {
    pub backend_ref: BackendRef,
    pub authority: Option<String>,
}

/// References a port on a `Service`, in the extension's namespace unless one
/// is given.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct BackendRef {
    pub name: String,
    pub namespace: Option<String>,
    pub port: u16,
}

// === impl GatewayExtensionSpec ===

impl GatewayExtensionSpec {
    pub fn grpc_service(&self) -> Option<&GrpcService> {
        match self.type_ {
            GatewayExtensionType::ExtAuth => self.ext_auth.as_ref().map(|p| &p.grpc_service),
            GatewayExtensionType::ExtProc => self.ext_proc.as_ref().map(|p| &p.grpc_service),
            GatewayExtensionType::RateLimit => self.rate_limit.as_ref().map(|p| &p.grpc_service),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_rate_limit_extension() {
        let ext: GatewayExtension = serde_yaml::from_str(
            r#"
apiVersion: policy.gateway.dev/v1alpha1
kind: GatewayExtension
metadata:
  name: limits
  namespace: infra
spec:
  type: RateLimit
  rateLimit:
    domain: api
    timeout: 100ms
    grpcService:
      backendRef:
        name: ratelimit
        port: 8081
"#,
        )
        .expect("extension must parse");

        assert_eq!(ext.spec.type_, GatewayExtensionType::RateLimit);
        let rl = ext.spec.rate_limit.as_ref().expect("provider must be set");
        assert_eq!(rl.domain, "api");
        assert_eq!(rl.timeout, Some(Duration::from_millis(100)));
        assert_eq!(
            ext.spec.grpc_service().map(|g| g.backend_ref.port),
            Some(8081)
        );
    }

    #[test]
    fn missing_provider_for_type() {
        let spec: GatewayExtensionSpec = serde_yaml::from_str(
            r#"
type: ExtAuth
extProc:
  grpcService:
    backendRef:
      name: processor
      port: 9000
"#,
        )
        .expect("spec must parse");
        assert_eq!(spec.grpc_service(), None);
    }

    #[test]
    fn parses_status_conditions() {
        let ext: GatewayExtension = serde_yaml::from_str(
            r#"
apiVersion: policy.gateway.dev/v1alpha1
kind: GatewayExtension
metadata:
  name: authz
  namespace: infra
spec:
  type: ExtAuth
  extAuth:
    grpcService:
      backendRef:
        name: authz
        port: 9000
status:
  conditions:
  - type: Accepted
    status: "False"
    reason: Invalid
    message: "backend authz.infra:9000 not found"
    lastTransitionTime: "2024-01-01T00:00:00Z"
    observedGeneration: 2
"#,
        )
        .expect("extension must parse");

        let status = ext.status.expect("status must be set");
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].type_, "Accepted");
        assert_eq!(status.conditions[0].observed_generation, Some(2));
        assert_ne!(status, GatewayExtensionStatus::default());
    }
}
