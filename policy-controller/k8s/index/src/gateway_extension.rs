use crate::{resource::ResourceId, Lookup};
use anyhow::{anyhow, Result};
use gateway_policy_controller_core::{
    extension::ExtensionProvider,
    xds::config::{EnvoyGrpc, ExtAuthz, ExtProc, GrpcService, RateLimit, RateLimitServiceConfig},
    ExtensionKind, ExtensionName, GatewayExtensionIr,
};
use gateway_policy_controller_k8s_api::gateway_extension::{
    self as api, GatewayExtensionSpec, GatewayExtensionType,
};

const TRANSPORT_API_VERSION: &str = "V3";

/// Resolves an extension's backend into the filter configuration that serves
/// it. A failure is retained on the returned extension so that each policy
/// that references it can report it.
pub(crate) fn resolve(
    id: &ResourceId,
    spec: &GatewayExtensionSpec,
    lookup: &impl Lookup,
) -> GatewayExtensionIr {
    let name = ExtensionName {
        namespace: id.namespace.clone(),
        name: id.name.clone(),
    };
    let kind = extension_kind(spec.type_);
    match provider(&id.namespace, spec, lookup) {
        Ok(provider) => GatewayExtensionIr::resolved(name, provider),
        Err(error) => GatewayExtensionIr::failed(name, kind, format!("{error:#}")),
    }
}

fn provider(ns: &str, spec: &GatewayExtensionSpec, lookup: &impl Lookup) -> Result<ExtensionProvider> {
    match spec.type_ {
        GatewayExtensionType::ExtAuth => {
            let p = spec
                .ext_auth
                .as_ref()
                .ok_or_else(|| anyhow!("type ExtAuth requires extAuth to be set"))?;
            Ok(ExtensionProvider::ExtAuth(ExtAuthz {
                grpc_service: grpc_service(ns, &p.grpc_service, None, lookup)?,
                transport_api_version: TRANSPORT_API_VERSION,
                failure_mode_allow: p.fail_open,
                filter_enabled_metadata: None,
            }))
        }
        GatewayExtensionType::ExtProc => {
            let p = spec
                .ext_proc
                .as_ref()
                .ok_or_else(|| anyhow!("type ExtProc requires extProc to be set"))?;
            Ok(ExtensionProvider::ExtProc(ExtProc {
                grpc_service: grpc_service(ns, &p.grpc_service, None, lookup)?,
                failure_mode_allow: p.fail_open,
                processing_mode: None,
            }))
        }
        GatewayExtensionType::RateLimit => {
            let p = spec
                .rate_limit
                .as_ref()
                .ok_or_else(|| anyhow!("type RateLimit requires rateLimit to be set"))?;
            if p.domain.is_empty() {
                return Err(anyhow!("rateLimit.domain must be set"));
            }
            let timeout = p.timeout.map(Into::into);
            Ok(ExtensionProvider::RateLimit(RateLimit {
                domain: p.domain.clone(),
                rate_limit_service: RateLimitServiceConfig {
                    grpc_service: grpc_service(ns, &p.grpc_service, timeout, lookup)?,
                    transport_api_version: TRANSPORT_API_VERSION,
                },
                failure_mode_deny: !p.fail_open,
                timeout,
            }))
        }
    }
}

fn grpc_service(
    ns: &str,
    svc: &api::GrpcService,
    timeout: Option<std::time::Duration>,
    lookup: &impl Lookup,
) -> Result<GrpcService> {
    let backend = &svc.backend_ref;
    let backend_ns = backend.namespace.as_deref().unwrap_or(ns);
    let cluster_name = lookup
        .service_cluster(backend_ns, &backend.name, backend.port)
        .ok_or_else(|| {
            anyhow!(
                "backend {backend_ns}/{}:{} not found",
                backend.name,
                backend.port
            )
        })?;
    Ok(GrpcService {
        envoy_grpc: EnvoyGrpc {
            cluster_name,
            authority: svc.authority.clone(),
        },
        timeout,
    })
}

pub(crate) fn extension_kind(t: GatewayExtensionType) -> ExtensionKind {
    match t {
        GatewayExtensionType::ExtAuth => ExtensionKind::ExtAuth,
        GatewayExtensionType::ExtProc => ExtensionKind::ExtProc,
        GatewayExtensionType::RateLimit => ExtensionKind::RateLimit,
    }
}
