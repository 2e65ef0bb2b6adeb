use gateway_policy_controller_core::{
    extension::ExtensionProvider,
    xds::{
        config::ExtAuthz,
        matcher::{MetadataMatcher, PathSegment, ValueMatcher},
        FilterChain, FilterStage, HttpFilter, Route, RouteConfiguration, StagedHttpFilter,
        TypedConfig, VirtualHost, WellKnownStage,
    },
    ExtensionName, GatewayExtensionIr, TrafficPolicy,
};
use std::{collections::BTreeMap, sync::Arc};

/// The cluster that serves the AI extension's processor.
pub const AI_EXT_PROC_CLUSTER: &str = "ai_ext_proc_server";

/// The dynamic metadata that, when `true`, skips every external authorization
/// filter in a chain.
pub const DISABLE_EXT_AUTH_NAMESPACE: &str = "dev.gateway.disable_ext_auth";
pub const DISABLE_EXT_AUTH_KEY: &str = "disable_all";

/// State for translating the policies of one set of filter chains.
///
/// A pass records, per chain, the filters that must be present for the
/// overrides it has written to take effect. A pass must not be shared between
/// translations: its state is only meaningful for the scopes it was applied
/// to.
#[derive(Debug, Default)]
pub struct TranslationPass {
    chains: BTreeMap<String, ChainState>,
}

#[derive(Debug, Default)]
struct ChainState {
    /// Filters keyed by name. Companions are registered disabled on first use;
    /// a chain-wide policy replaces them with an enabled filter.
    filters: BTreeMap<String, StagedHttpFilter>,

    /// The extensions that the chain's scopes delegate to.
    providers: BTreeMap<ExtensionName, Provider>,
}

#[derive(Debug)]
struct Provider {
    ir: Arc<GatewayExtensionIr>,
    enabled: bool,
}

// === impl TranslationPass ===

impl TranslationPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a policy to a single route.
    pub fn apply_route(&mut self, chain: &str, policy: &TrafficPolicy, route: &mut Route) {
        self.apply(chain, policy, route);
    }

    /// Applies a policy to a virtual host's own per-filter configuration,
    /// which the data plane consults for routes that do not set their own.
    pub fn apply_virtual_host(
        &mut self,
        chain: &str,
        policy: &TrafficPolicy,
        vhost: &mut VirtualHost,
    ) {
        self.apply(chain, policy, vhost);
    }

    /// Applies a policy to a route configuration's own per-filter
    /// configuration, the fallback for its virtual hosts and routes.
    pub fn apply_route_configuration(
        &mut self,
        chain: &str,
        policy: &TrafficPolicy,
        config: &mut RouteConfiguration,
    ) {
        self.apply(chain, policy, config);
    }

    /// Returns the filters that a chain must contain, without consuming the
    /// pass. Chains that no scope has referenced contain only the router.
    pub fn filter_chain(&self, chain: &str) -> FilterChain {
        match self.chains.get(chain) {
            Some(state) => state.build(chain),
            None => FilterChain {
                name: chain.to_string(),
                http_filters: vec![HttpFilter::router()],
            },
        }
    }

    /// Builds every chain that this pass has touched, ordered by name.
    pub fn into_filter_chains(self) -> Vec<FilterChain> {
        self.chains
            .iter()
            .map(|(name, state)| state.build(name))
            .collect()
    }

    fn chain(&mut self, chain: &str) -> &mut ChainState {
        if !self.chains.contains_key(chain) {
            tracing::trace!(%chain, "New filter chain");
        }
        self.chains.entry(chain.to_string()).or_default()
    }

    /// Ensures that a disabled instance of a filter is present in the chain so
    /// that per-scope overrides of it are honored. Only the first registration
    /// for a chain has any effect.
    pub(crate) fn register_companion(
        &mut self,
        chain: &str,
        name: &str,
        stage: FilterStage,
        config: impl FnOnce() -> TypedConfig,
    ) {
        self.chain(chain)
            .filters
            .entry(name.to_string())
            .or_insert_with(|| StagedHttpFilter {
                stage,
                filter: HttpFilter::disabled(name, config()),
            });
    }

    /// Enables a filter for the entire chain, replacing any disabled
    /// companion.
    pub(crate) fn enable_filter(
        &mut self,
        chain: &str,
        name: &str,
        stage: FilterStage,
        typed_config: TypedConfig,
    ) {
        let filter = HttpFilter {
            name: name.to_string(),
            typed_config,
            disabled: false,
        };
        self.chain(chain)
            .filters
            .insert(name.to_string(), StagedHttpFilter { stage, filter });
    }

    /// Records that a chain needs a filter for an extension. Each extension is
    /// materialized once per chain regardless of how many scopes use it.
    pub(crate) fn register_provider(
        &mut self,
        chain: &str,
        provider: &Arc<GatewayExtensionIr>,
        enabled: bool,
    ) {
        let entry = self
            .chain(chain)
            .providers
            .entry(provider.name.clone())
            .or_insert_with(|| Provider {
                ir: provider.clone(),
                enabled: false,
            });
        entry.enabled |= enabled;
    }
}

// === impl ChainState ===

impl ChainState {
    fn build(&self, name: &str) -> FilterChain {
        let mut filters = self.filters.values().cloned().collect::<Vec<_>>();
        filters.extend(self.providers.values().filter_map(Provider::staged));
        FilterChain {
            name: name.to_string(),
            http_filters: StagedHttpFilter::into_chain(filters),
        }
    }
}

// === impl Provider ===

impl Provider {
    fn staged(&self) -> Option<StagedHttpFilter> {
        let provider = match &self.ir.provider {
            Ok(provider) => provider,
            Err(error) => {
                tracing::warn!(extension = %self.ir.name, %error, "Skipping unresolved extension");
                return None;
            }
        };
        let (stage, typed_config) = match provider {
            ExtensionProvider::ExtAuth(config) => (
                FilterStage::during(WellKnownStage::AuthZ),
                TypedConfig::ExtAuthz(skip_when_disabled(config.clone())),
            ),
            ExtensionProvider::ExtProc(_) => (
                FilterStage::after(WellKnownStage::AuthZ),
                provider.typed_config(),
            ),
            ExtensionProvider::RateLimit(_) => (
                FilterStage::during(WellKnownStage::RateLimit),
                provider.typed_config(),
            ),
        };
        Some(StagedHttpFilter {
            stage,
            filter: HttpFilter {
                name: self.ir.filter_name(),
                typed_config,
                disabled: !self.enabled,
            },
        })
    }
}

/// Makes an authorization filter skip requests for which the disable-all
/// sentinel has been set.
fn skip_when_disabled(config: ExtAuthz) -> ExtAuthz {
    ExtAuthz {
        filter_enabled_metadata: Some(MetadataMatcher {
            filter: DISABLE_EXT_AUTH_NAMESPACE.to_string(),
            path: vec![PathSegment {
                key: DISABLE_EXT_AUTH_KEY.to_string(),
            }],
            value: ValueMatcher { bool_match: true },
            invert: true,
        }),
        ..config
    }
}
