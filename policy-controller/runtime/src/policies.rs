use crate::{
    core::{xds::Route, MergeOptions, MergedPolicy},
    index::{SharedIndex, Target},
    translate::TranslationPass,
};

/// Looks up the effective policy for a target hierarchy.
///
/// In strict mode the index withholds policies the data plane has not
/// accepted, so targets fall back to whatever the remaining policies
/// configure.
#[derive(Clone)]
pub struct Policies {
    index: SharedIndex,
    options: MergeOptions,
}

// === impl Policies ===

impl Policies {
    pub fn new(index: SharedIndex, options: MergeOptions) -> Self {
        Self { index, options }
    }

    pub fn options(&self) -> MergeOptions {
        self.options
    }

    pub fn effective_policy(&self, hierarchy: &[Target]) -> MergedPolicy {
        self.index.read().effective_policy(hierarchy, self.options)
    }

    /// Merges the policies attached to a route's hierarchy and applies the
    /// result to the route.
    pub fn apply_route(
        &self,
        pass: &mut TranslationPass,
        chain: &str,
        hierarchy: &[Target],
        route: &mut Route,
    ) -> MergedPolicy {
        let merged = self.effective_policy(hierarchy);
        pass.apply_route(chain, &merged.policy, route);
        merged
    }
}
