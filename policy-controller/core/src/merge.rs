//! Composes the policies attached to a target into one effective policy.
//!
//! Attachments are grouped by their depth in the attachment hierarchy. Each
//! group is first reduced to a single record, where the first attachment to
//! set a facet wins. Level records are then merged from the deepest level to
//! the shallowest, each level's annotation choosing how it combines with the
//! deeper levels already merged.

use crate::{
    facets::TransformationIr, Facet, PolicyAttachment, PolicyError, PolicyRef, TrafficPolicy,
};
use std::{collections::BTreeMap, fmt, str::FromStr};

/// A policy's precedence relative to the policies attached below it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum InheritedPriority {
    #[default]
    ShallowMergePreferChild,
    ShallowMergePreferParent,
    DeepMergePreferChild,
    DeepMergePreferParent,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MergeStrategy {
    /// Keeps facets that are already set; incoming facets only fill gaps.
    AugmentedShallow,
    /// Incoming facets replace facets that are already set.
    OverridableShallow,
    /// As `AugmentedShallow`, but concatenable facets append incoming
    /// entries.
    AugmentedDeep,
    /// As `OverridableShallow`, but concatenable facets prepend incoming
    /// entries.
    OverridableDeep,
}

/// Which end of the hierarchical priority range is closest to the leaf.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum HierarchyDirection {
    #[default]
    HigherIsDeeper,
    LowerIsDeeper,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub direction: HierarchyDirection,
}

/// The attachments that contributed a facet's value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    /// The value was taken wholesale from one policy.
    One(PolicyRef),
    /// The value concatenates entries from several policies, in order.
    Many(Vec<PolicyRef>),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeOrigins(BTreeMap<Facet, Origin>);

/// The effective policy for a target.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MergedPolicy {
    pub policy: TrafficPolicy,
    pub origins: MergeOrigins,

    /// Errors from every merged attachment, whether or not its facets were
    /// kept.
    pub errors: Vec<PolicyError>,
}

/// Identifies where a facet value came from while it is being merged.
struct Record<'a> {
    origins: &'a mut MergeOrigins,
    facet: Facet,
    origin: Option<&'a Origin>,
}

/// Merges attachments across hierarchy levels.
pub fn merge(attachments: &[PolicyAttachment], opts: MergeOptions) -> MergedPolicy {
    let mut levels = BTreeMap::<i32, Vec<&PolicyAttachment>>::new();
    for attachment in attachments {
        levels
            .entry(attachment.hierarchical_priority)
            .or_default()
            .push(attachment);
    }

    let mut levels = levels.into_values().collect::<Vec<_>>();
    if opts.direction == HierarchyDirection::HigherIsDeeper {
        levels.reverse();
    }

    let mut merged = MergedPolicy::default();
    for group in levels {
        let priority = group
            .first()
            .map(|a| a.inherited_priority)
            .unwrap_or_default();
        let level = merge_with_strategy(group, MergeStrategy::AugmentedShallow);
        merged.merge_from(&level.policy, &level.origins, priority.into());
        merged.errors.extend(level.errors);
    }
    merged
}

/// Merges attachments in order, using a single strategy.
pub fn merge_with_strategy<'a>(
    attachments: impl IntoIterator<Item = &'a PolicyAttachment>,
    strategy: MergeStrategy,
) -> MergedPolicy {
    let mut merged = MergedPolicy::default();
    for attachment in attachments {
        let origins = MergeOrigins::single(&attachment.policy_ref, &attachment.policy);
        merged.merge_from(&attachment.policy, &origins, strategy);
        merged.errors.extend(attachment.errors.iter().cloned());
    }
    merged
}

// === impl InheritedPriority ===

impl InheritedPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShallowMergePreferChild => "ShallowMergePreferChild",
            Self::ShallowMergePreferParent => "ShallowMergePreferParent",
            Self::DeepMergePreferChild => "DeepMergePreferChild",
            Self::DeepMergePreferParent => "DeepMergePreferParent",
        }
    }
}

impl FromStr for InheritedPriority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ShallowMergePreferChild" => Ok(Self::ShallowMergePreferChild),
            "ShallowMergePreferParent" => Ok(Self::ShallowMergePreferParent),
            "DeepMergePreferChild" => Ok(Self::DeepMergePreferChild),
            "DeepMergePreferParent" => Ok(Self::DeepMergePreferParent),
            s => anyhow::bail!("invalid inherited policy priority: {s}"),
        }
    }
}

impl fmt::Display for InheritedPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl MergeStrategy ===

impl From<InheritedPriority> for MergeStrategy {
    fn from(priority: InheritedPriority) -> Self {
        match priority {
            InheritedPriority::ShallowMergePreferChild => Self::AugmentedShallow,
            InheritedPriority::ShallowMergePreferParent => Self::OverridableShallow,
            InheritedPriority::DeepMergePreferChild => Self::AugmentedDeep,
            InheritedPriority::DeepMergePreferParent => Self::OverridableDeep,
        }
    }
}

// === impl HierarchyDirection ===

impl FromStr for HierarchyDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "higher-is-deeper" => Ok(Self::HigherIsDeeper),
            "lower-is-deeper" => Ok(Self::LowerIsDeeper),
            s => anyhow::bail!("invalid hierarchy direction: {s}"),
        }
    }
}

// === impl Origin ===

impl Origin {
    pub fn refs(&self) -> &[PolicyRef] {
        match self {
            Self::One(r) => std::slice::from_ref(r),
            Self::Many(refs) => refs,
        }
    }
}

// === impl MergeOrigins ===

impl MergeOrigins {
    /// Attributes every facet a policy configures to that policy.
    fn single(policy_ref: &PolicyRef, policy: &TrafficPolicy) -> Self {
        Self(
            policy
                .configured()
                .map(|facet| (facet, Origin::One(policy_ref.clone())))
                .collect(),
        )
    }

    pub fn get(&self, facet: Facet) -> Option<&Origin> {
        self.0.get(&facet)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Facet, &Origin)> + '_ {
        self.0.iter().map(|(f, o)| (*f, o))
    }

    pub fn set_one(&mut self, facet: Facet, policy_ref: PolicyRef) {
        self.0.insert(facet, Origin::One(policy_ref));
    }

    /// Records that a facet's value was replaced wholesale.
    pub fn set(&mut self, facet: Facet, origin: Origin) {
        self.0.insert(facet, origin);
    }

    /// Records that entries contributed by `origin` follow the existing ones.
    pub fn append(&mut self, facet: Facet, origin: &Origin) {
        let mut refs = self.take_refs(facet);
        refs.extend(origin.refs().iter().cloned());
        self.0.insert(facet, Origin::Many(refs));
    }

    /// Records that entries contributed by `origin` precede the existing ones.
    pub fn prepend(&mut self, facet: Facet, origin: &Origin) {
        let mut refs = origin.refs().to_vec();
        refs.extend(self.take_refs(facet));
        self.0.insert(facet, Origin::Many(refs));
    }

    fn take_refs(&mut self, facet: Facet) -> Vec<PolicyRef> {
        match self.0.remove(&facet) {
            Some(Origin::One(r)) => vec![r],
            Some(Origin::Many(refs)) => refs,
            None => vec![],
        }
    }
}

// === impl MergedPolicy ===

impl MergedPolicy {
    pub fn is_accepted(&self) -> bool {
        self.errors.is_empty()
    }

    /// Merges `incoming` into this policy, facet by facet.
    fn merge_from(
        &mut self,
        incoming: &TrafficPolicy,
        origins: &MergeOrigins,
        strategy: MergeStrategy,
    ) {
        let Self {
            policy,
            origins: merged_origins,
            ..
        } = self;

        if policy.creation_timestamp.is_none() {
            policy.creation_timestamp = incoming.creation_timestamp;
        }

        for facet in incoming.configured() {
            let record = Record {
                origins: &mut *merged_origins,
                facet,
                origin: origins.get(facet),
            };
            match facet {
                Facet::Ai => merge_wholesale(&mut policy.ai, &incoming.ai, strategy, record),
                Facet::Transformation => merge_transformation(
                    &mut policy.transformation,
                    &incoming.transformation,
                    strategy,
                    record,
                ),
                Facet::HostRewrite => {
                    merge_wholesale(&mut policy.host_rewrite, &incoming.host_rewrite, strategy, record)
                }
                Facet::ExtProc => {
                    merge_wholesale(&mut policy.ext_proc, &incoming.ext_proc, strategy, record)
                }
                Facet::ExtAuth => {
                    merge_wholesale(&mut policy.ext_auth, &incoming.ext_auth, strategy, record)
                }
                Facet::LocalRateLimit => merge_wholesale(
                    &mut policy.local_rate_limit,
                    &incoming.local_rate_limit,
                    strategy,
                    record,
                ),
                Facet::GlobalRateLimit => merge_wholesale(
                    &mut policy.global_rate_limit,
                    &incoming.global_rate_limit,
                    strategy,
                    record,
                ),
                Facet::Cors => merge_wholesale(&mut policy.cors, &incoming.cors, strategy, record),
                Facet::Csrf => merge_wholesale(&mut policy.csrf, &incoming.csrf, strategy, record),
                Facet::Buffer => {
                    merge_wholesale(&mut policy.buffer, &incoming.buffer, strategy, record)
                }
                Facet::HeaderMutation => merge_wholesale(
                    &mut policy.header_mutation,
                    &incoming.header_mutation,
                    strategy,
                    record,
                ),
                Facet::HashPolicy => {
                    merge_wholesale(&mut policy.hash_policy, &incoming.hash_policy, strategy, record)
                }
                Facet::Timeouts => {
                    merge_wholesale(&mut policy.timeouts, &incoming.timeouts, strategy, record)
                }
            }
        }
    }
}

// === impl Record ===

impl Record<'_> {
    fn set(self) {
        if let Some(origin) = self.origin {
            self.origins.set(self.facet, origin.clone());
        }
    }

    fn append(self) {
        if let Some(origin) = self.origin {
            self.origins.append(self.facet, origin);
        }
    }

    fn prepend(self) {
        if let Some(origin) = self.origin {
            self.origins.prepend(self.facet, origin);
        }
    }
}

/// Merges a facet that has no deep merge rule: deep strategies behave as their
/// shallow counterparts.
fn merge_wholesale<T: Clone>(
    acc: &mut Option<T>,
    incoming: &Option<T>,
    strategy: MergeStrategy,
    record: Record<'_>,
) {
    match strategy {
        MergeStrategy::AugmentedShallow | MergeStrategy::AugmentedDeep => {
            fill_if_absent(acc, incoming, record)
        }
        MergeStrategy::OverridableShallow | MergeStrategy::OverridableDeep => {
            override_with(acc, incoming, record)
        }
    }
}

fn fill_if_absent<T: Clone>(acc: &mut Option<T>, incoming: &Option<T>, record: Record<'_>) {
    if acc.is_none() {
        override_with(acc, incoming, record);
    }
}

fn override_with<T: Clone>(acc: &mut Option<T>, incoming: &Option<T>, record: Record<'_>) {
    if let Some(value) = incoming {
        *acc = Some(value.clone());
        record.set();
    }
}

fn merge_transformation(
    acc: &mut Option<TransformationIr>,
    incoming: &Option<TransformationIr>,
    strategy: MergeStrategy,
    record: Record<'_>,
) {
    if let (Some(current), Some(incoming)) = (acc.as_mut(), incoming) {
        match strategy {
            MergeStrategy::AugmentedDeep => {
                current.append(incoming);
                record.append();
                return;
            }
            MergeStrategy::OverridableDeep => {
                current.prepend(incoming);
                record.prepend();
                return;
            }
            MergeStrategy::AugmentedShallow | MergeStrategy::OverridableShallow => {}
        }
    }
    merge_wholesale(acc, incoming, strategy, record)
}

#[cfg(test)]
mod tests;
