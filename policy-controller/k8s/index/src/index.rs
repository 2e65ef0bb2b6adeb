use crate::{
    attachment::{self, Target},
    gateway_extension,
    lookup::{self, Lookup, SecretData},
    resource::{ResourceId, StatusKind, StatusUpdate},
    traffic_policy,
};
use ahash::AHashMap as HashMap;
use chrono::{offset::Utc, DateTime};
use gateway_policy_controller_core::{
    merge, ExtensionName, GatewayExtensionIr, InheritedPriority, MergeOptions, MergedPolicy,
    PolicyAttachment, PolicyError, TrafficPolicy,
};
use gateway_policy_controller_k8s_api::{
    self as k8s,
    target_ref::{LocalPolicyTargetRef, LocalPolicyTargetSelector},
    ResourceExt, INHERITED_POLICY_PRIORITY_ANNOTATION,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::info_span;

pub type SharedIndex = Arc<RwLock<Index>>;

/// Holds all indexing state. Owned and updated by the tasks that process watch
/// events; read when translating the policies attached to a target.
pub struct Index {
    resources: Resources,
    policies: HashMap<ResourceId, PolicyState>,

    /// When set, only policies that the data plane has accepted are attached
    /// to targets.
    strict: bool,

    /// Publishes status changes to the status controller.
    updates: UnboundedSender<StatusUpdate>,
}

/// The resources that policies and extensions resolve their references
/// against.
#[derive(Default)]
struct Resources {
    /// The ports of each service.
    services: HashMap<ResourceId, BTreeSet<u16>>,
    secrets: HashMap<ResourceId, SecretData>,
    extensions: HashMap<ResourceId, ExtensionState>,
}

struct ExtensionState {
    spec: k8s::GatewayExtensionSpec,
    generation: Option<i64>,
    ir: Arc<GatewayExtensionIr>,
}

/// The data plane's verdict on a policy's configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(PolicyError),
}

pub(crate) struct PolicyState {
    spec: Arc<k8s::TrafficPolicySpec>,
    generation: Option<i64>,
    pub(crate) target_refs: Vec<LocalPolicyTargetRef>,
    pub(crate) target_selectors: Vec<LocalPolicyTargetSelector>,
    pub(crate) inherited_priority: InheritedPriority,
    priority_error: Option<PolicyError>,
    pub(crate) policy: Arc<TrafficPolicy>,
    pub(crate) errors: Vec<PolicyError>,

    /// Unset until the current `policy` has been validated by the data plane.
    verdict: Option<Verdict>,
}

// === impl Index ===

impl Index {
    pub fn shared(updates: UnboundedSender<StatusUpdate>) -> SharedIndex {
        Arc::new(RwLock::new(Self::new(updates, false)))
    }

    /// Returns an index that withholds each policy from its targets until the
    /// data plane has accepted the policy's current configuration.
    pub fn shared_strict(updates: UnboundedSender<StatusUpdate>) -> SharedIndex {
        Arc::new(RwLock::new(Self::new(updates, true)))
    }

    fn new(updates: UnboundedSender<StatusUpdate>, strict: bool) -> Self {
        Self {
            resources: Resources::default(),
            policies: HashMap::default(),
            strict,
            updates,
        }
    }

    /// Returns the policies attached to each level of a target hierarchy.
    pub fn attachments(&self, hierarchy: &[Target]) -> Vec<PolicyAttachment> {
        let mut attachments = Vec::new();
        for target in hierarchy {
            let mut attached = self
                .policies
                .iter()
                .filter(|(id, policy)| target.is_targeted_by(id, policy))
                .filter(|(id, policy)| {
                    let withheld = self.strict && policy.verdict != Some(Verdict::Accepted);
                    if withheld {
                        tracing::debug!(
                            policy = %id,
                            verdict = ?policy.verdict,
                            "Withholding policy"
                        );
                    }
                    !withheld
                })
                .collect::<Vec<_>>();
            attached.sort_by(|a, b| attachment::by_age(*a, *b));
            attachments.extend(attached.into_iter().map(|(id, p)| target.attach(id, p)));
        }
        attachments
    }

    /// Merges the policies attached to a target hierarchy into its effective
    /// policy.
    pub fn effective_policy(&self, hierarchy: &[Target], opts: MergeOptions) -> MergedPolicy {
        merge(&self.attachments(hierarchy), opts)
    }

    pub fn extension(&self, name: &ExtensionName) -> Option<Arc<GatewayExtensionIr>> {
        self.resources.extension(name)
    }

    /// Returns the constructed policy, without any facets that failed to
    /// build.
    pub fn policy(&self, id: &ResourceId) -> Option<Arc<TrafficPolicy>> {
        self.policies.get(id).map(|state| state.policy.clone())
    }

    /// Returns the data plane's verdict on a policy's current configuration,
    /// if it has been validated.
    pub fn verdict(&self, id: &ResourceId) -> Option<Verdict> {
        self.policies.get(id)?.verdict.clone()
    }

    /// Records the data plane's verdict on a policy.
    ///
    /// Returns false, discarding the verdict, when the policy has been deleted
    /// or rebuilt since `validated` was read.
    pub fn record_verdict(
        &mut self,
        id: &ResourceId,
        validated: &TrafficPolicy,
        verdict: Verdict,
    ) -> bool {
        match self.policies.get_mut(id) {
            Some(state) if *state.policy == *validated => {
                state.verdict = Some(verdict);
                true
            }
            _ => false,
        }
    }

    fn apply_policy(&mut self, id: ResourceId, policy: k8s::TrafficPolicy) {
        let annotation = policy.annotations().get(INHERITED_POLICY_PRIORITY_ANNOTATION);
        let priority = annotation.map(|v| v.parse::<InheritedPriority>());
        let (inherited_priority, priority_error) = match priority {
            None => (InheritedPriority::default(), None),
            Some(Ok(priority)) => (priority, None),
            Some(Err(error)) => {
                let error = PolicyError::Annotation {
                    annotation: INHERITED_POLICY_PRIORITY_ANNOTATION,
                    message: format!("{error:#}"),
                };
                (InheritedPriority::default(), Some(error))
            }
        };
        let created = policy.creation_timestamp().map(|k8s::Time(t)| t);
        let generation = policy.metadata.generation;
        let spec = Arc::new(policy.spec);

        let (policy, errors) = build_policy(
            &id,
            &spec,
            created,
            priority_error.as_ref(),
            &self.resources,
        );
        if !errors.is_empty() {
            tracing::info!(errors = errors.len(), "Policy has errors");
        }

        let prior = self.policies.get(&id);
        let verdict = prior
            .filter(|prior| *prior.policy == policy)
            .and_then(|prior| prior.verdict.clone());
        let changed = match prior {
            Some(prior) => {
                prior.generation != generation
                    || prior.errors != errors
                    || *prior.policy != policy
            }
            None => true,
        };
        let state = PolicyState {
            target_refs: spec.target_refs.clone(),
            target_selectors: spec.target_selectors.clone(),
            spec,
            generation,
            inherited_priority,
            priority_error,
            policy: Arc::new(policy),
            errors,
            verdict,
        };
        if changed {
            self.publish(StatusKind::TrafficPolicy, &id, state.generation, &state.errors);
        }
        self.policies.insert(id, state);
    }

    fn apply_extension(&mut self, id: ResourceId, ext: k8s::GatewayExtension) {
        let generation = ext.metadata.generation;
        let ir = Arc::new(gateway_extension::resolve(&id, &ext.spec, &self.resources));
        let state = ExtensionState {
            spec: ext.spec,
            generation,
            ir,
        };
        let changed = match self.resources.extensions.get(&id) {
            Some(prior) => prior.generation != generation || prior.ir != state.ir,
            None => true,
        };
        if changed {
            let errors = extension_errors(&state.ir);
            self.publish(StatusKind::GatewayExtension, &id, generation, &errors);
        }
        self.resources.extensions.insert(id, state);
    }

    /// Re-resolves every extension, e.g. after a backend service changes.
    fn reindex_extensions(&mut self) {
        let mut changed = Vec::new();
        for (id, state) in self.resources.extensions.iter() {
            let ir = Arc::new(gateway_extension::resolve(id, &state.spec, &self.resources));
            if ir != state.ir {
                changed.push((id.clone(), ir));
            }
        }
        for (id, ir) in changed {
            let Some(state) = self.resources.extensions.get_mut(&id) else {
                continue;
            };
            tracing::debug!(%id, "Extension changed");
            state.ir = ir;
            let generation = state.generation;
            let errors = extension_errors(&state.ir);
            self.publish(StatusKind::GatewayExtension, &id, generation, &errors);
        }
    }

    /// Rebuilds every policy, e.g. after a referenced resource changes.
    ///
    /// A policy whose configuration changes is republished so that it may be
    /// validated again.
    fn reindex_policies(&mut self) {
        let Self {
            resources,
            policies,
            updates,
            ..
        } = self;
        for (id, state) in policies.iter_mut() {
            let created = state.policy.creation_timestamp;
            let (policy, errors) = build_policy(
                id,
                &state.spec,
                created,
                state.priority_error.as_ref(),
                &*resources,
            );
            if policy == *state.policy && errors == state.errors {
                continue;
            }
            tracing::debug!(%id, "Policy changed");
            if policy != *state.policy {
                state.verdict = None;
            }
            state.policy = Arc::new(policy);
            state.errors = errors;
            send(
                updates,
                StatusKind::TrafficPolicy,
                id,
                state.generation,
                &state.errors,
            );
        }
    }

    fn reindex_all(&mut self) {
        self.reindex_extensions();
        self.reindex_policies();
    }

    fn publish(
        &self,
        kind: StatusKind,
        id: &ResourceId,
        generation: Option<i64>,
        errors: &[PolicyError],
    ) {
        send(&self.updates, kind, id, generation, errors);
    }
}

fn send(
    updates: &UnboundedSender<StatusUpdate>,
    kind: StatusKind,
    id: &ResourceId,
    generation: Option<i64>,
    errors: &[PolicyError],
) {
    let update = StatusUpdate {
        kind,
        id: id.clone(),
        generation,
        errors: errors.to_vec(),
    };
    if updates.send(update).is_err() {
        tracing::debug!(%kind, %id, "Status controller has stopped; dropping update");
    }
}

fn build_policy(
    id: &ResourceId,
    spec: &k8s::TrafficPolicySpec,
    created: Option<DateTime<Utc>>,
    priority_error: Option<&PolicyError>,
    resources: &Resources,
) -> (TrafficPolicy, Vec<PolicyError>) {
    let traffic_policy::Constructed { policy, errors } =
        traffic_policy::construct(&id.namespace, spec, created, resources);
    let errors = priority_error.cloned().into_iter().chain(errors).collect();
    (policy, errors)
}

fn extension_errors(ir: &GatewayExtensionIr) -> Vec<PolicyError> {
    match &ir.provider {
        Ok(_) => Vec::new(),
        Err(error) => vec![PolicyError::Resolution {
            extension: ir.name.clone(),
            message: error.to_string(),
        }],
    }
}

fn resource_id<T: ResourceExt>(resource: &T) -> Option<ResourceId> {
    let namespace = resource.namespace()?;
    Some(ResourceId::new(namespace, resource.name_unchecked()))
}

// === impl Resources ===

impl Lookup for Resources {
    fn service_cluster(&self, namespace: &str, name: &str, port: u16) -> Option<String> {
        let ports = self.services.get(&ResourceId::new(namespace, name))?;
        ports
            .contains(&port)
            .then(|| lookup::cluster_name(namespace, name, port))
    }

    fn secret(&self, namespace: &str, name: &str) -> Option<SecretData> {
        self.secrets.get(&ResourceId::new(namespace, name)).cloned()
    }

    fn extension(&self, name: &ExtensionName) -> Option<Arc<GatewayExtensionIr>> {
        let id = ResourceId::new(name.namespace.clone(), name.name.clone());
        self.extensions.get(&id).map(|ext| ext.ir.clone())
    }
}

// === Watches ===

impl kubert::index::IndexNamespacedResource<k8s::Service> for Index {
    fn apply(&mut self, svc: k8s::Service) {
        let Some(id) = resource_id(&svc) else {
            tracing::warn!("Service must be namespaced");
            return;
        };
        let _span = info_span!("apply", ns = %id.namespace, name = %id.name).entered();

        let ports = svc
            .spec
            .into_iter()
            .flat_map(|spec| spec.ports.into_iter().flatten())
            .filter_map(|p| u16::try_from(p.port).ok())
            .collect::<BTreeSet<_>>();
        if self.resources.services.get(&id) == Some(&ports) {
            return;
        }
        tracing::debug!(?ports, "Service updated");
        self.resources.services.insert(id, ports);
        self.reindex_all();
    }

    fn delete(&mut self, namespace: String, name: String) {
        let _span = info_span!("delete", ns = %namespace, name = %name).entered();
        if self
            .resources
            .services
            .remove(&ResourceId::new(namespace, name))
            .is_some()
        {
            self.reindex_all();
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Secret> for Index {
    fn apply(&mut self, secret: k8s::Secret) {
        let Some(id) = resource_id(&secret) else {
            tracing::warn!("Secret must be namespaced");
            return;
        };
        let _span = info_span!("apply", ns = %id.namespace, name = %id.name).entered();

        let data = secret
            .data
            .into_iter()
            .flatten()
            .map(|(k, v)| (k, v.0))
            .collect::<BTreeMap<_, _>>();
        if self.resources.secrets.get(&id).map(|d| d.as_ref()) == Some(&data) {
            return;
        }
        self.resources.secrets.insert(id, Arc::new(data));
        self.reindex_policies();
    }

    fn delete(&mut self, namespace: String, name: String) {
        let _span = info_span!("delete", ns = %namespace, name = %name).entered();
        if self
            .resources
            .secrets
            .remove(&ResourceId::new(namespace, name))
            .is_some()
        {
            self.reindex_policies();
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::GatewayExtension> for Index {
    fn apply(&mut self, ext: k8s::GatewayExtension) {
        let Some(id) = resource_id(&ext) else {
            tracing::warn!("GatewayExtension must be namespaced");
            return;
        };
        let _span = info_span!("apply", ns = %id.namespace, name = %id.name).entered();
        self.apply_extension(id, ext);
        self.reindex_policies();
    }

    fn delete(&mut self, namespace: String, name: String) {
        let _span = info_span!("delete", ns = %namespace, name = %name).entered();
        if self
            .resources
            .extensions
            .remove(&ResourceId::new(namespace, name))
            .is_some()
        {
            self.reindex_policies();
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::TrafficPolicy> for Index {
    fn apply(&mut self, policy: k8s::TrafficPolicy) {
        let Some(id) = resource_id(&policy) else {
            tracing::warn!("TrafficPolicy must be namespaced");
            return;
        };
        let _span = info_span!("apply", ns = %id.namespace, name = %id.name).entered();
        self.apply_policy(id, policy);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let _span = info_span!("delete", ns = %namespace, name = %name).entered();
        // The policy's verdict goes with it: a policy recreated under the same
        // name is validated afresh.
        if self
            .policies
            .remove(&ResourceId::new(namespace, name))
            .is_some()
        {
            tracing::debug!("Policy deleted");
        }
    }
}
