use gateway_policy_controller_k8s_index::StatusKind;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ControllerMetrics {
    patch_succeeded: Family<KindLabels, Counter>,
    patch_failed: Family<KindLabels, Counter>,
    patch_retried: Family<KindLabels, Counter>,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let patch_succeeded = Family::default();
        prom.register(
            "patch_succeeded",
            "Count of status patches that were applied",
            patch_succeeded.clone(),
        );

        let patch_failed = Family::default();
        prom.register(
            "patch_failed",
            "Count of status patches that were dropped after exhausting retries",
            patch_failed.clone(),
        );

        let patch_retried = Family::default();
        prom.register(
            "patch_retried",
            "Count of status patch attempts that were retried",
            patch_retried.clone(),
        );

        Self {
            patch_succeeded,
            patch_failed,
            patch_retried,
        }
    }

    pub(crate) fn succeeded(&self, kind: StatusKind) {
        self.patch_succeeded.get_or_create(&kind.into()).inc();
    }

    pub(crate) fn failed(&self, kind: StatusKind) {
        self.patch_failed.get_or_create(&kind.into()).inc();
    }

    pub(crate) fn retried(&self, kind: StatusKind) {
        self.patch_retried.get_or_create(&kind.into()).inc();
    }

    #[cfg(test)]
    pub(crate) fn counts(&self, kind: StatusKind) -> (u64, u64, u64) {
        let labels = kind.into();
        (
            self.patch_succeeded.get_or_create(&labels).get(),
            self.patch_failed.get_or_create(&labels).get(),
            self.patch_retried.get_or_create(&labels).get(),
        )
    }
}

impl From<StatusKind> for KindLabels {
    fn from(kind: StatusKind) -> Self {
        Self {
            kind: kind.to_string(),
        }
    }
}
