use crate::{
    index::{SharedIndex, StatusKind, StatusUpdate, Verdict},
    translate::{ValidationState, Validator},
};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// Has the data plane validate each policy before its status is published.
///
/// Verdicts are recorded in the index, which withholds a policy from its
/// targets until its current configuration has been accepted.
pub(crate) struct StrictValidation {
    index: SharedIndex,
    validator: Arc<dyn Validator>,
}

impl StrictValidation {
    pub(crate) fn new(index: SharedIndex, validator: Arc<dyn Validator>) -> Self {
        Self { index, validator }
    }

    pub(crate) async fn run(
        self,
        mut updates: UnboundedReceiver<StatusUpdate>,
        validated: UnboundedSender<StatusUpdate>,
    ) {
        while let Some(update) = updates.recv().await {
            let Some(update) = self.validate(update).await else {
                continue;
            };
            if validated.send(update).is_err() {
                tracing::debug!("Status controller has stopped");
                return;
            }
        }
    }

    /// Returns `None` when the update is stale: the policy has since been
    /// deleted or rebuilt, and any rebuild publishes its own update.
    async fn validate(&self, mut update: StatusUpdate) -> Option<StatusUpdate> {
        if update.kind != StatusKind::TrafficPolicy {
            return Some(update);
        }
        let (policy, verdict) = {
            let index = self.index.read();
            let policy = index.policy(&update.id)?;
            (policy, index.verdict(&update.id))
        };

        let verdict = match verdict {
            Some(verdict) => verdict,
            None => match ValidationState::strict(&policy, &*self.validator).await {
                Ok(ValidationState::Rejected(error)) => Verdict::Rejected(error),
                Ok(state) => {
                    tracing::debug!(policy = %update.id, ?state, "Policy validated");
                    Verdict::Accepted
                }
                // The policy stays withheld until it can be validated.
                Err(error) => {
                    tracing::warn!(policy = %update.id, %error, "Failed to validate policy");
                    return Some(update);
                }
            },
        };

        if !self
            .index
            .write()
            .record_verdict(&update.id, &policy, verdict.clone())
        {
            tracing::debug!(policy = %update.id, "Policy changed during validation");
            return None;
        }
        if let Verdict::Rejected(error) = verdict {
            tracing::info!(policy = %update.id, %error, "Policy rejected");
            if !update.errors.contains(&error) {
                update.errors.push(error);
            }
        }
        Some(update)
    }
}
