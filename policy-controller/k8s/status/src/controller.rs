use crate::{conditions, ControllerMetrics};
use async_trait::async_trait;
use chrono::Utc;
use gateway_policy_controller_k8s_api::{self as k8s, GatewayExtension, TrafficPolicy};
use gateway_policy_controller_k8s_index::{ResourceId, StatusKind, StatusUpdate};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Writes a status patch to a resource.
#[async_trait]
pub trait StatusPatcher: Send + Sync {
    async fn patch(
        &self,
        kind: StatusKind,
        id: &ResourceId,
        patch: &k8s::Patch<serde_json::Value>,
    ) -> anyhow::Result<()>;
}

/// Patches the status subresource through the Kubernetes API.
#[derive(Clone)]
pub struct KubePatcher {
    client: k8s::Client,
    field_manager: String,
    timeout: Duration,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Retry {
    /// The number of attempts made after the first one fails.
    pub retries: u32,

    /// The delay before the first retry. Each subsequent retry waits twice as
    /// long as the one before it.
    pub backoff: Duration,
}

pub struct Controller<P = KubePatcher> {
    patcher: P,
    updates: UnboundedReceiver<StatusUpdate>,
    retry: Retry,
    metrics: ControllerMetrics,
}

// === impl KubePatcher ===

impl KubePatcher {
    pub fn new(client: k8s::Client, field_manager: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
            timeout,
        }
    }
}

#[async_trait]
impl StatusPatcher for KubePatcher {
    async fn patch(
        &self,
        kind: StatusKind,
        id: &ResourceId,
        patch: &k8s::Patch<serde_json::Value>,
    ) -> anyhow::Result<()> {
        let params = k8s::PatchParams::apply(&self.field_manager);
        let patch = async {
            match kind {
                StatusKind::TrafficPolicy => {
                    k8s::Api::<TrafficPolicy>::namespaced(self.client.clone(), &id.namespace)
                        .patch_status(&id.name, &params, patch)
                        .await
                        .map(|_| ())
                }
                StatusKind::GatewayExtension => {
                    k8s::Api::<GatewayExtension>::namespaced(self.client.clone(), &id.namespace)
                        .patch_status(&id.name, &params, patch)
                        .await
                        .map(|_| ())
                }
            }
        };
        tokio::time::timeout(self.timeout, patch)
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {:?}", self.timeout))??;
        Ok(())
    }
}

// === impl Retry ===

impl Default for Retry {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

// === impl Controller ===

impl<P: StatusPatcher> Controller<P> {
    pub fn new(
        patcher: P,
        updates: UnboundedReceiver<StatusUpdate>,
        retry: Retry,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            patcher,
            updates,
            retry,
            metrics,
        }
    }

    /// Applies updates until every sender has been dropped.
    pub async fn process_updates(mut self) {
        while let Some(update) = self.updates.recv().await {
            self.process(update).await;
        }
        tracing::debug!("Status updates closed");
    }

    async fn process(&self, update: StatusUpdate) {
        let StatusUpdate {
            kind,
            id,
            generation,
            errors,
        } = update;
        let condition = conditions::accepted(&errors, generation, Utc::now());
        let accepted = errors.is_empty();
        let patch = conditions::make_patch(kind, condition);

        let mut backoff = self.retry.backoff;
        let mut attempt = 0;
        loop {
            let error = match self.patcher.patch(kind, &id, &patch).await {
                Ok(()) => {
                    tracing::debug!(%kind, namespace = %id.namespace, name = %id.name, accepted, "Patched status");
                    self.metrics.succeeded(kind);
                    return;
                }
                Err(error) => error,
            };

            if attempt == self.retry.retries {
                tracing::error!(%kind, namespace = %id.namespace, name = %id.name, %error, "Failed to patch status");
                self.metrics.failed(kind);
                return;
            }

            attempt += 1;
            tracing::info!(%kind, namespace = %id.namespace, name = %id.name, %error, attempt, ?backoff, "Retrying status patch");
            self.metrics.retried(kind);
            tokio::time::sleep(backoff).await;
            backoff = backoff.saturating_mul(2);
        }
    }
}
