use super::SubIr;
use crate::{
    xds::{
        config::{LocalRateLimit, TokenBucket},
        matcher::RuntimeFractionalPercent,
    },
    Facet, ValidationError,
};
use std::time::Duration;

/// The data plane rejects token buckets that refill more often than this.
pub const MIN_FILL_INTERVAL: Duration = Duration::from_millis(50);

const STAT_PREFIX: &str = "http_local_rate_limiter";

/// A per-instance token bucket.
///
/// A limit without a token bucket disables rate limiting for its scope.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalRateLimitIr {
    pub config: LocalRateLimit,
}

impl LocalRateLimitIr {
    pub fn token_bucket(
        max_tokens: u32,
        tokens_per_fill: Option<u32>,
        fill_interval: Duration,
    ) -> Self {
        Self {
            config: LocalRateLimit {
                stat_prefix: STAT_PREFIX.to_string(),
                token_bucket: Some(TokenBucket {
                    max_tokens,
                    tokens_per_fill,
                    fill_interval,
                }),
                filter_enabled: Some(RuntimeFractionalPercent::percent(100)),
                filter_enforced: Some(RuntimeFractionalPercent::percent(100)),
            },
        }
    }

    pub fn disabled() -> Self {
        Self {
            config: LocalRateLimit {
                stat_prefix: STAT_PREFIX.to_string(),
                token_bucket: None,
                filter_enabled: None,
                filter_enforced: None,
            },
        }
    }
}

impl SubIr for LocalRateLimitIr {
    const FACET: Facet = Facet::LocalRateLimit;

    fn validate(&self) -> Result<(), ValidationError> {
        let Some(bucket) = &self.config.token_bucket else {
            return Ok(());
        };
        if bucket.max_tokens == 0 {
            return Err(ValidationError::out_of_range(
                "rateLimit.local.tokenBucket.maxTokens",
                0u32,
                1u32,
                u32::MAX,
            ));
        }
        if bucket.tokens_per_fill == Some(0) {
            return Err(ValidationError::out_of_range(
                "rateLimit.local.tokenBucket.tokensPerFill",
                0u32,
                1u32,
                u32::MAX,
            ));
        }
        if bucket.fill_interval < MIN_FILL_INTERVAL {
            return Err(ValidationError::invalid(
                "rateLimit.local.tokenBucket.fillInterval",
                format!(
                    "must be at least {MIN_FILL_INTERVAL:?}; got {:?}",
                    bucket.fill_interval
                ),
            ));
        }
        Ok(())
    }
}
