use super::SubIr;
use crate::{xds::route::RetryPolicy, Facet, ValidationError};
use std::time::Duration;

/// Request timeouts and retries, applied to the route action.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TimeoutsIr {
    pub request: Option<Duration>,
    pub stream_idle: Option<Duration>,
    pub retry: Option<RetryPolicy>,
}

impl SubIr for TimeoutsIr {
    const FACET: Facet = Facet::Timeouts;

    fn validate(&self) -> Result<(), ValidationError> {
        let Some(retry) = &self.retry else {
            return Ok(());
        };
        if retry.retry_on.is_empty() && retry.retriable_status_codes.is_empty() {
            return Err(ValidationError::Missing("retry.retryOn"));
        }
        for code in &retry.retriable_status_codes {
            if !(400..=599).contains(code) {
                return Err(ValidationError::out_of_range(
                    "retry.statusCodes",
                    *code,
                    400u32,
                    599u32,
                ));
            }
        }
        if let (Some(per_try), Some(request)) = (retry.per_try_timeout, self.request) {
            if per_try > request {
                return Err(ValidationError::invalid(
                    "retry.perTryTimeout",
                    format!("{per_try:?} exceeds the request timeout of {request:?}"),
                ));
            }
        }
        if let Some(backoff) = &retry.retry_back_off {
            if backoff.base_interval.is_zero() {
                return Err(ValidationError::Missing("retry.backoffBaseInterval"));
            }
            if backoff.max_interval.is_some_and(|max| max < backoff.base_interval) {
                return Err(ValidationError::invalid(
                    "retry.backoffMaxInterval",
                    "must not be less than the base interval",
                ));
            }
        }
        Ok(())
    }
}
