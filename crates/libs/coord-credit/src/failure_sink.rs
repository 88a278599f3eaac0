//! Where terminally-failed ledger mutations are recorded after
//! [`crate::retry::with_backoff`] exhausts its attempts.

/// Parallels `coord_core::external::AnalyticsSink`: a thin, swappable
/// boundary for a collaborator this crate does not implement.
pub trait FailureSink: Send + Sync {
    fn record(&self, operation_id: &str, principal: &str, reason: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFailureSink;

impl FailureSink for NoopFailureSink {
    fn record(&self, _operation_id: &str, _principal: &str, _reason: &str) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFailureSink;

impl FailureSink for LoggingFailureSink {
    fn record(&self, operation_id: &str, principal: &str, reason: &str) {
        tracing::error!(operation_id, principal, reason, "credit ledger mutation failed permanently");
    }
}
