//! Typed boundaries for collaborators the core consumes but does not
//! implement: analytics, billing, and cross-process advisory locking.
//! Production implementations (Stripe, a real analytics pipeline) are
//! explicitly out of scope; these traits exist so the core can be built
//! and tested against fakes.

use async_trait::async_trait;
use serde_json::Value;

/// Fire-and-forget analytics event sink.
pub trait AnalyticsSink: Send + Sync {
    fn capture(&self, event: &str, distinct_id: &str, properties: Value);
    fn flush(&self);
}

/// Drops every event; the default for contexts with no analytics pipeline
/// configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnalyticsSink;

impl AnalyticsSink for NoopAnalyticsSink {
    fn capture(&self, _event: &str, _distinct_id: &str, _properties: Value) {}
    fn flush(&self) {}
}

/// Logs every event via `tracing` instead of shipping it anywhere;
/// useful for local development and tests that want to observe emitted
/// events without a real analytics backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAnalyticsSink;

impl AnalyticsSink for LoggingAnalyticsSink {
    fn capture(&self, event: &str, distinct_id: &str, properties: Value) {
        tracing::info!(event, distinct_id, %properties, "analytics event");
    }
    fn flush(&self) {}
}

/// Payment method summary returned by `PaymentGateway::list_payment_methods`.
#[derive(Debug, Clone)]
pub struct PaymentMethod {
    pub id: String,
    pub brand: String,
    pub last4: String,
}

/// Billing collaborator. No production implementation ships with this
/// crate; Stripe integration is explicitly out of scope.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        amount_cents: i64,
        idempotency_key: &str,
    ) -> anyhow::Result<String>;
    async fn list_payment_methods(&self, customer_id: &str) -> anyhow::Result<Vec<PaymentMethod>>;
    async fn retrieve_subscription(&self, subscription_id: &str) -> anyhow::Result<Value>;
}

/// Cross-process advisory lock keyed by a string (e.g. `"user:<id>"` or
/// `"org:<id>"`), used by the Credit Ledger to serialize mutation paths per
/// principal. `coord_core::store::file_lock::FileLock` is the one
/// production implementation, keyed on a lock-keys directory under the
/// config root.
#[async_trait]
pub trait AdvisoryLockTransaction: Send + Sync {
    async fn with_advisory_lock<'a>(
        &'a self,
        lock_key: &'a str,
        callback: Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'a>,
    ) -> anyhow::Result<()>;
}
