//! Ordered-grant credit consumption: the engine behind `grant_credit`,
//! `consume`, `calculate_usage_and_balance`, weekly subscription blocks,
//! and subscribe-time migration.
//!
//! Each principal's grants live in a single JSON file
//! (`<root>/credits/<lock_key>.json`, sanitized) guarded by
//! `coord_core`'s `FileLock` — the same per-path advisory lock the Team
//! Store uses, standing in here for the spec's abstract
//! `withAdvisoryLockTransaction`.

use crate::error::{Error, Result};
use crate::failure_sink::{FailureSink, NoopFailureSink};
use crate::model::{
    BlockGrantOutcome, ConsumptionResult, CreditGrant, CreditGrantForCreate, GrantType, Principal,
    TypeBreakdown, UsageAndBalance,
};
use crate::retry;
use coord_core::external::{AnalyticsSink, NoopAnalyticsSink};
use coord_core::store::file_lock::FileLock;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::warn;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// A weekly subscription credit block expires after this many hours unless
/// overridden by the caller.
pub const DEFAULT_BLOCK_DURATION_HOURS: i64 = 24 * 7;

/// Result of the lock-held insert attempt inside `grant_credit`, distinct
/// from whatever debt-clearing remainder ends up positive or not so the
/// caller can tell a fresh insert apart from an idempotent replay without
/// guessing from grant fields.
enum GrantOutcome {
    Inserted(CreditGrant),
    Existing(CreditGrant),
    NoOp,
}

pub struct CreditLedger {
    root: PathBuf,
    lock: FileLock,
    timeout: Duration,
    analytics: Arc<dyn AnalyticsSink>,
    failures: Arc<dyn FailureSink>,
}

impl CreditLedger {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            lock: FileLock::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            analytics: Arc::new(NoopAnalyticsSink),
            failures: Arc::new(NoopFailureSink),
        }
    }

    pub fn with_sinks(
        root: PathBuf,
        analytics: Arc<dyn AnalyticsSink>,
        failures: Arc<dyn FailureSink>,
    ) -> Self {
        Self {
            root,
            lock: FileLock::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            analytics,
            failures,
        }
    }

    fn grant_file(&self, principal: &Principal) -> PathBuf {
        let stem = principal.lock_key().replace(':', "_");
        self.root.join("credits").join(format!("{stem}.json"))
    }

    async fn read_grants(&self, path: &Path) -> Result<Vec<CreditGrant>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(coord_core::Error::Io(err).into()),
        }
    }

    async fn write_grants(&self, path: &Path, grants: &[CreditGrant]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(coord_core::Error::Io)?;
        }
        let body = serde_json::to_string_pretty(grants)?;
        let tmp = path.with_extension(format!("json.tmp.{}", std::process::id()));
        fs::write(&tmp, body).await.map_err(coord_core::Error::Io)?;
        fs::rename(&tmp, path).await.map_err(coord_core::Error::Io)?;
        Ok(())
    }

    /// Acquire the per-principal file lock around `f`, releasing on every
    /// exit path. `FileLock::with_lock` can't be reused directly here since
    /// it's pinned to `coord_core::Error`, not this crate's richer error
    /// type.
    async fn with_file_lock<F, Fut, T>(&self, path: &Path, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let guard = self.lock.acquire(path, self.timeout).await.map_err(Error::from)?;
        let result = f().await;
        guard.release().await;
        result
    }

    /// Grant `input.amount` credits to `principal`. Existing negative
    /// balances are cleared first; only the remainder (if positive) becomes
    /// a new grant. A retried call with an `operation_id` already on file
    /// is a no-op returning the existing grant unchanged — checked before
    /// any debt-clearing mutation runs, so replays never clear debt twice.
    pub async fn grant_credit(
        &self,
        principal: &Principal,
        input: CreditGrantForCreate,
        now: i64,
    ) -> Result<Option<CreditGrant>> {
        let path = self.grant_file(principal);
        let operation_id = input.operation_id.clone();

        let outcome = retry::with_backoff("grant_credit", || {
            let path = path.clone();
            let input = input.clone();
            async move {
                self.with_file_lock(&path, || async {
                    let mut grants = self.read_grants(&path).await?;

                    if let Some(existing) = grants
                        .iter()
                        .find(|g| g.operation_id == input.operation_id)
                    {
                        return Ok(GrantOutcome::Existing(existing.clone()));
                    }

                    let mut cleared = 0i64;
                    for grant in grants.iter_mut().filter(|g| g.balance < 0) {
                        cleared += -grant.balance;
                        grant.balance = 0;
                    }

                    let remaining = input.amount - cleared;
                    let outcome = if remaining > 0 {
                        let grant = CreditGrant {
                            operation_id: input.operation_id.clone(),
                            user_id: input.user_id.clone(),
                            org_id: input.org_id.clone(),
                            grant_type: input.grant_type,
                            principal_amount: remaining,
                            balance: remaining,
                            priority: input.priority,
                            expires_at: input.expires_at,
                            created_at: now,
                            description: input.description.clone(),
                            stripe_subscription_id: input.stripe_subscription_id.clone(),
                        };
                        grants.push(grant.clone());
                        GrantOutcome::Inserted(grant)
                    } else {
                        GrantOutcome::NoOp
                    };

                    self.write_grants(&path, &grants).await?;
                    Ok(outcome)
                })
                .await
            }
        })
        .await;

        match outcome {
            Ok(GrantOutcome::Inserted(grant)) => {
                self.analytics.capture(
                    "CREDIT_GRANT",
                    &principal.lock_key(),
                    json!({
                        "operationId": grant.operation_id,
                        "amount": grant.principal_amount,
                        "grantType": grant.grant_type,
                    }),
                );
                Ok(Some(grant))
            }
            Ok(GrantOutcome::Existing(grant)) => Ok(Some(grant)),
            Ok(GrantOutcome::NoOp) => Ok(None),
            Err(err) => {
                self.failures
                    .record(&operation_id, &principal.lock_key(), &err.to_string());
                Err(err)
            }
        }
    }

    /// Consume `amount` credits from `principal`'s grants, repaying debt
    /// first, then drawing on positive balances, then pushing any shortfall
    /// onto the "last grant" as new debt.
    pub async fn consume(
        &self,
        principal: &Principal,
        amount: i64,
        now: i64,
    ) -> Result<ConsumptionResult> {
        let path = self.grant_file(principal);
        let result = retry::with_backoff("consume", || {
            let path = path.clone();
            async move {
                self.with_file_lock(&path, || async {
                    let mut grants = self.read_grants(&path).await?;
                    let result = consume_from_ordered_grants(amount, &mut grants, now);
                    self.write_grants(&path, &grants).await?;
                    Ok(result)
                })
                .await
            }
        })
        .await;

        result.map_err(|err| {
            self.failures
                .record("consume", &principal.lock_key(), &err.to_string());
            err
        })
    }

    pub async fn calculate_usage_and_balance(
        &self,
        principal: &Principal,
        cycle_start: i64,
        now: i64,
    ) -> Result<UsageAndBalance> {
        let path = self.grant_file(principal);
        let grants = self.read_grants(&path).await?;
        Ok(calculate_usage_and_balance_over(&grants, cycle_start, now))
    }

    /// Weekly subscription block: returns the caller's existing active
    /// block if one exists, otherwise creates one sized to the remaining
    /// weekly allowance (or reports the limit has been reached).
    #[allow(clippy::too_many_arguments)]
    pub async fn ensure_active_block_grant(
        &self,
        principal: &Principal,
        weekly_limit: i64,
        credits_per_block: i64,
        block_duration_hours: i64,
        week_start: i64,
        operation_id: &str,
        now: i64,
    ) -> Result<BlockGrantOutcome> {
        let path = self.grant_file(principal);
        self.with_file_lock(&path, || async {
                let mut grants = self.read_grants(&path).await?;

                if let Some(existing) = grants.iter().find(|g| {
                    g.grant_type == GrantType::Subscription
                        && g.description == "weekly-block"
                        && g.is_active(now)
                }) {
                    return Ok(BlockGrantOutcome::Existing(existing.clone()));
                }

                let weekly_usage: i64 = grants
                    .iter()
                    .filter(|g| g.grant_type == GrantType::Subscription && g.created_at >= week_start)
                    .map(|g| g.principal_amount - g.balance)
                    .sum();

                if weekly_usage >= weekly_limit {
                    return Ok(BlockGrantOutcome::WeeklyLimitReached);
                }

                let weekly_remaining = weekly_limit - weekly_usage;
                let amount = credits_per_block.min(weekly_remaining);
                let grant = CreditGrant {
                    operation_id: operation_id.to_string(),
                    user_id: principal_user_id(principal),
                    org_id: principal_org_id(principal),
                    grant_type: GrantType::Subscription,
                    principal_amount: amount,
                    balance: amount,
                    priority: 50,
                    expires_at: Some(now + block_duration_hours * 3_600_000),
                    created_at: now,
                    description: "weekly-block".to_string(),
                    stripe_subscription_id: None,
                };
                grants.push(grant.clone());
                self.write_grants(&path, &grants).await?;
                Ok(BlockGrantOutcome::Created(grant))
            })
            .await
    }

    pub async fn revoke_grant_by_operation_id(
        &self,
        principal: &Principal,
        operation_id: &str,
    ) -> Result<()> {
        let path = self.grant_file(principal);
        self.with_file_lock(&path, || async {
                let mut grants = self.read_grants(&path).await?;
                let idx = grants
                    .iter()
                    .position(|g| g.operation_id == operation_id)
                    .ok_or_else(|| Error::GrantNotFound(operation_id.to_string()))?;

                if grants[idx].balance < 0 {
                    return Err(Error::RevocationRefused(operation_id.to_string()));
                }

                grants.remove(idx);
                self.write_grants(&path, &grants).await?;
                Ok(())
            })
            .await
    }

    /// Migrate non-subscription positive-balance grants expiring strictly
    /// within `[period_start, period_end)` into one replacement
    /// subscription grant, keyed by a deterministic `operationId` so a
    /// retried subscribe webhook is a no-op.
    pub async fn migrate_on_subscribe(
        &self,
        principal: &Principal,
        subscription_id: &str,
        period_start: i64,
        period_end: i64,
        now: i64,
    ) -> Result<Option<CreditGrant>> {
        let operation_id = format!("subscribe-migrate-{subscription_id}");
        let path = self.grant_file(principal);
        self.with_file_lock(&path, || async {
                let mut grants = self.read_grants(&path).await?;

                if grants.iter().any(|g| g.operation_id == operation_id) {
                    return Ok(grants
                        .into_iter()
                        .find(|g| g.operation_id == operation_id));
                }

                let mut migrated_total = 0i64;
                for grant in grants.iter_mut() {
                    let eligible = grant.grant_type != GrantType::Subscription
                        && grant.balance > 0
                        && grant
                            .expires_at
                            .is_some_and(|e| e >= period_start && e < period_end);
                    if eligible {
                        migrated_total += grant.balance;
                        grant.balance = 0;
                    }
                }

                if migrated_total == 0 {
                    self.write_grants(&path, &grants).await?;
                    return Ok(None);
                }

                let replacement = CreditGrant {
                    operation_id: operation_id.clone(),
                    user_id: principal_user_id(principal),
                    org_id: principal_org_id(principal),
                    grant_type: GrantType::Subscription,
                    principal_amount: migrated_total,
                    balance: migrated_total,
                    priority: 50,
                    expires_at: Some(period_end),
                    created_at: now,
                    description: format!("migrated on subscribe to {subscription_id}"),
                    stripe_subscription_id: Some(subscription_id.to_string()),
                };
                grants.push(replacement.clone());
                self.write_grants(&path, &grants).await?;
                Ok(Some(replacement))
            })
            .await
    }
}

fn principal_user_id(principal: &Principal) -> String {
    match principal {
        Principal::User(id) => id.clone(),
        Principal::Org(id) => id.clone(),
    }
}

fn principal_org_id(principal: &Principal) -> Option<String> {
    match principal {
        Principal::User(_) => None,
        Principal::Org(id) => Some(id.clone()),
    }
}

/// Consumption order: priority ascending, expiry ascending with no-expiry
/// last, creation time ascending. Pass 1 repays debt, pass 2 draws on
/// positive balances, pass 3 pushes any remainder onto the "last grant"
/// (highest sort key among active grants) as new debt.
pub fn consume_from_ordered_grants(
    amount: i64,
    grants: &mut [CreditGrant],
    now: i64,
) -> ConsumptionResult {
    let mut remaining = amount;
    let mut consumed = 0i64;
    let mut from_purchased = 0i64;

    if remaining <= 0 || grants.is_empty() {
        return ConsumptionResult {
            consumed: 0,
            from_purchased: 0,
        };
    }

    let mut order: Vec<usize> = (0..grants.len()).filter(|&i| grants[i].is_active(now)).collect();
    order.sort_by_key(|&i| grants[i].consumption_sort_key());

    for &i in &order {
        if remaining <= 0 {
            break;
        }
        if grants[i].balance < 0 {
            let debt = -grants[i].balance;
            let repay = debt.min(remaining);
            grants[i].balance += repay;
            remaining -= repay;
            consumed += repay;
        }
    }

    for &i in &order {
        if remaining <= 0 {
            break;
        }
        if grants[i].balance > 0 {
            let draw = grants[i].balance.min(remaining);
            grants[i].balance -= draw;
            remaining -= draw;
            consumed += draw;
            if grants[i].grant_type == GrantType::Purchase {
                from_purchased += draw;
            }
        }
    }

    if remaining > 0 {
        if let Some(&last_idx) = order.iter().max_by_key(|&&i| grants[i].consumption_sort_key()) {
            grants[last_idx].balance -= remaining;
            consumed += remaining;
        } else {
            warn!(amount, "consume requested with no active grants to draw from or push debt onto");
        }
    }

    ConsumptionResult {
        consumed,
        from_purchased,
    }
}

/// One pass over `grants` accumulating usage and per-type positive/debt
/// totals, then settling debt against positive balance in memory (the
/// stored balances themselves are untouched).
pub fn calculate_usage_and_balance_over(
    grants: &[CreditGrant],
    cycle_start: i64,
    now: i64,
) -> UsageAndBalance {
    let mut total_positive = 0i64;
    let mut total_debt = 0i64;
    let mut usage_this_cycle = 0i64;
    let mut by_type: BTreeMap<String, TypeBreakdown> = BTreeMap::new();

    for grant in grants.iter().filter(|g| g.is_active(now)) {
        let entry = by_type.entry(type_key(grant.grant_type)).or_default();
        if grant.balance > 0 {
            total_positive += grant.balance;
            entry.positive += grant.balance;
        } else if grant.balance < 0 {
            total_debt += -grant.balance;
            entry.debt += -grant.balance;
        }
        if grant.created_at >= cycle_start {
            usage_this_cycle += grant.principal_amount - grant.balance;
        }
    }

    let settlement = total_debt.min(total_positive);
    total_positive -= settlement;
    total_debt -= settlement;

    UsageAndBalance {
        total_positive,
        total_debt,
        net_balance: total_positive - total_debt,
        usage_this_cycle,
        by_type,
    }
}

fn type_key(t: GrantType) -> String {
    serde_json::to_value(t)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingAnalyticsSink {
        captures: AtomicUsize,
    }

    impl AnalyticsSink for CountingAnalyticsSink {
        fn capture(&self, _event: &str, _distinct_id: &str, _properties: serde_json::Value) {
            self.captures.fetch_add(1, Ordering::SeqCst);
        }
        fn flush(&self) {}
    }

    fn grant(grant_type: GrantType, principal_amount: i64, balance: i64, priority: i32) -> CreditGrant {
        CreditGrant {
            operation_id: format!("op-{priority}"),
            user_id: "u1".into(),
            org_id: None,
            grant_type,
            principal_amount,
            balance,
            priority,
            expires_at: None,
            created_at: 0,
            description: String::new(),
            stripe_subscription_id: None,
        }
    }

    #[test]
    fn test_scenario_7_debt_repay_then_purchase_draw() {
        let mut grants = vec![
            grant(GrantType::Free, 100, -20, 20),
            grant(GrantType::Purchase, 200, 200, 80),
        ];
        let result = consume_from_ordered_grants(50, &mut grants, 0);
        assert_eq!(result.consumed, 50);
        assert_eq!(result.from_purchased, 30);
        assert_eq!(grants[0].balance, 0);
        assert_eq!(grants[1].balance, 170);
    }

    #[test]
    fn test_consume_pushes_shortfall_onto_last_grant() {
        let mut grants = vec![grant(GrantType::Free, 10, 10, 20)];
        let result = consume_from_ordered_grants(30, &mut grants, 0);
        assert_eq!(result.consumed, 30);
        assert_eq!(result.from_purchased, 0);
        assert_eq!(grants[0].balance, -20);
    }

    #[test]
    fn test_expired_grants_are_skipped() {
        let mut g = grant(GrantType::Purchase, 100, 100, 10);
        g.expires_at = Some(5);
        let mut grants = vec![g];
        let result = consume_from_ordered_grants(10, &mut grants, 100);
        // no active grants: the shortfall lands nowhere, nothing consumed
        assert_eq!(result.consumed, 0);
        assert_eq!(grants[0].balance, 100);
    }

    #[test]
    fn test_usage_and_balance_settles_debt_against_positive() {
        let grants = vec![
            grant(GrantType::Free, 100, -20, 20),
            grant(GrantType::Purchase, 200, 170, 80),
        ];
        let usage = calculate_usage_and_balance_over(&grants, 0, 0);
        assert_eq!(usage.total_debt, 0);
        assert_eq!(usage.total_positive, 150);
        assert_eq!(usage.net_balance, 150);
    }

    #[tokio::test]
    async fn test_grant_credit_is_idempotent_on_operation_id() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = CreditLedger::new(dir.path().to_path_buf());
        let principal = Principal::User("u1".into());
        let input = CreditGrantForCreate {
            user_id: "u1".into(),
            org_id: None,
            grant_type: GrantType::Purchase,
            amount: 100,
            priority: 80,
            expires_at: None,
            operation_id: "op-1".into(),
            description: "test".into(),
            stripe_subscription_id: None,
        };

        let first = ledger
            .grant_credit(&principal, input.clone(), 1_000)
            .await
            .expect("grant")
            .expect("inserted");
        let second = ledger
            .grant_credit(&principal, input, 2_000)
            .await
            .expect("grant")
            .expect("returns existing");

        assert_eq!(first.operation_id, second.operation_id);
        assert_eq!(second.created_at, 1_000);

        let grants = ledger.read_grants(&ledger.grant_file(&principal)).await.unwrap();
        assert_eq!(grants.len(), 1);
    }

    #[tokio::test]
    async fn test_grant_credit_replay_with_same_now_does_not_refire_analytics() {
        let dir = TempDir::new().expect("tempdir");
        let analytics = Arc::new(CountingAnalyticsSink::default());
        let ledger = CreditLedger::with_sinks(
            dir.path().to_path_buf(),
            analytics.clone(),
            Arc::new(crate::failure_sink::NoopFailureSink),
        );
        let principal = Principal::User("u1".into());
        let input = CreditGrantForCreate {
            user_id: "u1".into(),
            org_id: None,
            grant_type: GrantType::Purchase,
            amount: 100,
            priority: 80,
            expires_at: None,
            operation_id: "op-replay".into(),
            description: "test".into(),
            stripe_subscription_id: None,
        };

        // A client that snapshots `now` once and reuses it across retries.
        let fixed_now = 1_000;
        ledger
            .grant_credit(&principal, input.clone(), fixed_now)
            .await
            .expect("grant")
            .expect("inserted");
        ledger
            .grant_credit(&principal, input, fixed_now)
            .await
            .expect("grant")
            .expect("returns existing on replay");

        assert_eq!(
            analytics.captures.load(Ordering::SeqCst),
            1,
            "CREDIT_GRANT must fire only on the insert, not on the idempotent replay"
        );
    }

    #[tokio::test]
    async fn test_grant_credit_clears_debt_before_inserting_remainder() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = CreditLedger::new(dir.path().to_path_buf());
        let principal = Principal::User("u1".into());
        let path = ledger.grant_file(&principal);
        ledger
            .write_grants(&path, &[grant(GrantType::Free, 50, -20, 10)])
            .await
            .unwrap();

        let input = CreditGrantForCreate {
            user_id: "u1".into(),
            org_id: None,
            grant_type: GrantType::Purchase,
            amount: 50,
            priority: 80,
            expires_at: None,
            operation_id: "op-2".into(),
            description: "test".into(),
            stripe_subscription_id: None,
        };
        let inserted = ledger
            .grant_credit(&principal, input, 1_000)
            .await
            .unwrap()
            .expect("remainder inserted");
        assert_eq!(inserted.principal_amount, 30);

        let grants = ledger.read_grants(&path).await.unwrap();
        assert_eq!(grants[0].balance, 0);
    }

    #[tokio::test]
    async fn test_revoke_refuses_on_negative_balance() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = CreditLedger::new(dir.path().to_path_buf());
        let principal = Principal::User("u1".into());
        let path = ledger.grant_file(&principal);
        ledger
            .write_grants(&path, &[grant(GrantType::Free, 50, -10, 10)])
            .await
            .unwrap();

        let err = ledger
            .revoke_grant_by_operation_id(&principal, "op-10")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RevocationRefused(_)));
    }

    #[tokio::test]
    async fn test_ensure_active_block_grant_reports_weekly_limit() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = CreditLedger::new(dir.path().to_path_buf());
        let principal = Principal::User("u1".into());

        let first = ledger
            .ensure_active_block_grant(&principal, 100, 100, 24, 0, "block-1", 1_000)
            .await
            .unwrap();
        assert!(matches!(first, BlockGrantOutcome::Created(_)));

        // consume it so the next call doesn't find an active existing block
        let path = ledger.grant_file(&principal);
        let mut grants = ledger.read_grants(&path).await.unwrap();
        grants[0].balance = 0;
        ledger.write_grants(&path, &grants).await.unwrap();

        let second = ledger
            .ensure_active_block_grant(&principal, 100, 100, 24, 0, "block-2", 2_000)
            .await
            .unwrap();
        assert!(matches!(second, BlockGrantOutcome::WeeklyLimitReached));
    }

    #[tokio::test]
    async fn test_migrate_on_subscribe_is_deterministic_and_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let ledger = CreditLedger::new(dir.path().to_path_buf());
        let principal = Principal::User("u1".into());
        let path = ledger.grant_file(&principal);
        let mut g = grant(GrantType::Ad, 40, 40, 10);
        g.expires_at = Some(500);
        ledger.write_grants(&path, &[g]).await.unwrap();

        let first = ledger
            .migrate_on_subscribe(&principal, "sub_123", 0, 1_000, 1)
            .await
            .unwrap()
            .expect("migration grant created");
        assert_eq!(first.principal_amount, 40);
        assert_eq!(first.operation_id, "subscribe-migrate-sub_123");

        let second = ledger
            .migrate_on_subscribe(&principal, "sub_123", 0, 1_000, 2)
            .await
            .unwrap()
            .expect("idempotent replay returns same grant");
        assert_eq!(second.operation_id, first.operation_id);

        let grants = ledger.read_grants(&path).await.unwrap();
        assert_eq!(grants.len(), 2, "no duplicate migration grant inserted");
    }
}
