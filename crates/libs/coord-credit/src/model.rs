//! Credit ledger entities (spec section 3, "Credit Ledger entities").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    Free,
    ReferralLegacy,
    Ad,
    Admin,
    Organization,
    Purchase,
    Subscription,
}

/// Which side of a `"user:<id>"` / `"org:<id>"` advisory lock key a
/// principal resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Principal {
    User(String),
    Org(String),
}

impl Principal {
    /// The advisory lock key and on-disk file stem for this principal.
    pub fn lock_key(&self) -> String {
        match self {
            Principal::User(id) => format!("user:{id}"),
            Principal::Org(id) => format!("org:{id}"),
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.lock_key())
    }
}

/// A single credit grant. `operation_id` is the idempotency key;
/// `principal_amount` (the spec's bare `principal` field, renamed here to
/// avoid colliding with the owning [`Principal`]) is the immutable amount
/// originally granted. `balance` is signed and mutates as credits are
/// consumed or debt is repaid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditGrant {
    pub operation_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub grant_type: GrantType,
    pub principal_amount: i64,
    pub balance: i64,
    pub priority: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub created_at: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripe_subscription_id: Option<String>,
}

impl CreditGrant {
    pub fn is_active(&self, now: i64) -> bool {
        self.expires_at.is_none_or(|e| e > now)
    }

    /// Ascending sort key realizing consumption order: priority asc,
    /// `expiresAt` asc with NULL last, `createdAt` asc. The maximum element
    /// under this ordering (among active grants) is the spec's "last
    /// grant".
    pub fn consumption_sort_key(&self) -> (i32, i64, i64) {
        (self.priority, self.expires_at.unwrap_or(i64::MAX), self.created_at)
    }
}

/// Input for [`crate::ledger::CreditLedger::grant_credit`], mirroring the
/// teacher's `*ForCreate` pattern for write operations.
#[derive(Debug, Clone)]
pub struct CreditGrantForCreate {
    pub user_id: String,
    pub org_id: Option<String>,
    pub grant_type: GrantType,
    pub amount: i64,
    pub priority: i32,
    pub expires_at: Option<i64>,
    pub operation_id: String,
    pub description: String,
    pub stripe_subscription_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumptionResult {
    pub consumed: i64,
    pub from_purchased: i64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TypeBreakdown {
    pub positive: i64,
    pub debt: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageAndBalance {
    pub total_positive: i64,
    pub total_debt: i64,
    pub net_balance: i64,
    pub usage_this_cycle: i64,
    pub by_type: std::collections::BTreeMap<String, TypeBreakdown>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockGrantOutcome {
    Existing(CreditGrant),
    Created(CreditGrant),
    WeeklyLimitReached,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_lock_key() {
        assert_eq!(Principal::User("u1".into()).lock_key(), "user:u1");
        assert_eq!(Principal::Org("o1".into()).lock_key(), "org:o1");
    }

    #[test]
    fn test_is_active_respects_expiry() {
        let grant = |expires_at| CreditGrant {
            operation_id: "x".into(),
            user_id: "u".into(),
            org_id: None,
            grant_type: GrantType::Free,
            principal_amount: 10,
            balance: 10,
            priority: 0,
            expires_at,
            created_at: 0,
            description: String::new(),
            stripe_subscription_id: None,
        };
        assert!(grant(None).is_active(1_000));
        assert!(grant(Some(2_000)).is_active(1_000));
        assert!(!grant(Some(500)).is_active(1_000));
    }
}
