//! # coord-credit: ordered-grant credit consumption engine
//!
//! Tracks per-principal credit grants (free, referral, ad, admin,
//! organization, purchase, subscription) as signed balances consumed in
//! priority order, settling debt against positive balance, and gating
//! weekly subscription top-ups. File-backed under the same config root and
//! advisory-lock discipline as [`coord_core::store::Store`]; this crate has
//! no dependency on the Team Store itself, only on its lock and error
//! primitives.
//!
//! ```no_run
//! use coord_credit::{CreditLedger, model::{CreditGrantForCreate, GrantType, Principal}};
//!
//! # async fn run() -> coord_credit::error::Result<()> {
//! let ledger = CreditLedger::new(coord_common::config::config_root());
//! let principal = Principal::User("agent-1".into());
//! ledger
//!     .grant_credit(
//!         &principal,
//!         CreditGrantForCreate {
//!             user_id: "agent-1".into(),
//!             org_id: None,
//!             grant_type: GrantType::Purchase,
//!             amount: 500,
//!             priority: 80,
//!             expires_at: None,
//!             operation_id: "purchase-abc123".into(),
//!             description: "credit pack".into(),
//!             stripe_subscription_id: None,
//!         },
//!         1_700_000_000_000,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod failure_sink;
pub mod ledger;
pub mod model;
pub mod retry;

pub use error::{Error, Result};
pub use failure_sink::{FailureSink, LoggingFailureSink, NoopFailureSink};
pub use ledger::CreditLedger;
