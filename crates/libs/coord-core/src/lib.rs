//! # coord-core: core domain logic for the agent team coordination fabric
//!
//! A durable, file-backed store that lets autonomous agents share team
//! state, assign and track dependency-constrained tasks, and exchange
//! per-recipient messages, gated by a strict phase state machine.
//!
//! ## Key modules
//!
//! - [`store`]: the Team Store and Message Fabric — validated CRUD over
//!   JSON files under a config root, serialized by [`store::file_lock`].
//! - [`model`]: `TeamConfig`, `TeamTask`, and the tagged-union
//!   `ProtocolMessage` carried by inboxes.
//! - [`phase`]: the forward-only team lifecycle and its tool-gating table.
//! - [`discovery`]: resolves which team an agent belongs to absent an
//!   explicit team argument.
//! - [`maintenance`] / [`report`]: integrity checks, pruning, and
//!   human-readable status composition.
//! - [`hooks`]: in-process pub/sub for team lifecycle events.
//! - [`ctx`]: the request context threaded through store operations.
//!
//! ## Example
//!
//! ```no_run
//! use coord_core::store::Store;
//! use coord_core::model::team::{TeamConfig, TeamSettings};
//! use coord_core::phase::Phase;
//!
//! async fn example() -> coord_core::Result<()> {
//!     let store = Store::new(coord_common::config::config_root());
//!     let config = TeamConfig {
//!         name: "rocket-launch".into(),
//!         description: "Ship the rocket".into(),
//!         created_at: 0,
//!         lead_agent_id: "lead-agent-0".into(),
//!         phase: Phase::Planning,
//!         members: vec![],
//!         settings: TeamSettings { max_members: 10, auto_assign: false },
//!     };
//!     store.create_team(config).await?;
//!     Ok(())
//! }
//! ```

pub mod ctx;
pub mod discovery;
pub mod error;
pub mod external;
pub mod hooks;
pub mod maintenance;
pub mod model;
pub mod phase;
pub mod report;
pub mod store;
pub mod utils;

pub use ctx::Ctx;
pub use error::{Error, Result};
pub use store::Store;
