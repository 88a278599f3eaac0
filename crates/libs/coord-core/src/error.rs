//! Error types for coord-core operations.
//!
//! Errors are categorized into:
//!
//! - **External errors**: wrapped errors from dependencies (io, serde_json)
//! - **Not-found errors**: entity lookups that have a mutation-path meaning
//! - **Store errors**: validation, corruption, lock, and path-safety failures
//!
//! # Example
//!
//! ```
//! use coord_core::error::{Error, Result};
//!
//! fn find_team(name: &str) -> Result<()> {
//!     if name.is_empty() {
//!         return Err(Error::TeamNotFound(name.to_string()));
//!     }
//!     Ok(())
//! }
//! ```

use strum_macros::AsRefStr;
use thiserror::Error;

/// The error type for coord-core operations.
#[derive(Debug, Error, AsRefStr)]
pub enum Error {
    /// Standard I/O error.
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("Serde JSON Error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Team not found by name.
    ///
    /// Returned from mutation paths (`addTeamMember`, `createTask`, ...)
    /// that require an existing team. Pure lookups (`loadTeamConfig`,
    /// `findCurrentTeam`) return `Ok(None)` instead.
    #[error("Team \"{0}\" not found")]
    TeamNotFound(String),

    /// Task not found by id within a team.
    #[error("Task \"{id}\" not found in team \"{team}\"")]
    TaskNotFound { team: String, id: String },

    /// Schema violation surviving an auto-repair attempt.
    ///
    /// The contained string is the offending file path.
    #[error("Corrupted file: {0}")]
    Corrupted(String),

    /// Lock acquisition timeout.
    #[error("Timed out waiting for lock on {path}")]
    LockTimeout { path: String },

    /// A resolved path would escape its expected parent directory.
    #[error("Path traversal rejected: {0}")]
    PathTraversal(String),

    /// A phase transition was not a legal forward single-step move.
    #[error(
        "Cannot transition from \"{from}\" to \"{to}\". Only forward single-step transitions are allowed."
    )]
    InvalidTransition { from: String, to: String },

    /// Structured validation error with actionable suggestion.
    #[error("Validation error: {0}")]
    Validation(#[from] crate::utils::validation::ValidationError),
}

/// A specialized [`Result`] type for coord-core operations.
pub type Result<T> = core::result::Result<T, Error>;
