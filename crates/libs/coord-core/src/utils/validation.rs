// Allow expect in this module: regex patterns are compile-time verified
#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

lazy_static! {
    static ref TEAM_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,50}$").expect("valid regex");
    static ref MEMBER_NAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,100}$").expect("valid regex");
    static ref TASK_ID_RE: Regex = Regex::new(r"^[0-9]+$").expect("valid regex");
}

/// Validation error with actionable suggestion, surfaced to callers as both
/// a `Display` message and a structured JSON context.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationFailure {
    pub field: String,
    pub provided: String,
    pub reason: String,
    pub suggestion: Option<String>,
}

/// Input validation errors with recovery hints.
///
/// `Display` messages for `InvalidTeamName` and `InvalidTaskId` match the
/// exact observable strings an operator should see at the CLI/MCP surface.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ValidationError {
    #[error("Team name may only contain letters, numbers, hyphens, and underscores.")]
    InvalidTeamName { provided: String },

    #[error("Member name may only contain letters, numbers, hyphens, and underscores.")]
    InvalidMemberName { provided: String },

    #[error("Task ID must be numeric.")]
    InvalidTaskId { provided: String },

    #[error("{field} must be one of {allowed:?}, got: {provided}")]
    InvalidEnum {
        field: String,
        provided: String,
        allowed: Vec<String>,
    },

    #[error("Dangling task reference: task \"{from}\" references missing task \"{to}\"")]
    DanglingTaskReference { from: String, to: String },
}

impl ValidationError {
    pub fn context(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Validate a team name against `^[A-Za-z0-9_-]{1,50}$`.
pub fn validate_team_name(name: &str) -> Result<(), ValidationError> {
    if TEAM_NAME_RE.is_match(name) {
        return Ok(());
    }
    Err(ValidationError::InvalidTeamName {
        provided: name.to_string(),
    })
}

/// Validate a member name against `^[A-Za-z0-9_-]{1,100}$`.
pub fn validate_member_name(name: &str) -> Result<(), ValidationError> {
    if MEMBER_NAME_RE.is_match(name) {
        return Ok(());
    }
    Err(ValidationError::InvalidMemberName {
        provided: name.to_string(),
    })
}

/// Validate a task id against `^[0-9]+$`.
pub fn validate_task_id(id: &str) -> Result<(), ValidationError> {
    if TASK_ID_RE.is_match(id) {
        return Ok(());
    }
    Err(ValidationError::InvalidTaskId {
        provided: id.to_string(),
    })
}
