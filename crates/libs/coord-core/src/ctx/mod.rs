//! Request context identifying the acting agent.
//!
//! The [`Ctx`] struct is threaded through store operations to identify which
//! agent is performing a mutation, for audit logging. The coordination
//! fabric has no authenticated human users, so this carries an agent
//! identifier rather than a numeric user id.

/// Request context carrying the acting agent's current identifier.
///
/// Agent identifiers rotate across tool calls (see the discovery
/// resolver), so `Ctx` is cheap to construct fresh per call rather than
/// held across calls.
#[derive(Clone, Debug)]
pub struct Ctx {
    agent_id: String,
}

impl Ctx {
    /// Creates a context for system-level operations (maintenance sweeps,
    /// background jobs) with no specific acting agent.
    pub fn root_ctx() -> Self {
        Ctx {
            agent_id: "system".to_string(),
        }
    }

    /// Creates a context scoped to a specific agent id.
    pub fn new(agent_id: impl Into<String>) -> Self {
        Ctx {
            agent_id: agent_id.into(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }
}
