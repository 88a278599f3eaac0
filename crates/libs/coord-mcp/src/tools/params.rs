//! Parameter types for the coordination fabric's MCP tools.

use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TeamCreateParams {
    /// Team name (used as the on-disk identifier)
    pub name: String,
    /// Short description of the team's purpose
    #[serde(default)]
    pub description: String,
    /// Agent id of the team lead
    pub lead_agent_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SendMessageParams {
    /// Team the sender and recipient belong to. Omit to use discovery.
    pub team: Option<String>,
    /// Sending agent's id
    pub from: String,
    /// Recipient member name
    pub to: String,
    /// Message body text
    pub text: String,
    /// Optional short summary shown in digest views
    pub summary: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskCreateParams {
    /// Acting agent's id, used for team discovery when `team` is omitted
    pub agent_id: String,
    /// Team the task belongs to. Omit to use discovery.
    pub team: Option<String>,
    /// Task id, unique within the team
    pub id: String,
    /// Short task subject line
    pub subject: String,
    /// Full task description
    #[serde(default)]
    pub description: String,
    /// Task ids this task depends on
    #[serde(default)]
    pub blocked_by: Vec<String>,
    /// Task ids that depend on this task
    #[serde(default)]
    pub blocks: Vec<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskUpdateParams {
    /// Acting agent's id, used for team discovery when `team` is omitted
    pub agent_id: String,
    /// Team the task belongs to. Omit to use discovery.
    pub team: Option<String>,
    /// Task id to update
    pub id: String,
    pub subject: Option<String>,
    pub description: Option<String>,
    /// One of: pending, in_progress, completed, blocked
    pub status: Option<String>,
    /// One of: critical, high, medium, low
    pub priority: Option<String>,
    pub owner: Option<String>,
    pub blocked_by: Option<Vec<String>>,
    pub blocks: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskListParams {
    /// Acting agent's id, used for team discovery when `team` is omitted
    pub agent_id: String,
    /// Team to list tasks for. Omit to use discovery.
    pub team: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TaskGetParams {
    /// Acting agent's id, used for team discovery when `team` is omitted
    pub agent_id: String,
    /// Team the task belongs to. Omit to use discovery.
    pub team: Option<String>,
    /// Task id to fetch
    pub id: String,
}
