//! Shared helpers for the coordination fabric's MCP tools: team discovery
//! and phase-gated tool admission.

use coord_core::discovery::find_current_team;
use coord_core::model::task::{TaskPriority, TaskStatus};
use coord_core::model::team::TeamConfig;
use coord_core::phase::is_tool_allowed_in_phase;
use coord_core::store::Store;
use rmcp::ErrorData as McpError;

/// Resolves which team a tool call acts on (explicit `team` wins,
/// otherwise discovery for `agent_id`), loads its config, and refuses the
/// call if the team's current phase doesn't unlock `tool_name` yet.
///
/// A team that does not exist yet is never gated — `team_create` is the
/// one caller that reaches this with no prior config to check against.
pub async fn resolve_team_and_check_phase(
    store: &Store,
    agent_id: &str,
    explicit: Option<&str>,
    tool_name: &str,
) -> Result<(String, Option<TeamConfig>), McpError> {
    let team_name = match explicit {
        Some(team) => team.to_string(),
        None => find_current_team(store, agent_id)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?
            .ok_or_else(|| {
                McpError::invalid_params(
                    "could not determine team: pass `team` explicitly or join a team first"
                        .to_string(),
                    None,
                )
            })?,
    };

    let config = store
        .load_team_config(&team_name)
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

    if let Some(config) = &config {
        if !is_tool_allowed_in_phase(tool_name, config.phase) {
            return Err(McpError::invalid_request(
                format!(
                    "tool \"{tool_name}\" is not available in team \"{team_name}\"'s current phase ({})",
                    config.phase
                ),
                None,
            ));
        }
    }

    Ok((team_name, config))
}

pub fn parse_task_status(s: &str) -> Result<TaskStatus, McpError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| McpError::invalid_params(format!("invalid task status \"{s}\""), None))
}

pub fn parse_task_priority(s: &str) -> Result<TaskPriority, McpError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| McpError::invalid_params(format!("invalid task priority \"{s}\""), None))
}
