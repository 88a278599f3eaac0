//! Forward-only team lifecycle with a tool-gating table.
//!
//! States are strictly ordered: `planning → pre-alpha → alpha → beta →
//! production → mature`. A transition is legal only when it advances
//! exactly one step; the caller persists the result via `saveTeamConfig`.

use crate::error::{Error, Result};
use crate::model::team::TeamConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Planning,
    PreAlpha,
    Alpha,
    Beta,
    Production,
    Mature,
}

const ORDER: [Phase; 6] = [
    Phase::Planning,
    Phase::PreAlpha,
    Phase::Alpha,
    Phase::Beta,
    Phase::Production,
    Phase::Mature,
];

impl Phase {
    pub fn index(self) -> usize {
        ORDER.iter().position(|p| *p == self).unwrap_or(0)
    }

    pub fn from_str_loose(s: &str) -> Option<Phase> {
        match s {
            "planning" => Some(Phase::Planning),
            "pre-alpha" => Some(Phase::PreAlpha),
            "alpha" => Some(Phase::Alpha),
            "beta" => Some(Phase::Beta),
            "production" => Some(Phase::Production),
            "mature" => Some(Phase::Mature),
            _ => None,
        }
    }

    /// True iff `next` is exactly one step ahead of `self`.
    pub fn can_transition_to(self, next: Phase) -> bool {
        next.index() == self.index() + 1
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Planning => "planning",
            Phase::PreAlpha => "pre-alpha",
            Phase::Alpha => "alpha",
            Phase::Beta => "beta",
            Phase::Production => "production",
            Phase::Mature => "mature",
        };
        f.write_str(s)
    }
}

/// Returns a new config with `phase = next`, or `invalid_transition` if the
/// move is not a legal forward single step. The original config is left
/// unchanged; the caller persists the returned copy.
pub fn transition_phase(config: &TeamConfig, next: Phase) -> Result<TeamConfig> {
    if !config.phase.can_transition_to(next) {
        return Err(Error::InvalidTransition {
            from: config.phase.to_string(),
            to: next.to_string(),
        });
    }
    let mut updated = config.clone();
    updated.phase = next;
    Ok(updated)
}

/// Team-scoped tools gated by phase. Any tool not in this table passes
/// through `is_tool_allowed_in_phase` unconditionally.
const TOOL_GATE: &[(&str, Phase)] = &[
    ("task_create", Phase::Planning),
    ("task_update", Phase::Planning),
    ("task_get", Phase::Planning),
    ("task_list", Phase::Planning),
    ("send_message", Phase::PreAlpha),
    ("team_create", Phase::PreAlpha),
    ("team_delete", Phase::Alpha),
    ("spawn_agents", Phase::Alpha),
    ("spawn_agent_inline", Phase::Alpha),
];

pub fn minimum_phase_for_tool(tool: &str) -> Option<Phase> {
    TOOL_GATE
        .iter()
        .find(|(name, _)| *name == tool)
        .map(|(_, phase)| *phase)
}

pub fn is_tool_allowed_in_phase(tool: &str, phase: Phase) -> bool {
    match minimum_phase_for_tool(tool) {
        Some(min_phase) => phase >= min_phase,
        None => true,
    }
}

/// Every team-scoped tool unlocked at or before `phase` (superset-monotone
/// as phase advances).
pub fn phase_tools(phase: Phase) -> Vec<&'static str> {
    TOOL_GATE
        .iter()
        .filter(|(_, min_phase)| phase >= *min_phase)
        .map(|(name, _)| *name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::team::{TeamConfig, TeamSettings};

    fn config_in(phase: Phase) -> TeamConfig {
        TeamConfig {
            name: "alpha".into(),
            description: String::new(),
            created_at: 0,
            lead_agent_id: "lead-x".into(),
            phase,
            members: vec![],
            settings: TeamSettings {
                max_members: 10,
                auto_assign: false,
            },
        }
    }

    #[test]
    fn test_forward_single_step_allowed() {
        assert!(Phase::Planning.can_transition_to(Phase::PreAlpha));
        assert!(Phase::Beta.can_transition_to(Phase::Production));
    }

    #[test]
    fn test_skip_and_backward_rejected() {
        assert!(!Phase::Planning.can_transition_to(Phase::Alpha));
        assert!(!Phase::Beta.can_transition_to(Phase::Alpha));
        assert!(!Phase::Mature.can_transition_to(Phase::Mature));
    }

    #[test]
    fn test_transition_phase_skip_error_message() {
        let config = config_in(Phase::Planning);
        let err = transition_phase(&config, Phase::Alpha).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot transition from \"planning\" to \"alpha\". Only forward single-step transitions are allowed."
        );
    }

    #[test]
    fn test_transition_phase_does_not_mutate_original() {
        let config = config_in(Phase::Planning);
        let updated = transition_phase(&config, Phase::PreAlpha).expect("valid transition");
        assert_eq!(config.phase, Phase::Planning);
        assert_eq!(updated.phase, Phase::PreAlpha);
    }

    #[test]
    fn test_tool_gating_table() {
        assert!(is_tool_allowed_in_phase("task_create", Phase::Planning));
        assert!(!is_tool_allowed_in_phase("send_message", Phase::Planning));
        assert!(is_tool_allowed_in_phase("send_message", Phase::PreAlpha));
        assert!(!is_tool_allowed_in_phase("team_delete", Phase::PreAlpha));
        assert!(is_tool_allowed_in_phase("team_delete", Phase::Alpha));
        assert!(is_tool_allowed_in_phase("unrelated_tool", Phase::Planning));
    }

    #[test]
    fn test_minimum_phase_for_tool() {
        assert_eq!(minimum_phase_for_tool("task_list"), Some(Phase::Planning));
        assert_eq!(minimum_phase_for_tool("not_a_tool"), None);
    }

    #[test]
    fn test_phase_tools_is_superset_monotone() {
        let planning = phase_tools(Phase::Planning);
        let alpha = phase_tools(Phase::Alpha);
        for tool in &planning {
            assert!(alpha.contains(tool));
        }
        assert!(alpha.len() > planning.len());
    }
}
