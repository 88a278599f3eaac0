//! `TeamConfig` and `TeamMember` data models (spec section 3).

use crate::phase::Phase;
use crate::utils::validation::{validate_member_name, validate_team_name, ValidationError};
use serde::{Deserialize, Serialize};

/// Built-in role names a member's `role` field is remapped to during
/// config auto-repair when it fails schema validation.
pub const BUILTIN_ROLES: [&str; 23] = [
    "director",
    "manager",
    "senior-engineer",
    "mid-level-engineer",
    "junior-engineer",
    "product-lead",
    "tech-lead",
    "team-lead",
    "product-manager",
    "program-manager",
    "architect",
    "qa-engineer",
    "devops-engineer",
    "security-engineer",
    "data-engineer",
    "ml-engineer",
    "site-reliability-engineer",
    "release-manager",
    "support-engineer",
    "business-analyst",
    "scrum-master",
    "technical-writer",
    "designer",
];

/// Maps a free-form role string to its closest built-in name, following
/// the substring-match order the auto-repair pass uses.
pub fn remap_role(role: &str) -> &'static str {
    let lower = role.to_lowercase();
    if lower.contains("director") {
        "director"
    } else if lower.contains("manager") {
        "manager"
    } else if lower.contains("engineer") {
        "senior-engineer"
    } else if lower.contains("lead") {
        "product-lead"
    } else {
        "mid-level-engineer"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Idle,
    Working,
    Blocked,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOverrides {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub blocked: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamMember {
    pub agent_id: String,
    pub name: String,
    pub role: String,
    pub agent_type: String,
    pub model: String,
    pub joined_at: i64,
    pub status: MemberStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_overrides: Option<ToolOverrides>,
}

impl TeamMember {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_member_name(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamSettings {
    pub max_members: u32,
    pub auto_assign: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    pub description: String,
    pub created_at: i64,
    pub lead_agent_id: String,
    pub phase: Phase,
    pub members: Vec<TeamMember>,
    pub settings: TeamSettings,
}

impl TeamConfig {
    /// Structural + name/uniqueness validation (spec section 3 invariants).
    /// Does not check the `role` field — auto-repair owns that remapping.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_team_name(&self.name)?;

        let mut seen_ids = std::collections::HashSet::new();
        let mut seen_names = std::collections::HashSet::new();
        for member in &self.members {
            member.validate()?;
            if !seen_ids.insert(member.agent_id.clone()) {
                return Err(ValidationError::InvalidEnum {
                    field: "members[].agentId".into(),
                    provided: member.agent_id.clone(),
                    allowed: vec!["<unique agentId>".into()],
                });
            }
            if !seen_names.insert(member.name.clone()) {
                return Err(ValidationError::InvalidEnum {
                    field: "members[].name".into(),
                    provided: member.name.clone(),
                    allowed: vec!["<unique name>".into()],
                });
            }
        }
        Ok(())
    }

    /// Strict schema validation used by `loadTeamConfig`: in addition to
    /// [`Self::validate`], every member's `role` must be a recognized
    /// built-in. A config failing only on `role` is exactly what
    /// [`Self::auto_repair`] exists to fix.
    pub fn validate_strict(&self) -> Result<(), ValidationError> {
        self.validate()?;
        for member in &self.members {
            if !BUILTIN_ROLES.contains(&member.role.as_str()) {
                return Err(ValidationError::InvalidEnum {
                    field: "members[].role".into(),
                    provided: member.role.clone(),
                    allowed: BUILTIN_ROLES.iter().map(|r| r.to_string()).collect(),
                });
            }
        }
        Ok(())
    }

    /// Runs the single auto-repair pass: remap any member role that is not
    /// a recognized built-in to its closest match, then revalidate.
    pub fn auto_repair(&mut self) {
        for member in &mut self.members {
            if !BUILTIN_ROLES.contains(&member.role.as_str()) {
                member.role = remap_role(&member.role).to_string();
            }
        }
    }

    pub fn lead_member(&self) -> Option<&TeamMember> {
        self.members
            .iter()
            .find(|m| format!("lead-{}", m.agent_id) == self.lead_agent_id)
    }
}
