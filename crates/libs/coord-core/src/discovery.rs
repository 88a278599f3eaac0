//! Resolves which team (and acting member) an agent belongs to when a tool
//! call doesn't name one explicitly (spec section 4.5). Tried in order:
//!
//! 1. Exact match: the caller's agent id equals a team's `leadAgentId` (as
//!    `"lead-{agentId}"`), or any member's `agentId` equals `agentId`, or
//!    any member's `agentId` equals `"lead-{agentId}"`.
//! 2. Single-team shortcut: exactly one team exists under the store root.
//! 3. Last-active marker: `.last-active-team` recorded by a prior call.

use crate::model::team::{TeamConfig, TeamMember};
use crate::store::Store;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTeam {
    pub team: String,
    pub member: Option<TeamMember>,
}

/// Resolves the team an `agent_id` belongs to, without requiring an exact
/// member match (used by tools that only need to know which team to act on).
pub async fn find_current_team(store: &Store, agent_id: &str) -> crate::error::Result<Option<String>> {
    Ok(find_current_team_and_agent(store, agent_id).await?.map(|r| r.team))
}

/// Runs the full 3-tier resolution, also returning the matched member when
/// the match came from an exact agent id lookup.
pub async fn find_current_team_and_agent(
    store: &Store,
    agent_id: &str,
) -> crate::error::Result<Option<ResolvedTeam>> {
    let team_names = store.list_team_names().await?;

    let mut configs = Vec::with_capacity(team_names.len());
    for name in &team_names {
        if let Some(config) = store.load_team_config(name).await? {
            configs.push(config);
        }
    }

    if let Some(resolved) = exact_match(&configs, agent_id) {
        return Ok(Some(resolved));
    }

    if configs.len() == 1 {
        let config = &configs[0];
        return Ok(Some(ResolvedTeam {
            team: config.name.clone(),
            member: None,
        }));
    }

    if let Some(last) = store.last_active_team().await {
        if configs.iter().any(|c| c.name == last) {
            return Ok(Some(ResolvedTeam {
                team: last,
                member: None,
            }));
        }
    }

    Ok(None)
}

fn exact_match(configs: &[TeamConfig], agent_id: &str) -> Option<ResolvedTeam> {
    for config in configs {
        if config.lead_agent_id == format!("lead-{agent_id}") {
            return Some(ResolvedTeam {
                team: config.name.clone(),
                member: config.lead_member().cloned(),
            });
        }
        if let Some(member) = config.members.iter().find(|m| m.agent_id == agent_id) {
            return Some(ResolvedTeam {
                team: config.name.clone(),
                member: Some(member.clone()),
            });
        }
        if let Some(member) = config
            .members
            .iter()
            .find(|m| m.agent_id == format!("lead-{agent_id}"))
        {
            return Some(ResolvedTeam {
                team: config.name.clone(),
                member: Some(member.clone()),
            });
        }
    }
    None
}

/// Records `team` as the most recently used team, best-effort (spec section
/// 4.5: a failure here never fails the caller's tool call).
pub async fn set_last_active_team(store: &Store, team: &str) {
    store.set_last_active_team(team).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::team::{MemberStatus, TeamSettings};
    use crate::phase::Phase;
    use tempfile::TempDir;

    fn config(name: &str, lead_agent_id: &str, members: Vec<TeamMember>) -> TeamConfig {
        TeamConfig {
            name: name.into(),
            description: String::new(),
            created_at: 0,
            lead_agent_id: lead_agent_id.into(),
            phase: Phase::Planning,
            members,
            settings: TeamSettings {
                max_members: 10,
                auto_assign: false,
            },
        }
    }

    fn member(agent_id: &str, name: &str) -> TeamMember {
        TeamMember {
            agent_id: agent_id.into(),
            name: name.into(),
            role: "senior-engineer".into(),
            agent_type: "llm".into(),
            model: "test-model".into(),
            joined_at: 0,
            status: MemberStatus::Active,
            current_task_id: None,
            cwd: None,
            tool_overrides: None,
        }
    }

    #[tokio::test]
    async fn test_exact_match_on_member_agent_id() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store
            .create_team(config("alpha", "lead-x", vec![member("dev-1", "dev")]))
            .await
            .expect("create");
        store
            .create_team(config("beta", "lead-y", vec![member("dev-2", "dev")]))
            .await
            .expect("create");

        let resolved = find_current_team_and_agent(&store, "dev-1")
            .await
            .expect("resolve")
            .expect("found");
        assert_eq!(resolved.team, "alpha");
    }

    #[tokio::test]
    async fn test_exact_match_on_member_agent_id_with_lead_prefix() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store
            .create_team(config("alpha", "lead-x", vec![member("lead-dev-1", "dev")]))
            .await
            .expect("create");
        store
            .create_team(config("beta", "lead-y", vec![member("dev-2", "dev")]))
            .await
            .expect("create");

        let resolved = find_current_team_and_agent(&store, "dev-1")
            .await
            .expect("resolve")
            .expect("found");
        assert_eq!(resolved.team, "alpha");
        assert_eq!(resolved.member.expect("member").agent_id, "lead-dev-1");
    }

    #[tokio::test]
    async fn test_single_team_shortcut() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store
            .create_team(config("alpha", "lead-x", vec![member("dev-1", "dev")]))
            .await
            .expect("create");

        let resolved = find_current_team_and_agent(&store, "unknown-agent")
            .await
            .expect("resolve")
            .expect("found via single-team shortcut");
        assert_eq!(resolved.team, "alpha");
    }

    #[tokio::test]
    async fn test_falls_back_to_last_active_marker() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store
            .create_team(config("alpha", "lead-x", vec![member("dev-1", "dev")]))
            .await
            .expect("create");
        store
            .create_team(config("beta", "lead-y", vec![member("dev-2", "dev")]))
            .await
            .expect("create");
        set_last_active_team(&store, "beta").await;

        let resolved = find_current_team_and_agent(&store, "unknown-agent")
            .await
            .expect("resolve")
            .expect("found via last-active marker");
        assert_eq!(resolved.team, "beta");
    }

    #[tokio::test]
    async fn test_no_match_returns_none() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store
            .create_team(config("alpha", "lead-x", vec![member("dev-1", "dev")]))
            .await
            .expect("create");
        store
            .create_team(config("beta", "lead-y", vec![member("dev-2", "dev")]))
            .await
            .expect("create");

        let resolved = find_current_team_and_agent(&store, "unknown-agent")
            .await
            .expect("resolve");
        assert_eq!(resolved, None);
    }
}
