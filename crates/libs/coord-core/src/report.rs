//! Composes `maintenance` stats and integrity checks into a single typed
//! report, renderable as text or JSON (spec §2 row 9 / SPEC_FULL §4.9).

use crate::error::Result;
use crate::maintenance::{get_team_stats, validate_team_integrity, IntegrityIssue, TeamStats};
use crate::store::Store;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct TeamReport {
    pub stats: TeamStats,
    pub issues: Vec<IntegrityIssue>,
}

/// Builds the report for `team`, or `None` if the team has no config at
/// all (a fully absent team, not merely one with integrity issues).
pub async fn build_team_report(store: &Store, team: &str) -> Result<Option<TeamReport>> {
    let Some(stats) = get_team_stats(store, team).await? else {
        return Ok(None);
    };
    let issues = validate_team_integrity(store, team).await?;
    Ok(Some(TeamReport { stats, issues }))
}

impl TeamReport {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl fmt::Display for TeamReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Team: {} ({})", self.stats.team, self.stats.phase)?;
        writeln!(
            f,
            "Tasks: {} total (pending={}, in_progress={}, completed={}, blocked={})",
            self.stats.total_tasks,
            self.stats.tasks_by_status.pending,
            self.stats.tasks_by_status.in_progress,
            self.stats.tasks_by_status.completed,
            self.stats.tasks_by_status.blocked,
        )?;
        writeln!(
            f,
            "Members: active={}, idle={}, working={}, blocked={}, completed={}, failed={}",
            self.stats.members_by_status.active,
            self.stats.members_by_status.idle,
            self.stats.members_by_status.working,
            self.stats.members_by_status.blocked,
            self.stats.members_by_status.completed,
            self.stats.members_by_status.failed,
        )?;
        writeln!(f, "Uptime: {}ms", self.stats.uptime_ms)?;
        if self.issues.is_empty() {
            writeln!(f, "Integrity: no issues")?;
        } else {
            writeln!(f, "Integrity: {} issue(s)", self.issues.len())?;
            for issue in &self.issues {
                writeln!(f, "  - {issue:?}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::team::{TeamConfig, TeamSettings};
    use crate::phase::Phase;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_build_team_report_missing_team_is_none() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        assert!(build_team_report(&store, "ghost").await.expect("build").is_none());
    }

    #[tokio::test]
    async fn test_build_team_report_renders_text() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store
            .create_team(TeamConfig {
                name: "alpha".into(),
                description: String::new(),
                created_at: 0,
                lead_agent_id: "lead-x".into(),
                phase: Phase::Planning,
                members: vec![],
                settings: TeamSettings {
                    max_members: 10,
                    auto_assign: false,
                },
            })
            .await
            .expect("create");

        let report = build_team_report(&store, "alpha")
            .await
            .expect("build")
            .expect("exists");
        let text = report.to_string();
        assert!(text.contains("Team: alpha"));
        assert!(text.contains("Integrity"));

        let json = report.to_json();
        assert_eq!(json["stats"]["team"], "alpha");
    }
}
