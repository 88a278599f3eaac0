//! Read-whole-store integrity and upkeep operations (spec section 4.7).
//! Safe to run during normal agent activity: every pass tolerates the store
//! mutating underneath it, since correctness here is advisory, not
//! transactional.

use crate::error::Result;
use crate::model::task::{find_dangling_reference, TaskStatus};
use crate::model::team::TeamConfig;
use crate::phase::Phase;
use crate::store::Store;
use serde::Serialize;
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Removes every `*.lock` sidecar under `team`'s directories whose body is
/// unparseable or older than `stale_ms`. Returns the number removed.
pub async fn cleanup_stale_locks(store: &Store, team: &str, stale_ms: u64) -> Result<usize> {
    let mut removed = 0;
    let mut dirs = vec![
        store.paths().team_dir(team)?,
        store.paths().inboxes_dir(team)?,
        store.paths().tasks_dir(team)?,
    ];
    dirs.retain(|d| d.exists());

    for dir in dirs {
        removed += sweep_locks_in(&dir, stale_ms).await?;
    }
    Ok(removed)
}

async fn sweep_locks_in(dir: &std::path::Path, stale_ms: u64) -> Result<usize> {
    let mut removed = 0;
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("lock") {
            continue;
        }
        let stale = match tokio::fs::read_to_string(&path).await {
            Ok(body) => match body.trim().parse::<u64>() {
                Ok(ts) => now_ms().saturating_sub(ts as i64) as u64 > stale_ms,
                Err(_) => true,
            },
            Err(_) => false,
        };
        if stale && tokio::fs::remove_file(&path).await.is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Moves each completed task whose `updatedAt` is older than `older_than_ms`
/// into `tasks/<team>/completed/`. Returns the number moved.
pub async fn prune_completed_tasks(store: &Store, team: &str, older_than_ms: i64) -> Result<usize> {
    let cutoff = now_ms() - older_than_ms;
    let completed_dir = store.paths().completed_tasks_dir(team)?;
    tokio::fs::create_dir_all(&completed_dir).await?;

    let mut moved = 0;
    for task in store.list_tasks(team).await? {
        if task.status != TaskStatus::Completed || task.updated_at >= cutoff {
            continue;
        }
        let from = store.paths().task_file(team, &task.id)?;
        let to = completed_dir.join(format!("{}.json", task.id));
        if tokio::fs::rename(&from, &to).await.is_ok() {
            moved += 1;
        }
    }
    Ok(moved)
}

/// Removes inbox files whose stem does not name a current member. Returns
/// the number removed.
pub async fn cleanup_orphaned_inboxes(store: &Store, team: &str) -> Result<usize> {
    let Some(config) = store.load_team_config(team).await? else {
        return Ok(0);
    };
    let member_names: HashSet<&str> = config.members.iter().map(|m| m.name.as_str()).collect();

    let inboxes_dir = store.paths().inboxes_dir(team)?;
    let mut entries = match tokio::fs::read_dir(&inboxes_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if !member_names.contains(stem) && tokio::fs::remove_file(&path).await.is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Rebuilds a minimal config when the stored one is missing or fails
/// schema validation, inferring phase from the most advanced phase any
/// observed task names. Writes the rebuilt config back and returns it.
pub async fn repair_team_config(store: &Store, team: &str) -> Result<TeamConfig> {
    if let Some(config) = store.load_team_config(team).await? {
        return Ok(config);
    }

    let tasks = store.list_tasks(team).await?;
    let inferred_phase = tasks
        .iter()
        .filter_map(|t| t.phase)
        .max()
        .unwrap_or(Phase::Planning);

    let rebuilt = TeamConfig {
        name: team.to_string(),
        description: String::new(),
        created_at: now_ms(),
        lead_agent_id: format!("lead-{team}"),
        phase: inferred_phase,
        members: Vec::new(),
        settings: crate::model::team::TeamSettings {
            max_members: 10,
            auto_assign: false,
        },
    };
    store.save_team_config(team, &rebuilt).await?;
    Ok(rebuilt)
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamStats {
    pub team: String,
    pub phase: Phase,
    pub total_tasks: usize,
    pub tasks_by_status: TaskStatusCounts,
    pub members_by_status: MemberStatusCounts,
    pub uptime_ms: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskStatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub blocked: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemberStatusCounts {
    pub active: usize,
    pub idle: usize,
    pub working: usize,
    pub blocked: usize,
    pub completed: usize,
    pub failed: usize,
}

pub async fn get_team_stats(store: &Store, team: &str) -> Result<Option<TeamStats>> {
    let Some(config) = store.load_team_config(team).await? else {
        return Ok(None);
    };
    let tasks = store.list_tasks(team).await?;

    let mut tasks_by_status = TaskStatusCounts::default();
    for task in &tasks {
        match task.status {
            TaskStatus::Pending => tasks_by_status.pending += 1,
            TaskStatus::InProgress => tasks_by_status.in_progress += 1,
            TaskStatus::Completed => tasks_by_status.completed += 1,
            TaskStatus::Blocked => tasks_by_status.blocked += 1,
        }
    }

    let mut members_by_status = MemberStatusCounts::default();
    for member in &config.members {
        use crate::model::team::MemberStatus;
        match member.status {
            MemberStatus::Active => members_by_status.active += 1,
            MemberStatus::Idle => members_by_status.idle += 1,
            MemberStatus::Working => members_by_status.working += 1,
            MemberStatus::Blocked => members_by_status.blocked += 1,
            MemberStatus::Completed => members_by_status.completed += 1,
            MemberStatus::Failed => members_by_status.failed += 1,
        }
    }

    Ok(Some(TeamStats {
        team: team.to_string(),
        phase: config.phase,
        total_tasks: tasks.len(),
        tasks_by_status,
        members_by_status,
        uptime_ms: now_ms() - config.created_at,
    }))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    MissingConfig,
    InvalidConfig { detail: String },
    InvalidTask { task_id: String, detail: String },
    OrphanedInbox { stem: String },
    MissingInbox { member: String },
    StaleLock { path: String },
    DanglingTaskReference { from: String, to: String },
}

/// Non-fatal integrity sweep; every issue is surfaced as data for an
/// operator or Maintenance caller to act on.
pub async fn validate_team_integrity(store: &Store, team: &str) -> Result<Vec<IntegrityIssue>> {
    let mut issues = Vec::new();

    let config_file = store.paths().config_file(team)?;
    let config = match tokio::fs::read_to_string(&config_file).await {
        Ok(body) => match serde_json::from_str::<TeamConfig>(&body) {
            Ok(config) => Some(config),
            Err(err) => {
                issues.push(IntegrityIssue::InvalidConfig {
                    detail: err.to_string(),
                });
                None
            }
        },
        Err(_) => {
            issues.push(IntegrityIssue::MissingConfig);
            None
        }
    };

    let tasks_dir = store.paths().tasks_dir(team)?;
    let mut valid_tasks = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(&tasks_dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(body) => match serde_json::from_str::<crate::model::task::TeamTask>(&body) {
                    Ok(task) => valid_tasks.push(task),
                    Err(err) => issues.push(IntegrityIssue::InvalidTask {
                        task_id: path
                            .file_stem()
                            .and_then(|s| s.to_str())
                            .unwrap_or("?")
                            .to_string(),
                        detail: err.to_string(),
                    }),
                },
                Err(_) => continue,
            }
        }
    }

    if let Some(dangling) = find_dangling_reference(&valid_tasks) {
        if let crate::utils::validation::ValidationError::DanglingTaskReference { from, to } = dangling {
            issues.push(IntegrityIssue::DanglingTaskReference { from, to });
        }
    }

    if let Some(config) = &config {
        let member_names: HashSet<&str> = config.members.iter().map(|m| m.name.as_str()).collect();

        let inboxes_dir = store.paths().inboxes_dir(team)?;
        let mut inbox_stems = HashSet::new();
        if let Ok(mut entries) = tokio::fs::read_dir(&inboxes_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    inbox_stems.insert(stem.to_string());
                    if !member_names.contains(stem) {
                        issues.push(IntegrityIssue::OrphanedInbox {
                            stem: stem.to_string(),
                        });
                    }
                }
            }
        }
        for name in &member_names {
            if !inbox_stems.contains(*name) {
                issues.push(IntegrityIssue::MissingInbox {
                    member: name.to_string(),
                });
            }
        }
    }

    for dir in [
        store.paths().team_dir(team)?,
        store.paths().inboxes_dir(team)?,
        store.paths().tasks_dir(team)?,
    ] {
        if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("lock") {
                    issues.push(IntegrityIssue::StaleLock {
                        path: path.display().to_string(),
                    });
                }
            }
        }
    }

    Ok(issues)
}

/// Moves `teams/<team>` and `tasks/<team>` under a single timestamped
/// archive entry. The ISO timestamp is supplied by the caller (this crate
/// never reads the wall clock for anything user-observable beyond advisory
/// metadata, per the store's deterministic-write design).
pub async fn archive_team(store: &Store, team: &str, iso_timestamp: &str) -> Result<()> {
    let entry = store.paths().archive_entry(team, iso_timestamp)?;
    tokio::fs::create_dir_all(&entry).await?;

    let team_dir = store.paths().team_dir(team)?;
    let tasks_dir = store.paths().tasks_dir(team)?;

    if team_dir.exists() {
        tokio::fs::rename(&team_dir, entry.join("team")).await?;
    }
    if tasks_dir.exists() {
        tokio::fs::rename(&tasks_dir, entry.join("tasks")).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::task::{TaskPriority, TeamTask};
    use crate::model::team::{MemberStatus, TeamMember, TeamSettings};
    use tempfile::TempDir;

    fn config(name: &str, members: Vec<TeamMember>) -> TeamConfig {
        TeamConfig {
            name: name.into(),
            description: String::new(),
            created_at: now_ms() - 5_000,
            lead_agent_id: "lead-x".into(),
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

    fn task(id: &str, status: TaskStatus, updated_at: i64) -> TeamTask {
        TeamTask {
            id: id.into(),
            subject: "t".into(),
            description: String::new(),
            status,
            priority: TaskPriority::Medium,
            owner: None,
            blocked_by: vec![],
            blocks: vec![],
            phase: None,
            active_form: None,
            created_at: 0,
            updated_at,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_cleanup_stale_locks_removes_old_and_unparseable() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store.create_team(config("alpha", vec![])).await.expect("create");

        let team_dir = store.paths().team_dir("alpha").expect("team dir");
        tokio::fs::write(team_dir.join("config.json.lock"), "not-a-number")
            .await
            .expect("write lock");

        let removed = cleanup_stale_locks(&store, "alpha", 10_000).await.expect("cleanup");
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_prune_completed_tasks_moves_old_ones() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store.create_team(config("alpha", vec![])).await.expect("create");
        store
            .create_task("alpha", task("1", TaskStatus::Completed, now_ms() - 100_000))
            .await
            .expect("create task");
        store
            .create_task("alpha", task("2", TaskStatus::Completed, now_ms()))
            .await
            .expect("create task");

        let moved = prune_completed_tasks(&store, "alpha", 50_000).await.expect("prune");
        assert_eq!(moved, 1);
        let remaining = store.list_tasks("alpha").await.expect("list");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "2");
    }

    #[tokio::test]
    async fn test_cleanup_orphaned_inboxes() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store
            .create_team(config("alpha", vec![member("dev-1", "dev")]))
            .await
            .expect("create");
        store
            .send_message(
                "alpha",
                "ghost",
                crate::model::message::ProtocolMessage::new(
                    "t".into(),
                    crate::model::message::MessageBody::Broadcast {
                        from: "dev".into(),
                        text: "hi".into(),
                        summary: None,
                    },
                ),
            )
            .await
            .expect("send to stale inbox");

        let removed = cleanup_orphaned_inboxes(&store, "alpha").await.expect("cleanup");
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_repair_team_config_rebuilds_missing_config() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        tokio::fs::create_dir_all(store.paths().tasks_dir("alpha").expect("tasks dir"))
            .await
            .expect("mkdir");
        let mut t = task("1", TaskStatus::Pending, now_ms());
        t.phase = Some(Phase::Alpha);
        store.create_task("alpha", t).await.expect("create task");

        let rebuilt = repair_team_config(&store, "alpha").await.expect("repair");
        assert_eq!(rebuilt.phase, Phase::Alpha);
        assert_eq!(
            store.load_team_config("alpha").await.expect("load"),
            Some(rebuilt)
        );
    }

    #[tokio::test]
    async fn test_get_team_stats_counts() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store
            .create_team(config("alpha", vec![member("dev-1", "dev")]))
            .await
            .expect("create");
        store
            .create_task("alpha", task("1", TaskStatus::Completed, now_ms()))
            .await
            .expect("create task");
        store
            .create_task("alpha", task("2", TaskStatus::Pending, now_ms()))
            .await
            .expect("create task");

        let stats = get_team_stats(&store, "alpha")
            .await
            .expect("stats")
            .expect("team exists");
        assert_eq!(stats.total_tasks, 2);
        assert_eq!(stats.tasks_by_status.completed, 1);
        assert_eq!(stats.tasks_by_status.pending, 1);
        assert_eq!(stats.members_by_status.active, 1);
        assert!(stats.uptime_ms >= 0);
    }

    #[tokio::test]
    async fn test_validate_team_integrity_flags_dangling_reference() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store
            .create_team(config("alpha", vec![member("dev-1", "dev")]))
            .await
            .expect("create");
        let mut t = task("1", TaskStatus::Pending, now_ms());
        t.blocked_by = vec!["99".into()];
        store.create_task("alpha", t).await.expect("create task");

        let issues = validate_team_integrity(&store, "alpha").await.expect("validate");
        assert!(issues
            .iter()
            .any(|i| matches!(i, IntegrityIssue::DanglingTaskReference { .. })));
        assert!(issues
            .iter()
            .any(|i| matches!(i, IntegrityIssue::MissingInbox { .. })));
    }

    #[tokio::test]
    async fn test_archive_team_moves_directories() {
        let dir = TempDir::new().expect("temp dir");
        let store = Store::new(dir.path().to_path_buf());
        store.create_team(config("alpha", vec![])).await.expect("create");
        store
            .create_task("alpha", task("1", TaskStatus::Pending, now_ms()))
            .await
            .expect("create task");

        archive_team(&store, "alpha", "2026-08-01T00:00:00.000Z")
            .await
            .expect("archive");

        assert!(!store.paths().team_dir("alpha").expect("team dir").exists());
        let entry = store
            .paths()
            .archive_entry("alpha", "2026-08-01T00:00:00.000Z")
            .expect("entry");
        assert!(entry.join("team").join("config.json").exists());
        assert!(entry.join("tasks").join("1.json").exists());
    }
}
