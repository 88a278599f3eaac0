//! Team Store: validated CRUD for configs, tasks, and inboxes under a
//! config root (spec section 4.2), plus the thin Message Fabric layer over
//! the inbox primitives (spec section 4.3).

pub mod file_lock;
pub mod paths;

use crate::error::{Error, Result};
use crate::model::message::{Inbox, ProtocolMessage};
use crate::model::task::{TaskPatch, TeamTask};
use crate::model::team::TeamConfig;
use file_lock::FileLock;
use paths::StorePaths;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Clone, Debug)]
pub struct Store {
    paths: StorePaths,
    lock: FileLock,
    timeout: Duration,
}

impl Store {
    pub fn new(root: PathBuf) -> Self {
        Self {
            paths: StorePaths::new(root),
            lock: FileLock::default(),
            timeout: Duration::from_millis(file_lock::DEFAULT_TIMEOUT_MS),
        }
    }

    pub fn with_lock_tuning(
        root: PathBuf,
        stale_ms: u64,
        poll_interval_ms: u64,
        timeout_ms: u64,
    ) -> Self {
        Self {
            paths: StorePaths::new(root),
            lock: FileLock::new(stale_ms, poll_interval_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    // -- Team Store -----------------------------------------------------

    pub async fn create_team(&self, config: TeamConfig) -> Result<()> {
        config.validate()?;
        let team_dir = self.paths.team_dir(&config.name)?;
        tokio::fs::create_dir_all(self.paths.inboxes_dir(&config.name)?).await?;
        tokio::fs::create_dir_all(self.paths.tasks_dir(&config.name)?).await?;
        let config_file = team_dir.join("config.json");
        self.lock
            .with_lock(&config_file, self.timeout, || async {
                write_json_atomic(&config_file, &config).await
            })
            .await?;
        info!(team = %config.name, "team created");
        Ok(())
    }

    /// Reads and schema-validates a team config. On structural mismatch,
    /// attempts one auto-repair pass (role remapping); on persistent
    /// failure or a missing file, returns `Ok(None)`.
    pub async fn load_team_config(&self, name: &str) -> Result<Option<TeamConfig>> {
        let config_file = self.paths.config_file(name)?;
        let body = match tokio::fs::read_to_string(&config_file).await {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut config: TeamConfig = match serde_json::from_str(&body) {
            Ok(config) => config,
            Err(_) => return Ok(None),
        };

        if config.validate_strict().is_ok() {
            return Ok(Some(config));
        }

        warn!(team = name, path = %config_file.display(), "team config failed validation, attempting auto-repair");
        config.auto_repair();
        if config.validate_strict().is_err() {
            return Ok(None);
        }

        self.save_team_config(name, &config).await?;
        Ok(Some(config))
    }

    pub async fn save_team_config(&self, name: &str, config: &TeamConfig) -> Result<()> {
        config.validate()?;
        let config_file = self.paths.config_file(name)?;
        if let Some(parent) = config_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.lock
            .with_lock(&config_file, self.timeout, || async {
                write_json_atomic(&config_file, config).await
            })
            .await
    }

    pub async fn delete_team(&self, name: &str) -> Result<()> {
        let team_dir = self.paths.team_dir(name)?;
        let tasks_dir = self.paths.tasks_dir(name)?;
        remove_dir_if_exists(&team_dir).await?;
        remove_dir_if_exists(&tasks_dir).await?;
        info!(team = name, "team deleted");
        Ok(())
    }

    pub async fn add_team_member(
        &self,
        name: &str,
        member: crate::model::team::TeamMember,
    ) -> Result<()> {
        member.validate()?;
        let config_file = self.paths.config_file(name)?;
        let name = name.to_string();
        self.lock
            .with_lock(&config_file, self.timeout, || async {
                let mut config = self
                    .read_config_locked(&config_file)
                    .await?
                    .ok_or_else(|| Error::TeamNotFound(name.clone()))?;
                config.members.retain(|m| m.agent_id != member.agent_id);
                config.members.push(member);
                write_json_atomic(&config_file, &config).await
            })
            .await
    }

    pub async fn remove_team_member(&self, name: &str, agent_id: &str) -> Result<()> {
        let config_file = self.paths.config_file(name)?;
        let name = name.to_string();
        let agent_id = agent_id.to_string();
        self.lock
            .with_lock(&config_file, self.timeout, || async {
                let mut config = self
                    .read_config_locked(&config_file)
                    .await?
                    .ok_or_else(|| Error::TeamNotFound(name.clone()))?;
                config.members.retain(|m| m.agent_id != agent_id);
                write_json_atomic(&config_file, &config).await
            })
            .await
    }

    async fn read_config_locked(&self, config_file: &Path) -> Result<Option<TeamConfig>> {
        match tokio::fs::read_to_string(config_file).await {
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    // -- Tasks ------------------------------------------------------------

    pub async fn create_task(&self, team: &str, task: TeamTask) -> Result<()> {
        task.validate()?;
        let task_file = self.paths.task_file(team, &task.id)?;
        if let Some(parent) = task_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.lock
            .with_lock(&task_file, self.timeout, || async {
                write_json_atomic(&task_file, &task).await
            })
            .await
    }

    pub async fn update_task(&self, team: &str, id: &str, patch: TaskPatch) -> Result<TeamTask> {
        let task_file = self.paths.task_file(team, id)?;
        let team_s = team.to_string();
        let id_s = id.to_string();
        self.lock
            .with_lock(&task_file, self.timeout, || async {
                let body = tokio::fs::read_to_string(&task_file).await.map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        Error::TaskNotFound {
                            team: team_s.clone(),
                            id: id_s.clone(),
                        }
                    } else {
                        Error::Io(err)
                    }
                })?;
                let mut task: TeamTask = serde_json::from_str(&body)
                    .map_err(|_| Error::Corrupted(task_file.display().to_string()))?;
                patch.apply(&mut task);
                task.updated_at = now_ms();
                write_json_atomic(&task_file, &task).await?;
                Ok(task)
            })
            .await
    }

    pub async fn get_task(&self, team: &str, id: &str) -> Result<Option<TeamTask>> {
        let task_file = self.paths.task_file(team, id)?;
        match tokio::fs::read_to_string(&task_file).await {
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_tasks(&self, team: &str) -> Result<Vec<TeamTask>> {
        let tasks_dir = self.paths.tasks_dir(team)?;
        let mut entries = match tokio::fs::read_dir(&tasks_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut tasks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(body) = tokio::fs::read_to_string(&path).await {
                if let Ok(task) = serde_json::from_str::<TeamTask>(&body) {
                    tasks.push(task);
                }
            }
        }
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tasks)
    }

    // -- Message Fabric ---------------------------------------------------

    pub async fn send_message(&self, team: &str, to: &str, msg: ProtocolMessage) -> Result<()> {
        let inbox_file = self.paths.inbox_file(team, to)?;
        if let Some(parent) = inbox_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.lock
            .with_lock(&inbox_file, self.timeout, || async {
                let mut inbox = self.read_inbox_unlocked(&inbox_file).await?;
                inbox.push(msg);
                write_json_atomic(&inbox_file, &inbox).await
            })
            .await
    }

    /// Broadcasts to every member whose name differs from `sender_name`.
    /// The sender never appears in its own inbox.
    pub async fn broadcast(
        &self,
        team: &str,
        sender_name: &str,
        make_message: impl Fn() -> ProtocolMessage,
    ) -> Result<usize> {
        let config = self
            .load_team_config(team)
            .await?
            .ok_or_else(|| Error::TeamNotFound(team.to_string()))?;
        let mut delivered = 0;
        for member in &config.members {
            if member.name == sender_name {
                continue;
            }
            self.send_message(team, &member.name, make_message())
                .await?;
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Reads without consuming; lock-free per spec (a torn concurrent
    /// write surfaces as a JSON parse failure, which the caller retries).
    pub async fn read_inbox(&self, team: &str, agent: &str) -> Result<Inbox> {
        let inbox_file = self.paths.inbox_file(team, agent)?;
        self.read_inbox_unlocked(&inbox_file).await
    }

    async fn read_inbox_unlocked(&self, inbox_file: &Path) -> Result<Inbox> {
        match tokio::fs::read_to_string(inbox_file).await {
            Ok(body) => Ok(serde_json::from_str(&body)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn clear_inbox(&self, team: &str, agent: &str) -> Result<()> {
        let inbox_file = self.paths.inbox_file(team, agent)?;
        if let Some(parent) = inbox_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.lock
            .with_lock(&inbox_file, self.timeout, || async {
                write_json_atomic(&inbox_file, &Vec::<ProtocolMessage>::new()).await
            })
            .await
    }

    // -- Discovery support --------------------------------------------------

    pub async fn list_team_names(&self) -> Result<Vec<String>> {
        let teams_dir = self.paths.teams_dir();
        let mut entries = match tokio::fs::read_dir(&teams_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub async fn last_active_team(&self) -> Option<String> {
        let marker = self.paths.last_active_team_file();
        let body = tokio::fs::read_to_string(&marker).await.ok()?;
        let trimmed = body.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    /// Best-effort write; never fails the caller (spec section 4.5).
    pub async fn set_last_active_team(&self, name: &str) {
        let marker = self.paths.last_active_team_file();
        if let Some(parent) = marker.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }
        if let Err(err) = tokio::fs::write(&marker, name).await {
            warn!(error = %err, "failed to update last-active-team marker");
        }
    }
}

async fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    let tmp_path = path.with_extension(format!(
        "{}.tmp.{}",
        path.extension().and_then(|e| e.to_str()).unwrap_or("json"),
        std::process::id()
    ));
    tokio::fs::write(&tmp_path, body).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
