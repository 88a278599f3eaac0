//! Resolves the on-disk layout under a config root:
//!
//! ```text
//! <root>/
//!   .last-active-team
//!   teams/<team>/config.json
//!   teams/<team>/inboxes/<agent>.json
//!   tasks/<team>/<taskId>.json
//!   archive/<team>-<iso-timestamp>/{team,tasks}/...
//! ```
//!
//! Every accessor normalizes its result and verifies it is contained within
//! the expected parent, rejecting traversal via a validated component
//! (`team`, `agent`, `taskId`) that somehow still smuggled in a `..` or an
//! absolute path.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct StorePaths {
    root: PathBuf,
}

impl StorePaths {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn last_active_team_file(&self) -> PathBuf {
        self.root.join(".last-active-team")
    }

    pub fn teams_dir(&self) -> PathBuf {
        self.root.join("teams")
    }

    pub fn team_dir(&self, team: &str) -> Result<PathBuf> {
        self.contained(self.teams_dir(), team)
    }

    pub fn config_file(&self, team: &str) -> Result<PathBuf> {
        Ok(self.team_dir(team)?.join("config.json"))
    }

    pub fn inboxes_dir(&self, team: &str) -> Result<PathBuf> {
        Ok(self.team_dir(team)?.join("inboxes"))
    }

    pub fn inbox_file(&self, team: &str, agent: &str) -> Result<PathBuf> {
        self.contained(self.inboxes_dir(team)?, &format!("{agent}.json"))
    }

    pub fn tasks_root(&self) -> PathBuf {
        self.root.join("tasks")
    }

    pub fn tasks_dir(&self, team: &str) -> Result<PathBuf> {
        self.contained(self.tasks_root(), team)
    }

    pub fn task_file(&self, team: &str, task_id: &str) -> Result<PathBuf> {
        self.contained(self.tasks_dir(team)?, &format!("{task_id}.json"))
    }

    pub fn completed_tasks_dir(&self, team: &str) -> Result<PathBuf> {
        Ok(self.tasks_dir(team)?.join("completed"))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    pub fn archive_entry(&self, team: &str, iso_timestamp: &str) -> Result<PathBuf> {
        let safe_ts = iso_timestamp.replace([':', '.'], "-");
        self.contained(self.archive_dir(), &format!("{team}-{safe_ts}"))
    }

    /// Joins `child` onto `parent`, normalizes, and verifies containment.
    fn contained(&self, parent: PathBuf, child: &str) -> Result<PathBuf> {
        if child.contains("..") || child.starts_with('/') || child.contains('\0') {
            return Err(Error::PathTraversal(child.to_string()));
        }
        let joined = parent.join(child);
        let normalized = normalize(&joined);
        let normalized_parent = normalize(&parent);
        if !normalized.starts_with(&normalized_parent) {
            return Err(Error::PathTraversal(joined.display().to_string()));
        }
        Ok(joined)
    }
}

/// Lexical normalization (no filesystem access, since the target may not
/// exist yet) — collapses `.` components; `..` is already rejected above.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}
