//! Per-path cross-process mutual exclusion with stale-lock reclamation.
//!
//! A lock on `path` is a sidecar file `<path>.lock` containing an ASCII
//! decimal millisecond timestamp written at acquisition. Acquisition is
//! exclusive file creation (`O_CREAT|O_EXCL` semantics); a holder crashing
//! without releasing leaves a lock that is reclaimed once it is older than
//! the stale threshold.

use crate::error::{Error, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Default staleness threshold: a lock older than this is reclaimed by the
/// next acquirer regardless of whether the original holder is still alive.
pub const DEFAULT_STALE_MS: u64 = 10_000;
/// Default poll interval while waiting for a contended lock.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;
/// Default deadline for a single `acquire` call.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Cross-process file lock keyed by an arbitrary path.
///
/// Stateless aside from tuning knobs: every call resolves its own sidecar
/// path, so one `FileLock` can be reused (or a fresh one constructed per
/// call) to guard any number of distinct paths.
#[derive(Clone, Debug)]
pub struct FileLock {
    pub stale_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for FileLock {
    fn default() -> Self {
        Self {
            stale_ms: DEFAULT_STALE_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl FileLock {
    pub fn new(stale_ms: u64, poll_interval_ms: u64) -> Self {
        Self {
            stale_ms,
            poll_interval_ms,
        }
    }

    fn sidecar(path: &Path) -> PathBuf {
        let mut os = path.as_os_str().to_owned();
        os.push(".lock");
        PathBuf::from(os)
    }

    /// Acquire the lock guarding `path`, waiting up to `timeout`.
    pub async fn acquire(&self, path: &Path, timeout: Duration) -> Result<LockGuard> {
        let sidecar = Self::sidecar(path);
        if let Some(parent) = sidecar.parent() {
            fs::create_dir_all(parent).await?;
        }

        let deadline = Instant::now() + timeout;

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&sidecar)
                .await
            {
                Ok(mut file) => {
                    file.write_all(now_ms().to_string().as_bytes()).await?;
                    file.flush().await?;
                    debug!(path = %sidecar.display(), "lock acquired");
                    return Ok(LockGuard {
                        sidecar: Some(sidecar),
                    });
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    if self.reclaim_if_stale(&sidecar).await {
                        continue;
                    }

                    if Instant::now() > deadline {
                        return Err(Error::LockTimeout {
                            path: path.display().to_string(),
                        });
                    }

                    tokio::time::sleep(Duration::from_millis(self.poll_interval_ms)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Run `f` while holding the lock on `path`, releasing on every exit
    /// path (success, error, or panic unwind via the guard's `Drop`).
    pub async fn with_lock<F, Fut, T>(&self, path: &Path, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = self.acquire(path, timeout).await?;
        let result = f().await;
        guard.release().await;
        result
    }

    /// Returns true if a stale lock was found and removed, meaning the
    /// caller should retry acquisition immediately.
    async fn reclaim_if_stale(&self, sidecar: &Path) -> bool {
        match fs::read_to_string(sidecar).await {
            Ok(body) => match body.trim().parse::<u64>() {
                Ok(ts) => {
                    if now_ms().saturating_sub(ts) > self.stale_ms {
                        info!(path = %sidecar.display(), age_ms = now_ms().saturating_sub(ts), "reclaiming stale lock");
                        let _ = fs::remove_file(sidecar).await;
                        true
                    } else {
                        false
                    }
                }
                Err(_) => {
                    // Body unparseable but the file exists: if it's a
                    // read race with the writer still mid-write, treat as
                    // held; if truly malformed, the next stale sweep
                    // (Maintenance) will clear it.
                    false
                }
            },
            Err(_) => {
                // Transient read failure (e.g. removed between the
                // create_new failure and this read) — retry immediately.
                true
            }
        }
    }
}

/// RAII guard releasing its sidecar lock file on drop.
///
/// Release is synchronous so the lock is gone by the time `Drop` returns,
/// even outside a Tokio runtime (a panicking `#[test]`, for instance) —
/// unlike a `tokio::spawn`-based best-effort cleanup, which could still be
/// pending when the process exits.
#[derive(Debug)]
pub struct LockGuard {
    sidecar: Option<PathBuf>,
}

impl LockGuard {
    /// Explicit async release. Prefer this in async code; `Drop` is the
    /// fallback for guards that go out of scope without it.
    pub async fn release(mut self) {
        if let Some(path) = self.sidecar.take() {
            match fs::remove_file(&path).await {
                Ok(()) => debug!(path = %path.display(), "lock released"),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    // Already reclaimed as stale by another acquirer; a
                    // double-release is a no-op per contract.
                }
                Err(err) => warn!(path = %path.display(), error = %err, "failed to release lock"),
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(path) = self.sidecar.take() {
            match std::fs::remove_file(&path) {
                Ok(()) | Err(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lock_acquire_release() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("config.json");
        let lock = FileLock::default();

        let guard = lock
            .acquire(&target, Duration::from_secs(1))
            .await
            .expect("acquire");
        let sidecar = FileLock::sidecar(&target);
        assert!(sidecar.exists());
        guard.release().await;
        assert!(!sidecar.exists());
    }

    #[tokio::test]
    async fn test_contended_lock_times_out() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("task.json");
        let lock = FileLock::default();

        let _held = lock
            .acquire(&target, Duration::from_secs(1))
            .await
            .expect("acquire");

        let err = lock
            .acquire(&target, Duration::from_millis(150))
            .await
            .expect_err("should time out");
        assert!(matches!(err, Error::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn test_stale_lock_reclaimed_quickly() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("team.json");
        let sidecar = FileLock::sidecar(&target);

        let stale_ts = now_ms().saturating_sub(30_000);
        fs::write(&sidecar, stale_ts.to_string())
            .await
            .expect("write stale lock");

        let lock = FileLock::default();
        let start = Instant::now();
        let guard = lock
            .acquire(&target, Duration::from_secs(2))
            .await
            .expect("should reclaim stale lock");
        assert!(start.elapsed() < Duration::from_secs(1));
        guard.release().await;
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("inbox.json");
        let sidecar = FileLock::sidecar(&target);
        let lock = FileLock::default();

        let result: Result<()> = lock
            .with_lock(&target, Duration::from_secs(1), || async {
                Err(Error::TeamNotFound("x".into()))
            })
            .await;

        assert!(result.is_err());
        assert!(!sidecar.exists());
    }

    #[tokio::test]
    async fn test_double_release_is_noop() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("x.json");
        let lock = FileLock::default();

        let guard = lock
            .acquire(&target, Duration::from_secs(1))
            .await
            .expect("acquire");
        let sidecar = FileLock::sidecar(&target);
        std::fs::remove_file(&sidecar).expect("manual remove");
        // guard's eventual drop/release on an already-removed file must not panic
        guard.release().await;
    }

    #[tokio::test]
    async fn test_20_concurrent_acquirers_serialize() {
        let dir = TempDir::new().expect("temp dir");
        let target = dir.path().join("inbox.json");
        let lock = FileLock::default();
        let counter = std::sync::Arc::new(tokio::sync::Mutex::new(0u32));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let lock = lock.clone();
            let target = target.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let guard = lock
                    .acquire(&target, Duration::from_secs(5))
                    .await
                    .expect("acquire");
                {
                    let mut c = counter.lock().await;
                    *c += 1;
                }
                guard.release().await;
            }));
        }

        for h in handles {
            h.await.expect("join");
        }

        assert_eq!(*counter.lock().await, 20);
    }
}
