use config::{Config, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub mcp: McpConfig,
    pub lock: LockConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct McpConfig {
    pub transport: String,
    pub port: u16,
}

impl McpConfig {
    /// Create config from environment variables (for standalone MCP usage).
    pub fn from_env() -> Self {
        Self {
            transport: std::env::var("COORD_MCP__TRANSPORT").unwrap_or_else(|_| "stdio".into()),
            port: std::env::var("COORD_MCP__PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        }
    }
}

/// Tuning knobs for `coord_core`'s file lock (spec section 4.1).
#[derive(Debug, Deserialize, Clone)]
pub struct LockConfig {
    #[serde(default = "default_stale_ms")]
    pub stale_ms: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

fn default_stale_ms() -> u64 {
    10_000
}

fn default_poll_ms() -> u64 {
    50
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_ms: default_stale_ms(),
            poll_interval_ms: default_poll_ms(),
            acquire_timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8765,
            },
            mcp: McpConfig {
                transport: "stdio".to_string(),
                port: 3000,
            },
            lock: LockConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration with 12-factor app compliant env var support.
    ///
    /// Priority order (highest to lowest):
    /// 1. `PORT` / `HOST` env vars (12-factor standard)
    /// 2. Config files (`config/default.toml`, `config/{run_mode}.toml`)
    /// 3. Hardcoded defaults (port 8765)
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8765)?
            .set_default("mcp.transport", "stdio")?
            .set_default("mcp.port", 3000)?
            .set_default("lock.stale_ms", 10_000)?
            .set_default("lock.poll_interval_ms", 50)?
            .set_default("lock.acquire_timeout_ms", 10_000)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false));

        if let Ok(port) = env::var("PORT") {
            if let Ok(p) = port.parse::<i64>() {
                builder = builder.set_override("server.port", p)?;
            }
        }
        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }

        builder.build()?.try_deserialize()
    }
}

/// Resolve the coordination fabric's config root.
///
/// Defaults to `~/.config/levelcode/`; overridable via `LEVELCODE_HOME` so
/// tests and multi-tenant hosts can redirect the store without touching
/// the real home directory.
pub fn config_root() -> PathBuf {
    if let Ok(dir) = env::var("LEVELCODE_HOME") {
        return PathBuf::from(dir);
    }

    let home = env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());

    PathBuf::from(home).join(".config").join("levelcode")
}
