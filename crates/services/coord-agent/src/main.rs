use clap::{Args, CommandFactory, Parser, Subcommand};
use coord_common::config::{AppConfig, config_root};
use coord_common::robot::{
    CommandSchema, Example, ROBOT_HELP_SCHEMA_VERSION, RobotFlagSchema, RobotHelpOutput,
};
use coord_core::model::message::{MessageBody, ProtocolMessage};
use coord_core::model::task::{TaskPatch, TaskPriority, TaskStatus, TeamTask};
use coord_core::model::team::{MemberStatus, TeamConfig, TeamMember, TeamSettings};
use coord_core::phase::Phase;
use coord_core::store::Store;
use coord_credit::model::{CreditGrantForCreate, GrantType, Principal};
use coord_credit::ledger::CreditLedger;
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;
use tracing::info;

mod panic_hook;

#[derive(Parser)]
#[command(name = "coord-agent")]
#[command(about = "Unified server/CLI for the multi-agent coordination fabric")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log format: plain or json
    #[arg(long, default_value = "plain", global = true)]
    log_format: String,

    /// Output help in machine-readable JSON format
    #[arg(long, global = true, help = "Output help in machine-readable JSON format")]
    robot_help: bool,

    /// Output format for robot flags and reports (json/yaml/text)
    #[arg(long, global = true, default_value = "json", help = "Output format for robot flags and reports")]
    format: String,

    /// Output system health status in machine-readable format
    #[arg(long, global = true, help = "Output system health status in machine-readable format")]
    robot_status: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a server (HTTP status surface or MCP stdio transport)
    Serve(ServeArgs),

    /// Check the HTTP status surface's health
    Health {
        #[arg(short, long, env = "COORD_AGENT_URL", default_value = "http://localhost:8765")]
        url: String,
    },

    /// Manage configuration
    Config(ConfigArgs),

    /// Export JSON schemas for the MCP tool surface
    Schema {
        #[arg(short, long, default_value = "json")]
        format: String,
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Create, list, and inspect teams
    Team(TeamArgs),

    /// Create, update, and inspect tasks
    Task(TaskArgs),

    /// Send messages and read inboxes
    Message(MessageArgs),

    /// Grant, consume, and inspect credit balances
    Credit(CreditArgs),

    /// Print a team's status report
    Status {
        team: String,
    },

    /// Show version info
    Version,
}

#[derive(Args)]
struct ServeArgs {
    #[command(subcommand)]
    command: ServeCommands,
}

#[derive(Subcommand)]
enum ServeCommands {
    /// Start the HTTP status surface
    Http {
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Start the MCP server over stdio
    Mcp {
        #[arg(long, default_value = "stdio")]
        transport: String,
    },
}

#[derive(Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Set the HTTP status surface's binding port in config
    SetPort { port: u16 },
    /// Show the current binding port
    ShowPort,
}

#[derive(Args)]
struct TeamArgs {
    #[command(subcommand)]
    command: TeamCommands,
}

#[derive(Subcommand)]
enum TeamCommands {
    /// Create a new team, starting in the planning phase
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        lead_agent_id: String,
    },
    /// List every team name on disk
    List,
    /// Show a team's full configuration
    Show { name: String },
}

#[derive(Args)]
struct TaskArgs {
    #[command(subcommand)]
    command: TaskCommands,
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Create a task
    Create {
        team: String,
        id: String,
        subject: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, value_delimiter = ',')]
        blocked_by: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        blocks: Vec<String>,
    },
    /// Apply a partial update to a task
    Update {
        team: String,
        id: String,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        priority: Option<String>,
        #[arg(long)]
        owner: Option<String>,
    },
    /// List every task in a team
    List { team: String },
    /// Fetch a single task
    Get { team: String, id: String },
}

#[derive(Args)]
struct MessageArgs {
    #[command(subcommand)]
    command: MessageCommands,
}

#[derive(Subcommand)]
enum MessageCommands {
    /// Send a message to a team member
    Send {
        team: String,
        from: String,
        to: String,
        text: String,
        #[arg(long)]
        summary: Option<String>,
    },
    /// Print an agent's inbox
    Inbox { team: String, agent: String },
    /// Clear an agent's inbox
    ClearInbox { team: String, agent: String },
}

#[derive(Args)]
struct CreditArgs {
    #[command(subcommand)]
    command: CreditCommands,
}

#[derive(Subcommand)]
enum CreditCommands {
    /// Grant credits to a user
    Grant {
        user_id: String,
        amount: i64,
        #[arg(long, default_value = "purchase")]
        grant_type: String,
        #[arg(long, default_value_t = 50)]
        priority: i32,
        #[arg(long)]
        operation_id: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Consume credits from a user's balance
    Consume { user_id: String, amount: i64 },
    /// Show a user's usage and balance for the current billing cycle
    Balance {
        user_id: String,
        #[arg(long)]
        cycle_start: i64,
    },
    /// Revoke an unconsumed grant by its operation id
    Revoke { user_id: String, operation_id: String },
}

fn setup_tracing(json_logs: bool) {
    coord_common::tracing::init(json_logs, "info,tower_http=debug,coord_agent=debug");
}

fn load_config() -> AppConfig {
    AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!("failed to load config file: {e}. using defaults.");
        AppConfig::default()
    })
}

/// Error returned when a port is unavailable.
#[derive(Debug)]
pub struct PortInUseError {
    pub port: u16,
    pub suggestion: String,
}

impl std::fmt::Display for PortInUseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Port {} is already in use.\n\n{}\n", self.port, self.suggestion)
    }
}

impl std::error::Error for PortInUseError {}

/// Briefly binds `port` to check availability; the listener is dropped
/// immediately, releasing it back before the real server binds.
pub fn validate_port(port: u16) -> Result<(), PortInUseError> {
    let addr = format!("127.0.0.1:{port}");
    match TcpListener::bind(&addr) {
        Ok(_listener) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            let alt_port = if port < 65535 { port + 1 } else { port - 1 };
            Err(PortInUseError {
                port,
                suggestion: format!(
                    "To find what's using port {port}:\n  lsof -i :{port}\n\nOr use an alternative port:\n  coord-agent serve http --port {alt_port}"
                ),
            })
        }
        Err(e) => Err(PortInUseError {
            port,
            suggestion: format!("Failed to bind to port {port}: {e}\n\nTry a different port with --port."),
        }),
    }
}

async fn handle_serve_http(port: Option<u16>, mut config: AppConfig) -> anyhow::Result<()> {
    if let Some(p) = port {
        config.server.port = p;
    }
    if let Err(e) = validate_port(config.server.port) {
        eprintln!("\n{e}");
        std::process::exit(1);
    }
    info!("starting HTTP status surface on port {}", config.server.port);
    let store = Arc::new(Store::new(config_root()));
    let addr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    coord_http::serve(store, addr).await?;
    Ok(())
}

async fn handle_serve_mcp(transport: String) -> anyhow::Result<()> {
    info!("starting MCP server ({transport})");
    if transport != "stdio" {
        anyhow::bail!("unsupported MCP transport \"{transport}\" (only stdio is implemented)");
    }
    coord_mcp::run_stdio(config_root()).await?;
    Ok(())
}

async fn handle_health(url: String) -> anyhow::Result<()> {
    info!("checking health at {url}");
    let resp = reqwest::get(format!("{url}/healthz")).await?;
    if resp.status().is_success() {
        info!("server is HEALTHY: {}", resp.text().await?);
    } else {
        tracing::error!("server is UNHEALTHY: status {}", resp.status());
        std::process::exit(1);
    }
    Ok(())
}

fn handle_schema(format: String, output: Option<String>) -> anyhow::Result<()> {
    let schemas = coord_mcp::get_tool_schemas();
    let content = if format == "markdown" || format == "md" {
        generate_markdown_docs(&schemas)
    } else {
        serde_json::to_string_pretty(&schemas)?
    };
    if let Some(path) = output {
        std::fs::write(&path, &content)?;
        eprintln!("schema written to {path}");
    } else {
        println!("{content}");
    }
    Ok(())
}

fn generate_markdown_docs(schemas: &[coord_mcp::ToolSchema]) -> String {
    let mut out = String::from("# Coordination fabric MCP tools\n\n");
    for schema in schemas {
        out.push_str(&format!("## `{}`\n\n{}\n\n", schema.name, schema.description));
        if let Some(phase) = &schema.min_phase {
            out.push_str(&format!("Requires team phase >= `{phase}`.\n\n"));
        }
    }
    out
}

fn handle_config_command(cmd: ConfigCommands) -> anyhow::Result<()> {
    match cmd {
        ConfigCommands::SetPort { port } => {
            let config_dir = config_root();
            let config_path = config_dir.join("config.toml");
            std::fs::create_dir_all(&config_dir)?;

            let content = if config_path.exists() {
                std::fs::read_to_string(&config_path)?
            } else {
                String::new()
            };

            let mut config: toml::Table = toml::from_str(&content).unwrap_or_else(|_| toml::Table::new());
            let server_entry = config.entry("server").or_insert(toml::Value::Table(toml::Table::new()));
            if let toml::Value::Table(server_table) = server_entry {
                server_table.insert("port".to_string(), toml::Value::Integer(port as i64));
            }

            let new_content = toml::to_string_pretty(&config)?;
            std::fs::write(&config_path, new_content)?;

            println!("updated port to {port} in {}", config_path.display());
            println!("restart the server for changes to take effect.");
        }
        ConfigCommands::ShowPort => {
            let config = load_config();
            println!("{}", config.server.port);
        }
    }
    Ok(())
}

fn handle_robot_help(format: &str) {
    let output = RobotHelpOutput {
        schema_version: ROBOT_HELP_SCHEMA_VERSION.to_string(),
        tool: "coord-agent".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Unified server/CLI for the multi-agent coordination fabric".to_string(),
        commands: vec![
            CommandSchema {
                name: "serve".to_string(),
                description: "Start the HTTP status surface or the MCP stdio transport.".to_string(),
                parameters: vec![],
                exit_codes: HashMap::new(),
                subcommands: vec![],
                examples: vec![Example {
                    invocation: "coord-agent serve mcp".to_string(),
                    description: "Run the MCP tool surface over stdio.".to_string(),
                }],
            },
            CommandSchema {
                name: "team".to_string(),
                description: "Create, list, and inspect teams.".to_string(),
                parameters: vec![],
                exit_codes: HashMap::new(),
                subcommands: vec![],
                examples: vec![],
            },
            CommandSchema {
                name: "task".to_string(),
                description: "Create, update, and inspect tasks.".to_string(),
                parameters: vec![],
                exit_codes: HashMap::new(),
                subcommands: vec![],
                examples: vec![],
            },
            CommandSchema {
                name: "message".to_string(),
                description: "Send messages and read inboxes.".to_string(),
                parameters: vec![],
                exit_codes: HashMap::new(),
                subcommands: vec![],
                examples: vec![],
            },
            CommandSchema {
                name: "credit".to_string(),
                description: "Grant, consume, and inspect credit balances.".to_string(),
                parameters: vec![],
                exit_codes: HashMap::new(),
                subcommands: vec![],
                examples: vec![],
            },
            CommandSchema {
                name: "status".to_string(),
                description: "Print a team's status report.".to_string(),
                parameters: vec![],
                exit_codes: HashMap::new(),
                subcommands: vec![],
                examples: vec![],
            },
        ],
        robot_flags: vec![
            RobotFlagSchema {
                name: "--robot-status".to_string(),
                description: "Output a machine-readable health check and exit.".to_string(),
                output_format: "json|yaml".to_string(),
                examples: vec![],
            },
        ],
    };
    let rendered = if format.eq_ignore_ascii_case("yaml") {
        serde_yaml::to_string(&output).unwrap_or_default()
    } else {
        serde_json::to_string_pretty(&output).unwrap_or_default()
    };
    println!("{rendered}");
}

/// One named check in [`RobotStatusOutput`], mirroring the teacher's
/// database/archive/config health-check trio but checking the config root
/// and lock tuning this system actually depends on.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct CheckResult {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct RobotStatusOutput {
    schema_version: String,
    tool: String,
    version: String,
    timestamp: String,
    status: String,
    checks: HashMap<String, CheckResult>,
    exit_code: u8,
}

fn handle_robot_status(format: &str) -> u8 {
    let mut checks = HashMap::new();
    let mut exit_code = 0;

    let root = config_root();
    checks.insert(
        "config_root".to_string(),
        CheckResult {
            status: if root.exists() { "ok".to_string() } else { "missing".to_string() },
            path: Some(root.to_string_lossy().to_string()),
            port: None,
        },
    );

    let config = load_config();
    checks.insert(
        "config".to_string(),
        CheckResult { status: "ok".to_string(), path: None, port: Some(config.server.port) },
    );

    let status = if checks.values().any(|c| c.status != "ok") {
        exit_code = 1;
        "degraded".to_string()
    } else {
        "healthy".to_string()
    };

    let output = RobotStatusOutput {
        schema_version: ROBOT_HELP_SCHEMA_VERSION.to_string(),
        tool: "coord-agent".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        status,
        checks,
        exit_code,
    };

    let rendered = if format.eq_ignore_ascii_case("yaml") {
        serde_yaml::to_string(&output).unwrap_or_default()
    } else {
        serde_json::to_string_pretty(&output).unwrap_or_default()
    };
    println!("{rendered}");
    exit_code
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

async fn handle_team_command(cmd: TeamCommands, store: &Store) -> anyhow::Result<()> {
    match cmd {
        TeamCommands::Create { name, description, lead_agent_id } => {
            let config = TeamConfig {
                name: name.clone(),
                description,
                created_at: now_ms(),
                lead_agent_id: format!("lead-{lead_agent_id}"),
                phase: Phase::Planning,
                members: vec![TeamMember {
                    agent_id: lead_agent_id.clone(),
                    name: lead_agent_id.clone(),
                    role: "team-lead".to_string(),
                    agent_type: "llm".to_string(),
                    model: "unknown".to_string(),
                    joined_at: now_ms(),
                    status: MemberStatus::Active,
                    current_task_id: None,
                    cwd: None,
                    tool_overrides: None,
                }],
                settings: TeamSettings { max_members: 25, auto_assign: false },
            };
            store.create_team(config).await?;
            coord_core::discovery::set_last_active_team(store, &name).await;
            println!("created team \"{name}\" (phase: planning, lead: {lead_agent_id})");
        }
        TeamCommands::List => {
            for name in store.list_team_names().await? {
                println!("{name}");
            }
        }
        TeamCommands::Show { name } => {
            let config = store
                .load_team_config(&name)
                .await?
                .ok_or_else(|| anyhow::anyhow!("team \"{name}\" not found"))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

async fn handle_task_command(cmd: TaskCommands, store: &Store) -> anyhow::Result<()> {
    match cmd {
        TaskCommands::Create { team, id, subject, description, blocked_by, blocks } => {
            let now = now_ms();
            let task = TeamTask {
                id: id.clone(),
                subject,
                description,
                status: TaskStatus::Pending,
                priority: TaskPriority::Medium,
                owner: None,
                blocked_by,
                blocks,
                phase: None,
                active_form: None,
                created_at: now,
                updated_at: now,
                metadata: None,
            };
            store.create_task(&team, task).await?;
            println!("created task \"{id}\" in team \"{team}\"");
        }
        TaskCommands::Update { team, id, status, priority, owner } => {
            let status = status.map(|s| parse_task_status(&s)).transpose()?;
            let priority = priority.map(|p| parse_task_priority(&p)).transpose()?;
            let patch = TaskPatch {
                subject: None,
                description: None,
                status,
                priority,
                owner,
                blocked_by: None,
                blocks: None,
                phase: None,
                active_form: None,
                metadata: None,
            };
            let task = store.update_task(&team, &id, patch).await?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskCommands::List { team } => {
            let tasks = store.list_tasks(&team).await?;
            println!("{}", serde_json::to_string_pretty(&tasks)?);
        }
        TaskCommands::Get { team, id } => {
            let task = store
                .get_task(&team, &id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("task \"{id}\" not found in team \"{team}\""))?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
    }
    Ok(())
}

fn parse_task_status(s: &str) -> anyhow::Result<TaskStatus> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| anyhow::anyhow!("invalid task status \"{s}\""))
}

fn parse_task_priority(s: &str) -> anyhow::Result<TaskPriority> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| anyhow::anyhow!("invalid task priority \"{s}\""))
}

async fn handle_message_command(cmd: MessageCommands, store: &Store) -> anyhow::Result<()> {
    match cmd {
        MessageCommands::Send { team, from, to, text, summary } => {
            let msg = ProtocolMessage::new(
                chrono::Utc::now().to_rfc3339(),
                MessageBody::Message { from: from.clone(), to: to.clone(), text, summary },
            );
            store.send_message(&team, &to, msg).await?;
            println!("delivered message from \"{from}\" to \"{to}\" in team \"{team}\"");
        }
        MessageCommands::Inbox { team, agent } => {
            let inbox = store.read_inbox(&team, &agent).await?;
            println!("{}", serde_json::to_string_pretty(&inbox)?);
        }
        MessageCommands::ClearInbox { team, agent } => {
            store.clear_inbox(&team, &agent).await?;
            println!("cleared inbox for \"{agent}\" in team \"{team}\"");
        }
    }
    Ok(())
}

fn parse_grant_type(s: &str) -> anyhow::Result<GrantType> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| anyhow::anyhow!("invalid grant type \"{s}\""))
}

async fn handle_credit_command(cmd: CreditCommands, ledger: &CreditLedger) -> anyhow::Result<()> {
    match cmd {
        CreditCommands::Grant { user_id, amount, grant_type, priority, operation_id, description } => {
            let principal = Principal::User(user_id.clone());
            let grant = ledger
                .grant_credit(
                    &principal,
                    CreditGrantForCreate {
                        user_id,
                        org_id: None,
                        grant_type: parse_grant_type(&grant_type)?,
                        amount,
                        priority,
                        expires_at: None,
                        operation_id,
                        description,
                        stripe_subscription_id: None,
                    },
                    now_ms(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&grant)?);
        }
        CreditCommands::Consume { user_id, amount } => {
            let principal = Principal::User(user_id);
            let result = ledger.consume(&principal, amount, now_ms()).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        CreditCommands::Balance { user_id, cycle_start } => {
            let principal = Principal::User(user_id);
            let usage = ledger.calculate_usage_and_balance(&principal, cycle_start, now_ms()).await?;
            println!("{}", serde_json::to_string_pretty(&usage)?);
        }
        CreditCommands::Revoke { user_id, operation_id } => {
            let principal = Principal::User(user_id);
            ledger.revoke_grant_by_operation_id(&principal, &operation_id).await?;
            println!("revoked grant \"{operation_id}\"");
        }
    }
    Ok(())
}

async fn handle_status_command(team: &str, store: &Store) -> anyhow::Result<()> {
    let report = coord_core::report::build_team_report(store, team)
        .await?
        .ok_or_else(|| anyhow::anyhow!("team \"{team}\" not found"))?;
    println!("{}", serde_json::to_string_pretty(&report.to_json())?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    panic_hook::init_panic_hook();

    let cli = Cli::parse();

    if cli.robot_help {
        handle_robot_help(&cli.format);
        return Ok(());
    }

    if cli.robot_status {
        let code = handle_robot_status(&cli.format);
        if code != 0 {
            std::process::exit(code as i32);
        }
        return Ok(());
    }

    setup_tracing(cli.log_format == "json");
    let config = load_config();
    let store = Store::new(config_root());
    let ledger = CreditLedger::new(config_root());

    match cli.command {
        Some(Commands::Serve(args)) => match args.command {
            ServeCommands::Http { port } => handle_serve_http(port, config).await?,
            ServeCommands::Mcp { transport } => handle_serve_mcp(transport).await?,
        },
        Some(Commands::Health { url }) => handle_health(url).await?,
        Some(Commands::Config(args)) => handle_config_command(args.command)?,
        Some(Commands::Schema { format, output }) => handle_schema(format, output)?,
        Some(Commands::Team(args)) => handle_team_command(args.command, &store).await?,
        Some(Commands::Task(args)) => handle_task_command(args.command, &store).await?,
        Some(Commands::Message(args)) => handle_message_command(args.command, &store).await?,
        Some(Commands::Credit(args)) => handle_credit_command(args.command, &ledger).await?,
        Some(Commands::Status { team }) => handle_status_command(&team, &store).await?,
        Some(Commands::Version) => println!("coord-agent v{}", env!("CARGO_PKG_VERSION")),
        None => {
            Cli::command().print_help()?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_port_rejects_in_use_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let result = validate_port(port);
        assert!(result.is_err());
        drop(listener);
    }

    #[test]
    fn test_validate_port_accepts_free_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(validate_port(port).is_ok());
    }

    #[test]
    fn test_parse_task_status_rejects_unknown() {
        assert!(parse_task_status("nonexistent").is_err());
    }

    #[test]
    fn test_parse_task_status_accepts_known() {
        assert_eq!(parse_task_status("pending").unwrap(), TaskStatus::Pending);
    }

    #[test]
    fn test_parse_grant_type_accepts_known() {
        assert_eq!(parse_grant_type("purchase").unwrap(), GrantType::Purchase);
    }
}
