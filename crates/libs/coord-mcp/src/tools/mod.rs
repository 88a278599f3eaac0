//! MCP tool implementations exposing the coordination fabric: team
//! creation, message sending, and task CRUD, each gated through the Phase
//! Engine's tool table before it runs.

use rmcp::{
    ErrorData as McpError,
    handler::server::{ServerHandler, tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use coord_core::model::message::{MessageBody, ProtocolMessage};
use coord_core::model::task::{TaskPatch, TaskPriority, TaskStatus, TeamTask};
use coord_core::model::team::{MemberStatus, TeamConfig, TeamMember, TeamSettings};
use coord_core::store::Store;

pub mod helpers;
pub mod params;

pub use params::*;

// ============================================================================
// Schema export types, mirrors the teacher's `get_tool_schemas` surface so
// `coord-agent --schema` can print it without spinning up a transport.
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub min_phase: Option<String>,
}

const TOOL_NAMES: &[(&str, &str)] = &[
    ("team_create", "Create a new team with a lead agent."),
    ("send_message", "Send a message from one team member to another."),
    ("task_create", "Create a dependency-tracked task within a team."),
    ("task_update", "Apply a partial update to an existing task."),
    ("task_list", "List every task in a team."),
    ("task_get", "Fetch a single task by id."),
];

pub fn get_tool_schemas() -> Vec<ToolSchema> {
    TOOL_NAMES
        .iter()
        .map(|(name, description)| ToolSchema {
            name: name.to_string(),
            description: description.to_string(),
            min_phase: coord_core::phase::minimum_phase_for_tool(name).map(|p| p.to_string()),
        })
        .collect()
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Clone)]
pub struct CoordinationService {
    store: Arc<Store>,
    tool_router: ToolRouter<Self>,
}

impl CoordinationService {
    pub async fn new(config_root: PathBuf) -> anyhow::Result<Self> {
        Ok(Self::new_with_store(Arc::new(Store::new(config_root))))
    }

    pub fn new_with_store(store: Arc<Store>) -> Self {
        Self {
            store,
            tool_router: Self::tool_router(),
        }
    }
}

impl ServerHandler for CoordinationService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(ListToolsResult {
                tools: self.tool_router.list_all(),
                next_cursor: None,
                meta: None,
            })
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let tool_context =
                rmcp::handler::server::tool::ToolCallContext::new(self, request, context);
            self.tool_router.call(tool_context).await
        }
    }
}

#[tool_router]
impl CoordinationService {
    #[tool(description = "Create a new team with a lead agent. The team starts in the planning phase.")]
    async fn team_create(
        &self,
        params: Parameters<TeamCreateParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;

        let (_, existing) = helpers::resolve_team_and_check_phase(
            &self.store,
            &p.lead_agent_id,
            Some(p.name.as_str()),
            "team_create",
        )
        .await?;
        if existing.is_some() {
            return Err(McpError::invalid_request(
                format!("team \"{}\" already exists", p.name),
                None,
            ));
        }

        let config = TeamConfig {
            name: p.name.clone(),
            description: p.description,
            created_at: now_ms(),
            lead_agent_id: format!("lead-{}", p.lead_agent_id),
            phase: coord_core::phase::Phase::Planning,
            members: vec![TeamMember {
                agent_id: p.lead_agent_id.clone(),
                name: p.lead_agent_id.clone(),
                role: "team-lead".into(),
                agent_type: "llm".into(),
                model: "unknown".into(),
                joined_at: now_ms(),
                status: MemberStatus::Active,
                current_task_id: None,
                cwd: None,
                tool_overrides: None,
            }],
            settings: TeamSettings {
                max_members: 25,
                auto_assign: false,
            },
        };

        self.store
            .create_team(config)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        coord_core::discovery::set_last_active_team(&self.store, &p.name).await;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "created team \"{}\" (phase: planning, lead: {})",
            p.name, p.lead_agent_id
        ))]))
    }

    #[tool(description = "Send a message from one team member to another.")]
    async fn send_message(
        &self,
        params: Parameters<SendMessageParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;

        let (team, _) = helpers::resolve_team_and_check_phase(
            &self.store,
            &p.from,
            p.team.as_deref(),
            "send_message",
        )
        .await?;

        let msg = ProtocolMessage::new(
            now_rfc3339(),
            MessageBody::Message {
                from: p.from.clone(),
                to: p.to.clone(),
                text: p.text,
                summary: p.summary,
            },
        );

        self.store
            .send_message(&team, &p.to, msg)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "delivered message from \"{}\" to \"{}\" in team \"{team}\"",
            p.from, p.to
        ))]))
    }

    #[tool(description = "Create a dependency-tracked task within a team.")]
    async fn task_create(
        &self,
        params: Parameters<TaskCreateParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;

        let (team, _) = helpers::resolve_team_and_check_phase(
            &self.store,
            &p.agent_id,
            p.team.as_deref(),
            "task_create",
        )
        .await?;

        let now = now_ms();
        let task = TeamTask {
            id: p.id.clone(),
            subject: p.subject,
            description: p.description,
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            owner: None,
            blocked_by: p.blocked_by,
            blocks: p.blocks,
            phase: None,
            active_form: None,
            created_at: now,
            updated_at: now,
            metadata: None,
        };

        self.store
            .create_task(&team, task)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(format!(
            "created task \"{}\" in team \"{team}\"",
            p.id
        ))]))
    }

    #[tool(description = "Apply a partial update to an existing task.")]
    async fn task_update(
        &self,
        params: Parameters<TaskUpdateParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;

        let (team, _) = helpers::resolve_team_and_check_phase(
            &self.store,
            &p.agent_id,
            p.team.as_deref(),
            "task_update",
        )
        .await?;

        let status = p.status.as_deref().map(helpers::parse_task_status).transpose()?;
        let priority = p
            .priority
            .as_deref()
            .map(helpers::parse_task_priority)
            .transpose()?;

        let patch = TaskPatch {
            subject: p.subject,
            description: p.description,
            status,
            priority,
            owner: p.owner,
            blocked_by: p.blocked_by,
            blocks: p.blocks,
            phase: None,
            active_form: None,
            metadata: None,
        };

        let task = self
            .store
            .update_task(&team, &p.id, patch)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&task).unwrap_or_default(),
        )]))
    }

    #[tool(description = "List every task in a team.")]
    async fn task_list(
        &self,
        params: Parameters<TaskListParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;

        let (team, _) = helpers::resolve_team_and_check_phase(
            &self.store,
            &p.agent_id,
            p.team.as_deref(),
            "task_list",
        )
        .await?;

        let tasks = self
            .store
            .list_tasks(&team)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&tasks).unwrap_or_default(),
        )]))
    }

    #[tool(description = "Fetch a single task by id.")]
    async fn task_get(
        &self,
        params: Parameters<TaskGetParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;

        let (team, _) = helpers::resolve_team_and_check_phase(
            &self.store,
            &p.agent_id,
            p.team.as_deref(),
            "task_get",
        )
        .await?;

        let task = self
            .store
            .get_task(&team, &p.id)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?
            .ok_or_else(|| McpError::invalid_params(format!("task \"{}\" not found", p.id), None))?;

        Ok(CallToolResult::success(vec![Content::text(
            serde_json::to_string_pretty(&task).unwrap_or_default(),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn service() -> (TempDir, CoordinationService) {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(Store::new(dir.path().to_path_buf()));
        (dir, CoordinationService::new_with_store(store))
    }

    #[tokio::test]
    async fn test_team_create_then_task_lifecycle() {
        let (_dir, svc) = service();

        svc.team_create(Parameters(TeamCreateParams {
            name: "alpha".into(),
            description: "test team".into(),
            lead_agent_id: "lead-1".into(),
        }))
        .await
        .expect("create team");

        svc.task_create(Parameters(TaskCreateParams {
            agent_id: "lead-1".into(),
            team: Some("alpha".into()),
            id: "1".into(),
            subject: "write tests".into(),
            description: String::new(),
            blocked_by: vec![],
            blocks: vec![],
        }))
        .await
        .expect("create task");

        let result = svc
            .task_get(Parameters(TaskGetParams {
                agent_id: "lead-1".into(),
                team: Some("alpha".into()),
                id: "1".into(),
            }))
            .await
            .expect("get task");
        assert!(!result.content.is_empty());
    }

    #[tokio::test]
    async fn test_send_message_gated_by_planning_phase() {
        let (_dir, svc) = service();

        svc.team_create(Parameters(TeamCreateParams {
            name: "alpha".into(),
            description: String::new(),
            lead_agent_id: "lead-1".into(),
        }))
        .await
        .expect("create team");

        let err = svc
            .send_message(Parameters(SendMessageParams {
                team: Some("alpha".into()),
                from: "lead-1".into(),
                to: "dev-1".into(),
                text: "hi".into(),
                summary: None,
            }))
            .await
            .expect_err("send_message requires pre-alpha, team is still planning");
        assert!(err.message.contains("not available"));
    }

    #[tokio::test]
    async fn test_team_create_rejects_duplicate() {
        let (_dir, svc) = service();

        svc.team_create(Parameters(TeamCreateParams {
            name: "alpha".into(),
            description: String::new(),
            lead_agent_id: "lead-1".into(),
        }))
        .await
        .expect("create team");

        let err = svc
            .team_create(Parameters(TeamCreateParams {
                name: "alpha".into(),
                description: String::new(),
                lead_agent_id: "lead-2".into(),
            }))
            .await
            .expect_err("duplicate team name");
        assert!(err.message.contains("already exists"));
    }
}
