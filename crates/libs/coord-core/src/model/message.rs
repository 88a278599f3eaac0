//! Tagged-union protocol message carried by the Message Fabric (spec
//! section 3). `timestamp` is common to every variant; schema validation at
//! read time is mandatory since messages may have been written by a
//! different protocol version.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    IdleNotification {
        from: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(rename = "completedTaskId", skip_serializing_if = "Option::is_none")]
        completed_task_id: Option<String>,
    },
    TaskCompleted {
        from: String,
        #[serde(rename = "taskId")]
        task_id: String,
        #[serde(rename = "taskSubject")]
        task_subject: String,
    },
    ShutdownRequest {
        #[serde(rename = "requestId")]
        request_id: String,
        from: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    ShutdownApproved {
        #[serde(rename = "requestId")]
        request_id: String,
        from: String,
    },
    ShutdownRejected {
        #[serde(rename = "requestId")]
        request_id: String,
        from: String,
        reason: String,
    },
    PlanApprovalRequest {
        #[serde(rename = "requestId")]
        request_id: String,
        from: String,
        #[serde(rename = "planContent")]
        plan_content: String,
    },
    PlanApprovalResponse {
        #[serde(rename = "requestId")]
        request_id: String,
        approved: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
    Message {
        from: String,
        to: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    Broadcast {
        from: String,
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub timestamp: String,
    #[serde(flatten)]
    pub body: MessageBody,
}

impl ProtocolMessage {
    pub fn new(timestamp: String, body: MessageBody) -> Self {
        Self { timestamp, body }
    }

    /// The sender identifier present on every variant.
    pub fn from(&self) -> &str {
        match &self.body {
            MessageBody::IdleNotification { from, .. }
            | MessageBody::TaskCompleted { from, .. }
            | MessageBody::ShutdownRequest { from, .. }
            | MessageBody::ShutdownApproved { from, .. }
            | MessageBody::ShutdownRejected { from, .. }
            | MessageBody::PlanApprovalRequest { from, .. }
            | MessageBody::Message { from, .. }
            | MessageBody::Broadcast { from, .. } => from,
            MessageBody::PlanApprovalResponse { .. } => "",
        }
    }
}

pub type Inbox = Vec<ProtocolMessage>;
