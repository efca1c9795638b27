//! MCP tool parameter definitions.
//!
//! These structs define the JSON Schema for MCP tool parameters.
//! The `schemars` descriptions are what LLMs see when choosing tools.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the init_task_session tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InitTaskSessionParams {
    /// Name of the new forum topic
    #[schemars(
        description = "Short name for the task, used as the Telegram topic title. \
        Examples: 'Deploy v2.3', 'Fix flaky login test'"
    )]
    pub task_name: String,
}

/// Parameters for the broadcast_log tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BroadcastLogParams {
    /// Topic to post into
    #[schemars(description = "Thread id returned by init_task_session.")]
    pub thread_id: String,

    /// Status text
    #[schemars(
        description = "Message to post. Supports **bold**, _italic_, `code`, \
        ```code blocks``` and '- ' bullet lists."
    )]
    pub message: String,
}

/// Parameters for the ask_human_and_wait tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AskHumanParams {
    /// Topic to ask in
    #[schemars(description = "Thread id returned by init_task_session.")]
    pub thread_id: String,

    /// The question
    #[schemars(description = "Question to send. Same formatting as broadcast_log.")]
    pub question: String,

    /// Optional answer buttons
    #[schemars(
        description = "Optional short answers (3-4 at most) shown as buttons, one per row. \
        Example: [\"Run Tests\", \"Deploy\", \"Explain Code\"]. The human may still reply \
        with free text."
    )]
    #[serde(default)]
    pub options: Option<Vec<String>>,
}
