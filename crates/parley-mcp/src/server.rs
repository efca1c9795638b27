//! MCP server implementation for parley.

use std::sync::Arc;

use crate::tools::{AskHumanParams, BroadcastLogParams, InitTaskSessionParams};
use parley_telegram::{CancellationToken, TelegramDesk, ThreadId};
use rmcp::ErrorData as McpError;
use rmcp::RoleServer;
use rmcp::ServiceExt;
use rmcp::handler::server::ServerHandler;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::tool;
use rmcp::tool_router;
use tracing::{info, warn};

/// MCP server that routes agent questions and updates to Telegram topics.
#[derive(Clone)]
pub struct ParleyMcpServer {
    desk: Arc<TelegramDesk>,
    tool_router: ToolRouter<Self>,
}

impl ParleyMcpServer {
    pub fn new(desk: TelegramDesk) -> Self {
        Self {
            desk: Arc::new(desk),
            tool_router: Self::tool_router(),
        }
    }

    /// Create a topic and return its thread id.
    pub async fn open_task(&self, task_name: &str) -> Result<String, String> {
        self.desk
            .open_session(task_name)
            .await
            .map(|session| session.thread_id.to_string())
            .map_err(|e| format!("Error creating task session: {e}"))
    }

    /// Post `message` into the topic.
    pub async fn broadcast(&self, thread_id: &str, message: &str) -> Result<String, String> {
        let fail = |e: String| format!("Error broadcasting log: {e}");
        let session = self.desk.session(parse_thread_id(thread_id).map_err(fail)?);
        self.desk
            .post_update(&session, message)
            .await
            .map(|_| "Log sent successfully".to_string())
            .map_err(|e| fail(e.to_string()))
    }

    /// Ask in the topic and wait for the answer text or chosen button label.
    pub async fn ask(
        &self,
        thread_id: &str,
        question: &str,
        options: &[String],
        cancel: &CancellationToken,
    ) -> Result<String, String> {
        let fail = |e: String| format!("Error asking human: {e}");
        let session = self.desk.session(parse_thread_id(thread_id).map_err(fail)?);
        self.desk
            .ask_and_wait(&session, question, options, cancel)
            .await
            .map(parley_telegram::Reply::into_text)
            .map_err(|e| fail(e.to_string()))
    }
}

fn parse_thread_id(raw: &str) -> Result<ThreadId, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("invalid thread id '{raw}': expected an integer"))
}

/// Maps an operation outcome onto a tool result.
///
/// Failures are still successful JSON-RPC responses, flagged `isError`.
fn tool_result(outcome: Result<String, String>) -> Result<CallToolResult, McpError> {
    match outcome {
        Ok(text) => text_result(text),
        Err(text) => {
            warn!(error = %text, "tool call failed");
            error_result(text)
        }
    }
}

/// Creates a successful text result.
fn text_result(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

/// Creates an error text result.
fn error_result(text: impl Into<String>) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(text)]))
}

#[tool_router]
impl ParleyMcpServer {
    #[tool(description = "Create a new Telegram forum topic for a task. \
        Call once at the start of a task; returns the thread_id (as a string) that \
        broadcast_log and ask_human_and_wait need.")]
    async fn init_task_session(
        &self,
        Parameters(params): Parameters<InitTaskSessionParams>,
    ) -> Result<CallToolResult, McpError> {
        tool_result(self.open_task(&params.task_name).await)
    }

    #[tool(description = "Send a log or status message to the task's Telegram topic. \
        Does not wait for a reply. Returns a confirmation string.")]
    async fn broadcast_log(
        &self,
        Parameters(params): Parameters<BroadcastLogParams>,
    ) -> Result<CallToolResult, McpError> {
        tool_result(self.broadcast(&params.thread_id, &params.message).await)
    }

    #[tool(description = "Send a question to the task's Telegram topic and WAIT for the \
        human's reply. Use this to ask for the next instruction or a clarification. \
        Returns the reply text, or the label of the button the human pressed. \
        There is no timeout; cancel the call to stop waiting.")]
    async fn ask_human_and_wait(
        &self,
        Parameters(params): Parameters<AskHumanParams>,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let options = params.options.unwrap_or_default();
        tool_result(
            self.ask(&params.thread_id, &params.question, &options, &context.ct)
                .await,
        )
    }
}

impl ServerHandler for ParleyMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut info = ServerInfo::default();
        info.protocol_version = ProtocolVersion::V_2024_11_05;
        info.capabilities = ServerCapabilities::builder().enable_tools().build();
        info.server_info = Implementation::from_build_env();
        info.instructions = Some(
            "Parley connects you to a human operator through a Telegram group with forum topics. \
             Workflow: (1) init_task_session once per task to get a thread_id, \
             (2) broadcast_log to report progress, (3) ask_human_and_wait when you need a \
             decision or clarification. Keep button options short."
                .to_string(),
        );
        info
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let ctx = ToolCallContext::new(self, request, context);
        self.tool_router.call(ctx).await
    }
}

/// Serves the MCP server over stdio.
///
/// This is the main entry point for `parley serve`.
pub async fn serve_stdio(desk: TelegramDesk) -> anyhow::Result<()> {
    info!(channel = %desk.channel(), "Starting parley MCP server on stdio");

    let server = ParleyMcpServer::new(desk);

    let transport = (tokio::io::stdin(), tokio::io::stdout());
    let service = server.serve(transport).await?;
    service.waiting().await?;

    info!("parley MCP server stopped");
    Ok(())
}
