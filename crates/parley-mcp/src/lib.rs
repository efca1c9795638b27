//! # parley-mcp
//!
//! MCP (Model Context Protocol) server that lets an agent talk to a human
//! operator through Telegram forum topics. Tools available:
//!
//! - `init_task_session` - Open a new topic for a task and return its thread id
//! - `broadcast_log` - Post a status update into a task's topic
//! - `ask_human_and_wait` - Ask a question (optionally with buttons) and block
//!   until the human answers

mod server;
mod tools;

pub use server::{ParleyMcpServer, serve_stdio};
pub use tools::{AskHumanParams, BroadcastLogParams, InitTaskSessionParams};
