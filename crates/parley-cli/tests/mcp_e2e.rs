//! End-to-end tests for the parley MCP server.
//!
//! These tests spawn `parley serve` as a subprocess and communicate
//! with it using the MCP JSON-RPC protocol over stdio. The Bot API base URL
//! points at a closed local port, so no request ever leaves the machine.

use anyhow::Result;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use wait_timeout::ChildExt;

const UNREACHABLE_API: &str = "http://127.0.0.1:9";

fn parley_command(dir: &Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_parley"));
    command
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command
}

/// Spawns `parley serve` with a complete (fake) configuration.
fn spawn_server(dir: &Path) -> Result<(Child, ChildStdin, BufReader<ChildStdout>)> {
    let mut child = parley_command(dir)
        .arg("serve")
        .env("TELEGRAM_BOT_TOKEN", "123456:test-token")
        .env("TELEGRAM_GROUP_ID", "-1001234567890")
        .env("TELEGRAM_API_BASE", UNREACHABLE_API)
        .spawn()?;

    let stdin = child.stdin.take().expect("Failed to get stdin");
    let stdout = child.stdout.take().expect("Failed to get stdout");
    Ok((child, stdin, BufReader::new(stdout)))
}

/// Sends a JSON-RPC request and reads the response.
/// Skips any non-JSON lines before the actual response.
fn send_request(
    stdin: &mut impl Write,
    stdout: &mut BufReader<impl std::io::Read>,
    request: Value,
) -> Result<Value> {
    writeln!(stdin, "{}", serde_json::to_string(&request)?)?;
    stdin.flush()?;

    loop {
        let mut response_line = String::new();
        let bytes_read = stdout.read_line(&mut response_line)?;
        if bytes_read == 0 {
            anyhow::bail!("EOF while waiting for response");
        }

        let trimmed = response_line.trim();
        if trimmed.starts_with('{') {
            let response: Value = serde_json::from_str(trimmed)?;
            return Ok(response);
        }
    }
}

/// Runs the initialize handshake and returns the initialize result.
fn initialize(stdin: &mut impl Write, stdout: &mut BufReader<impl std::io::Read>) -> Result<Value> {
    let init_request = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "test-client", "version": "1.0.0" }
        }
    });
    let response = send_request(stdin, stdout, init_request)?;

    let initialized = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
    writeln!(stdin, "{}", serde_json::to_string(&initialized)?)?;
    stdin.flush()?;

    Ok(response)
}

fn call_tool(
    stdin: &mut impl Write,
    stdout: &mut BufReader<impl std::io::Read>,
    id: u64,
    name: &str,
    arguments: Value,
) -> Result<Value> {
    let request = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": { "name": name, "arguments": arguments }
    });
    let response = send_request(stdin, stdout, request)?;
    Ok(response.get("result").cloned().expect("Should have result"))
}

fn first_text(result: &Value) -> &str {
    result["content"][0]["text"]
        .as_str()
        .expect("Should have text content")
}

/// Helper to cleanly shut down a child process.
fn shutdown_child(mut child: Child) {
    let _ = child.wait_timeout(Duration::from_secs(2));
    child.kill().ok();
    child.wait().ok();
}

#[test]
fn test_mcp_server_initialization() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (child, mut stdin, mut reader) = spawn_server(temp_dir.path())?;

    let response = initialize(&mut stdin, &mut reader)?;

    let result = response.get("result").expect("Should have result");
    assert!(result.get("serverInfo").is_some(), "Should have serverInfo");
    assert!(
        result
            .get("capabilities")
            .and_then(|c| c.get("tools"))
            .is_some(),
        "Should have tools capability"
    );

    drop(stdin);
    shutdown_child(child);
    Ok(())
}

#[test]
fn test_mcp_tools_list() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (child, mut stdin, mut reader) = spawn_server(temp_dir.path())?;
    initialize(&mut stdin, &mut reader)?;

    let list_tools = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
    let response = send_request(&mut stdin, &mut reader, list_tools)?;

    let tools = response["result"]["tools"]
        .as_array()
        .expect("Tools should be array");
    let mut tool_names: Vec<&str> = tools
        .iter()
        .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
        .collect();
    tool_names.sort_unstable();
    assert_eq!(
        tool_names,
        vec!["ask_human_and_wait", "broadcast_log", "init_task_session"]
    );

    let ask = tools
        .iter()
        .find(|t| t["name"] == "ask_human_and_wait")
        .expect("ask_human_and_wait listed");
    let required = ask["inputSchema"]["required"]
        .as_array()
        .expect("required list");
    assert!(required.contains(&json!("thread_id")));
    assert!(required.contains(&json!("question")));
    assert!(!required.contains(&json!("options")));

    drop(stdin);
    shutdown_child(child);
    Ok(())
}

#[test]
fn test_bad_thread_id_is_an_error_result() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (child, mut stdin, mut reader) = spawn_server(temp_dir.path())?;
    initialize(&mut stdin, &mut reader)?;

    let result = call_tool(
        &mut stdin,
        &mut reader,
        3,
        "broadcast_log",
        json!({"thread_id": "abc", "message": "hello"}),
    )?;

    assert_eq!(result["isError"], json!(true));
    assert!(first_text(&result).starts_with("Error broadcasting log:"));

    drop(stdin);
    shutdown_child(child);
    Ok(())
}

#[test]
fn test_unreachable_api_is_an_error_result() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let (child, mut stdin, mut reader) = spawn_server(temp_dir.path())?;
    initialize(&mut stdin, &mut reader)?;

    let result = call_tool(
        &mut stdin,
        &mut reader,
        4,
        "init_task_session",
        json!({"task_name": "Deploy"}),
    )?;

    assert_eq!(result["isError"], json!(true));
    let text = first_text(&result);
    assert!(text.starts_with("Error creating task session:"));
    assert!(!text.contains("test-token"), "token must not leak: {text}");

    drop(stdin);
    shutdown_child(child);
    Ok(())
}

#[test]
fn test_serve_without_configuration_exits_non_zero() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut child = parley_command(temp_dir.path())
        .arg("serve")
        .env_remove("TELEGRAM_BOT_TOKEN")
        .env_remove("TELEGRAM_GROUP_ID")
        .env_remove("TELEGRAM_API_BASE")
        .spawn()?;

    let status = match child.wait_timeout(Duration::from_secs(10))? {
        Some(status) => status,
        None => {
            child.kill().ok();
            anyhow::bail!("parley serve kept running without configuration");
        }
    };
    assert!(!status.success());
    Ok(())
}

#[test]
fn test_serve_with_username_group_id_exits_non_zero() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = parley_command(temp_dir.path())
        .arg("serve")
        .env("TELEGRAM_BOT_TOKEN", "123456:test-token")
        .env("TELEGRAM_GROUP_ID", "@ops_room")
        .env("TELEGRAM_API_BASE", UNREACHABLE_API)
        .stdin(Stdio::null())
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not a numeric chat id"), "stderr: {stderr}");
    Ok(())
}

#[test]
fn test_serve_reads_config_file() -> Result<()> {
    let temp_dir = TempDir::new()?;
    std::fs::write(
        temp_dir.path().join("parley.yml"),
        format!(
            "telegram:\n  bot_token: \"123456:file-token\"\n  group_id: -1001234567890\n  api_base: {UNREACHABLE_API}\n"
        ),
    )?;

    let mut child = parley_command(temp_dir.path())
        .arg("serve")
        .env_remove("TELEGRAM_BOT_TOKEN")
        .env_remove("TELEGRAM_GROUP_ID")
        .env_remove("TELEGRAM_API_BASE")
        .spawn()?;
    let mut stdin = child.stdin.take().expect("Failed to get stdin");
    let mut reader = BufReader::new(child.stdout.take().expect("Failed to get stdout"));

    let response = initialize(&mut stdin, &mut reader)?;
    assert!(response.get("result").is_some(), "Should have result");

    drop(stdin);
    shutdown_child(child);
    Ok(())
}
