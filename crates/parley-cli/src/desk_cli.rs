//! Telegram-facing subcommands: `serve`, `send`, `verify`, `token`.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use parley_telegram::{
    ConfigError, ConfigSources, DEFAULT_CONFIG_FILE, TelegramConfig, TelegramDesk, ThreadId,
};
use tracing::{info, warn};

const KEYCHAIN_SERVICE: &str = "parley";
const KEYCHAIN_USER: &str = "telegram-bot-token";

const VERIFY_TOPIC: &str = "Installation Verification";

// ─────────────────────────────────────────────────────────────────────────────
// CLI STRUCTS
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Message text (same Markdown subset as broadcast_log)
    #[arg(value_name = "MESSAGE")]
    pub message: String,

    /// Name of the topic to create for the message
    #[arg(long, default_value = "Agent Chat")]
    pub topic: String,

    /// Post into this existing thread instead of creating a topic
    #[arg(long, value_name = "ID", conflicts_with = "topic")]
    pub thread: Option<ThreadId>,
}

#[derive(Parser, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommands,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommands {
    /// Store or overwrite the bot token
    Set(SetTokenArgs),
}

#[derive(Parser, Debug)]
pub struct SetTokenArgs {
    /// Telegram bot token to store
    #[arg(value_name = "TOKEN")]
    pub token: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// COMMANDS
// ─────────────────────────────────────────────────────────────────────────────

/// `parley serve`: the MCP server. Exits non-zero before serving if the
/// destination is not configured.
pub async fn serve(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let desk = TelegramDesk::from_config(&config).context("Failed to set up Telegram client")?;
    parley_mcp::serve_stdio(desk).await
}

/// `parley send`: post one message, creating a topic unless `--thread` is given.
pub async fn send(args: SendArgs, config_path: Option<&Path>, use_colors: bool) -> Result<()> {
    let config = resolve_config(config_path)?;
    let desk = TelegramDesk::from_config(&config).context("Failed to set up Telegram client")?;

    let session = match args.thread {
        Some(thread_id) => desk.session(thread_id),
        None => {
            let session = desk
                .open_session(&args.topic)
                .await
                .with_context(|| format!("Failed to create topic '{}'", args.topic))?;
            print_status(
                use_colors,
                &format!("Created topic '{}' (thread {})", args.topic, session.thread_id),
            );
            session
        }
    };

    match desk.post_update(&session, &args.message).await {
        Ok(delivered) => {
            print_success(
                use_colors,
                &format!(
                    "Message sent to thread {} (message {})",
                    delivered.thread_id, delivered.message_id
                ),
            );
            Ok(())
        }
        Err(e) => {
            print_error(use_colors, &format!("Failed to send message: {e}"));
            Err(e).context("Failed to send message")
        }
    }
}

/// `parley verify`: configuration, `getMe`, topic creation and a broadcast.
pub async fn verify(config_path: Option<&Path>, use_colors: bool) -> Result<()> {
    println!("Verifying parley setup\n");

    let config = match resolve_config(config_path) {
        Ok(config) => {
            print_success(
                use_colors,
                &format!(
                    "Loaded configuration (token {}, group {})",
                    config.bot_token_masked(),
                    config.channel_id
                ),
            );
            config
        }
        Err(e) => {
            print_error(use_colors, &format!("{e:#}"));
            return Err(e);
        }
    };
    let desk = TelegramDesk::from_config(&config).context("Failed to set up Telegram client")?;

    match desk.check_connection().await {
        Ok(identity) => {
            let name = identity
                .username
                .map_or(identity.first_name, |username| format!("@{username}"));
            print_success(use_colors, &format!("Connected as {name}"));
        }
        Err(e) => {
            print_error(use_colors, &format!("Bot token rejected or unreachable: {e}"));
            return Err(e).context("getMe failed");
        }
    }

    let session = match desk.open_session(VERIFY_TOPIC).await {
        Ok(session) => {
            print_success(
                use_colors,
                &format!("Created topic with thread id {}", session.thread_id),
            );
            session
        }
        Err(e) => {
            print_error(use_colors, &format!("Failed to create topic: {e}"));
            print_status(
                use_colors,
                "The group must be a forum and the bot an admin allowed to manage topics",
            );
            return Err(e).context("createForumTopic failed");
        }
    };

    match desk
        .post_update(&session, "Installation verified successfully by **parley**.")
        .await
    {
        Ok(_) => {
            print_success(use_colors, "Broadcast delivered");
            Ok(())
        }
        Err(e) => {
            print_error(use_colors, &format!("Failed to broadcast: {e}"));
            Err(e).context("sendMessage failed")
        }
    }
}

pub fn token(args: TokenArgs, use_colors: bool) -> Result<()> {
    match args.command {
        TokenCommands::Set(set_args) => {
            let token = set_args.token.trim();
            if token.is_empty() {
                anyhow::bail!("Token cannot be empty");
            }
            store_bot_token(token)?;
            print_success(use_colors, "Bot token saved to the OS keychain");
            Ok(())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CONFIG HELPERS
// ─────────────────────────────────────────────────────────────────────────────

/// Resolve config from all sources (env > keychain > config file).
fn resolve_config(config_path: Option<&Path>) -> Result<TelegramConfig> {
    let file = match config_path {
        Some(path) => ConfigSources::from_file(path)?,
        None => ConfigSources::from_optional_file(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    let config = resolve_from(ConfigSources::from_env(), load_bot_token(), file)
        .context("Failed to resolve Telegram configuration")?;
    info!(channel = %config.channel_id, api_base = %config.api_base, "configuration resolved");
    Ok(config)
}

fn resolve_from(
    env: ConfigSources,
    keychain_token: Option<String>,
    file: ConfigSources,
) -> Result<TelegramConfig, ConfigError> {
    let keychain = ConfigSources {
        bot_token: keychain_token,
        ..ConfigSources::default()
    };
    TelegramConfig::resolve(&[env, keychain, file])
}

// ─────────────────────────────────────────────────────────────────────────────
// KEYCHAIN HELPERS
// ─────────────────────────────────────────────────────────────────────────────

/// Store bot token in OS keychain.
fn store_bot_token(token: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_USER)
        .context("Failed to create keychain entry")?;
    if let Err(err) = entry.set_password(token) {
        // Some keychains refuse overwrites; try delete + set as a fallback.
        if entry.delete_credential().is_ok() {
            entry
                .set_password(token)
                .context("Failed to store token in keychain after deleting existing entry")?;
        } else {
            return Err(anyhow::anyhow!("Failed to store token in keychain: {err}"));
        }
    }
    Ok(())
}

/// Load bot token from OS keychain. No keychain service means no token.
fn load_bot_token() -> Option<String> {
    match keyring::Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_USER).and_then(|e| e.get_password()) {
        Ok(token) => Some(token),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(error = %e, "keychain unavailable, skipping stored token");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OUTPUT HELPERS
// ─────────────────────────────────────────────────────────────────────────────

fn print_success(use_colors: bool, msg: &str) {
    if use_colors {
        println!("  \x1b[32m\u{2713}\x1b[0m {msg}");
    } else {
        println!("  OK: {msg}");
    }
}

fn print_error(use_colors: bool, msg: &str) {
    if use_colors {
        println!("  \x1b[31m\u{2717}\x1b[0m {msg}");
    } else {
        println!("  ERROR: {msg}");
    }
}

fn print_status(use_colors: bool, msg: &str) {
    if use_colors {
        println!("  \x1b[2m-\x1b[0m {msg}");
    } else {
        println!("  {msg}");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TESTS
// ─────────────────────────────────────────────────────────────────────────────
