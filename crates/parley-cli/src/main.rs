//! # parley-cli
//!
//! Binary entry point for parley.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Configuration assembly (flags, environment, keychain, `parley.yml`)
//! - The MCP server on stdio via `parley serve`
//! - One-off messaging via `parley send` and a setup check via `parley verify`

mod desk_cli;

use std::io::{IsTerminal, stdout};
use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use crate::desk_cli::{SendArgs, TokenArgs};

/// Parley - Telegram forum-topic conversations between agents and humans
#[derive(Parser, Debug)]
#[command(name = "parley", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    // ─────────────────────────────────────────────────────────────────────────
    // Global options (available for all subcommands)
    // ─────────────────────────────────────────────────────────────────────────
    /// Path to configuration file (defaults to parley.yml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Color output mode (auto, always, never)
    #[arg(long, value_enum, default_value_t = ColorMode::Auto, global = true)]
    color: ColorMode,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the MCP server on stdio (default if no subcommand given)
    Serve,

    /// Post a message into a new or existing topic
    Send(SendArgs),

    /// Check configuration and connectivity end to end
    Verify,

    /// Manage the bot token stored in the OS keychain
    Token(TokenArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Color output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum ColorMode {
    /// Automatically detect if stdout is a TTY
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl ColorMode {
    /// Returns true if colors should be used based on mode and terminal detection.
    fn should_use_colors(self) -> bool {
        match self {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => stdout().is_terminal(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let use_colors = cli.color.should_use_colors();
    let config = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => desk_cli::serve(config).await,
        Commands::Send(args) => desk_cli::send(args, config, use_colors).await,
        Commands::Verify => desk_cli::verify(config, use_colors).await,
        Commands::Token(args) => desk_cli::token(args, use_colors),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "parley", &mut stdout());
            Ok(())
        }
    }
}

/// Logs go to stderr without ANSI codes: stdout carries the MCP stream.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
