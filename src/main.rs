//! claude-relay - Remote control of Claude Code prompts via Slack.

use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use claude_relay::commands::{add_claude_home, run_setup, HookInstaller};
use claude_relay::config::{
    relay_home, session_exists, EnabledSessions, RelayConfig, RelayState,
};
use claude_relay::hooks::{HookInput, HookRunner, NotifyEvent};
use claude_relay::permissions::SessionCache;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NotifyArg {
    Stop,
    Notification,
}

impl From<NotifyArg> for NotifyEvent {
    fn from(arg: NotifyArg) -> Self {
        match arg {
            NotifyArg::Stop => NotifyEvent::Stop,
            NotifyArg::Notification => NotifyEvent::Notification,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "claude-relay",
    about = "Approve, deny, and answer Claude Code prompts from Slack",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up claude-relay: configure Slack tokens and install hooks.
    Setup {
        /// Path to the Claude Code config directory.
        #[arg(long, default_value = "~/.claude")]
        claude_home: String,
    },
    /// Enable Slack routing for a session ID or 'all'.
    Enable { target: String },
    /// Disable Slack routing for a session ID or 'all'.
    Disable { target: String },
    /// Show claude-relay status: config and enabled sessions.
    Status,
    /// Register an additional Claude Code home directory.
    AddHome { path: String },
    /// Remove claude-relay hooks from Claude Code config directories.
    Uninstall {
        /// Target a single Claude home; default removes from all registered.
        #[arg(long)]
        claude_home: Option<String>,
    },
    /// Run a Claude Code hook handler (called by Claude Code, not directly).
    Hook {
        #[command(subcommand)]
        event: HookCommands,
    },
}

#[derive(Subcommand)]
enum HookCommands {
    /// Route tool permissions and questions to Slack.
    PreToolUse,
    /// Post the last assistant message to Slack, wait for a reply.
    Stop,
    /// Plan approval via Slack for ExitPlanMode.
    PlanApproval,
    /// Send a one-way DM notification.
    Notify {
        /// The hook event type.
        #[arg(long, value_enum, default_value_t = NotifyArg::Notification)]
        event: NotifyArg,
    },
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Hook subcommands log to a file: stdout is the response channel and
/// stderr shows up in Claude Code's output.
fn init_tracing(verbosity: u8, to_file: bool) {
    if to_file {
        let Ok(home) = relay_home() else {
            return;
        };
        let log_dir = home.join("logs");
        if std::fs::create_dir_all(&log_dir).is_err() {
            return;
        }
        let Ok(file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join("claude-relay.log"))
        else {
            return;
        };
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(filter)
            .init();
        return;
    }

    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn require_setup(home: &Path) -> Option<RelayConfig> {
    let config = RelayConfig::load(home);
    if !config.is_valid() {
        eprintln!(
            "Not configured. Run `claude-relay setup` first.\n\nConfig dir: {}",
            home.display()
        );
        return None;
    }
    Some(config)
}

fn read_hook_input() -> HookInput {
    let mut raw = String::new();
    if std::io::stdin().read_to_string(&mut raw).is_err() {
        return HookInput::default();
    }
    HookInput::from_json(&raw)
}

async fn run_hook(event: HookCommands) -> ExitCode {
    match &event {
        HookCommands::PreToolUse | HookCommands::PlanApproval => {
            if std::io::stdin().is_terminal() {
                eprintln!(
                    "Error: This hook reads JSON from stdin, not meant to be called directly."
                );
                return ExitCode::FAILURE;
            }
        }
        _ => {}
    }

    let input = read_hook_input();
    tracing::debug!(
        session = %input.session_id,
        event = %input.hook_event_name,
        "hook fired"
    );

    let runner = match HookRunner::load() {
        Ok(runner) => runner,
        Err(e) => {
            tracing::debug!(error = %e, "could not load relay config, skipping");
            return ExitCode::SUCCESS;
        }
    };

    match event {
        HookCommands::PreToolUse => {
            if let Some(response) = runner.run_pre_tool_use(&input).await {
                println!("{response}");
            }
            ExitCode::SUCCESS
        }
        HookCommands::Stop => {
            if let Some(response) = runner.run_stop(&input).await {
                println!("{response}");
            }
            ExitCode::SUCCESS
        }
        HookCommands::PlanApproval => {
            if let Some(response) = runner.run_plan_approval(&input).await {
                println!("{response}");
            }
            ExitCode::SUCCESS
        }
        HookCommands::Notify { event } => {
            if runner.run_notify(&input, event.into()).await {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn cmd_enable(home: &Path, target: &str) -> ExitCode {
    let Some(config) = require_setup(home) else {
        return ExitCode::FAILURE;
    };
    let mut state = RelayState::load(home);

    if target == "all" {
        state.enable_all();
        if let Err(e) = state.save(home) {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
        println!("Enabled for all sessions.  (config: {})", home.display());
        return ExitCode::SUCCESS;
    }

    if matches!(state.enabled, EnabledSessions::All(_)) {
        println!("Already enabled for all sessions.");
        return ExitCode::SUCCESS;
    }

    if !session_exists(target, &config.claude_homes) {
        eprintln!("Error: Session {target} not found in any registered Claude home.");
        return ExitCode::FAILURE;
    }

    state.enable(target);
    if let Err(e) = state.save(home) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }
    println!("Enabled for session {target}  (config: {})", home.display());
    ExitCode::SUCCESS
}

fn cmd_disable(home: &Path, target: &str) -> ExitCode {
    let Some(config) = require_setup(home) else {
        return ExitCode::FAILURE;
    };
    let mut state = RelayState::load(home);

    if target == "all" {
        state.disable_all();
        if let Err(e) = state.save(home) {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
        println!("Disabled for all sessions.  (config: {})", home.display());
        return ExitCode::SUCCESS;
    }

    if matches!(state.enabled, EnabledSessions::All(_)) {
        println!(
            "Currently enabled for all. Use `disable all` first, then enable specific sessions."
        );
        return ExitCode::SUCCESS;
    }

    if !session_exists(target, &config.claude_homes) {
        eprintln!("Error: Session {target} not found in any registered Claude home.");
        return ExitCode::FAILURE;
    }

    state.disable(target);
    if let Err(e) = state.save(home) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    // The session is done routing; drop its cached approvals too.
    if let Err(e) = SessionCache::new(home, target).clear() {
        eprintln!("Warning: could not clear session cache: {e}");
    }

    println!("Disabled for session {target}  (config: {})", home.display());
    ExitCode::SUCCESS
}

fn cmd_status(home: &Path) -> ExitCode {
    println!("{} v{}\n", "claude-relay".bold(), env!("CARGO_PKG_VERSION"));

    let Some(config) = require_setup(home) else {
        return ExitCode::FAILURE;
    };

    println!("Config dir:    {}", home.display());
    println!("Slack user:    {}", config.user_id);
    println!("DM channel:    {}", config.dm_channel_id);
    println!("Timeout:       {}s", config.timeout_secs());
    println!(
        "Claude homes:  {}",
        if config.claude_homes.is_empty() {
            "(none)".to_string()
        } else {
            config.claude_homes.join(", ")
        }
    );

    let state = RelayState::load(home);
    println!();
    match &state.enabled {
        EnabledSessions::All(_) => println!("Sessions:      {}", "ALL enabled".green()),
        EnabledSessions::Ids(ids) if ids.is_empty() => {
            println!("Sessions:      {}", "none enabled".dimmed());
        }
        EnabledSessions::Ids(ids) => println!("Sessions:      {}", ids.join(", ")),
    }
    ExitCode::SUCCESS
}

fn cmd_uninstall(home: &Path, claude_home: Option<String>) -> ExitCode {
    let config = RelayConfig::load(home);

    let homes_to_remove: Vec<String> = match claude_home {
        Some(path) => vec![expand_tilde(&path).to_string_lossy().into_owned()],
        None => config.claude_homes.clone(),
    };

    if homes_to_remove.is_empty() {
        println!("No Claude homes registered, nothing to uninstall.");
        return ExitCode::SUCCESS;
    }

    let mut remaining = config.claude_homes.clone();
    for claude_home in &homes_to_remove {
        let installer = match HookInstaller::from_current_exe(Path::new(claude_home)) {
            Ok(installer) => installer,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        };
        match installer.uninstall() {
            Ok(result) if result.changed() => {
                println!(
                    "Removed claude-relay hooks from {}",
                    result.settings_path.display()
                );
            }
            Ok(result) => {
                println!(
                    "No claude-relay hooks found in {}",
                    result.settings_path.display()
                );
            }
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        }
        remaining.retain(|h| h != claude_home);
    }

    let updated = RelayConfig {
        claude_homes: remaining,
        ..config
    };
    if let Err(e) = updated.save(home) {
        eprintln!("Error: {e}");
        return ExitCode::FAILURE;
    }

    if homes_to_remove.len() == 1 {
        println!("Removed {} from registered Claude homes.", homes_to_remove[0]);
    } else {
        println!("Removed {} Claude homes.", homes_to_remove.len());
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let is_hook = matches!(cli.command, Commands::Hook { .. });
    init_tracing(cli.verbose, is_hook);

    let home = match relay_home() {
        Ok(home) => home,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Setup { claude_home } => {
            match run_setup(&home, &expand_tilde(&claude_home)).await {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("Error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Enable { target } => cmd_enable(&home, &target),
        Commands::Disable { target } => cmd_disable(&home, &target),
        Commands::Status => cmd_status(&home),
        Commands::AddHome { path } => {
            let expanded = expand_tilde(&path);
            match add_claude_home(&home, &expanded.to_string_lossy()) {
                Ok(installed) => {
                    println!("Hooks installed in {}", installed.join("settings.json").display());
                    println!(
                        "Registered {} as a Claude home.  (config: {})",
                        installed.display(),
                        home.display()
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Commands::Uninstall { claude_home } => cmd_uninstall(&home, claude_home),
        Commands::Hook { event } => run_hook(event).await,
    }
}
