//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use docksweep::backup::{self, BackupRecorder};
use docksweep::cleaner::Cleaner;
use docksweep::client::docker::DockerRuntime;
use docksweep::client::host::LocalHost;
use docksweep::client::{HostClient, RuntimeClient};
use docksweep::core::config::Config;
use docksweep::core::paths::resolve_absolute_path;
use docksweep::core::resource::{Report, Resource, RunMode};
use docksweep::daemon::loop_main::SweepDaemon;
use docksweep::report::{format_bytes, render_summary};
use docksweep::scanner::sizing;

/// docksweep — removes unused Docker resources with safety rails.
#[derive(Debug, Parser)]
#[command(
    name = "docksweep",
    author,
    version,
    about = "docksweep - Docker resource cleanup with safety rails",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase log verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List unused resources without touching anything.
    Scan(ScanArgs),
    /// Run one cleanup pass (preview unless --destructive).
    Clean(CleanArgs),
    /// Run the scheduled sweep daemon.
    Daemon(DaemonArgs),
    /// Inspect recorded pre-removal backups.
    Backups(BackupsArgs),
    /// View and validate configuration.
    Config(ConfigArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    /// Maximum number of candidates to display (0 shows all).
    #[arg(long, default_value_t = 20, value_name = "N")]
    top: usize,
}

#[derive(Debug, Clone, Args)]
struct CleanArgs {
    /// Actually remove resources. Without this flag the pass only previews.
    #[arg(long)]
    destructive: bool,
    /// Skip the confirmation prompt for destructive passes.
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, Clone, Args)]
struct DaemonArgs {
    /// Run a single scheduled pass immediately and exit.
    #[arg(long)]
    once: bool,
}

#[derive(Debug, Clone, Args)]
struct BackupsArgs {
    #[command(subcommand)]
    command: BackupsCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum BackupsCommand {
    /// List recorded backups, oldest first.
    List,
    /// Show one backup file.
    Show {
        /// Backup file to inspect.
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print the config file path in effect.
    Path,
    /// Print the effective configuration.
    Show,
    /// Load and validate the configuration.
    Validate,
    /// Write a default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Args)]
struct VersionArgs {
    /// Include build metadata.
    #[arg(long)]
    verbose: bool,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Target shell.
    #[arg(value_enum, value_name = "SHELL")]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }
    init_tracing(cli);

    match &cli.command {
        Command::Scan(args) => run_scan(cli, args),
        Command::Clean(args) => run_clean(cli, args),
        Command::Daemon(args) => run_daemon(cli, args),
        Command::Backups(args) => run_backups(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Version(args) => emit_version(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("DSW_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    // Logs go to stderr; stdout is reserved for command output.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

// ──────────────────── shared plumbing ────────────────────

fn load_config(cli: &Cli) -> Result<Config, CliError> {
    Config::load(cli.config.as_deref()).map_err(|error| CliError::User(error.to_string()))
}

fn async_runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|error| CliError::Internal(format!("failed to start async runtime: {error}")))
}

fn build_cleaner(config: Config) -> Result<Cleaner, CliError> {
    let runtime: Arc<dyn RuntimeClient> = Arc::new(
        DockerRuntime::connect(&config.docker)
            .map_err(|error| CliError::Runtime(error.to_string()))?,
    );
    let host: Arc<dyn HostClient> = Arc::new(LocalHost::new());
    Cleaner::new(config, runtime, host).map_err(|error| CliError::User(error.to_string()))
}

// ──────────────────── scan ────────────────────

fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let cleaner = build_cleaner(config)?;
    let candidates = async_runtime()?
        .block_on(cleaner.scan_candidates())
        .map_err(|error| CliError::Runtime(error.to_string()))?;
    let total = sizing::total_size(&candidates);

    match output_mode(cli) {
        OutputMode::Human => {
            if candidates.is_empty() {
                println!("No unused resources found.");
                return Ok(());
            }
            print_candidate_table(&candidates, args.top);
            println!();
            println!(
                "{} candidate(s), {} reclaimable",
                candidates.len(),
                format_bytes(total)
            );
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "scan",
                "candidates": serde_json::to_value(&candidates)?,
                "count": candidates.len(),
                "total_bytes": total,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── clean ────────────────────

fn run_clean(cli: &Cli, args: &CleanArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let cleaner = build_cleaner(config)?;
    let runtime = async_runtime()?;
    let mode = if args.destructive {
        RunMode::Destructive
    } else {
        RunMode::Preview
    };

    if args.destructive && !args.yes {
        if output_mode(cli) == OutputMode::Json {
            return Err(CliError::User(
                "destructive pass needs --yes in JSON output mode".to_string(),
            ));
        }
        if !confirm_destructive(&runtime, &cleaner)? {
            println!("Aborted, nothing was removed.");
            return Ok(());
        }
    }

    let report = runtime
        .block_on(cleaner.run(mode))
        .map_err(|error| CliError::Runtime(error.to_string()))?;
    emit_report(cli, "clean", &report)?;

    if report.details.errors.is_empty() {
        Ok(())
    } else {
        Err(CliError::Partial(format!(
            "{} of {} candidates failed",
            report.details.errors.len(),
            report.details.total_accounted()
        )))
    }
}

fn confirm_destructive(
    runtime: &tokio::runtime::Runtime,
    cleaner: &Cleaner,
) -> Result<bool, CliError> {
    if !io::stdin().is_terminal() {
        return Err(CliError::User(
            "destructive pass needs --yes when stdin is not a terminal".to_string(),
        ));
    }

    let candidates = runtime
        .block_on(cleaner.scan_candidates())
        .map_err(|error| CliError::Runtime(error.to_string()))?;
    if candidates.is_empty() {
        println!("No unused resources found.");
        return Ok(false);
    }

    print_candidate_table(&candidates, 20);
    println!();
    let headline = format!(
        "This will permanently remove up to {} resource(s) ({}).",
        candidates.len(),
        format_bytes(sizing::total_size(&candidates))
    );
    println!("{}", headline.red());
    print!("Proceed? [y/N] ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim(), "y" | "Y" | "yes"))
}

// ──────────────────── daemon ────────────────────

fn run_daemon(cli: &Cli, args: &DaemonArgs) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let runtime = async_runtime()?;

    if args.once {
        let mode = if config.schedule.destructive {
            RunMode::Destructive
        } else {
            RunMode::Preview
        };
        let cleaner = build_cleaner(config)?;
        let report = runtime
            .block_on(cleaner.run(mode))
            .map_err(|error| CliError::Runtime(error.to_string()))?;
        return emit_report(cli, "daemon", &report);
    }

    let runtime_client: Arc<dyn RuntimeClient> = Arc::new(
        DockerRuntime::connect(&config.docker)
            .map_err(|error| CliError::Runtime(error.to_string()))?,
    );
    let host: Arc<dyn HostClient> = Arc::new(LocalHost::new());
    let mut daemon = SweepDaemon::new(config, runtime_client, host)
        .map_err(|error| CliError::User(error.to_string()))?;
    runtime
        .block_on(daemon.run())
        .map_err(|error| CliError::Runtime(error.to_string()))
}

// ──────────────────── backups ────────────────────

fn run_backups(cli: &Cli, args: &BackupsArgs) -> Result<(), CliError> {
    match &args.command {
        BackupsCommand::List => run_backups_list(cli),
        BackupsCommand::Show { path } => run_backups_show(cli, path),
    }
}

fn run_backups_list(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let recorder = BackupRecorder::new(config.backup.dir);
    let paths = recorder
        .list_backups()
        .map_err(|error| CliError::Runtime(error.to_string()))?;

    let mut entries = Vec::new();
    for path in paths {
        match backup::load_backup(&path) {
            Ok(meta) => entries.push((path, meta)),
            Err(error) => eprintln!("docksweep: skipping {}: {error}", path.display()),
        }
    }

    match output_mode(cli) {
        OutputMode::Human => {
            if entries.is_empty() {
                println!("No backups recorded.");
                return Ok(());
            }
            println!("{:<20} {:>9} {:>10}  {}", "CREATED", "RESOURCES", "SIZE", "PATH");
            for (path, meta) in &entries {
                let created = meta.created_at.format("%Y-%m-%d %H:%M:%S").to_string();
                println!(
                    "{:<20} {:>9} {:>10}  {}",
                    created,
                    meta.resource_count,
                    format_bytes(meta.total_size_bytes),
                    path.display()
                );
            }
        }
        OutputMode::Json => {
            let items: Vec<Value> = entries
                .iter()
                .map(|(path, meta)| {
                    json!({
                        "path": path.to_string_lossy(),
                        "created_at": meta.created_at.to_rfc3339(),
                        "resource_count": meta.resource_count,
                        "total_size_bytes": meta.total_size_bytes,
                    })
                })
                .collect();
            write_json_line(&json!({
                "command": "backups list",
                "backups": items,
            }))?;
        }
    }
    Ok(())
}

fn run_backups_show(cli: &Cli, path: &Path) -> Result<(), CliError> {
    let loaded = backup::load_backup(path).map_err(|error| CliError::User(error.to_string()))?;

    match output_mode(cli) {
        OutputMode::Human => {
            println!("created:   {}", loaded.created_at.to_rfc3339());
            println!("resources: {}", loaded.resource_count);
            println!("size:      {}", format_bytes(loaded.total_size_bytes));
            println!("digest:    {}", loaded.digest);
            println!();
            print_candidate_table(&loaded.resources, 0);
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "backups show",
                "backup": serde_json::to_value(&loaded)?,
            }))?;
        }
    }
    Ok(())
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        ConfigCommand::Path => {
            let path =
                resolve_absolute_path(&cli.config.clone().unwrap_or_else(Config::default_path));
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommand::Show => run_config_show(cli),
        ConfigCommand::Validate => run_config_validate(cli),
        ConfigCommand::Init { force } => run_config_init(cli, *force),
    }
}

fn run_config_show(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    match output_mode(cli) {
        OutputMode::Human => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|error| CliError::Internal(format!("failed to render config: {error}")))?;
            print!("{rendered}");
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "config show",
                "config": serde_json::to_value(&config)?,
            }))?;
        }
    }
    Ok(())
}

fn run_config_validate(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let hash = config
        .stable_hash()
        .map_err(|error| CliError::Internal(error.to_string()))?;
    match output_mode(cli) {
        OutputMode::Human => println!("configuration OK (hash {hash})"),
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "config validate",
                "valid": true,
                "hash": hash,
            }))?;
        }
    }
    Ok(())
}

fn run_config_init(cli: &Cli, force: bool) -> Result<(), CliError> {
    let path = resolve_absolute_path(&cli.config.clone().unwrap_or_else(Config::default_path));
    if path.exists() && !force {
        return Err(CliError::User(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let rendered = toml::to_string_pretty(&Config::default())
        .map_err(|error| CliError::Internal(format!("failed to render config: {error}")))?;
    std::fs::write(&path, rendered)?;

    match output_mode(cli) {
        OutputMode::Human => println!("wrote {}", path.display()),
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "config init",
                "path": path.to_string_lossy(),
            }))?;
        }
    }
    Ok(())
}

// ──────────────────── output helpers ────────────────────

fn emit_version(cli: &Cli, args: &VersionArgs) -> Result<(), CliError> {
    let version = env!("CARGO_PKG_VERSION");
    let package = env!("CARGO_PKG_NAME");

    match output_mode(cli) {
        OutputMode::Human => {
            println!("docksweep {version}");
            if args.verbose {
                println!("package: {package}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "binary": "docksweep",
                "version": version,
                "package": package,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn emit_report(cli: &Cli, command: &str, report: &Report) -> Result<(), CliError> {
    match output_mode(cli) {
        OutputMode::Human => print!("{}", render_summary(report)),
        OutputMode::Json => {
            let payload = json!({
                "command": command,
                "report": serde_json::to_value(report)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn print_candidate_table(candidates: &[Resource], top: usize) {
    let shown = if top == 0 {
        candidates.len()
    } else {
        top.min(candidates.len())
    };
    println!("{:<10} {:<13} {:<42} {:>10}", "KIND", "ID", "NAME", "SIZE");
    for resource in &candidates[..shown] {
        let kind = resource.kind().to_string();
        println!(
            "{:<10} {:<13} {:<42} {:>10}",
            kind,
            resource.short_id(),
            clip(&resource.name, 42),
            format_bytes(resource.size_bytes)
        );
    }
    if shown < candidates.len() {
        println!("... and {} more", candidates.len() - shown);
    }
}

fn clip(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let end = s
        .char_indices()
        .nth(max_len.saturating_sub(3))
        .map_or(s.len(), |(idx, _)| idx);
    format!("{}...", &s[..end])
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("DSW_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        Some("auto") | None => fallback,
        Some(_) => fallback,
    }
}
