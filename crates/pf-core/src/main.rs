//! Preflight - deployment pre-flight process introspection
//!
//! The main entry point for the preflight binary, handling:
//! - File lock scanning (which process holds which file open)
//! - Close-list evaluation and liveness checks
//! - Process tracking with start/exit event streams
//! - Headless close-apps decision sessions

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use pf_common::error::{format_error_human, StructuredError};
use pf_common::{Error, OutputFormat, ProcessId, ProcessIdentity};
use pf_core::ancestry::AncestryResolver;
use pf_core::closeapps::{session_pair, CloseAppsOrchestrator, SessionHandle, UserDecision};
use pf_core::config::{load_config, LoadedConfig};
use pf_core::exit_codes::ExitCode;
use pf_core::lockscan::LockScanner;
use pf_core::logging::{generate_run_id, init_logging, LogConfig, LogFormat, LogLevel};
use pf_core::output;
use pf_core::sys::live_probe;
use pf_core::track::ProcessTracker;
use std::io::{BufRead, IsTerminal};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tracing::debug;

/// Preflight - find file locks and close blocking applications before deployment
#[derive(Parser)]
#[command(name = "preflight")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Override config file path
    #[arg(long, global = true, env = "PREFLIGHT_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format for stderr (human, jsonl)
    #[arg(long, global = true, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for processes holding open file handles under the given paths
    Scan(ScanArgs),

    /// Evaluate which close-list targets are currently running
    Evaluate(EvaluateArgs),

    /// Check whether a single target is running (exit code reflects the answer)
    Running(RunningArgs),

    /// Ask targets to close their windows, then terminate stragglers
    Close(CloseArgs),

    /// Resolve the parent chain of a process
    Ancestry(AncestryArgs),

    /// Track targets and stream start/exit events as JSON lines
    Watch(WatchArgs),

    /// Run a headless close-apps decision session
    Closeapps(CloseAppsArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Args, Debug)]
struct ScanArgs {
    /// Paths to check for open handles
    #[arg(required = true)]
    roots: Vec<String>,

    /// Expand directories to the files under them
    #[arg(long)]
    recursive: bool,

    /// Directory depth for recursive expansion (-1 = unbounded, 0 = root only)
    #[arg(long)]
    max_depth: Option<i32>,

    /// Fail the scan when any process refuses handle inspection
    #[arg(long)]
    abort_on_denied: bool,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    /// Executable base names to look for (".exe" suffix optional)
    #[arg(required = true)]
    names: Vec<String>,
}

#[derive(Args, Debug)]
struct RunningArgs {
    /// Executable base name to look for
    name: String,
}

#[derive(Args, Debug)]
struct CloseArgs {
    /// Executable base names to close
    #[arg(required = true)]
    names: Vec<String>,

    /// How long to wait for graceful exit before terminating
    #[arg(long)]
    grace_ms: Option<u64>,
}

#[derive(Args, Debug)]
struct AncestryArgs {
    /// Process id to walk upward from
    pid: u32,
}

#[derive(Args, Debug)]
struct WatchArgs {
    /// Executable base names to track
    #[arg(required = true)]
    names: Vec<String>,

    /// Poll interval override
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Stop after this many seconds (default: run until interrupted)
    #[arg(long)]
    duration_s: Option<u64>,
}

#[derive(Args, Debug)]
struct CloseAppsArgs {
    /// Executable base names that block the deployment
    #[arg(required = true)]
    names: Vec<String>,

    /// Countdown override in seconds
    #[arg(long)]
    countdown_s: Option<u64>,

    /// Resolve to continue when every blocker exits on its own
    #[arg(long)]
    auto_continue: bool,

    /// Hold the full countdown even when nothing blocking is running
    #[arg(long)]
    forced: bool,
}

#[derive(Args, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    shell: Shell,
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::Success
                }
                _ => ExitCode::UsageError,
            };
            err.print().ok();
            std::process::exit(code.as_i32());
        }
    };

    // Initialize logging
    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let run_id = generate_run_id();
    debug!(run_id = %run_id, "preflight starting");

    // Completions need no config and no probe.
    if let Commands::Completions(args) = &cli.command {
        let code = run_completions(args);
        std::process::exit(code.as_i32());
    }

    let loaded = match load_config(cli.global.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(err) => {
            let code = report_error(&cli.global, &err);
            std::process::exit(code.as_i32());
        }
    };
    debug!(path = ?loaded.path, "configuration resolved");

    let exit_code = match &cli.command {
        Commands::Scan(args) => run_scan(&cli.global, args, &loaded, &run_id),
        Commands::Evaluate(args) => run_evaluate(&cli.global, args, &loaded, &run_id),
        Commands::Running(args) => run_running(&cli.global, args, &loaded, &run_id),
        Commands::Close(args) => run_close(&cli.global, args, &loaded, &run_id),
        Commands::Ancestry(args) => run_ancestry(&cli.global, args, &run_id),
        Commands::Watch(args) => run_watch(&cli.global, args, &loaded),
        Commands::Closeapps(args) => run_closeapps(&cli.global, args, &loaded, &run_id),
        Commands::Completions(_) => unreachable!("handled above"),
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_scan(global: &GlobalOpts, args: &ScanArgs, loaded: &LoadedConfig, run_id: &str) -> ExitCode {
    let mut options = loaded.config.scan.clone();
    if args.recursive {
        options.recursive = true;
    }
    if let Some(depth) = args.max_depth {
        options.max_depth = depth;
    }
    if args.abort_on_denied {
        options.continue_on_access_denied = false;
    }
    // Reject bad options before touching the platform probe.
    if let Err(err) = options.validate() {
        return report_error(global, &err);
    }

    let probe = match live_probe() {
        Ok(probe) => probe,
        Err(err) => return report_error(global, &err),
    };

    let scanner = LockScanner::new(probe);
    match scanner.find_locking_processes(&args.roots, &options) {
        Ok(outcome) => {
            println!("{}", output::render_scan(global.format, run_id, &outcome));
            ExitCode::Success
        }
        Err(err) => report_error(global, &err),
    }
}

fn run_evaluate(
    global: &GlobalOpts,
    args: &EvaluateArgs,
    loaded: &LoadedConfig,
    run_id: &str,
) -> ExitCode {
    let probe = match live_probe() {
        Ok(probe) => probe,
        Err(err) => return report_error(global, &err),
    };

    let tracker = ProcessTracker::new(probe, loaded.config.tracker.to_tracker_config());
    let targets = cli_targets(&args.names);
    match tracker.evaluate_running_processes(&targets) {
        Ok(identities) => {
            println!(
                "{}",
                output::render_identities(global.format, run_id, &identities)
            );
            ExitCode::Success
        }
        Err(err) => report_error(global, &err),
    }
}

fn run_running(
    global: &GlobalOpts,
    args: &RunningArgs,
    loaded: &LoadedConfig,
    run_id: &str,
) -> ExitCode {
    let probe = match live_probe() {
        Ok(probe) => probe,
        Err(err) => return report_error(global, &err),
    };

    let tracker = ProcessTracker::new(probe, loaded.config.tracker.to_tracker_config());
    let name = strip_exe_suffix(&args.name);
    match tracker.is_process_running(name) {
        Ok(running) => {
            println!(
                "{}",
                output::render_liveness(global.format, run_id, name, running)
            );
            if running {
                ExitCode::Success
            } else {
                ExitCode::NotRunning
            }
        }
        Err(err) => report_error(global, &err),
    }
}

fn run_close(global: &GlobalOpts, args: &CloseArgs, loaded: &LoadedConfig, run_id: &str) -> ExitCode {
    let probe = match live_probe() {
        Ok(probe) => probe,
        Err(err) => return report_error(global, &err),
    };

    let mut tracker_config = loaded.config.tracker.to_tracker_config();
    if let Some(grace) = args.grace_ms {
        tracker_config.close_grace = Duration::from_millis(grace);
    }
    let tracker = ProcessTracker::new(probe, tracker_config);

    let mut results = Vec::new();
    for name in &args.names {
        let name = strip_exe_suffix(name);
        match tracker.close_process(name) {
            Ok(all_gone) => results.push((name.to_string(), all_gone)),
            Err(err) => return report_error(global, &err),
        }
    }

    println!(
        "{}",
        output::render_close_report(global.format, run_id, &results)
    );
    ExitCode::Success
}

fn run_ancestry(global: &GlobalOpts, args: &AncestryArgs, run_id: &str) -> ExitCode {
    let probe = match live_probe() {
        Ok(probe) => probe,
        Err(err) => return report_error(global, &err),
    };

    let chain = AncestryResolver::new(probe).parent_chain(ProcessId(args.pid));
    println!(
        "{}",
        output::render_ancestry(global.format, run_id, args.pid, &chain)
    );
    ExitCode::Success
}

fn run_watch(global: &GlobalOpts, args: &WatchArgs, loaded: &LoadedConfig) -> ExitCode {
    let probe = match live_probe() {
        Ok(probe) => probe,
        Err(err) => return report_error(global, &err),
    };

    let mut tracker_config = loaded.config.tracker.to_tracker_config();
    if let Some(interval) = args.interval_ms {
        tracker_config.poll_interval = Duration::from_millis(interval);
    }
    let tracker = ProcessTracker::new(probe, tracker_config);

    // Subscribe before start so the first poll's events are not missed.
    let events = tracker.subscribe();
    if let Err(err) = tracker.start(&cli_targets(&args.names)) {
        return report_error(global, &err);
    }

    let deadline = args
        .duration_s
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => println!("{}", event.to_jsonl()),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    tracker.stop();
    ExitCode::Success
}

fn run_closeapps(
    global: &GlobalOpts,
    args: &CloseAppsArgs,
    loaded: &LoadedConfig,
    run_id: &str,
) -> ExitCode {
    let probe = match live_probe() {
        Ok(probe) => probe,
        Err(err) => return report_error(global, &err),
    };

    let tracker = Arc::new(ProcessTracker::new(
        probe,
        loaded.config.tracker.to_tracker_config(),
    ));

    let mut close_config = loaded.config.closeapps.to_close_config();
    if let Some(secs) = args.countdown_s {
        close_config.countdown = Duration::from_secs(secs);
    }
    if args.auto_continue {
        close_config.continue_on_process_closure = true;
    }
    if args.forced {
        close_config.forced_countdown = true;
    }

    let orchestrator = match CloseAppsOrchestrator::new(Arc::clone(&tracker), close_config) {
        Ok(orchestrator) => orchestrator,
        Err(err) => return report_error(global, &err),
    };

    let (handle, controls) = session_pair();
    spawn_stdin_decisions(handle);

    let targets = cli_targets(&args.names);
    match orchestrator.run(&targets, controls) {
        Ok(result) => {
            println!("{}", output::render_session(global.format, run_id, &result));
            tracker.stop();
            ExitCode::from(result.outcome)
        }
        Err(err) => report_error(global, &err),
    }
}

fn run_completions(args: &CompletionsArgs) -> ExitCode {
    let mut cmd = Cli::command();
    clap_complete::generate(args.shell, &mut cmd, "preflight", &mut std::io::stdout());
    ExitCode::Success
}

// ============================================================================
// Helpers
// ============================================================================

/// Forward `close` / `continue` / `defer` lines from stdin to the session.
/// Other lines are ignored; EOF ends the reader.
fn spawn_stdin_decisions(handle: SessionHandle) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let decision = match line.trim().to_lowercase().as_str() {
                "close" => Some(UserDecision::Close),
                "continue" => Some(UserDecision::Continue),
                "defer" => Some(UserDecision::Defer),
                _ => None,
            };
            if let Some(decision) = decision {
                if !handle.decide(decision) {
                    break;
                }
            }
        }
    });
}

fn cli_targets(names: &[String]) -> Vec<ProcessIdentity> {
    names
        .iter()
        .map(|name| ProcessIdentity::new(strip_exe_suffix(name)))
        .collect()
}

/// Accept "winword.exe" where an executable base name is expected.
fn strip_exe_suffix(name: &str) -> &str {
    if name.len() > 4
        && name.is_char_boundary(name.len() - 4)
        && name[name.len() - 4..].eq_ignore_ascii_case(".exe")
    {
        &name[..name.len() - 4]
    } else {
        name
    }
}

/// Print an error in the selected format and map it to an exit code.
fn report_error(global: &GlobalOpts, err: &Error) -> ExitCode {
    match global.format {
        OutputFormat::Json | OutputFormat::Jsonl => {
            println!("{}", StructuredError::from(err).to_json());
        }
        _ => {
            let use_color = !global.no_color && std::io::stderr().is_terminal();
            eprintln!("{}", format_error_human(err, use_color));
        }
    }
    ExitCode::from(err)
}
