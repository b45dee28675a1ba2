//! `ncp-mcp-server`: the binary exposing the orchestrator's MCP endpoint
//! (`serve`) plus the scheduler's two internal worker entry points
//! (`_task-execute`, `_timing-fire`). A single binary dispatching on a
//! leading subcommand mirrors the teacher's own multi-subcommand CLI shape.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use ncp_core::NcpPaths;
use ncp_core::Orchestrator;
use ncp_mcp_server::NcpMcpServer;
use ncp_mcp_server::run_task_execute;
use ncp_mcp_server::run_timing_fire;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ncp-mcp-server", about = "NCP's MCP endpoint and scheduler worker entry points")]
struct Cli {
    /// Profile to load (default: "default").
    #[arg(long, global = true, default_value = "default")]
    profile: String,

    /// Overrides the `NCP_HOME` base directory for this invocation.
    #[arg(long, global = true)]
    ncp_home: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the MCP server over stdio.
    Serve,
    /// Internal: execute one scheduled task by id.
    #[command(name = "_task-execute")]
    TaskExecute { task_id: String },
    /// Internal: fire every active task for one timing group.
    #[command(name = "_timing-fire")]
    TimingFire { timing_id: String },
}

fn init_tracing() {
    let debug = std::env::var("NCP_DEBUG").as_deref() == Ok("true");
    let default_level = if debug { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn resolve_paths(ncp_home: Option<std::path::PathBuf>) -> NcpPaths {
    match ncp_home {
        Some(base) => NcpPaths::new(base),
        None => NcpPaths::discover(),
    }
}

fn worker_binary() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.to_str().map(str::to_string))
        .unwrap_or_else(|| "ncp-mcp-server".to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let paths = resolve_paths(cli.ncp_home);

    match cli.command {
        Command::Serve => run_serve(paths, &cli.profile).await,
        Command::TaskExecute { task_id } => {
            let outcome = run_task_execute(&paths, &cli.profile, &worker_binary(), &task_id).await;
            ExitCode::from(outcome.exit_code() as u8)
        }
        Command::TimingFire { timing_id } => {
            let exit_code = run_timing_fire(&paths, &worker_binary(), &timing_id).await;
            ExitCode::from(exit_code as u8)
        }
    }
}

async fn run_serve(paths: NcpPaths, profile_name: &str) -> ExitCode {
    let orchestrator = match Orchestrator::initialize(paths, profile_name).await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            eprintln!("failed to initialize orchestrator: {err}");
            return ExitCode::from(3);
        }
    };
    let orchestrator = Arc::new(orchestrator);
    let server = NcpMcpServer::new(Arc::clone(&orchestrator));

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = wait_for_shutdown_signal().await {
            let _ = shutdown_tx.send(()).await;
        }
    });

    tokio::select! {
        result = server.run() => {
            if let Err(err) = result {
                eprintln!("MCP server exited with an error: {err}");
                orchestrator.cleanup().await;
                return ExitCode::from(1);
            }
        }
        _ = shutdown_rx.recv() => {
            tracing::info!("received shutdown signal, cleaning up");
        }
    }

    orchestrator.cleanup().await;
    ExitCode::SUCCESS
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => Ok(()),
        _ = sigint.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
