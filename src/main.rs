mod actions;
mod config;
mod engine;
mod intercept;
mod key;
mod platform;
mod ports;
mod table;

use actions::{CommandDispatch, LogDispatch};
use clap::Parser;
use engine::GestureEngine;
use intercept::{Interceptor, QueueVerdict};
use key::KeyEvent;
use platform::{EventResponse, Platform, SessionState};
use ports::ActionDispatchPort;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use table::ActionTable;
use tracing::{Level, info, trace};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gestured", about = "Hardware button gesture daemon")]
struct Args {
    /// Path to config file (default: ~/.config/gestured/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log resolved actions instead of running them
    #[arg(long)]
    dry_run: bool,
}

fn default_config_path() -> PathBuf {
    config::default_path().unwrap_or_else(|| PathBuf::from("config.toml"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Load and validate config
    let config_path = args.config.unwrap_or_else(default_config_path);
    info!("loading config from {}", config_path.display());

    let runtime_config = match config::load(&config_path) {
        Ok(result) => result,
        Err(err) => {
            // Use miette's fancy error display
            eprintln!("{:?}", miette::Report::new(err));
            return ExitCode::FAILURE;
        }
    };
    info!(?runtime_config, "config loaded");

    let mut platform = match Platform::create() {
        Ok(platform) => platform,
        Err(err) => {
            eprintln!("error: {err:?}");
            return ExitCode::FAILURE;
        }
    };

    // Wire the ports
    let session = Arc::new(SessionState::new());
    let dispatch: Arc<dyn ActionDispatchPort> = if args.dry_run {
        info!("dry-run mode: actions will be logged, not executed");
        Arc::new(LogDispatch)
    } else {
        Arc::new(CommandDispatch)
    };

    let interceptor = Interceptor::new(
        Arc::new(GestureEngine::new()),
        Arc::new(ActionTable::new(Arc::new(runtime_config))),
        Arc::new(platform.injector()),
        session.clone(),
        session,
        dispatch,
    );

    if let Err(err) = platform
        .run(|event: KeyEvent| handle_event(event, &interceptor))
        .await
    {
        eprintln!("error: {err:?}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Handle one raw key transition from the platform.
///
/// The queueing hook runs inline and never blocks. Events it claims are
/// resolved on a spawned task so timing windows never stall the producer
/// loop; the dispatch side re-delivers originals itself when a gesture falls
/// through to default behavior.
async fn handle_event(event: KeyEvent, interceptor: &Interceptor) -> EventResponse {
    match interceptor.before_queueing(&event) {
        QueueVerdict::Forward => EventResponse::Passthrough,
        QueueVerdict::Swallow => EventResponse::Block,
        QueueVerdict::Continue => {
            let interceptor = interceptor.clone();
            tokio::spawn(async move {
                let outcome = interceptor.before_dispatching(event).await;
                trace!(?event, ?outcome, "dispatch resolved");
            });
            EventResponse::Block
        }
    }
}
