//! chatload - paced conversational load against a chat endpoint.

mod args;
mod interactive;
mod progress;

use std::{io::IsTerminal, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use chatload_core::{Configuration, PromptCategory, SessionOutcome, prompts};
use chatload_session::{Orchestrator, SessionHandle, SessionOptions, storage::JsonFileStore};
use chatload_transport::{
    WebSocketTransport,
    tui::{ControlCommand, KeyListener, RawModeGuard},
};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{args::Cli, interactive::Prompter};

/// Grace period for the progress printer to flush after the session stops.
const PRINTER_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

fn print_categories() {
    for &category in PromptCategory::ALL {
        let name = category.as_str();
        if category == PromptCategory::Custom {
            println!("{name:<12} your own prompts (--prompt / --prompts-file)");
            continue;
        }
        let builtin = prompts::builtin(category);
        println!(
            "{name:<12} {} prompts, e.g. \"{}\"",
            builtin.len(),
            builtin.first().copied().unwrap_or_default()
        );
    }
}

fn print_config(config: &Configuration) {
    println!("Endpoint:  {}", config.endpoint);
    println!("Category:  {}", config.category);
    println!("Interval:  {:.1}s", config.interval.as_secs_f64());
    println!("Messages:  {}", config.max_messages);
    println!("Log file:  {}", config.log_path.display());
}

/// Cancel the session on Ctrl+C or SIGTERM.
fn spawn_signal_watcher(handle: SessionHandle) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to listen for SIGTERM: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {}
            () = terminate => {}
            () = handle.stopped() => return,
        }
        handle.cancel();
    })
}

/// Forward keyboard commands to the session.
fn spawn_key_controls(handle: SessionHandle) -> KeyListener {
    let (listener, mut commands) = KeyListener::spawn();
    tokio::spawn(async move {
        while let Some(command) = commands.recv().await {
            match command {
                ControlCommand::TogglePause => {
                    let _ = handle.toggle_pause();
                }
                ControlCommand::Stop => handle.cancel(),
            }
        }
    });
    listener
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.list_categories {
        print_categories();
        return Ok(ExitCode::SUCCESS);
    }

    let interactive = cli.interactive || (cli.url.is_none() && std::io::stdin().is_terminal());
    let config = if interactive {
        let mut prompter = Prompter::stdio();
        args::resolve(&cli, Some(&mut prompter))?
    } else {
        args::resolve::<std::io::StdinLock<'static>, std::io::Stdout>(&cli, None)?
    };

    if cli.dry_run {
        print_config(&config);
        let preview: Vec<String> = config.prompts().into_iter().take(5).collect();
        println!("Prompts:");
        for prompt in preview {
            println!("  - {prompt}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    print_config(&config);
    let max_messages = config.max_messages;
    let mut session = Orchestrator::new(
        config,
        WebSocketTransport::new(),
        JsonFileStore::new(),
        SessionOptions::default(),
    );
    let handle = session.handle();

    // Ctrl+C during the connect wait takes the cancel path too.
    let signals = spawn_signal_watcher(handle.clone());
    if let Err(e) = session.start().await {
        signals.abort();
        return Err(e).context("Could not connect to the endpoint");
    }

    let keys_enabled = !cli.no_keys && std::io::stdin().is_terminal();
    let raw_mode = if keys_enabled {
        match RawModeGuard::enable() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::warn!("Keyboard controls unavailable: {e}");
                None
            }
        }
    } else {
        None
    };
    let keys = raw_mode
        .as_ref()
        .map(|_| spawn_key_controls(handle.clone()));
    if keys.is_some() {
        print!("Controls: p = pause/resume, q = stop\r\n");
    }

    let printer = progress::spawn(&handle, max_messages, raw_mode.is_some());

    let result = session.run().await;

    let _ = tokio::time::timeout(PRINTER_GRACE, printer).await;
    if let Some(keys) = keys {
        keys.shutdown();
    }
    drop(raw_mode);
    signals.abort();

    let report = result.context("Session failed")?;
    println!();
    println!("{}", report.summary);

    Ok(match report.log.status {
        SessionOutcome::Completed | SessionOutcome::Cancelled => ExitCode::SUCCESS,
        SessionOutcome::Unrecoverable => ExitCode::FAILURE,
    })
}
