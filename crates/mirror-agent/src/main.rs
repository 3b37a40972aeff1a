//! Runs a single task on the mirrored iPhone from the terminal.
//!
//! While the task runs, type `p` and Enter to pause or resume it, and `c`
//! and Enter (or Ctrl-C) to cancel it.

#[macro_use]
extern crate tracing;

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use mirror_agent::{Config, SessionBuilder};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::runtime::Builder as RuntimeBuilder;
use tokio::select;
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

enum TaskEvent {
    Status(String),
    Completed(bool, String),
}

const BAR_CHAR: &str = "▎";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = match RuntimeBuilder::new_current_thread().enable_all().build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start the runtime: {err}");
            return ExitCode::FAILURE;
        }
    };
    let exit_code = runtime.block_on(run());
    // Reading stdin blocks a thread that cannot be interrupted, don't wait
    // for it.
    runtime.shutdown_background();
    exit_code
}

async fn run() -> ExitCode {
    let task = env::args().skip(1).collect::<Vec<_>>().join(" ");
    let task = task.trim();
    if task.is_empty() {
        eprintln!("usage: mirror-agent <task description>");
        return ExitCode::from(2);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };
    debug!("using {config:?}");

    let session = SessionBuilder::from_config(&config).build();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let handle = session.run(
        task,
        {
            let event_tx = event_tx.clone();
            move |success, reason| {
                event_tx.send(TaskEvent::Completed(success, reason)).ok();
            }
        },
        move |status| {
            event_tx.send(TaskEvent::Status(status.to_owned())).ok();
        },
    );

    let progress_bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {wide_msg}") {
        progress_bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    progress_bar.set_message("📱 Starting...");
    progress_bar.enable_steady_tick(Duration::from_millis(100));

    let mut lines = io::BufReader::new(io::stdin()).lines();
    let mut stdin_open = true;

    let (success, reason) = loop {
        select! {
            event = event_rx.recv() => match event {
                Some(TaskEvent::Status(status)) => {
                    progress_bar.set_message(format!("📱 {status}"));
                }
                Some(TaskEvent::Completed(success, reason)) => {
                    break (success, reason);
                }
                None => break (false, "The agent stopped unexpectedly".to_owned()),
            },
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "p" if handle.is_paused() => handle.resume(),
                    "p" => handle.pause(),
                    "c" => handle.cancel(),
                    "" => {}
                    other => progress_bar.println(format!(
                        "{}unknown command {other:?}, use p to pause or resume, c to cancel",
                        BAR_CHAR.bright_yellow()
                    )),
                },
                Ok(None) => stdin_open = false,
                Err(err) => {
                    error!("error reading input: {err}");
                    stdin_open = false;
                }
            },
            _ = signal::ctrl_c() => handle.cancel(),
        }
    };

    // Finish the progress bar before printing anything else.
    progress_bar.finish_and_clear();
    if success {
        println!("{}✅ {}", BAR_CHAR.bright_green(), reason.bright_white());
        ExitCode::SUCCESS
    } else {
        println!("{}❌ {}", BAR_CHAR.bright_red(), reason.bright_white());
        ExitCode::FAILURE
    }
}
