//! Run command - the diagnosis itself

use anyhow::{Context, Result};
use blockcheck_core::config::VERSION;
use blockcheck_core::{CancelToken, Config, DiagnosisEngine, DiagnosisReport, ProbeLog, RunOutcome};
use blockcheck_net::NetStack;
use colored::Colorize;
use serde::Serialize;
use std::process::ExitCode;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::args::Args;
use crate::commands::config;
use crate::{render, upload};

/// Exit status after Ctrl-C
const EXIT_CANCELLED: u8 = 130;

/// How often the main thread looks at the cancel token
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// What the diagnosis thread hands back
type Outcome = blockcheck_core::Result<RunOutcome>;

/// How waiting for the diagnosis ended
enum Waited {
    Finished(Outcome),
    Cancelled,
}

#[derive(Serialize)]
struct JsonOutput<'a> {
    version: &'static str,
    report: &'a DiagnosisReport,
    transcript: &'a ProbeLog,
}

/// Execute the run command
pub fn execute(args: &Args) -> Result<ExitCode> {
    let mut config = config::load(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate().context("Configuration validation failed")?;

    if !args.quiet {
        print_notice(args.verbose > 0 || args.debug);
    }

    let stack = NetStack::build(&config).context("Failed to set up network access")?;

    let cancel = CancelToken::new();
    let token = cancel.clone();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, stopping...");
        token.cancel();
    })
    .context("Failed to set signal handler")?;

    info!(
        parallel = config.probes.parallel,
        ipv6 = !config.probes.disable_ipv6,
        oracle = config.oracle.enabled,
        "Starting diagnosis"
    );

    let worker_config = config.clone();
    let worker_cancel = cancel.clone();
    let outcome_rx = spawn_diagnosis(move || {
        DiagnosisEngine::new(&worker_config, stack.collaborators()).run(worker_cancel)
    });

    // a worker blocked in I/O is abandoned; the process exits without waiting for it
    let outcome = match wait_for_outcome(&outcome_rx, &cancel, CANCEL_POLL) {
        Waited::Finished(Ok(outcome)) => outcome,
        Waited::Finished(Err(e)) if !e.is_cancelled() => {
            return Err(e).context("Diagnosis failed");
        }
        Waited::Finished(Err(_)) | Waited::Cancelled => {
            warn!("Diagnosis cancelled");
            eprintln!("Cancelled, no report produced.");
            return Ok(ExitCode::from(EXIT_CANCELLED));
        }
    };

    let result = verdict_text(&outcome.report, &config);
    if args.json {
        let json = JsonOutput {
            version: VERSION,
            report: &outcome.report,
            transcript: &outcome.transcript,
        };
        let text = serde_json::to_string_pretty(&json).context("Failed to serialize report")?;
        println!("{text}");
    } else {
        print!("{}", outcome.transcript.text());
        println!();
        println!("{}", "[!] Result:".bold());
        print!("{result}");
    }

    if config.report.enabled {
        send_report(&config, &outcome, &result);
    }
    Ok(ExitCode::SUCCESS)
}

/// Run the diagnosis on its own thread and hand back the channel its result arrives on
fn spawn_diagnosis<F>(job: F) -> Receiver<Outcome>
where
    F: FnOnce() -> Outcome + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        // the receiver is gone when the run was cancelled
        let _ = tx.send(job());
    });
    rx
}

/// Wait for the worker, giving up as soon as cancellation is requested
fn wait_for_outcome(
    rx: &Receiver<Outcome>,
    cancel: &CancelToken,
    poll: Duration,
) -> Waited {
    loop {
        if cancel.is_cancelled() {
            return Waited::Cancelled;
        }
        match rx.recv_timeout(poll) {
            Ok(result) => return Waited::Finished(result),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Waited::Finished(Err(blockcheck_core::Error::Config(
                    "diagnosis thread stopped without a result".into(),
                )));
            }
        }
    }
}

fn verdict_text(report: &DiagnosisReport, config: &Config) -> String {
    let mut text = String::new();
    for line in render::verdict_lines(report, &config.oracle.name) {
        text.push_str(&line);
        text.push('\n');
    }
    text
}

/// Upload the transcript, with the debug lines only when the check itself misbehaved
fn send_report(config: &Config, outcome: &RunOutcome, result: &str) {
    let text = format!("{}\n[!] Result:\n{result}", outcome.transcript.text());
    let text_debug = outcome
        .report
        .health
        .internal_error
        .then(|| format!("{}\n[!] Result:\n{result}", outcome.transcript.text_with_debug()));
    upload::send(&config.report.url, &config.general.user_agent, &text, text_debug.as_deref());
}

/// Progress goes to stderr so `--json` output stays clean
fn print_notice(live: bool) {
    eprintln!("{}", format!("Blockcheck v{VERSION}").green().bold());
    if live {
        eprintln!("Running the diagnosis...");
    } else {
        eprintln!(
            "Running the diagnosis, this takes a few minutes (use -v to follow the progress)..."
        );
    }
    eprintln!();
}
