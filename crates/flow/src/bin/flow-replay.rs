//! Flow Replay Tool
//!
//! Replays a recorded identity-service transcript (one JSON message per line)
//! through the authentication flow controller and reports the outcome and the
//! commands the controller answered with.

use async_trait::async_trait;
use ausweis_core::{logging, FlowConfig};
use ausweis_flow::{
    AccessRightsDecision, AccessRightsRequest, AuthFlow, AuthFlowDelegate, ErrorDetails,
    MemoryChannel, PinChallenge,
};
use ausweis_protocol::Command;
use serde::Serialize;
use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;
use zeroize::Zeroizing;

const DEFAULT_TC_TOKEN_URL: &str =
    "https://test.governikus-eid.de/AusweisAuskunft/WebServiceRequesterServlet";

/// Terminal outcome as printed
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum ReplayOutcome {
    Success { refresh_url: String },
    Error { reason: String, message: String },
}

/// JSON output of a replay
#[derive(Debug, Serialize)]
struct ReplayReport {
    #[serde(flatten)]
    outcome: Option<ReplayOutcome>,
    messages_replayed: usize,
    commands: Vec<Command>,
}

struct ReplayDelegate {
    pin: Option<String>,
    decline_rights: bool,
    outcome_tx: mpsc::UnboundedSender<ReplayOutcome>,
}

#[async_trait]
impl AuthFlowDelegate for ReplayDelegate {
    async fn enter_pin(&self, challenge: PinChallenge) -> anyhow::Result<Zeroizing<String>> {
        eprintln!(
            "PIN requested ({} attempts remaining, {} failed)",
            challenge.attempts_remaining(),
            challenge.failed_attempts()
        );
        match &self.pin {
            Some(pin) => Ok(Zeroizing::new(pin.clone())),
            None => anyhow::bail!("no --pin given"),
        }
    }

    async fn request_access_rights(
        &self,
        request: AccessRightsRequest,
    ) -> anyhow::Result<AccessRightsDecision> {
        eprintln!(
            "Access rights requested: required [{}], optional [{}]",
            request.required.join(", "),
            request.optional.join(", ")
        );
        if self.decline_rights {
            Ok(AccessRightsDecision::Decline)
        } else {
            Ok(AccessRightsDecision::AcceptEffective)
        }
    }

    fn on_card_attached_changed(&self, attached: bool) {
        eprintln!("Card attached: {}", attached);
    }

    fn on_status_progress(&self, progress: u8) {
        eprintln!("Progress: {}%", progress);
    }

    fn on_attach_card(&self) {
        eprintln!("Attach card");
    }

    fn on_success(&self, refresh_url: String) {
        let _ = self.outcome_tx.send(ReplayOutcome::Success { refresh_url });
    }

    fn on_error(&self, details: ErrorDetails) {
        let _ = self.outcome_tx.send(ReplayOutcome::Error {
            reason: details.reason.to_string(),
            message: details.message,
        });
    }
}

struct Options {
    transcript: PathBuf,
    config: Option<PathBuf>,
    pin: Option<String>,
    tc_token_url: String,
    decline_rights: bool,
    step_ms: u64,
    log_format: String,
}

fn read_transcript(path: &PathBuf) -> io::Result<Vec<String>> {
    let file = fs::File::open(path)?;
    let reader = io::BufReader::new(file);
    let mut messages = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        messages.push(line.to_string());
    }

    Ok(messages)
}

async fn replay(options: Options) -> Result<ReplayReport, String> {
    let config = match &options.config {
        Some(path) => FlowConfig::from_file(path)
            .map_err(|e| format!("Failed to load config: {}", e))?,
        None => FlowConfig::default(),
    };
    let messages = read_transcript(&options.transcript)
        .map_err(|e| format!("Failed to read transcript: {}", e))?;

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let channel = Arc::new(MemoryChannel::new());
    let delegate = Arc::new(ReplayDelegate {
        pin: options.pin,
        decline_rights: options.decline_rights,
        outcome_tx,
    });
    let flow = AuthFlow::new(channel.clone(), delegate, config);

    flow.start(options.tc_token_url)
        .map_err(|e| format!("Failed to start flow: {}", e))?;
    tokio::time::timeout(Duration::from_secs(5), channel.next_command())
        .await
        .map_err(|_| "Flow did not send RUN_AUTH".to_string())?;

    let step = Duration::from_millis(options.step_ms);
    let mut replayed = 0;
    let mut outcome = None;
    for message in messages {
        if let Ok(done) = outcome_rx.try_recv() {
            outcome = Some(done);
            break;
        }
        channel.emit(message);
        replayed += 1;
        tokio::time::sleep(step).await;
    }

    if outcome.is_none() {
        outcome = tokio::time::timeout(step.max(Duration::from_millis(100)), outcome_rx.recv())
            .await
            .ok()
            .flatten();
    }
    if outcome.is_none() && flow.is_active() {
        info!("Transcript ended without a terminal message");
        flow.cancel()
            .await
            .map_err(|e| format!("Failed to cancel flow: {}", e))?;
        outcome = outcome_rx.recv().await;
    }

    Ok(ReplayReport {
        outcome,
        messages_replayed: replayed,
        commands: channel.sent_commands().iter().map(Command::redacted).collect(),
    })
}

fn print_usage() {
    eprintln!("Flow Replay Tool");
    eprintln!();
    eprintln!("Usage: flow-replay --transcript <file> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -t, --transcript <file>   JSON-lines transcript of service messages");
    eprintln!("  -c, --config <file>       TOML flow configuration");
    eprintln!("  -p, --pin <pin>           PIN to answer ENTER_PIN with");
    eprintln!("  -u, --tc-token-url <url>  TC token URL for RUN_AUTH");
    eprintln!("      --decline-rights      Decline the requested access rights");
    eprintln!("      --step-ms <ms>        Delay between replayed messages (default 10)");
    eprintln!("      --log-format <fmt>    text or json (default text)");
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut transcript = None;
    let mut options = Options {
        transcript: PathBuf::new(),
        config: None,
        pin: None,
        tc_token_url: DEFAULT_TC_TOKEN_URL.to_string(),
        decline_rights: false,
        step_ms: 10,
        log_format: "text".to_string(),
    };

    let mut i = 0;
    while i < args.len() {
        let value = |i: usize| {
            args.get(i + 1)
                .cloned()
                .ok_or_else(|| format!("Missing value for {}", args[i]))
        };
        match args[i].as_str() {
            "--transcript" | "-t" => {
                transcript = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--config" | "-c" => {
                options.config = Some(PathBuf::from(value(i)?));
                i += 1;
            }
            "--pin" | "-p" => {
                options.pin = Some(value(i)?);
                i += 1;
            }
            "--tc-token-url" | "-u" => {
                options.tc_token_url = value(i)?;
                i += 1;
            }
            "--step-ms" => {
                options.step_ms = value(i)?
                    .parse()
                    .map_err(|_| "Invalid --step-ms value".to_string())?;
                i += 1;
            }
            "--log-format" => {
                options.log_format = value(i)?;
                i += 1;
            }
            "--decline-rights" => options.decline_rights = true,
            other => return Err(format!("Unknown argument: {}", other)),
        }
        i += 1;
    }

    options.transcript = transcript.ok_or_else(|| "Missing --transcript argument".to_string())?;
    Ok(options)
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        process::exit(if args.is_empty() { 1 } else { 0 });
    }

    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(e) => {
            print_usage();
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    logging::init_with_format(&options.log_format);

    match replay(options).await {
        Ok(report) => {
            let success = matches!(report.outcome, Some(ReplayOutcome::Success { .. }));
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            }
            if !success {
                process::exit(2);
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
