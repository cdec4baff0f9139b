// MST Integration Engine - CLI
//
// Usage: mst-integration [--config FILE] [--view summary|detailed|full] [--offline] MST...
//
// Results go to stdout as JSON, logs go to stderr.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mst_integration::{exit_codes, IntegrationConfig, IntegrationEngine, SessionStatistics, View};

struct CliArgs {
    config: Option<PathBuf>,
    view: View,
    offline: bool,
    identifiers: Vec<String>,
}

const USAGE: &str =
    "Usage: mst-integration [--config FILE] [--view summary|detailed|full] [--offline] MST...";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mst_integration=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = match parse_args(env::args().skip(1)) {
        Ok(Some(args)) => args,
        Ok(None) => {
            println!("{}", USAGE);
            return ExitCode::from(exit_codes::EXIT_SUCCESS);
        }
        Err(e) => {
            eprintln!("❌ {:#}", e);
            eprintln!("{}", USAGE);
            return ExitCode::from(exit_codes::EXIT_INVALID_INPUT);
        }
    };

    match run(args) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %format!("{:#}", e), "startup failed");
            eprintln!("❌ {:#}", e);
            ExitCode::from(exit_codes::EXIT_INTERNAL_FAULT)
        }
    }
}

/// `Ok(None)` means help was requested
fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<CliArgs>> {
    let mut parsed = CliArgs {
        config: None,
        view: View::default(),
        offline: false,
        identifiers: Vec::new(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "--offline" => parsed.offline = true,
            "--config" => {
                let path = args.next().context("--config needs a file path")?;
                parsed.config = Some(PathBuf::from(path));
            }
            "--view" => {
                let view = args.next().context("--view needs a value")?;
                parsed.view = view.parse().map_err(anyhow::Error::msg)?;
            }
            flag if flag.starts_with("--") => bail!("unknown option {}", flag),
            _ => parsed.identifiers.push(arg),
        }
    }

    if parsed.identifiers.is_empty() {
        bail!("at least one MST is required");
    }
    Ok(Some(parsed))
}

fn run(args: CliArgs) -> Result<u8> {
    let mut config = match &args.config {
        Some(path) => IntegrationConfig::load(path)?,
        None => IntegrationConfig::default(),
    };
    if args.offline {
        config.enterprise.enabled = false;
        config.insurance.enabled = false;
    }

    let engine = IntegrationEngine::from_config(&config)?;
    let stats = SessionStatistics::new();

    let report = engine.process_batch(&args.identifiers, &stats, args.view);

    let output = match report.entries.as_slice() {
        [single] => match &single.outcome {
            Ok(outcome) => outcome.to_json(args.view),
            Err(_) => report.to_json(args.view)["results"][0].clone(),
        },
        _ => report.to_json(args.view),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize output")?
    );

    let snapshot = stats.snapshot();
    info!(
        requests = snapshot.total_requests,
        successes = snapshot.successes,
        success_rate = snapshot.success_rate,
        average_latency_ms = snapshot.average_latency_ms,
        enterprise_live = snapshot.enterprise.live,
        insurance_live = snapshot.insurance.live,
        "session finished"
    );

    Ok(report.exit_code())
}
