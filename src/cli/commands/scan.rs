//! Scan command - comprehensive risk evaluation of one server

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use mcpaudit::ai::OracleClient;
use mcpaudit::client::{McpClient, McpClientTrait};
use mcpaudit::scanner::{
    passive_channel, PassiveDetector, PassiveObservation, PassiveReceiver, ProgressCallback,
    ScanCoordinator, ScanEngine, ScanReport, ScanRequest, DEFAULT_PASSIVE_CAPACITY,
};
use mcpaudit::transport::TransportConfig;

use crate::cli::config::{FileConfig, ScanOverrides};
use crate::cli::OutputFormat;

/// Arguments of `mcpaudit scan`
#[derive(Debug, Clone)]
pub struct ScanArgs {
    pub target: String,
    pub args: Vec<String>,
    pub config_path: Option<PathBuf>,
    pub overrides: ScanOverrides,
    pub observations: Option<PathBuf>,
    pub format: OutputFormat,
    pub output: Option<PathBuf>,
    pub quiet: bool,
}

pub async fn run(args: ScanArgs) -> Result<i32> {
    let mut config = FileConfig::load(args.config_path.as_deref())
        .context("Failed to load configuration")?;
    args.overrides.apply(&mut config);
    debug!("Scan configuration: {:?}", config.scan);

    let oracle = OracleClient::from_profiles(&config.profiles);
    if config.scan.enable_llm_analysis {
        let id = &config.scan.llm_config_id;
        if let Some(reason) = oracle.unavailable_reason(id) {
            warn!("Oracle profile '{}' is unavailable: {}", id, reason);
        } else if let Some((provider, model)) = oracle.describe(id) {
            info!("Using oracle profile '{}' ({} / {})", id, provider, model);
        } else {
            warn!(
                "Oracle profile '{}' is not configured (available: {})",
                id,
                oracle.profile_ids().collect::<Vec<_>>().join(", ")
            );
        }
    }

    let mut passive = match &args.observations {
        Some(path) => Some(load_observations(path).await?),
        None => None,
    };

    if !args.quiet && args.format == OutputFormat::Text {
        println!("{}", "Starting comprehensive scan...".cyan());
        println!("  Server: {}", args.target.yellow());
        println!(
            "  Oracle: {}",
            if config.scan.enable_llm_analysis {
                config.scan.llm_config_id.green().to_string()
            } else {
                "disabled".dimmed().to_string()
            }
        );
        println!();
    }

    let transport_config = TransportConfig {
        timeout_secs: config.scan.timeout_secs,
        ..Default::default()
    };
    let mut client = McpClient::connect(&args.target, &args.args, &HashMap::new(), transport_config)
        .await
        .with_context(|| format!("Failed to connect to {}", args.target))?;
    let server_name = client
        .server_name()
        .map(str::to_string)
        .unwrap_or_else(|| args.target.clone());

    let engine = ScanEngine::new(config.scan.clone(), Arc::new(oracle))
        .with_coordinator(ScanCoordinator::global().clone());

    let progress = (!args.quiet).then(create_progress_bar);
    let mut request = ScanRequest::new(server_name);
    if let Some(bar) = &progress {
        let bar = bar.clone();
        let callback: ProgressCallback = Arc::new(move |pct, msg| {
            bar.set_position(u64::from(pct));
            bar.set_message(msg.to_string());
        });
        request = request.with_progress(callback);
    }
    if let Some(receiver) = passive.as_mut() {
        request = request.with_passive(receiver);
    }

    let ctrl_c = tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", "Cancelling scan...".yellow());
            ScanCoordinator::global().cancel_active();
        }
    });
    let outcome = engine.start_comprehensive_scan(&mut client, request).await;
    ctrl_c.abort();

    if let Some(bar) = progress {
        bar.finish_and_clear();
    }
    if let Err(e) = client.close().await {
        debug!("Error closing client: {:#}", e);
    }

    let report = outcome.map_err(|e| anyhow::Error::new(e).context("Scan did not complete"))?;
    emit_report(&report, args.format, args.output.as_deref())?;
    Ok(report.exit_code())
}

fn create_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% ({msg})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("connecting...");
    pb
}

/// Run every recorded observation through the detector and queue the
/// matches for the summary phase.
async fn load_observations(path: &Path) -> Result<PassiveReceiver> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open observations file {}", path.display()))?;
    let detector = PassiveDetector::new();
    let mut results = Vec::new();

    for (index, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PassiveObservation>(&line) {
            Ok(observation) => results.extend(detector.inspect(&observation)),
            Err(e) => warn!("Skipping observation on line {}: {}", index + 1, e),
        }
    }

    let (tx, rx) = passive_channel(results.len().max(DEFAULT_PASSIVE_CAPACITY));
    let count = results.len();
    for result in results {
        tx.send(result).await?;
    }
    info!("Queued {} passive result(s) from {}", count, path.display());
    Ok(rx)
}

fn emit_report(report: &ScanReport, format: OutputFormat, output: Option<&Path>) -> Result<()> {
    match (format, output) {
        (OutputFormat::Text, None) => report.print_text(),
        (OutputFormat::Json, None) => report.print_json()?,
        (_, Some(path)) => {
            let json = serde_json::to_string_pretty(report)?;
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if format == OutputFormat::Text {
                report.print_text();
            }
            println!("Report written to {}", path.display());
        }
    }
    Ok(())
}
