//! mcpaudit - risk evaluation for MCP servers
//!
//! Connects to a Model Context Protocol server, exercises every component
//! it exposes and reports what a language-model oracle judged risky.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli;

use cli::commands;
use cli::commands::scan::ScanArgs;
use cli::config::ScanOverrides;
use cli::OutputFormat;
use mcpaudit::ai::ProviderKind;

/// mcpaudit - risk evaluation for MCP servers
#[derive(Parser)]
#[command(
    name = "mcpaudit",
    version,
    about = "Risk-evaluation scanner for Model Context Protocol servers",
    long_about = "mcpaudit walks every tool, prompt and resource an MCP server exposes,\n\
                  asks a language model to assess definitions and judge live responses,\n\
                  and aggregates the results into one risk report."
)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a comprehensive scan against one server
    Scan {
        /// Server command (stdio) or http(s) URL
        #[arg(required = true)]
        target: String,

        /// Arguments to pass to the server
        #[arg(last = true)]
        args: Vec<String>,

        /// Path to config file (defaults to .mcpaudit.toml, mcpaudit.toml or the user config dir)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Oracle profile id
        #[arg(long)]
        profile_id: Option<String>,

        /// Oracle provider (anthropic, openai, ollama, mock)
        #[arg(long)]
        provider: Option<ProviderKind>,

        /// Oracle model
        #[arg(long)]
        model: Option<String>,

        /// Upper bound on generated test cases per component
        #[arg(long)]
        max_test_cases: Option<usize>,

        /// Skip static analysis, verdicts and the narrative
        #[arg(long)]
        no_llm: bool,

        /// Skip the dynamic test phase
        #[arg(long)]
        no_generate: bool,

        /// Timeout for each server call (seconds)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Recorded observations (JSON lines) to run through passive detection
        #[arg(long)]
        observations: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,

        /// Also write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_logging(verbosity: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbosity {
            0 => EnvFilter::new("mcpaudit=info"),
            1 => EnvFilter::new("mcpaudit=debug"),
            2 => EnvFilter::new("mcpaudit=trace"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Scan {
            target,
            args,
            config,
            profile_id,
            provider,
            model,
            max_test_cases,
            no_llm,
            no_generate,
            timeout,
            observations,
            format,
            output,
        } => {
            let scan_args = ScanArgs {
                target,
                args,
                config_path: config,
                overrides: ScanOverrides {
                    profile_id,
                    provider,
                    model,
                    max_test_cases,
                    no_llm,
                    no_generate,
                    timeout,
                },
                observations,
                format,
                output,
                quiet: cli.quiet,
            };
            match commands::scan::run(scan_args).await {
                Ok(code) => {
                    if code != 0 {
                        std::process::exit(code);
                    }
                }
                Err(e) => {
                    eprintln!("{} {:#}", "✖".red(), e);
                    std::process::exit(2);
                }
            }
        }
    }

    Ok(())
}
