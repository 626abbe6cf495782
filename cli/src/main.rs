//! sharetoken CLI: issue share tokens for every applicant in a CSV file.
//!
//! Usage:
//! ```bash
//! # Live run; re-running the same command resumes where it stopped
//! SHARETOKEN_APP_TOKEN=... SHARETOKEN_SECRET=... sharetoken applicants.csv tokens.csv
//!
//! # Validate the input and log every request without sending it
//! sharetoken applicants.csv tokens.csv --dry-run
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use sharetoken_core::config::DEFAULT_FLUSH_BATCH_SIZE;
use sharetoken_core::progress::format_duration;
use sharetoken_core::shutdown::{self, Shutdown};
use sharetoken_core::{BatchProcessor, Credentials, Mode, ProcessorConfig, RunSummary};
use sharetoken_http::{HttpClientConfig, ShareTokenClient, DEFAULT_BASE_URL};

mod logging;

use logging::{init_tracing, parse_component, LogConfig};

#[derive(Parser)]
#[command(
    name = "sharetoken",
    about = "Issue share tokens for a CSV of applicants, resumably",
    long_about = "
Reads applicants from INPUT, requests a share token for each one and writes
the outcomes to OUTPUT. OUTPUT doubles as the resume point: applicants that
already have a token there are skipped on the next run.

ENVIRONMENT VARIABLES:
  SHARETOKEN_APP_TOKEN   API app token (required unless --dry-run)
  SHARETOKEN_SECRET      API signing secret (required unless --dry-run)
  SHARETOKEN_BASE_URL    API base URL
",
    version
)]
struct Cli {
    /// Input CSV with applicantId, externalId and applicantLevel columns
    input: PathBuf,

    /// Result CSV, created or merged into
    output: PathBuf,

    /// Validate and log requests without calling the API
    #[arg(long)]
    dry_run: bool,

    /// Flush the result file after this many records
    #[arg(long, default_value_t = DEFAULT_FLUSH_BATCH_SIZE)]
    batch_size: usize,

    #[arg(long, env = "SHARETOKEN_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    #[arg(long, env = "SHARETOKEN_APP_TOKEN", hide_env_values = true)]
    app_token: Option<String>,

    #[arg(long, env = "SHARETOKEN_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// trace | debug | info | warn | error
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Level override for one component, e.g. `sharetoken_http=debug` (repeatable)
    #[arg(long = "log-component", value_name = "CRATE=LEVEL", value_parser = parse_component)]
    log_components: Vec<(String, String)>,

    /// Emit JSON structured logs on the console
    #[arg(long)]
    json_logs: bool,

    /// Also append logs to this file
    #[arg(long, default_value = "sharetoken.log")]
    log_file: PathBuf,

    /// Do not write a log file
    #[arg(long)]
    no_log_file: bool,
}

impl Cli {
    fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            json: self.json_logs,
            components: self.log_components.iter().cloned().collect(),
            file: (!self.no_log_file).then(|| self.log_file.clone()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_config()) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(summary) => {
            print_summary(&summary, cli.dry_run);
            if summary.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<RunSummary> {
    let config = ProcessorConfig::default().with_flush_batch_size(cli.batch_size);
    config.validate().context("invalid --batch-size")?;

    let shutdown = watch_ctrl_c();

    let mode = if cli.dry_run {
        Mode::DryRun
    } else {
        let credentials = Credentials::new(cli.app_token.clone(), cli.secret.clone())
            .context("set SHARETOKEN_APP_TOKEN and SHARETOKEN_SECRET, or pass --dry-run")?;
        let client = ShareTokenClient::new(
            &credentials,
            HttpClientConfig {
                base_url: cli.base_url.clone(),
                client_id: config.client_id.clone(),
                ttl_secs: config.ttl_secs,
                ..Default::default()
            },
        )
        .context("cannot build HTTP client")?
        .with_shutdown(shutdown.clone());
        tracing::info!(url = client.url(), "live run");
        Mode::Live(Arc::new(client))
    };

    BatchProcessor::new(config, mode)?
        .with_shutdown(shutdown)
        .run(&cli.input, &cli.output)
        .await
        .with_context(|| format!("run over {} failed", cli.input.display()))
}

/// Exit status after a second interrupt (128 + SIGINT).
const ABORT_EXIT_CODE: i32 = 130;

/// Reaction to the n-th (1-based) Ctrl-C.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// Finish the in-flight record, then write results and stop.
    Graceful,
    /// Exit immediately; the result file keeps its last flushed snapshot.
    Abort,
}

impl Interrupt {
    fn nth(count: usize) -> Self {
        if count <= 1 {
            Self::Graceful
        } else {
            Self::Abort
        }
    }
}

/// First Ctrl-C stops the run after the in-flight record, a second one exits.
fn watch_ctrl_c() -> Shutdown {
    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        let mut received = 0usize;
        while tokio::signal::ctrl_c().await.is_ok() {
            received += 1;
            match Interrupt::nth(received) {
                Interrupt::Graceful => {
                    tracing::warn!("interrupt received, stopping after the current record (Ctrl-C again to abort)");
                    trigger.trigger();
                }
                Interrupt::Abort => {
                    tracing::error!("second interrupt, aborting without final write");
                    eprintln!("Aborted.");
                    std::process::exit(ABORT_EXIT_CODE);
                }
            }
        }
    });
    shutdown
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    let c = &summary.counts;
    println!();
    let state = if summary.interrupted { "interrupted" } else { "complete" };
    let mode = if dry_run { " (dry run)" } else { "" };
    println!("Run {state}{mode}");
    println!("  Processed: {}/{}", c.processed, summary.total);
    println!("  Succeeded: {}", c.succeeded);
    println!("  Failed:    {} ({} invalid)", c.failed, c.invalid);
    println!("  Skipped:   {}", c.skipped);
    println!("  Rows:      {}", summary.rows_written);
    println!("  Elapsed:   {}", format_duration(summary.elapsed));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_interrupt_aborts() {
        assert_eq!(Interrupt::nth(1), Interrupt::Graceful);
        assert_eq!(Interrupt::nth(2), Interrupt::Abort);
        assert_eq!(Interrupt::nth(5), Interrupt::Abort);
    }

    #[test]
    fn component_levels_reach_log_config() {
        let cli = Cli::try_parse_from([
            "sharetoken",
            "in.csv",
            "out.csv",
            "--log-component",
            "sharetoken_http=debug",
            "--log-component",
            "sharetoken-core=warn",
            "--no-log-file",
        ])
        .unwrap();
        let config = cli.log_config();
        assert_eq!(config.directives(), "info,sharetoken_core=warn,sharetoken_http=debug");
        assert!(config.file.is_none());
    }

    #[test]
    fn malformed_component_is_rejected() {
        let parsed = Cli::try_parse_from(["sharetoken", "in.csv", "out.csv", "--log-component", "debug"]);
        assert!(parsed.is_err());
    }
}
