use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use probewatch::config::{LoggingConfig, Settings};
use probewatch::report::EndpointSummary;

#[derive(Parser)]
#[command(
    name = "probewatch",
    about = "Probe HTTP source endpoints and keep a rolling health report",
    version,
    long_about = None
)]
struct Cli {
    /// Settings file (TOML). Falls back to $PROBEWATCH_CONFIG, then ./probewatch.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every endpoint once, update the history and rewrite the report
    Check(CheckArgs),

    /// Show stats from the stored history without probing
    Status {
        #[command(flatten)]
        paths: PathArgs,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Check the settings and endpoint list, then exit
    Validate {
        #[command(flatten)]
        paths: PathArgs,
    },
}

#[derive(Args)]
struct PathArgs {
    /// Endpoint list (JSON array)
    #[arg(long, env = "PROBEWATCH_ENDPOINTS")]
    endpoints: Option<PathBuf>,

    /// Report file holding the history
    #[arg(long, env = "PROBEWATCH_REPORT")]
    report: Option<PathBuf>,
}

impl PathArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(endpoints) = self.endpoints {
            settings.paths.endpoints = endpoints;
        }
        if let Some(report) = self.report {
            settings.paths.report = report;
        }
    }
}

#[derive(Args)]
struct CheckArgs {
    /// Search keyword (positional form)
    #[arg(value_name = "KEYWORD", conflicts_with = "keyword")]
    keyword_arg: Option<String>,

    /// Search keyword
    #[arg(long, env = "PROBEWATCH_KEYWORD")]
    keyword: Option<String>,

    /// Skip the keyword search test
    #[arg(long)]
    no_search: bool,

    /// Maximum endpoints probed at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Total attempts per check
    #[arg(long)]
    max_retry: Option<u32>,

    /// Delay between attempts (ms)
    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Per-attempt timeout (ms)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// History window, in runs
    #[arg(long)]
    max_days: Option<usize>,

    /// Consecutive failures before an endpoint is critical
    #[arg(long)]
    warn_streak: Option<u32>,

    #[command(flatten)]
    paths: PathArgs,

    /// JSON output for machine parsing
    #[arg(long)]
    json: bool,

    /// Exit with status 2 when any endpoint is critical
    #[arg(long)]
    fail_on_critical: bool,
}

impl CheckArgs {
    fn apply(self, settings: &mut Settings) -> (bool, bool) {
        if let Some(keyword) = self.keyword_arg.or(self.keyword) {
            settings.probe.search_keyword = keyword;
        }
        if self.no_search {
            settings.probe.search_enabled = false;
        }
        if let Some(v) = self.concurrency {
            settings.scheduler.concurrency = v;
        }
        if let Some(v) = self.max_retry {
            settings.probe.max_retry = v;
        }
        if let Some(v) = self.retry_delay_ms {
            settings.probe.retry_delay_ms = v;
        }
        if let Some(v) = self.timeout_ms {
            settings.probe.timeout_ms = v;
        }
        if let Some(v) = self.max_days {
            settings.history.max_days = v;
        }
        if let Some(v) = self.warn_streak {
            settings.history.warn_streak = v;
        }
        self.paths.apply(settings);
        (self.json, self.fail_on_critical)
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_table(summaries: &[EndpointSummary]) {
    println!(
        "{:<10} | {:<24} | {:<10} | {:>4} | {:>4} | {:>7} | {:<7} | Search",
        "Status", "Name", "ID", "OK", "Fail", "Rate", "Trend"
    );
    println!(
        "{:-<10}-|-{:-<24}-|-{:-<10}-|-{:->4}-|-{:->4}-|-{:->7}-|-{:-<7}-|-{:-<10}",
        "", "", "", "", "", "", "", ""
    );
    for s in summaries {
        println!(
            "{:<10} | {:<24} | {:<10} | {:>4} | {:>4} | {:>7} | {:<7} | {}",
            s.stats.status.to_string(),
            s.name,
            s.id,
            s.stats.ok_count,
            s.stats.fail_count,
            s.stats.success_rate.to_string(),
            s.stats.trend.to_string(),
            s.stats.search_label(),
        );
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let resolved = Settings::resolve(cli.config.as_deref())?;
    init_tracing(&resolved.settings.logging);
    for skipped in &resolved.skipped {
        tracing::warn!(error = %skipped, "settings file skipped, falling back");
    }
    match &resolved.source {
        Some(path) => tracing::info!(path = %path.display(), "loaded settings"),
        None => tracing::debug!("no settings file found, using compiled-in defaults"),
    }
    let mut settings = resolved.settings;

    match cli.command {
        Commands::Check(args) => {
            let (json, fail_on_critical) = args.apply(&mut settings);
            tracing::info!(
                endpoints = %settings.paths.endpoints.display(),
                report = %settings.paths.report.display(),
                concurrency = settings.scheduler.concurrency,
                "Starting check run"
            );
            let outcome = probewatch::run_check(&settings).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.summaries)?);
            } else {
                println!("\nprobewatch run {}", outcome.date);
                print_table(&outcome.summaries);
                println!("\nReport written to {}", settings.paths.report.display());
            }

            if fail_on_critical && outcome.has_critical() {
                return Ok(ExitCode::from(2));
            }
        }
        Commands::Status { paths, json } => {
            paths.apply(&mut settings);
            let summaries = probewatch::load_status(&settings)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print_table(&summaries);
            }
        }
        Commands::Validate { paths } => {
            paths.apply(&mut settings);
            settings.validate()?;
            let endpoints = probewatch::endpoints::load(&settings.paths.endpoints)?;
            let disabled = endpoints.iter().filter(|e| e.disabled).count();
            println!(
                "OK: {} endpoint(s), {} disabled, concurrency {}, window {} runs",
                endpoints.len(),
                disabled,
                settings.scheduler.concurrency,
                settings.history.max_days
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
