use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tally_core::AllowedCategories;
use tally_finance::anomaly::ANOMALY_COLUMNS;
use tally_finance::budget::BudgetStatus;
use tally_finance::{
    AnomalyDetector, BudgetConfig, DisabledCategorizer, ForecastConfig, LlmCategorizer, Pipeline,
    TransactionCategorizer, budget_status, forecast_spending, load_budgets, smart_budget,
};
use tally_ingest::{AppendedColumns, load_many, write_enriched};
use tracing_subscriber::EnvFilter;

mod config;
mod llm;
mod reports;
mod state;

use crate::config::{Config, init_config, load_config};
use crate::llm::HttpBackend;
use crate::reports::RunReports;

#[derive(Parser, Debug)]
#[command(
    name = "tally",
    version,
    long_version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TALLY_BUILD_SHA"), ")"),
    about = "Categorize bank transactions with keyword rules and an LLM fallback"
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Categorize one or more CSV exports and write the enriched table
    Run(RunArgs),

    /// Manage ~/.tally/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Input CSV (repeat to aggregate several accounts)
    #[arg(long, required = true, num_args = 1..)]
    input: Vec<PathBuf>,

    /// Enriched output CSV
    #[arg(long, default_value = "categorized_transactions.csv")]
    output: PathBuf,

    /// Never call the LLM; rule results are final
    #[arg(long)]
    no_llm: bool,

    /// Confidence threshold below which rules escalate (default from config)
    #[arg(long)]
    threshold: Option<f64>,

    /// Directory for report files
    #[arg(long)]
    reports: Option<PathBuf>,

    /// TOML file with a [budgets] table (smart budget when absent)
    #[arg(long)]
    budgets: Option<PathBuf>,

    /// Months to forecast
    #[arg(long, default_value_t = 3)]
    forecast_months: u32,

    /// Config file (default: ~/.tally/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a starter config with the built-in keyword rules
    Init {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Print the effective config
    Show {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Run(args) => run(args)?,
        Command::Config { command } => match command {
            ConfigCommand::Init { path } => init_config(path.as_deref())?,
            ConfigCommand::Show { path } => {
                let cfg = load_config(path.as_deref())?;
                print!("{}", toml::to_string_pretty(&cfg).context("serialize config")?);
            }
        },
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: RunArgs) -> Result<()> {
    // Configuration errors stop the run before any input is read.
    let cfg = load_config(args.config.as_deref())?;
    let settings = cfg
        .routing_settings(args.threshold)
        .context("invalid routing configuration")?;
    let llm = build_llm(&cfg, &settings.allowed, args.no_llm)?;
    let budgets = match &args.budgets {
        Some(p) => {
            let loaded = load_budgets(p)?;
            if loaded.is_none() {
                tracing::warn!(path = %p.display(), "no budgets found; using smart budget");
            }
            loaded
        }
        None => None,
    };

    let txns = load_many(&args.input)?;
    tracing::info!(rows = txns.len(), files = args.input.len(), "loaded input");

    let pipeline = Pipeline::from_settings(&settings, llm);
    let out = pipeline.run(&txns);

    let flags = AnomalyDetector::default().detect(&out.records);
    let appended = AppendedColumns {
        names: ANOMALY_COLUMNS.iter().map(|s| s.to_string()).collect(),
        values: flags.iter().map(|f| f.columns()).collect(),
    };
    write_enriched(&args.output, &out.records, Some(&appended))?;

    println!("Processed {} transactions.", out.stats.processed);
    println!(
        "LLM used for {} transactions ({} fell back).",
        out.stats.llm_escalations, out.stats.llm_fallbacks
    );
    println!("Saved output to {}", args.output.display());

    let budgets = budgets.unwrap_or_else(|| smart_budget(&out.records, &BudgetConfig::default()));
    let forecast = forecast_spending(
        &out.records,
        &ForecastConfig {
            months_ahead: args.forecast_months,
            ..ForecastConfig::default()
        },
    );
    let budget = budget_status(&out.records, &budgets);
    let reports = RunReports {
        records: &out.records,
        flags: &flags,
        forecast: &forecast,
        budget: &budget,
    };

    println!("\n{}", reports.summary_text());
    println!("\n{}", reports.anomaly_text());
    print_budget_alerts(&budget);

    if let Some(dir) = &args.reports {
        for p in reports.write_to(dir)? {
            println!("Saved {}", p.display());
        }
    }

    Ok(())
}

/// `None` disables escalation entirely; a missing key degrades to
/// `DisabledCategorizer` so low-confidence rows are still marked as escalated.
fn build_llm(
    cfg: &Config,
    allowed: &AllowedCategories,
    no_llm: bool,
) -> Result<Option<Box<dyn TransactionCategorizer>>> {
    if no_llm || !cfg.llm_enabled() {
        tracing::info!("llm disabled; rule results are final");
        return Ok(None);
    }

    match HttpBackend::from_config(cfg)? {
        Some(backend) => {
            tracing::info!(provider = ?backend.provider(), model = backend.model(), "llm fallback enabled");
            Ok(Some(Box::new(LlmCategorizer::new(backend, allowed.clone()))))
        }
        None => {
            let key_env = cfg.api_key_env()?;
            tracing::warn!("{key_env} is not set; running without the llm");
            Ok(Some(Box::new(DisabledCategorizer::new(format!("{key_env} missing")))))
        }
    }
}

fn print_budget_alerts(status: &BudgetStatus) {
    let alerts: Vec<_> = status.alerts().collect();
    if alerts.is_empty() {
        return;
    }
    println!("\nBudget alerts for {}:", status.month);
    for a in alerts {
        println!("  {} over by ${:.2}", a.category, -a.remaining);
    }
}
