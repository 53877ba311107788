use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use xolsim::config::{RunPlan, Settings};
use xolsim::metrics::{self, DistStats, RiskSummary};
use xolsim::pricing::PremiumBreakdown;
use xolsim::simulation::{Execution, SimulationResult};

/// Price an excess-of-loss layer by Monte Carlo simulation.
#[derive(Parser)]
#[command(name = "xolsim", version, about)]
struct Cli {
    /// TOML configuration; the canonical scenario is used when absent.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override simulation.n_trials.
    #[arg(short = 'n', long)]
    trials: Option<usize>,

    /// Override simulation.seed.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Run trials across the rayon pool.
    #[arg(long)]
    parallel: bool,

    /// Write per-trial outcomes as NDJSON.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the report as JSON instead of tables.
    #[arg(long)]
    json: bool,

    /// Suppress stdout.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Serialize)]
struct Report {
    n_trials: usize,
    seed: u64,
    attaching_years: usize,
    gross: Option<DistStats>,
    ceded: Option<DistStats>,
    ceded_risk: RiskSummary,
    premium: PremiumBreakdown,
    rate_on_line: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => Settings::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => Settings::canonical(),
    };
    if let Some(n) = cli.trials {
        settings.simulation.n_trials = n;
    }
    if let Some(seed) = cli.seed {
        settings.simulation.seed = Some(seed);
    }
    if cli.parallel {
        settings.simulation.execution = Execution::Parallel;
    }

    let plan = settings.validate().context("invalid configuration")?;
    info!(seed = plan.seed, n_trials = plan.n_trials, "configuration validated");

    let mut engine = plan.build_engine()?;
    let result = engine.run(plan.n_trials).context("simulation failed")?;

    if let Some(path) = &cli.output {
        write_trials(&result, path).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "trial outcomes written");
    }

    let report = build_report(&plan, &result)?;
    if !cli.quiet {
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            print_report(&report, &plan);
        }
    }
    Ok(())
}

fn build_report(plan: &RunPlan, result: &SimulationResult) -> Result<Report> {
    let gross = result.gross_losses();
    let ceded = result.ceded_losses();
    let ceded_risk = RiskSummary::from_losses(&ceded, plan.report_confidence, plan.pml_quantile)?;
    let premium = plan.calculator.calculate(&ceded)?;
    Ok(Report {
        n_trials: result.len(),
        seed: plan.seed,
        attaching_years: result.attaching_years(),
        gross: metrics::percentile_stats(&gross),
        ceded: metrics::percentile_stats(&ceded),
        ceded_risk,
        rate_on_line: premium.rate_on_line(plan.layer.limit()),
        premium,
    })
}

fn write_trials(result: &SimulationResult, path: &PathBuf) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for trial in result {
        serde_json::to_writer(&mut writer, trial)?;
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_report(report: &Report, plan: &RunPlan) {
    println!(
        "=== {} trials, seed {}, {} xs {} ({:?}) ===",
        report.n_trials,
        report.seed,
        plan.layer.limit(),
        plan.layer.retention(),
        plan.granularity,
    );
    println!(
        "Layer attached in {} of {} years ({:.2}%)",
        report.attaching_years,
        report.n_trials,
        report.attaching_years as f64 / report.n_trials as f64 * 100.0
    );

    println!(
        "\n{:>6} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12} | {:>12}",
        "", "min", "p5", "p25", "p50", "p75", "p95", "max", "mean"
    );
    for (label, ds) in [("Gross", &report.gross), ("Ceded", &report.ceded)] {
        if let Some(ds) = ds {
            println!(
                "{:>6} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0} | {:>12.0}",
                label, ds.min, ds.p5, ds.p25, ds.p50, ds.p75, ds.p95, ds.max, ds.mean
            );
        }
    }

    let r = &report.ceded_risk;
    println!("\n=== Ceded risk ===");
    println!("  Expected loss:          {:>14.2}", r.expected_loss);
    println!("  Std dev:                {:>14.2}", r.std_dev);
    println!("  VaR  ({:>5.1}%):         {:>14.2}", r.confidence * 100.0, r.var);
    println!("  TVaR ({:>5.1}%):         {:>14.2}", r.confidence * 100.0, r.tvar);
    println!("  PML  ({:>5.1}%):         {:>14.2}", r.pml_quantile * 100.0, r.pml);

    let p = &report.premium;
    println!("\n=== Premium ({:?}) ===", plan.calculator.measure().kind());
    println!("  Risk premium:           {:>14.2}", p.risk_premium);
    println!(
        "  Technical premium:      {:>14.2}  (expense {:.1}%)",
        p.technical_premium,
        plan.calculator.expense_ratio() * 100.0
    );
    println!(
        "  Commercial premium:     {:>14.2}  (profit {:.1}%)",
        p.commercial_premium,
        plan.calculator.profit_loading() * 100.0
    );
    println!("  Rate on line:           {:>13.3}%", report.rate_on_line * 100.0);
}
