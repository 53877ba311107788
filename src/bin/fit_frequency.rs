use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use xolsim::frequency::{DEFAULT_OVERDISPERSION_THRESHOLD, FrequencyFamily, FrequencyModel};
use xolsim::history;

/// Fit a claim-frequency model from NDJSON claim records on stdin
/// (`{"date":"YYYY-MM-DD","amount":...}` per line).
#[derive(Parser)]
#[command(name = "fit_frequency", version, about)]
struct Cli {
    /// Family to start from: poisson or negative_binomial.
    #[arg(short, long, default_value = "poisson", value_parser = parse_family)]
    model: FrequencyFamily,

    /// Variance/mean ratio above which a Poisson start switches to negative binomial.
    #[arg(short, long, default_value_t = DEFAULT_OVERDISPERSION_THRESHOLD)]
    threshold: f64,
}

fn parse_family(s: &str) -> std::result::Result<FrequencyFamily, String> {
    match s {
        "poisson" => Ok(FrequencyFamily::Poisson),
        "negative_binomial" | "negbin" => Ok(FrequencyFamily::NegativeBinomial),
        other => Err(format!("unknown frequency family {other:?}")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let records = history::read_records(io::stdin().lock()).context("reading claim records from stdin")?;

    let counts = history::yearly_counts(&records)?;
    info!(claims = records.len(), years = counts.len(), ?counts, "yearly claim counts");
    let report = FrequencyModel::fit(&counts, cli.model, cli.threshold)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
