use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use xolsim::synthetic::{ClaimGenerator, Contract};

/// Generate a synthetic claim history as NDJSON, one claim per line.
#[derive(Parser)]
#[command(name = "generate_claims", version, about)]
struct Cli {
    #[arg(short, long, default_value_t = 5_000)]
    n_claims: usize,

    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// First possible loss date (YYYY-MM-DD).
    #[arg(long)]
    start: Option<NaiveDate>,

    /// Loss dates fall strictly before this date.
    #[arg(long)]
    end: Option<NaiveDate>,

    /// Contract as ID:ATTACHMENT:LIMIT; repeatable. Replaces the default pair.
    #[arg(short, long = "contract", value_parser = parse_contract)]
    contracts: Vec<Contract>,

    /// Share of claims drawn from the heavy-tail component.
    #[arg(long)]
    tail_probability: Option<f64>,

    /// Write to a file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn parse_contract(s: &str) -> std::result::Result<Contract, String> {
    let parts: Vec<&str> = s.split(':').collect();
    let [id, attachment, limit] = parts.as_slice() else {
        return Err(format!("expected ID:ATTACHMENT:LIMIT, got {s:?}"));
    };
    Ok(Contract {
        contract_id: (*id).to_string(),
        attachment_point: attachment.parse().map_err(|e| format!("attachment {attachment:?}: {e}"))?,
        limit: limit.parse().map_err(|e| format!("limit {limit:?}: {e}"))?,
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut generator = ClaimGenerator { n_claims: cli.n_claims, ..ClaimGenerator::default() };
    if let Some(start) = cli.start {
        generator.start = start;
    }
    if let Some(end) = cli.end {
        generator.end = end;
    }
    if !cli.contracts.is_empty() {
        generator.contracts = cli.contracts;
    }
    if let Some(p) = cli.tail_probability {
        generator.tail_probability = p;
    }

    let claims = generator.generate(cli.seed).context("generating claims")?;

    let sink: Box<dyn Write> = match &cli.output {
        Some(path) => Box::new(File::create(path).with_context(|| format!("creating {}", path.display()))?),
        None => Box::new(io::stdout().lock()),
    };
    let mut writer = BufWriter::new(sink);
    for claim in &claims {
        serde_json::to_writer(&mut writer, claim)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    info!(n_claims = claims.len(), seed = cli.seed, "claims written");
    Ok(())
}
