use adinsight::config::EngineConfig;
use adinsight::llm::LlmClient;
use adinsight::{AnalysisEngine, CellValue, ColumnMapping, ColumnNormalizer, Granularity, RawRecord};
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adinsight")]
#[command(about = "Ad performance analysis for marketing spreadsheet exports")]
struct Args {
    /// CSV export with one row per ad/day (any header naming)
    input: PathBuf,

    /// JSON engine config (thresholds, matcher, granularity)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON column mapping ({"spend": "Cost", ...}); skips inference
    #[arg(short, long)]
    mapping: Option<PathBuf>,

    /// Trend bucket size: daily, weekly or monthly
    #[arg(short, long)]
    granularity: Option<Granularity>,

    /// OpenAI API key for header matching (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<RawRecord>)> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers: Vec<String> = reader.headers()?.iter().map(|h| h.to_string()).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: RawRecord = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), CellValue::from_field(v)))
            .collect();
        rows.push(row);
    }
    Ok((headers, rows))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::from_env()?,
    };
    if let Some(key) = args.api_key {
        config.matcher.api_key = Some(key);
    }
    if let Some(granularity) = args.granularity {
        config.granularity = granularity;
    }

    let (headers, rows) = read_csv(&args.input)?;
    info!("Loaded {} rows with {} columns from {}", rows.len(), headers.len(), args.input.display());

    let mapping: ColumnMapping = match &args.mapping {
        Some(path) => {
            let content = std::fs::read_to_string(path)?;
            let mapping: ColumnMapping = serde_json::from_str(&content)
                .with_context(|| format!("invalid mapping file {}", path.display()))?;
            mapping.ensure_required()?;
            mapping
        }
        None => {
            let llm = LlmClient::from_config(&config.matcher);
            if llm.is_offline() {
                info!("No API key configured, header matching is pattern-only");
            }
            let proposal = ColumnNormalizer::default()
                .infer_mapping_with_matcher(&headers, &[], &llm, config.matcher.timeout())
                .await;
            for (column, confidence) in &proposal.confidence {
                info!("  {} ({:.2})", column, confidence);
            }
            for suggestion in &proposal.suggestions {
                warn!(
                    "Unmapped column '{}' looks like {} ({:.2})",
                    suggestion.column, suggestion.field, suggestion.score
                );
            }
            if !proposal.is_complete() {
                bail!(
                    "could not map required columns {:?}; pass --mapping to confirm them",
                    proposal.missing_required
                );
            }
            proposal.into_confirmed()?
        }
    };

    let report = AnalysisEngine::new(&config).run(&rows, &mapping)?;
    let json = serde_json::to_string_pretty(&report)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)?;
            info!("Report {} written to {}", report.id, path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}
