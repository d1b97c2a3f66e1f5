//! Luxquote CLI
//!
//! Command-line front end for the quotation pipeline:
//! - `quote`: extract requirements from an RFP document and price them
//!   against a product catalog
//! - `rematch`: re-run matching and totals for an edited requirement list
//! - `update`: apply quantity/unit-price overrides to a stored quotation
//! - `recommend`: rank catalog products for a free-text query
//! - `repair`: run the structured-output repair pass over raw generator
//!   output (debugging aid)
//!
//! Provider selection is environment-driven: `LUXQUOTE_API_KEY` set picks
//! the live OpenAI-compatible backend, unset picks the deterministic
//! offline stubs. See `luxquote-providers` for the full variable list.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use luxquote_catalog::load_items;
use luxquote_core::records::{InteractionEvent, Quotation, RequirementRecord};
use luxquote_core::repair::parse_or_repair;
use luxquote_engine::{apply_item_updates, ItemUpdate, QuoteConfig, QuoteEvent, QuoteFlow};
use luxquote_providers::{ProviderConfig, ProviderSet};

#[derive(Parser)]
#[command(name = "luxquote")]
#[command(
    author,
    version,
    about = "RFP-to-quotation pipeline for lighting fixtures"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a quotation from an RFP document.
    Quote {
        /// Input document (read as UTF-8 text; `.pdf` with the `pdf` feature)
        input: PathBuf,
        /// Product catalog JSON (array of catalog items)
        #[arg(short, long)]
        catalog: PathBuf,
        /// Write the quotation JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Catalog candidates fetched per requirement
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        /// Skip the generated summary and use the templated statement
        #[arg(long)]
        no_summary: bool,
    },

    /// Re-run matching and totals for an edited requirement list.
    Rematch {
        /// Existing quotation JSON
        quotation: PathBuf,
        /// Edited requirements JSON (array of requirement records)
        #[arg(short, long)]
        requirements: PathBuf,
        /// Product catalog JSON
        #[arg(short, long)]
        catalog: PathBuf,
        /// Write the updated quotation JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Apply quantity/unit-price overrides to a stored quotation.
    Update {
        /// Existing quotation JSON
        quotation: PathBuf,
        /// Updates JSON (array of `{product_id, quantity?, unit_price?}`)
        #[arg(short, long)]
        updates: PathBuf,
        /// Write the updated quotation JSON here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Rank catalog products for a free-text query.
    Recommend {
        /// Query text
        query: String,
        /// Product catalog JSON
        #[arg(short, long)]
        catalog: PathBuf,
        /// Interaction history JSON (array of `{action, category}`)
        #[arg(long)]
        interactions: Option<PathBuf>,
        /// Maximum results
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },

    /// Repair raw generator output into valid JSON. Reads stdin when no
    /// file is given.
    Repair {
        /// Raw response file
        input: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Quote {
            input,
            catalog,
            out,
            top_k,
            no_summary,
        } => cmd_quote(&input, &catalog, out.as_deref(), top_k, no_summary).await,
        Commands::Rematch {
            quotation,
            requirements,
            catalog,
            out,
        } => cmd_rematch(&quotation, &requirements, &catalog, out.as_deref()).await,
        Commands::Update {
            quotation,
            updates,
            out,
        } => cmd_update(&quotation, &updates, out.as_deref()),
        Commands::Recommend {
            query,
            catalog,
            interactions,
            limit,
        } => cmd_recommend(&query, &catalog, interactions.as_deref(), limit).await,
        Commands::Repair { input } => cmd_repair(input.as_deref()),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn cmd_quote(
    input: &Path,
    catalog_path: &Path,
    out: Option<&Path>,
    top_k: usize,
    no_summary: bool,
) -> Result<()> {
    let text = load_document_text(input)?;
    let flow = build_flow(catalog_path, |config| {
        config.top_k = top_k;
        config.summarize_with_generation = !no_summary;
    })
    .await?;

    eprintln!("{} {}", "Quoting".green().bold(), input.display());
    let quotation = flow.quote(&text).await?;
    print_quotation(&quotation);
    write_or_print(out, &quotation)
}

async fn cmd_rematch(
    quotation_path: &Path,
    requirements_path: &Path,
    catalog_path: &Path,
    out: Option<&Path>,
) -> Result<()> {
    let original: Quotation = read_json(quotation_path)?;
    let requirements: Vec<RequirementRecord> = read_json(requirements_path)?;
    let flow = build_flow(catalog_path, |_| {}).await?;

    eprintln!(
        "{} {} ({} requirements)",
        "Rematching".green().bold(),
        quotation_path.display(),
        requirements.len()
    );
    let updated = flow.rematch(&original, requirements).await;
    print_quotation(&updated);
    write_or_print(out, &updated)
}

fn cmd_update(quotation_path: &Path, updates_path: &Path, out: Option<&Path>) -> Result<()> {
    let mut quotation: Quotation = read_json(quotation_path)?;
    let updates: Vec<ItemUpdate> = read_json(updates_path)?;

    apply_item_updates(&mut quotation, &updates);
    eprintln!(
        "{} applied {} update(s)",
        "ok".green().bold(),
        updates.len()
    );
    print_quotation(&quotation);
    write_or_print(out, &quotation)
}

async fn cmd_recommend(
    query: &str,
    catalog_path: &Path,
    interactions_path: Option<&Path>,
    limit: usize,
) -> Result<()> {
    let interactions: Vec<InteractionEvent> = match interactions_path {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let flow = build_flow(catalog_path, |_| {}).await?;

    let ranked = flow.recommend(query, &interactions, limit).await;
    if ranked.is_empty() {
        eprintln!("{} no candidates for this query", "info:".yellow().bold());
        return Ok(());
    }
    for (rank, candidate) in ranked.iter().enumerate() {
        println!(
            "{:>2}. [{:.2}] {} ({})",
            rank + 1,
            candidate.score,
            candidate.title.bold(),
            candidate.category
        );
        if let Some(explanation) = &candidate.explanation {
            println!("      {explanation}");
        }
    }
    Ok(())
}

fn cmd_repair(input: Option<&Path>) -> Result<()> {
    let raw = match input {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    let value =
        parse_or_repair(&raw).context("response could not be repaired into valid JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Loads the catalog, builds the flow, and routes degraded-path events to
/// stderr.
async fn build_flow<F>(catalog_path: &Path, tune: F) -> Result<QuoteFlow>
where
    F: FnOnce(&mut QuoteConfig),
{
    let providers = ProviderSet::from_config(&ProviderConfig::from_env());
    let items = load_items(catalog_path)
        .with_context(|| format!("failed to load catalog {}", catalog_path.display()))?;
    if items.is_empty() {
        eprintln!(
            "{} catalog {} is empty, nothing will match",
            "info:".yellow().bold(),
            catalog_path.display()
        );
    }
    let mut config = QuoteConfig::default();
    tune(&mut config);

    let mut flow = QuoteFlow::build(providers, items, config).await?;
    flow.on_event(Box::new(|event| match event {
        QuoteEvent::ExtractionDegraded { reason } => {
            eprintln!("{} extraction degraded: {reason}", "warn:".yellow().bold());
        }
        QuoteEvent::SummaryDegraded { reason } => {
            eprintln!("{} summary degraded: {reason}", "warn:".yellow().bold());
        }
        QuoteEvent::RequirementSkipped {
            requirement_id,
            reason,
        } => {
            eprintln!(
                "{} skipped {requirement_id}: {reason}",
                "info:".yellow().bold()
            );
        }
        QuoteEvent::MatchFailed {
            requirement_id,
            reason,
        } => {
            eprintln!(
                "{} match failed for {requirement_id}: {reason}",
                "warn:".yellow().bold()
            );
        }
        _ => {}
    }));
    Ok(flow)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

/// Human-readable run report on stderr; stdout stays machine-readable.
fn print_quotation(quotation: &Quotation) {
    eprintln!(
        "{} {} requirement(s), {} matched",
        "ok".green().bold(),
        quotation.requirements.len(),
        quotation.matches.len()
    );
    for matched in &quotation.matches {
        eprintln!(
            "  {} {} {} x{} @ ${:.2} = ${:.2}",
            "→".cyan(),
            matched.requirement_id.bold(),
            matched.product_title,
            matched.quantity,
            matched.unit_price,
            matched.price
        );
    }
    eprintln!(
        "  total: {}",
        format!("${:.2}", quotation.total_price).bold()
    );
    if let Some(error) = &quotation.error {
        eprintln!("{} {error}", "warn:".yellow().bold());
    }
}

fn write_or_print<T: serde::Serialize>(out: Option<&Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => {
            fs::write(path, &json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "{} {}",
                "wrote".green().bold(),
                path.display().to_string().bold()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Reads the document as UTF-8 text, or extracts text from a PDF when the
/// `pdf` feature is compiled in.
fn load_document_text(path: &Path) -> Result<String> {
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if is_pdf {
        return pdf_text(path);
    }
    fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(feature = "pdf")]
fn pdf_text(path: &Path) -> Result<String> {
    pdf_extract::extract_text(path)
        .with_context(|| format!("failed to extract text from {}", path.display()))
}

#[cfg(not(feature = "pdf"))]
fn pdf_text(path: &Path) -> Result<String> {
    anyhow::bail!(
        "{} is a PDF but this build lacks the `pdf` feature; rebuild with `--features pdf` or supply plain text",
        path.display()
    )
}
