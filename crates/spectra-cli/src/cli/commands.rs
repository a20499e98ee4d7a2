use super::CliError;
use super::helpers::{expand_inputs, parse_viewport, read_input};
use anyhow::Context;
use spectra_core::cache::{CacheConfig, CacheEngine, DEFAULT_VIEWPORT_BUDGET};
use spectra_core::domain::{FormatHint, IrMeta};
use spectra_core::ledger::{DuplicateLedger, LedgerScope};
use spectra_core::math::{CombineOp, CombineOptions, combine};
use spectra_core::pipeline::{BatchStatus, IngestOptions, ingest_batch};
use std::fs;
use std::path::PathBuf;

/// Resolved store locations shared by every subcommand.
pub(super) struct CommandContext {
    cache: CacheConfig,
    ledger_store: PathBuf,
}

impl CommandContext {
    pub(super) fn resolve(cache_root: Option<PathBuf>, ledger_store: Option<PathBuf>) -> Self {
        let cache = match cache_root {
            Some(root) => CacheConfig::new(root),
            None => CacheConfig::from_env(),
        };
        let ledger_store =
            ledger_store.unwrap_or_else(|| spectra_core::ledger::session_store_path(&cache.root));
        Self {
            cache,
            ledger_store,
        }
    }

    fn engine(&self) -> CacheEngine {
        CacheEngine::new(self.cache.clone())
    }

    fn ledger(&self, locked: bool) -> Result<DuplicateLedger, CliError> {
        let ledger = DuplicateLedger::open(&self.ledger_store)
            .map_err(spectra_core::SpectraError::from)?;
        Ok(ledger.with_lock(locked))
    }
}

#[derive(clap::Args)]
pub(super) struct IngestArgs {
    /// Files or glob patterns to ingest
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Declared format (ascii, jcamp, fits, zip); auto-detects by default
    #[arg(long, default_value = "auto")]
    format: String,

    /// Explicit x-unit label, overriding the file header
    #[arg(long)]
    x_unit: Option<String>,

    /// Explicit y-unit label, overriding the file header
    #[arg(long)]
    y_unit: Option<String>,

    /// Beer-Lambert path length, required for absorption-coefficient input
    #[arg(long)]
    path_length: Option<f64>,

    /// Beer-Lambert mole fraction, required for absorption-coefficient input
    #[arg(long)]
    mole_fraction: Option<f64>,

    /// Ledger label for first-seen content (defaults to the file name)
    #[arg(long)]
    label: Option<String>,

    /// Record content in the persistent global scope instead of session
    #[arg(long)]
    global: bool,

    /// Reject content whose hash the ledger has already seen
    #[arg(long)]
    locked: bool,

    /// Override the duplicate lock for this run
    #[arg(long)]
    force: bool,

    /// Treat a third ascii column as y uncertainty instead of metadata
    #[arg(long)]
    aux_uncertainty: bool,

    /// Write the per-file outcome report as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

pub(super) fn run_ingest_command(
    context: &CommandContext,
    args: IngestArgs,
) -> Result<i32, CliError> {
    let format = FormatHint::from_label(&args.format)
        .ok_or_else(|| CliError::Usage(format!("unknown format '{}'", args.format)))?;
    let ir_meta = match (args.path_length, args.mole_fraction) {
        (Some(path_length), Some(mole_fraction)) => Some(IrMeta {
            path_length,
            mole_fraction,
        }),
        (None, None) => None,
        _ => {
            return Err(CliError::Usage(
                "--path-length and --mole-fraction must be given together".to_string(),
            ));
        }
    };

    let files = expand_inputs(&args.inputs)?;
    tracing::debug!(count = files.len(), "resolved ingest inputs");
    let mut items = Vec::with_capacity(files.len());
    for path in &files {
        items.push((path.display().to_string(), read_input(path)?));
    }

    let options = IngestOptions {
        format,
        x_unit: args.x_unit,
        y_unit: args.y_unit,
        ir_meta,
        scope: Some(if args.global {
            LedgerScope::Global
        } else {
            LedgerScope::Session
        }),
        label: args.label,
        override_duplicate_lock: args.force,
        aux_is_uncertainty: args.aux_uncertainty,
        fetch_provenance: Vec::new(),
    };

    let ledger = context.ledger(args.locked)?;
    let engine = context.engine();
    let report = ingest_batch(items, &options, &ledger, &engine);

    for item in &report.items {
        match item.status {
            BatchStatus::Ingested => println!(
                "INGESTED {} ({} samples) {}",
                item.source_hash.as_deref().unwrap_or("-"),
                item.sample_count.unwrap_or(0),
                item.source_name
            ),
            BatchStatus::DuplicateSkipped => println!(
                "SKIPPED {} (duplicate content)",
                item.source_name
            ),
            BatchStatus::Failed => println!(
                "FAILED {}: {}",
                item.source_name,
                item.message.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!(
        "Ingest status: {} ({} ingested, {} skipped, {} failed)",
        if report.all_succeeded() { "PASS" } else { "FAIL" },
        report.ingested,
        report.skipped,
        report.failed
    );

    if let Some(path) = &args.report {
        let json = serde_json::to_vec_pretty(&report).context("serialize batch report")?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create report directory '{}'", parent.display()))?;
        }
        fs::write(path, json)
            .with_context(|| format!("write report '{}'", path.display()))?;
    }

    Ok(if report.all_succeeded() { 0 } else { 3 })
}

#[derive(clap::Args)]
pub(super) struct InfoArgs {
    /// Source hash of the cached spectrum
    source_hash: String,

    /// Print the raw index JSON instead of a summary
    #[arg(long)]
    json: bool,
}

pub(super) fn run_info_command(context: &CommandContext, args: InfoArgs) -> Result<i32, CliError> {
    let handle = context
        .engine()
        .open(&args.source_hash)
        .map_err(spectra_core::SpectraError::from)?;
    let index = handle.index();

    if args.json {
        let json = serde_json::to_string_pretty(index).context("serialize index")?;
        println!("{json}");
        return Ok(0);
    }

    println!("source hash:  {}", index.source_hash);
    println!("axis:         {} [{}]", index.axis_kind, index.x_unit);
    println!("y convention: {}", index.y_convention);
    println!("samples:      {}", index.sample_count);
    println!("x range:      [{}, {}]", index.x_min, index.x_max);
    println!("chunks:       {} (max {} samples)", index.chunks.len(), index.chunk_max_samples);
    for tier in &index.tiers {
        println!(
            "tier {}:       {} points ({})",
            tier.tier_index,
            tier.point_count,
            tier.method.as_str()
        );
    }
    println!("lineage:      {} provenance steps", index.provenance.len());
    Ok(0)
}

#[derive(clap::Args)]
pub(super) struct TiersArgs {
    /// Source hash of the cached spectrum
    source_hash: String,

    /// Viewport as 'LOW,HIGH' in canonical axis units (defaults to full range)
    #[arg(long)]
    viewport: Option<String>,

    /// On-screen point budget
    #[arg(long, default_value_t = DEFAULT_VIEWPORT_BUDGET)]
    budget: usize,
}

pub(super) fn run_tiers_command(
    context: &CommandContext,
    args: TiersArgs,
) -> Result<i32, CliError> {
    let handle = context
        .engine()
        .open(&args.source_hash)
        .map_err(spectra_core::SpectraError::from)?;
    let index = handle.index();

    let viewport = match &args.viewport {
        Some(raw) => parse_viewport(raw)?,
        None => (index.x_min, index.x_max),
    };
    let chosen = handle.select_tier(viewport, args.budget);

    println!("tier 0:       {} points (full resolution)", index.sample_count);
    for tier in &index.tiers {
        println!(
            "tier {}:       {} points ({}, target {})",
            tier.tier_index,
            tier.point_count,
            tier.method.as_str(),
            tier.target_point_budget
        );
    }
    println!(
        "viewport [{}, {}] at budget {} -> tier {chosen}",
        viewport.0, viewport.1, args.budget
    );
    Ok(0)
}

#[derive(clap::Args)]
pub(super) struct DiffArgs {
    /// Operation: subtract or ratio
    op: String,

    /// Source hash of the left operand
    left: String,

    /// Source hash of the right operand
    right: String,

    /// Output path for the two-column ascii trace
    #[arg(long)]
    out: PathBuf,

    /// Keep epsilon-suppressed ratio samples in the output as nan
    #[arg(long)]
    include_suppressed: bool,
}

pub(super) fn run_diff_command(context: &CommandContext, args: DiffArgs) -> Result<i32, CliError> {
    let op = match args.op.to_ascii_lowercase().as_str() {
        "subtract" | "sub" | "difference" => CombineOp::Subtract,
        "ratio" | "div" => CombineOp::Ratio,
        other => {
            return Err(CliError::Usage(format!(
                "unknown diff operation '{other}' (expected subtract or ratio)"
            )));
        }
    };

    let engine = context.engine();
    let left = engine
        .open(&args.left)
        .and_then(|handle| handle.load_spectrum())
        .map_err(spectra_core::SpectraError::from)?;
    let right = engine
        .open(&args.right)
        .and_then(|handle| handle.load_spectrum())
        .map_err(spectra_core::SpectraError::from)?;

    let trace = combine(
        &left,
        &right,
        op,
        CombineOptions {
            include_suppressed: args.include_suppressed,
            ..CombineOptions::default()
        },
    )
    .map_err(spectra_core::SpectraError::from)?;

    let mut output = String::new();
    output.push_str(&format!("# {op} of {} and {}\n", args.left, args.right));
    for step in &trace.spectrum.provenance {
        output.push_str(&format!("# {}: {}\n", step.stage, step.description));
    }
    for (x, y) in trace
        .spectrum
        .x_values
        .iter()
        .zip(&trace.spectrum.y_values)
    {
        output.push_str(&format!("{x:.9E} {y:.9E}\n"));
    }
    fs::write(&args.out, output)
        .with_context(|| format!("write diff trace '{}'", args.out.display()))?;

    println!(
        "Diff status: PASS ({} samples, {} suppressed) -> {}",
        trace.spectrum.x_values.len(),
        trace.suppressed_samples,
        args.out.display()
    );
    Ok(0)
}

#[derive(clap::Args)]
pub(super) struct LedgerArgs {
    #[command(subcommand)]
    command: LedgerCommand,
}

#[derive(clap::Subcommand)]
enum LedgerCommand {
    /// List all ledger entries
    List,
    /// Remove one entry by content hash (administrative)
    Purge {
        content_hash: String,
    },
}

pub(super) fn run_ledger_command(
    context: &CommandContext,
    args: LedgerArgs,
) -> Result<i32, CliError> {
    let ledger = context.ledger(false)?;
    match args.command {
        LedgerCommand::List => {
            let entries = ledger
                .entries()
                .map_err(spectra_core::SpectraError::from)?;
            if entries.is_empty() {
                println!("ledger is empty");
                return Ok(0);
            }
            for entry in entries {
                println!(
                    "{} {} {} {}",
                    entry.content_hash,
                    entry.scope,
                    entry.first_seen_at.to_rfc3339(),
                    entry.label
                );
            }
            Ok(0)
        }
        LedgerCommand::Purge { content_hash } => {
            let removed = ledger
                .purge(&content_hash)
                .map_err(spectra_core::SpectraError::from)?;
            if removed {
                println!("purged {content_hash}");
            } else {
                println!("no entry for {content_hash}");
            }
            Ok(0)
        }
    }
}
