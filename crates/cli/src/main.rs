//! ancil CLI - land-surface model ancillaries from land cover and soil surveys

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ancil_algorithms::landcover::CrosswalkTable;
use ancil_algorithms::process::{Run, RunSummary};
use ancil_algorithms::soil::{classify, TEXTURE_BOXES};
use ancil_core::io::read_geotiff;
use ancil_core::{Raster, RunConfig};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ancil")]
#[command(author, version, about = "Land-surface model ancillary generation", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every configured stage and write the gridded outputs
    Process {
        /// Run configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// Replace outputs that already exist
        #[arg(long)]
        overwrite: bool,
    },
    /// Show class codes whose crosswalk weights do not add up to 1
    CheckCrosswalk {
        /// Crosswalk method name
        #[arg(short, long, default_value = "Poulter")]
        method: String,
        /// Allowed deviation from 1
        #[arg(short, long, default_value = "1e-6")]
        tolerance: f64,
    },
    /// Classify a sand/silt/clay composition (percent)
    Texture {
        #[arg(long)]
        sand: f64,
        #[arg(long)]
        silt: f64,
        #[arg(long)]
        clay: f64,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Run one stage under a spinner.
fn stage<T>(msg: &str, f: impl FnOnce() -> ancil_core::Result<T>) -> Result<T> {
    let pb = spinner(msg);
    let result = f();
    pb.finish_and_clear();
    result.with_context(|| format!("{} failed", msg.trim_end_matches("...")))
}

fn report(summary: &RunSummary, elapsed: std::time::Duration) {
    for path in &summary.written {
        println!("Wrote: {}", path.display());
    }
    for path in &summary.skipped {
        println!("Skipped (exists): {}", path.display());
    }
    for r in &summary.reports {
        if r.is_clean() {
            println!("{}: sums to one over {} cells", r.subject, r.checked_cells);
        } else {
            println!("{}", r);
        }
    }
    println!("  Engine calls: {}", summary.engine_calls);
    println!("  Processing time: {:.2?}", elapsed);
}

fn process(config: PathBuf, overwrite: bool) -> Result<()> {
    let mut config =
        RunConfig::load(&config).with_context(|| format!("Failed to load {}", config.display()))?;
    config.main.overwrite |= overwrite;

    let mut run = Run::new(config).context("Invalid run configuration")?;
    info!("Region: {} ({})", run.context().name(), run.context().target().describe());

    let start = Instant::now();
    let land = stage("Computing land fraction...", || run.land_fraction())?;
    let sets = stage("Computing land-cover fractions...", || run.land_cover_fractions())?;
    let soil = stage("Computing soil properties...", || run.soil_properties(land.as_ref()))?;
    let summary = stage("Writing outputs...", || run.write_outputs(land.as_ref(), &sets, &soil))?;
    report(&summary, start.elapsed());
    Ok(())
}

fn check_crosswalk(method: &str, tolerance: f64) -> Result<()> {
    let table = CrosswalkTable::by_name(method)?;
    let gaps = table.coverage_gaps(tolerance);
    println!(
        "{}: {} categories, {} class codes",
        table.name(),
        table.len(),
        table.class_totals().len()
    );
    if gaps.is_empty() {
        println!("Every class code is fully allocated");
        return Ok(());
    }
    for (code, total) in gaps {
        println!("  class {:>3}: total weight {:.4} ({:+.4})", code, total, total - 1.0);
    }
    Ok(())
}

fn texture(sand: f64, silt: f64, clay: f64) -> Result<()> {
    let total = sand + silt + clay;
    if (total - 100.0).abs() > 1.0 {
        bail!("sand + silt + clay = {} (expected 100)", total);
    }
    match classify(sand, silt, clay) {
        Some(class) => {
            println!("{}", class);
            let others: Vec<String> = TEXTURE_BOXES
                .iter()
                .filter(|b| b.class != class && b.contains(sand, silt, clay))
                .map(|b| b.class.to_string())
                .collect();
            if !others.is_empty() {
                println!("  on the boundary with: {}", others.join(", "));
            }
        }
        None => println!("unclassified"),
    }
    Ok(())
}

fn raster_info(input: &PathBuf) -> Result<()> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(input).context("Failed to read raster")?;
    pb.finish_and_clear();
    let raster = raster.to_f64_nan();
    let region = raster.region();
    let e = region.extent();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", raster.cols(), raster.rows(), raster.len());
    println!("Cell size: {} x {}", region.res_x(), region.res_y());
    println!("Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})", e.west, e.south, e.east, e.north);
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    println!(
        "  Valid cells: {} ({:.1}%)",
        stats.valid_count,
        100.0 * stats.valid_count as f64 / raster.len().max(1) as f64
    );
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Process { config, overwrite } => process(config, overwrite),
        Commands::CheckCrosswalk { method, tolerance } => check_crosswalk(&method, tolerance),
        Commands::Texture { sand, silt, clay } => texture(sand, silt, clay),
        Commands::Info { input } => raster_info(&input),
    }
}
