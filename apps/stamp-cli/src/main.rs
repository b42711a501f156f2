//! Stamp CLI
//!
//! Applies the placements listed in a TOML job file to a PDF and writes the
//! stamped copy.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use stamp_core::{Point, StampCatalog, StampConfig, StampSession};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "stamp-cli")]
#[command(version, about = "Bake stamp images into a PDF")]
struct Args {
    /// PDF to stamp
    input: PathBuf,

    /// Job file with [viewer], [[stamps]] and [[placements]] sections
    #[arg(short, long)]
    config: PathBuf,

    /// Output path (default: stamped_<input name> next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Override the display scale the placement coordinates were taken at
    #[arg(long)]
    scale: Option<f64>,

    /// Print the stamp catalog and exit
    #[arg(long)]
    list_stamps: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("stamp_core=info,stamp_cli=info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (config, catalog) = load_job(&args.config, args.scale)?;

    if args.list_stamps {
        for kind in catalog.iter() {
            println!("{}\t{}\t{}", kind.id, kind.label, kind.default_size);
        }
        return Ok(());
    }

    let output = run(&args.input, args.output.as_deref(), config, catalog)?;
    println!("{}", output.display());
    Ok(())
}

/// Read the job file and the stamp images it names.
fn load_job(path: &Path, scale: Option<f64>) -> anyhow::Result<(StampConfig, Arc<StampCatalog>)> {
    let mut config = StampConfig::from_file(path)?;
    if let Some(scale) = scale {
        config.viewer.display_scale = scale;
        config.viewer.validate()?;
    }

    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let catalog = StampCatalog::from_config(&config, base_dir)
        .with_context(|| format!("Failed to load stamps from {}", path.display()))?;
    tracing::info!(stamps = catalog.len(), "loaded stamp catalog");
    Ok((config, Arc::new(catalog)))
}

/// Stamp `input` according to `config` and return the written path.
fn run(
    input: &Path,
    output: Option<&Path>,
    config: StampConfig,
    catalog: Arc<StampCatalog>,
) -> anyhow::Result<PathBuf> {
    if config.placements.is_empty() {
        bail!("Job file has no [[placements]]");
    }

    let bytes =
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    let mut session = StampSession::open(&name, &bytes, catalog, config.viewer.clone())
        .with_context(|| format!("Failed to open {}", input.display()))?;

    for (i, placement) in config.placements.iter().enumerate() {
        let size = match placement.size {
            Some(size) => size,
            None => session
                .catalog()
                .get(&placement.stamp)
                .map(|k| k.default_size)
                .with_context(|| format!("Unknown stamp '{}'", placement.stamp))?,
        };
        session
            .place(
                &placement.stamp,
                Point::new(placement.x, placement.y),
                size,
                placement.page,
            )
            .with_context(|| format!("Placement {} is invalid", i + 1))?;
    }

    let exported = session.export().context("Export failed")?;
    for skipped in &exported.skipped {
        tracing::warn!(index = skipped.index, page = skipped.page, reason = ?skipped.reason, "stamp was not exported");
    }

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => input.with_file_name(&exported.file_name),
    };
    std::fs::write(&output, &exported.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(
        stamped = exported.stamped,
        skipped = exported.skipped.len(),
        output = %output.display(),
        "wrote stamped PDF"
    );
    Ok(output)
}
