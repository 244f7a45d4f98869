//! Quadrille CLI - run the first pass over an OSM planet file
//!
//! Reads the file once, classifies every node and way into 4x4 Web Mercator
//! grid cells, and reports the resulting index sizes. The indexes feed the
//! second (tiling) pass.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use quadrille_core::{GridExtent, GridIndex, PbfReader, Sorter};

#[derive(Parser)]
#[command(name = "quadrille", about = "Sort OSM planet primitives into grid cells")]
struct Cli {
    /// Input .osm.pbf file
    input: PathBuf,

    /// Worker threads per phase (defaults to the CPU count)
    #[arg(long)]
    workers: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quadrille_tool=info".parse()?)
                .add_directive("quadrille_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let workers = cli.workers.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1)
    });

    let started = Instant::now();
    let index = first_pass(&cli.input, workers)?;

    info!(
        "first pass complete: {} node shards, {} way shards, {} extra nodes in {:.1?}",
        index.nodes.num_shards(),
        index.ways.num_shards(),
        index.extra_nodes.len(),
        started.elapsed(),
    );
    Ok(())
}

/// Stream the whole file through the sorter, building the grid indexes the
/// second pass consumes.
fn first_pass(path: &Path, workers: usize) -> Result<GridIndex> {
    let mut reader =
        PbfReader::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    reader
        .read_header()
        .context("unable to read the OSMHeader block")?;

    let mut sorter = Sorter::new(workers, GridExtent::world_mercator());

    // Keep the first error but drain the stream, so a mid-stream failure is
    // reported once everything readable has been consumed.
    let mut first_err = None;
    for block in reader.blocks() {
        match block {
            Ok(block) if first_err.is_none() => sorter.append(block)?,
            Ok(_) => {}
            Err(err) if first_err.is_none() => first_err = Some(err),
            Err(_) => {}
        }
    }
    if let Some(err) = first_err {
        return Err(err).context("reading the primitive block stream");
    }

    Ok(sorter.finish())
}
