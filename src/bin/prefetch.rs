//! prefetch - fill a tile cache for a region
//!
//! Usage:
//!   prefetch -pf={CO|US|WW} <smem_gb> <cache.sqlite> <index.sqlite> [--threads N]
//!
//! SIGINT/SIGTERM stop rendering; tiles rendered so far are committed.

use std::path::PathBuf;
use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use osmdb::config::CACHE_SIZE;
use osmdb::prefetch::{self, PrefetchConfig, Region};

fn usage() -> ! {
    eprintln!("Usage: prefetch -pf={{CO|US|WW}} <smem_gb> <cache.sqlite> <index.sqlite> [--threads N]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  -pf=REGION     region preset: CO (Colorado), US (contiguous US), WW (world)");
    eprintln!("  <smem_gb>      source index cache size in GiB");
    eprintln!("  <cache.sqlite> tile cache to create");
    eprintln!("  <index.sqlite> record index to read");
    eprintln!("  --threads N    render threads (default: available cores)");
    std::process::exit(1);
}

fn parse_config(args: &[String]) -> Result<PrefetchConfig> {
    let region: Region = match args[1].strip_prefix("-pf=") {
        Some(name) => name.parse()?,
        None => bail!("expected -pf=<region>, got {:?}", args[1]),
    };
    let smem_gb: f64 = args[2]
        .parse()
        .with_context(|| format!("bad smem_gb {:?}", args[2]))?;
    let nth = match args.iter().position(|a| a == "--threads") {
        Some(i) => args
            .get(i + 1)
            .context("--threads needs a value")?
            .parse::<usize>()
            .context("bad --threads value")?,
        None => prefetch::default_threads(),
    };

    Ok(PrefetchConfig {
        area: region.bounds(),
        smem: smem_gb * (1u64 << 30) as f64 / CACHE_SIZE as f64,
        cache: PathBuf::from(&args[3]),
        index: PathBuf::from(&args[4]),
        nth: nth.max(1),
    })
}

fn run(args: &[String]) -> Result<()> {
    let cfg = parse_config(args)?;
    if cfg.cache.exists() {
        bail!("tile cache {:?} already exists", cfg.cache);
    }
    tracing::info!("[prefetch] {:?} -> {:?}, area {:?}", cfg.index, cfg.cache, cfg.area);

    let stop = prefetch::stop_on_signals()?;
    let summary = prefetch::run(&cfg, &stop)?;
    if summary.stopped {
        tracing::warn!("[prefetch] Interrupted; cache holds {} tiles", summary.tiles);
    }
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 5 {
        usage();
    }

    if let Err(e) = run(&args) {
        tracing::error!("[prefetch] {:#}", e);
        std::process::exit(1);
    }
}
