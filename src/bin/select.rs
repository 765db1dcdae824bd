//! select - render one tile of a record index as XML
//!
//! Usage:
//!   select <index.sqlite> /osmdbv4/<zoom>/<x>/<y> [--cache <cache.sqlite>]
//!          [--config <index.json>] [--out <out.xml>]
//!
//! A prefetched tile from `--cache` is used when present; otherwise the tile
//! is rendered from the index. The XML is written to `out.xml` by default.

use std::path::PathBuf;
use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use osmdb::config::{IndexConfig, Mode};
use osmdb::index::Index;
use osmdb::storage::TileCache;
use osmdb::tile::parse;
use osmdb::tiler::Tiler;
use osmdb::xml::XmlVisitor;

#[derive(Debug, PartialEq, Eq)]
enum Request {
    Tile { zoom: i32, x: i32, y: i32 },
    Search(String),
}

fn parse_request(path: &str) -> Result<Request> {
    if let Some(rest) = path.strip_prefix("/osmdbv4/") {
        let parts: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
        if parts.len() != 3 {
            bail!("expected /osmdbv4/<zoom>/<x>/<y>, got {}", path);
        }
        let num = |s: &str| s.parse::<i32>().with_context(|| format!("bad tile coordinate {:?}", s));
        return Ok(Request::Tile { zoom: num(parts[0])?, x: num(parts[1])?, y: num(parts[2])? });
    }
    if let Some(words) = path.strip_prefix("/search/") {
        return Ok(Request::Search(words.replace('+', " ")));
    }
    bail!("unknown request {}", path)
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn usage() -> ! {
    eprintln!("Usage: select <index.sqlite> /osmdbv4/<zoom>/<x>/<y> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --cache <path>   prefetched tile cache to try first");
    eprintln!("  --config <path>  index configuration (JSON)");
    eprintln!("  --out <path>     output file (default: out.xml)");
    std::process::exit(1);
}

fn run(args: &[String]) -> Result<()> {
    let index_path = PathBuf::from(&args[1]);
    let (zoom, x, y) = match parse_request(&args[2])? {
        Request::Tile { zoom, x, y } => (zoom, x, y),
        Request::Search(words) => bail!("search is not supported (query {:?})", words),
    };
    let out_path = PathBuf::from(flag(args, "--out").unwrap_or("out.xml"));

    let mut config = match flag(args, "--config") {
        Some(path) => IndexConfig::from_json_file(path)
            .with_context(|| format!("reading index config {}", path))?,
        None => IndexConfig::default(),
    };
    config.mode = Mode::ReadOnly;
    config.nth = 1;

    let cached = match flag(args, "--cache") {
        Some(path) => TileCache::open(path, Mode::ReadOnly)
            .and_then(|cache| cache.get(zoom, x, y))
            .with_context(|| format!("reading tile cache {}", path))?,
        None => None,
    };

    let tile = match cached {
        Some(blob) => {
            tracing::info!("[select] Tile {}/{}/{} from cache", zoom, x, y);
            blob
        }
        None => {
            let index = Index::open(&index_path, config)
                .with_context(|| format!("opening index {:?}", index_path))?;
            let mut tiler = Tiler::new(&index, 0);
            let blob = tiler.tile(zoom, x, y)?;
            let stats = index.stats();
            tracing::info!(
                "[select] Rendered {}/{}/{}: {} bytes, {} entries loaded",
                zoom, x, y, blob.len(), stats.loads
            );
            blob
        }
    };

    let mut xml = XmlVisitor::new(Vec::new());
    let header = parse(&tile, &mut xml)?;
    let doc = xml.finish()?;
    std::fs::write(&out_path, &doc).with_context(|| format!("writing {:?}", out_path))?;

    tracing::info!(
        "[select] Wrote {:?}: {} rels, {} ways, {} nodes",
        out_path, header.count_rels, header.count_ways, header.count_nodes
    );
    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        usage();
    }

    if let Err(e) = run(&args) {
        tracing::error!("[select] {:#}", e);
        std::process::exit(1);
    }
}
