//! Prefetch: render every tile of a region into a tile cache
//!
//! ```text
//! rayon pool (nth threads)           channel            writer thread
//!   Tiler per thread  ── Rendered ──────►│──────────────► TileCache::put
//!   walks one zoom-9 subtree per job     │                progress lines
//! ```
//!
//! The source index is opened read-only with one thread slot per pool
//! thread; the rayon thread index is the index thread id.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::prelude::*;
use sysinfo::System;
use crate::config::{Mode, SUPPORTED_ZOOMS};
use crate::error::{OsmdbError, Result};
use crate::index::Index;
use crate::storage::record::Bounds;
use crate::storage::tiles::TileCache;
use crate::tile::frame::MAX_LAT;
use crate::tile::TileFrame;
use crate::tiler::Tiler;

/// Tiles between progress lines
const PROGRESS_EVERY: u64 = 1000;

/// Rendered tiles in flight per pool thread
const QUEUE_PER_THREAD: usize = 64;

/// Geographic presets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Colorado
    Co,
    /// Contiguous United States
    Us,
    /// Whole Mercator square
    Ww,
}

impl Region {
    pub fn bounds(self) -> Bounds {
        match self {
            Region::Co => Bounds::new(41.0, -109.05, 37.0, -102.04),
            Region::Us => Bounds::new(49.4, -124.8, 24.5, -66.9),
            Region::Ww => Bounds::new(MAX_LAT, -180.0, -MAX_LAT, 180.0),
        }
    }
}

impl FromStr for Region {
    type Err = OsmdbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "CO" => Ok(Region::Co),
            "US" => Ok(Region::Us),
            "WW" => Ok(Region::Ww),
            other => Err(OsmdbError::Protocol(format!(
                "unknown region {:?} (expected CO, US or WW)", other
            ))),
        }
    }
}

/// Prefetch job description
#[derive(Debug, Clone)]
pub struct PrefetchConfig {
    pub area: Bounds,
    /// Source index cache scale (see `IndexConfig::smem`)
    pub smem: f64,
    /// Tile cache to create
    pub cache: PathBuf,
    /// Source record index
    pub index: PathBuf,
    /// Render threads
    pub nth: usize,
}

/// Totals of a finished (or stopped) prefetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchSummary {
    pub tiles: u64,
    pub bytes: u64,
    pub stopped: bool,
}

fn intersects(area: &Bounds, tile: &Bounds) -> bool {
    tile.lat_b < area.lat_t && tile.lat_t > area.lat_b && tile.lon_l < area.lon_r && tile.lon_r > area.lon_l
}

/// Depth-first quadtree walk from `(zoom, x, y)` down to `max_zoom`.
///
/// Calls `visit` on every tile at a supported zoom that intersects `area`.
/// Subtrees outside the area are pruned. `visit` returning `false` stops
/// the walk; so does the return value.
pub fn walk<F>(area: &Bounds, zoom: i32, x: i32, y: i32, max_zoom: i32, visit: &mut F) -> Result<bool>
where
    F: FnMut(i32, i32, i32) -> Result<bool>,
{
    let frame = TileFrame::new(zoom, x, y)?;
    if !intersects(area, &frame.bounds()) {
        return Ok(true);
    }
    if SUPPORTED_ZOOMS.contains(&zoom) && !visit(zoom, x, y)? {
        return Ok(false);
    }
    if zoom < max_zoom {
        for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            if !walk(area, zoom + 1, 2 * x + dx, 2 * y + dy, max_zoom, visit)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Zoom-9 tiles intersecting `area`, one job each
pub fn roots(area: &Bounds) -> Result<Vec<(i32, i32)>> {
    let mut out = Vec::new();
    walk(area, 0, 0, 0, SUPPORTED_ZOOMS[0], &mut |_, x, y| {
        out.push((x, y));
        Ok(true)
    })?;
    Ok(out)
}

struct Rendered {
    zoom: i32,
    x: i32,
    y: i32,
    blob: Vec<u8>,
}

/// Resident set size of this process in bytes
fn rss(sys: &mut System) -> u64 {
    let Ok(pid) = sysinfo::get_current_pid() else {
        return 0;
    };
    sys.refresh_process(pid);
    sys.process(pid).map_or(0, |p| p.memory())
}

fn write_tiles(mut cache: TileCache, rx: Receiver<Rendered>) -> Result<PrefetchSummary> {
    let mut sys = System::new();
    let start = Instant::now();
    let mut summary = PrefetchSummary::default();

    cache.begin()?;
    for tile in rx {
        cache.put(tile.zoom, tile.x, tile.y, &tile.blob)?;
        summary.tiles += 1;
        summary.bytes += tile.blob.len() as u64;

        if summary.tiles % PROGRESS_EVERY == 0 {
            let secs = start.elapsed().as_secs_f64().max(f64::EPSILON);
            tracing::info!(
                "[prefetch] {} tiles ({}/{}/{}), {:.0} tiles/s, {} MB written, RSS {} MB",
                summary.tiles, tile.zoom, tile.x, tile.y,
                summary.tiles as f64 / secs,
                summary.bytes >> 20,
                rss(&mut sys) >> 20
            );
        }
    }
    cache.commit()?;
    Ok(summary)
}

/// Render one zoom-9 subtree
fn render_subtree(
    tiler: &mut Tiler<'_>,
    area: &Bounds,
    root: (i32, i32),
    tx: &Sender<Rendered>,
    stop: &AtomicBool,
) -> Result<()> {
    let max_zoom = SUPPORTED_ZOOMS[SUPPORTED_ZOOMS.len() - 1];
    walk(area, SUPPORTED_ZOOMS[0], root.0, root.1, max_zoom, &mut |zoom, x, y| {
        if stop.load(Ordering::Relaxed) {
            return Ok(false);
        }
        let blob = tiler.tile(zoom, x, y)?;
        tx.send(Rendered { zoom, x, y, blob })
            .map_err(|_| OsmdbError::Worker("tile writer hung up".into()))?;
        Ok(true)
    })?;
    Ok(())
}

/// Render every supported-zoom tile intersecting `cfg.area` into a new
/// tile cache at `cfg.cache`. Setting `stop` ends the walk early; tiles
/// rendered so far are committed.
pub fn run(cfg: &PrefetchConfig, stop: &AtomicBool) -> Result<PrefetchSummary> {
    let index = Index::read_only(&cfg.index, cfg.nth, cfg.smem)?;
    let changeset = index.changeset()?;

    let mut cache = TileCache::open(&cfg.cache, Mode::Create)?;
    cache.set_changeset(changeset)?;

    let roots = roots(&cfg.area)?;
    tracing::info!(
        "[prefetch] {} zoom-9 subtrees, changeset {}, {} threads",
        roots.len(), changeset, cfg.nth
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cfg.nth)
        .thread_name(|i| format!("tiler-{}", i))
        .build()
        .map_err(|e| OsmdbError::Worker(e.to_string()))?;

    let (tx, rx) = bounded::<Rendered>(cfg.nth * QUEUE_PER_THREAD);
    let area = cfg.area;

    let (rendered, written) = thread::scope(|s| {
        let writer = s.spawn(move || write_tiles(cache, rx));

        let rendered = pool.install(|| {
            roots.par_iter().try_for_each_init(
                || Tiler::new(&index, rayon::current_thread_index().unwrap_or(0)),
                |tiler, &root| render_subtree(tiler, &area, root, &tx, stop),
            )
        });
        drop(tx);

        let written = writer
            .join()
            .unwrap_or_else(|_| Err(OsmdbError::Worker("tile writer panicked".into())));
        (rendered, written)
    });

    // a writer failure is the root cause of any send error
    let mut summary = written?;
    rendered?;
    summary.stopped = stop.load(Ordering::Relaxed);
    tracing::info!(
        "[prefetch] {} {} tiles, {} MB",
        if summary.stopped { "Stopped after" } else { "Finished" },
        summary.tiles,
        summary.bytes >> 20
    );
    Ok(summary)
}

/// Flag raised by SIGINT or SIGTERM
pub fn stop_on_signals() -> Result<Arc<AtomicBool>> {
    let stop = Arc::new(AtomicBool::new(false));
    let mut signals = signal_hook::iterator::Signals::new([
        signal_hook::consts::SIGINT,
        signal_hook::consts::SIGTERM,
    ])?;

    let flag = Arc::clone(&stop);
    thread::spawn(move || {
        for sig in signals.forever() {
            tracing::warn!("[prefetch] Received signal {}, finishing queued tiles", sig);
            flag.store(true, Ordering::Relaxed);
        }
    });
    Ok(stop)
}

/// Default render thread count
pub fn default_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::record::{NodeCoord, RecordType, WayInfo, WayNds};
    use crate::storage::tiles::tile_id;
    use crate::tile::{parse, TileVisitor};
    use tempfile::tempdir;

    struct Nop;
    impl TileVisitor for Nop {}

    #[test]
    fn test_region_parse() {
        assert_eq!("CO".parse::<Region>().unwrap(), Region::Co);
        assert_eq!("us".parse::<Region>().unwrap(), Region::Us);
        assert_eq!("WW".parse::<Region>().unwrap(), Region::Ww);
        assert!("EU".parse::<Region>().is_err());
    }

    #[test]
    fn test_walk_emits_supported_zooms_only() {
        let area = Region::Co.bounds();
        let mut zooms = std::collections::BTreeMap::new();
        walk(&area, 0, 0, 0, 12, &mut |zoom, _, _| {
            *zooms.entry(zoom).or_insert(0) += 1;
            Ok(true)
        })
        .unwrap();
        assert_eq!(zooms.keys().copied().collect::<Vec<_>>(), vec![9, 12]);
        // Colorado spans about 11 x 9 zoom-9 tiles
        assert!(zooms[&9] >= 60 && zooms[&9] <= 150, "{:?}", zooms);
        assert!(zooms[&12] > zooms[&9] * 32);
    }

    #[test]
    fn test_walk_stops() {
        let area = Region::Ww.bounds();
        let mut seen = 0;
        let finished = walk(&area, 0, 0, 0, 15, &mut |_, _, _| {
            seen += 1;
            Ok(seen < 5)
        })
        .unwrap();
        assert!(!finished);
        assert_eq!(seen, 5);
    }

    fn small_area() -> (Bounds, (i32, i32)) {
        let frame = TileFrame::new(15, 6760, 12416).unwrap();
        let (lat, lon) = frame.bounds().center();
        (Bounds::new(lat + 0.001, lon - 0.001, lat - 0.001, lon + 0.001), (6760, 12416))
    }

    #[test]
    fn test_roots() {
        let (area, _) = small_area();
        assert_eq!(roots(&area).unwrap(), vec![(105, 194)]);
    }

    #[test]
    fn test_run_fills_cache() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("index.sqlite");
        let cache_path = dir.path().join("cache.sqlite");
        let (area, (x, y)) = small_area();

        {
            let mut index = Index::create(&index_path, 1.0).unwrap();
            index.set_changeset(77).unwrap();
            let (lat, lon) = area.center();
            index.add_record(&NodeCoord { nid: 1, lat, lon }).unwrap();
            index.add_record(&NodeCoord { nid: 2, lat: lat + 0.0005, lon }).unwrap();
            index
                .add_record(&WayInfo { wid: 9, class: 1, flags: 0, layer: 0, name: None })
                .unwrap();
            index.add_record(&WayNds { wid: 9, nds: vec![1, 2] }).unwrap();
            index.add_tile(RecordType::WayTile15, tile_id(15, x, y), 9).unwrap();
            index.close().unwrap();
        }

        let cfg = PrefetchConfig {
            area,
            smem: 1.0,
            cache: cache_path.clone(),
            index: index_path,
            nth: 2,
        };
        let stop = AtomicBool::new(false);
        let summary = run(&cfg, &stop).unwrap();
        assert_eq!(summary.tiles, 3);
        assert!(!summary.stopped);

        let cache = TileCache::open(&cache_path, Mode::ReadOnly).unwrap();
        assert_eq!(cache.changeset().unwrap(), 77);
        let blob = cache.get(15, x, y).unwrap().unwrap();
        let header = parse(&blob, &mut Nop).unwrap();
        assert_eq!(header.count_ways, 1);
        assert_eq!(header.changeset, 77);
        assert!(cache.get(12, x / 8, y / 8).unwrap().is_some());
        assert!(cache.get(9, x / 64, y / 64).unwrap().is_some());
    }

    #[test]
    fn test_run_honours_stop_flag() {
        let dir = tempdir().unwrap();
        let index_path = dir.path().join("index.sqlite");
        drop(Index::create(&index_path, 1.0).unwrap());

        let cfg = PrefetchConfig {
            area: Region::Co.bounds(),
            smem: 1.0,
            cache: dir.path().join("cache.sqlite"),
            index: index_path,
            nth: 1,
        };
        let stop = AtomicBool::new(true);
        let summary = run(&cfg, &stop).unwrap();
        assert_eq!(summary.tiles, 0);
        assert!(summary.stopped);
    }
}
