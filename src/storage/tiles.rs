//! Prefetched tile tables (`tbl_tile9`, `tbl_tile12`, `tbl_tile15`)

use std::path::Path;
use crate::config::{Mode, SUPPORTED_ZOOMS};
use crate::error::{OsmdbError, Result};
use crate::storage::store::Store;

/// Row id of tile `(zoom, x, y)`: `2^zoom * y + x`
pub fn tile_id(zoom: i32, x: i32, y: i32) -> i64 {
    (1i64 << zoom) * y as i64 + x as i64
}

fn table(zoom: i32) -> Result<String> {
    if !SUPPORTED_ZOOMS.contains(&zoom) {
        return Err(OsmdbError::Protocol(format!("zoom {} has no tile table", zoom)));
    }
    Ok(format!("tile{}", zoom))
}

/// Database of prefetched tile artifacts
pub struct TileCache {
    store: Store,
}

impl TileCache {
    /// Open a tile cache; `Mode::Create` creates the tile tables
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self> {
        let store = Store::open_raw(path, mode)?;
        if mode == Mode::Create {
            let tables: Vec<String> = SUPPORTED_ZOOMS.iter().map(|z| format!("tile{}", z)).collect();
            store.create_schema(&tables)?;
        }
        Ok(Self { store })
    }

    pub fn put(&mut self, zoom: i32, x: i32, y: i32, blob: &[u8]) -> Result<()> {
        let table = table(zoom)?;
        self.store.save_table(&table, tile_id(zoom, x, y), blob)
    }

    pub fn get(&self, zoom: i32, x: i32, y: i32) -> Result<Option<Vec<u8>>> {
        let table = table(zoom)?;
        self.store.load_table(&table, tile_id(zoom, x, y))
    }

    pub fn begin(&mut self) -> Result<()> {
        self.store.begin()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.store.commit()
    }

    pub fn changeset(&self) -> Result<i64> {
        self.store.changeset()
    }

    pub fn set_changeset(&mut self, changeset: i64) -> Result<()> {
        self.store.set_changeset(changeset)
    }
}
