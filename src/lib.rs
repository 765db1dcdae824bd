//! osmdb - OSM record cache and offline map tile builder
//!
//! # Architecture
//!
//! - **Packed records**: fixed little-endian layouts grouped into entry blobs
//! - **SQLite table set**: one `(major, blob)` table per record type
//! - **LRU index**: shared entry cache with high/low watermark eviction and
//!   dirty write-back
//! - **Tiler**: joins, samples and clips ways into compact tile artifacts
//! - **Prefetch**: renders whole regions into a tile cache on a thread pool
//!
//! # Usage example
//!
//! ```no_run
//! use osmdb::{Index, Tiler, XmlVisitor};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let index = Index::read_only("./index.sqlite", 1, 1.0)?;
//! let mut tiler = Tiler::new(&index, 0);
//! let tile = tiler.tile(15, 6760, 12416)?;
//!
//! let mut xml = XmlVisitor::new(Vec::new());
//! let header = osmdb::parse(&tile, &mut xml)?;
//! println!("{} ways in tile", header.count_ways);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod config;
pub mod storage;
pub mod index;
pub mod tile;
pub mod tiler;
pub mod prefetch;
pub mod xml;

pub use error::{OsmdbError, Result};
pub use config::{IndexConfig, Mode};
pub use storage::{tile_id, Entry, Handle, RecordType, Store, TileCache};
pub use index::{EntryKey, Index, IndexStats};
pub use tile::{parse, TileFrame, TileHeader, TileStream, TileVisitor};
pub use tiler::Tiler;
pub use prefetch::{PrefetchConfig, Region};
pub use xml::XmlVisitor;
