//! Packed record storage
//!
//! - `record`: binary layouts, owned builders and zero-copy views
//! - `entry`: in-memory unit of caching and persistence
//! - `store`: SQLite table set holding entry blobs
//! - `tiles`: prefetched tile tables

pub mod record;
pub mod entry;
pub mod store;
pub mod tiles;

pub use record::{
    Bounds, Member, NodeCoord, NodeInfo, PackedRecord, Record, RecordType, RelInfo,
    RelMembers, RelRange, RelType, TileRefs, WayInfo, WayNds, WayRange,
};
pub use entry::{Entry, Handle};
pub use store::Store;
pub use tiles::{tile_id, TileCache};
