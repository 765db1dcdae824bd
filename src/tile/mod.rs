//! Tile artifact format
//!
//! Layout (little-endian):
//!
//! ```text
//! header  magic u32, version u32, changeset i64, zoom i32, x i32, y i32,
//!         count_rels i32, count_ways i32, count_nodes i32            40 bytes
//! rel     class i32, flags i32, rel_type i32, cx i16, cy i16,
//!         count i32, name_len i32, name                       24 + name
//!         followed by `count` member ways
//! way     class i32, flags i32, layer i16, inner i16, count i32,
//!         name_len i32, name, count × (x i16, y i16)   20 + name + 4·count
//! node    class i32, flags i32, ele i32, x i16, y i16, name_len i32,
//!         name                                                20 + name
//! ```
//!
//! Rels come first, then standalone ways, then nodes.

pub mod frame;
pub mod stream;
pub mod parser;

pub use frame::TileFrame;
pub use parser::{parse, TileNode, TileRel, TileVisitor, TileWay};
pub use stream::TileStream;

pub const TILE_MAGIC: u32 = 0xB00D_90DB;
pub const TILE_VERSION: u32 = 20211112;

/// Deepest zoom a tile address may carry
pub const MAX_ZOOM: i32 = 15;

pub const HEADER_SIZE: usize = 40;
pub const REL_HEADER: usize = 24;
pub const WAY_HEADER: usize = 20;
pub const NODE_HEADER: usize = 20;
pub const POINT_SIZE: usize = 4;

// header field offsets
pub(crate) const OFF_COUNT_RELS: usize = 28;
pub(crate) const OFF_COUNT_WAYS: usize = 32;
pub(crate) const OFF_COUNT_NODES: usize = 36;

/// Decoded tile header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileHeader {
    pub changeset: i64,
    pub zoom: i32,
    pub x: i32,
    pub y: i32,
    pub count_rels: i32,
    pub count_ways: i32,
    pub count_nodes: i32,
}
