//! Validating single-pass reader of tile artifacts

use crate::error::{OsmdbError, Result};
use crate::storage::record::{decode_name, RelType};
use crate::tile::{
    TileFrame, TileHeader, HEADER_SIZE, NODE_HEADER, POINT_SIZE, REL_HEADER, TILE_MAGIC,
    TILE_VERSION, WAY_HEADER,
};

/// Relation record; its member ways are reported through `TileVisitor::member`
#[derive(Debug, Clone, Copy)]
pub struct TileRel<'a> {
    pub class: i32,
    pub flags: i32,
    pub rel_type: RelType,
    pub cx: i16,
    pub cy: i16,
    /// Number of member ways
    pub count: usize,
    pub name: Option<&'a str>,
}

#[derive(Debug, Clone, Copy)]
pub struct TileWay<'a> {
    pub class: i32,
    pub flags: i32,
    pub layer: i16,
    pub inner: bool,
    pub name: Option<&'a str>,
    points: &'a [u8],
}

impl<'a> TileWay<'a> {
    pub fn count(&self) -> usize {
        self.points.len() / POINT_SIZE
    }

    /// Fixed-point `(x, y)` pairs
    pub fn points(&self) -> impl Iterator<Item = (i16, i16)> + 'a {
        self.points.chunks_exact(POINT_SIZE).map(|p| {
            (i16::from_le_bytes([p[0], p[1]]), i16::from_le_bytes([p[2], p[3]]))
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TileNode<'a> {
    pub class: i32,
    pub flags: i32,
    pub ele: i32,
    pub x: i16,
    pub y: i16,
    pub name: Option<&'a str>,
}

/// Callbacks invoked by `parse` in artifact order.
///
/// Every callback may abort the parse by returning an error.
pub trait TileVisitor {
    fn tile(&mut self, _header: &TileHeader) -> Result<()> {
        Ok(())
    }

    fn rel(&mut self, _rel: &TileRel<'_>) -> Result<()> {
        Ok(())
    }

    /// Member way of the last reported rel
    fn member(&mut self, _way: &TileWay<'_>) -> Result<()> {
        Ok(())
    }

    /// Called after the last member of a rel
    fn end_rel(&mut self) -> Result<()> {
        Ok(())
    }

    fn way(&mut self, _way: &TileWay<'_>) -> Result<()> {
        Ok(())
    }

    fn node(&mut self, _node: &TileNode<'_>) -> Result<()> {
        Ok(())
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.bytes.len());
        match end {
            Some(end) => {
                let out = &self.bytes[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(OsmdbError::Corruption(format!(
                "tile truncated in {} at byte {} ({} needed, {} total)",
                what, self.pos, n, self.bytes.len()
            ))),
        }
    }

    fn name(&mut self, len: i32, what: &str) -> Result<Option<&'a str>> {
        if len < 0 {
            return Err(OsmdbError::Corruption(format!("negative name length in {}", what)));
        }
        let tail = self.take(len as usize, what)?;
        decode_name(tail)
    }
}

fn i16_at(b: &[u8], off: usize) -> i16 {
    i16::from_le_bytes([b[off], b[off + 1]])
}

fn i32_at(b: &[u8], off: usize) -> i32 {
    i32::from_le_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

fn count(value: i32, what: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| OsmdbError::Corruption(format!("negative {} count {}", what, value)))
}

fn read_header(cur: &mut Cursor<'_>) -> Result<TileHeader> {
    let h = cur.take(HEADER_SIZE, "header")?;
    let magic = u32::from_le_bytes([h[0], h[1], h[2], h[3]]);
    let version = u32::from_le_bytes([h[4], h[5], h[6], h[7]]);
    if magic != TILE_MAGIC {
        return Err(OsmdbError::Corruption(format!("bad tile magic {:#x}", magic)));
    }
    if version != TILE_VERSION {
        return Err(OsmdbError::Corruption(format!("unsupported tile version {}", version)));
    }
    let mut changeset = [0u8; 8];
    changeset.copy_from_slice(&h[8..16]);

    let header = TileHeader {
        changeset: i64::from_le_bytes(changeset),
        zoom: i32_at(h, 16),
        x: i32_at(h, 20),
        y: i32_at(h, 24),
        count_rels: i32_at(h, 28),
        count_ways: i32_at(h, 32),
        count_nodes: i32_at(h, 36),
    };
    TileFrame::new(header.zoom, header.x, header.y)?;
    Ok(header)
}

fn read_way<'a>(cur: &mut Cursor<'a>) -> Result<TileWay<'a>> {
    let h = cur.take(WAY_HEADER, "way")?;
    let points = count(i32_at(h, 12), "point")?;
    let name = cur.name(i32_at(h, 16), "way")?;
    let size = points
        .checked_mul(POINT_SIZE)
        .ok_or_else(|| OsmdbError::Corruption(format!("way point count {} overflows", points)))?;
    Ok(TileWay {
        class: i32_at(h, 0),
        flags: i32_at(h, 4),
        layer: i16_at(h, 8),
        inner: i16_at(h, 10) != 0,
        name,
        points: cur.take(size, "way points")?,
    })
}

/// Parse a tile artifact, reporting every record to `visitor`.
///
/// Fails on an undersized blob, bad magic or version, an invalid tile
/// address, negative counts, an unterminated name or trailing bytes.
pub fn parse<V: TileVisitor + ?Sized>(bytes: &[u8], visitor: &mut V) -> Result<TileHeader> {
    let mut cur = Cursor { bytes, pos: 0 };
    let header = read_header(&mut cur)?;
    let rels = count(header.count_rels, "rel")?;
    let ways = count(header.count_ways, "way")?;
    let nodes = count(header.count_nodes, "node")?;
    visitor.tile(&header)?;

    for _ in 0..rels {
        let h = cur.take(REL_HEADER, "rel")?;
        let rel = TileRel {
            class: i32_at(h, 0),
            flags: i32_at(h, 4),
            rel_type: RelType::from_code(i32_at(h, 8)),
            cx: i16_at(h, 12),
            cy: i16_at(h, 14),
            count: count(i32_at(h, 16), "member")?,
            name: cur.name(i32_at(h, 20), "rel")?,
        };
        visitor.rel(&rel)?;
        for _ in 0..rel.count {
            let way = read_way(&mut cur)?;
            visitor.member(&way)?;
        }
        visitor.end_rel()?;
    }

    for _ in 0..ways {
        let way = read_way(&mut cur)?;
        visitor.way(&way)?;
    }

    for _ in 0..nodes {
        let h = cur.take(NODE_HEADER, "node")?;
        let node = TileNode {
            class: i32_at(h, 0),
            flags: i32_at(h, 4),
            ele: i32_at(h, 8),
            x: i16_at(h, 12),
            y: i16_at(h, 14),
            name: cur.name(i32_at(h, 16), "node")?,
        };
        visitor.node(&node)?;
    }

    if cur.pos != bytes.len() {
        return Err(OsmdbError::Corruption(format!(
            "{} trailing bytes after tile records", bytes.len() - cur.pos
        )));
    }
    Ok(header)
}
