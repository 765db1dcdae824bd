//! Builder of tile artifacts
//!
//! Records are appended to one growing buffer. The stream remembers the byte
//! offset of the open rel and way and patches their counts through it, so
//! nothing refers into the buffer across a reallocation.

use crate::error::{OsmdbError, Result};
use crate::storage::record::{add_name, padded_name_len, RelType};
use crate::tile::{
    TileFrame, HEADER_SIZE, NODE_HEADER, OFF_COUNT_NODES, OFF_COUNT_RELS, OFF_COUNT_WAYS,
    POINT_SIZE, REL_HEADER, TILE_MAGIC, TILE_VERSION, WAY_HEADER,
};

// record field offsets patched after the fact
const REL_COUNT: usize = 16;
const WAY_COUNT: usize = 12;

/// Emission stage; only moves forward within a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Rels,
    Ways,
    Nodes,
}

#[derive(Debug)]
struct Open {
    frame: TileFrame,
    stage: Stage,
    rel: Option<usize>,
    way: Option<usize>,
}

/// Reusable builder for one tile at a time
#[derive(Debug, Default)]
pub struct TileStream {
    buf: Vec<u8>,
    open: Option<Open>,
}

fn push_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn name_len(name: Option<&str>) -> i32 {
    name.map_or(0, |n| padded_name_len(n) as i32)
}

fn push_name(out: &mut Vec<u8>, name: Option<&str>) {
    if let Some(name) = name {
        add_name(out, name);
    }
}

fn current<'a>(open: &'a mut Option<Open>, what: &str) -> Result<&'a mut Open> {
    open.as_mut()
        .ok_or_else(|| OsmdbError::Protocol(format!("{} outside begin_tile/end_tile", what)))
}

impl TileStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self, offset: usize) {
        let slot = &mut self.buf[offset..offset + 4];
        let count = i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]) + 1;
        slot.copy_from_slice(&count.to_le_bytes());
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        self.buf.try_reserve(additional)?;
        Ok(())
    }

    /// Start a tile; reserves the header
    pub fn begin_tile(&mut self, zoom: i32, x: i32, y: i32, changeset: i64) -> Result<()> {
        if self.open.is_some() {
            return Err(OsmdbError::Protocol("begin_tile inside an open tile".into()));
        }
        let frame = TileFrame::new(zoom, x, y)?;

        self.buf.clear();
        self.reserve(HEADER_SIZE)?;
        self.buf.extend_from_slice(&TILE_MAGIC.to_le_bytes());
        self.buf.extend_from_slice(&TILE_VERSION.to_le_bytes());
        self.buf.extend_from_slice(&changeset.to_le_bytes());
        for v in [zoom, x, y, 0, 0, 0] {
            push_i32(&mut self.buf, v);
        }

        self.open = Some(Open { frame, stage: Stage::Rels, rel: None, way: None });
        Ok(())
    }

    /// Frame of the open tile
    pub fn frame(&self) -> Option<&TileFrame> {
        self.open.as_ref().map(|o| &o.frame)
    }

    /// Start a relation; its member ways follow until `end_rel`
    pub fn begin_rel(
        &mut self,
        class: i32,
        flags: i32,
        rel_type: RelType,
        center: (f64, f64),
        name: Option<&str>,
    ) -> Result<()> {
        let open = current(&mut self.open, "begin_rel")?;
        if open.stage != Stage::Rels || open.rel.is_some() || open.way.is_some() {
            return Err(OsmdbError::Protocol("begin_rel out of order".into()));
        }
        let (cx, cy) = open.frame.point(center.0, center.1);
        let offset = self.buf.len();
        open.rel = Some(offset);

        self.reserve(REL_HEADER + name_len(name) as usize)?;
        push_i32(&mut self.buf, class);
        push_i32(&mut self.buf, flags);
        push_i32(&mut self.buf, rel_type.code());
        push_i16(&mut self.buf, cx);
        push_i16(&mut self.buf, cy);
        push_i32(&mut self.buf, 0);
        push_i32(&mut self.buf, name_len(name));
        push_name(&mut self.buf, name);
        Ok(())
    }

    pub fn end_rel(&mut self) -> Result<()> {
        let open = current(&mut self.open, "end_rel")?;
        if open.rel.is_none() || open.way.is_some() {
            return Err(OsmdbError::Protocol("end_rel without an open rel".into()));
        }
        open.rel = None;
        self.bump(OFF_COUNT_RELS);
        Ok(())
    }

    /// Start a way: a member when a rel is open, a standalone way otherwise
    pub fn begin_way(
        &mut self,
        class: i32,
        flags: i32,
        layer: i16,
        inner: bool,
        name: Option<&str>,
    ) -> Result<()> {
        let open = current(&mut self.open, "begin_way")?;
        if open.way.is_some() {
            return Err(OsmdbError::Protocol("begin_way inside an open way".into()));
        }
        if open.rel.is_none() {
            if open.stage > Stage::Ways {
                return Err(OsmdbError::Protocol("way after nodes".into()));
            }
            open.stage = Stage::Ways;
        }
        let offset = self.buf.len();
        open.way = Some(offset);

        self.reserve(WAY_HEADER + name_len(name) as usize)?;
        push_i32(&mut self.buf, class);
        push_i32(&mut self.buf, flags);
        push_i16(&mut self.buf, layer);
        push_i16(&mut self.buf, inner as i16);
        push_i32(&mut self.buf, 0);
        push_i32(&mut self.buf, name_len(name));
        push_name(&mut self.buf, name);
        Ok(())
    }

    /// Append one geographic coordinate to the open way
    pub fn add_way_coord(&mut self, lat: f64, lon: f64) -> Result<()> {
        let open = current(&mut self.open, "add_way_coord")?;
        let way = open
            .way
            .ok_or_else(|| OsmdbError::Protocol("add_way_coord without an open way".into()))?;
        let (px, py) = open.frame.point(lat, lon);

        self.reserve(POINT_SIZE)?;
        push_i16(&mut self.buf, px);
        push_i16(&mut self.buf, py);
        self.bump(way + WAY_COUNT);
        Ok(())
    }

    pub fn end_way(&mut self) -> Result<()> {
        let open = current(&mut self.open, "end_way")?;
        if open.way.take().is_none() {
            return Err(OsmdbError::Protocol("end_way without an open way".into()));
        }
        let rel = open.rel;
        match rel {
            Some(rel) => self.bump(rel + REL_COUNT),
            None => self.bump(OFF_COUNT_WAYS),
        }
        Ok(())
    }

    pub fn add_node(
        &mut self,
        class: i32,
        flags: i32,
        ele: i32,
        (lat, lon): (f64, f64),
        name: Option<&str>,
    ) -> Result<()> {
        let open = current(&mut self.open, "add_node")?;
        if open.rel.is_some() || open.way.is_some() {
            return Err(OsmdbError::Protocol("add_node inside a rel or way".into()));
        }
        open.stage = Stage::Nodes;
        let (px, py) = open.frame.point(lat, lon);

        self.reserve(NODE_HEADER + name_len(name) as usize)?;
        push_i32(&mut self.buf, class);
        push_i32(&mut self.buf, flags);
        push_i32(&mut self.buf, ele);
        push_i16(&mut self.buf, px);
        push_i16(&mut self.buf, py);
        push_i32(&mut self.buf, name_len(name));
        push_name(&mut self.buf, name);
        self.bump(OFF_COUNT_NODES);
        Ok(())
    }

    /// Finish the tile and hand out the artifact
    pub fn end_tile(&mut self) -> Result<Vec<u8>> {
        match &self.open {
            None => return Err(OsmdbError::Protocol("end_tile without begin_tile".into())),
            Some(open) if open.rel.is_some() || open.way.is_some() => {
                return Err(OsmdbError::Protocol("end_tile with an open rel or way".into()));
            }
            Some(_) => {}
        }
        self.open = None;
        Ok(std::mem::take(&mut self.buf))
    }

    /// Drop a partially built tile
    pub fn abort(&mut self) {
        self.open = None;
        self.buf.clear();
    }
}
