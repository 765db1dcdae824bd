//! Tile production from the record index
//!
//! One `Tiler` per thread. It reads the tile-refs lists of a tile, pulls the
//! referenced records through the shared `Index` and writes the artifact with
//! its own `TileStream`:
//!
//! 1. relations with their member ways
//! 2. standalone ways: joined, sampled, quadrant-clipped
//! 3. nodes not already emitted as a relation centre
//!
//! References to records that do not exist are skipped; the source dataset
//! may be geographically pruned.

pub mod segment;
pub mod clip;

use std::collections::HashSet;
use crate::config::{debug_log, SUPPORTED_ZOOMS};
use crate::error::{OsmdbError, Result};
use crate::index::Index;
use crate::storage::record::{Bounds, Member, RecordType, RelType};
use crate::storage::tiles::tile_id;
use crate::storage::Handle;
use crate::tile::{TileFrame, TileStream};
use clip::{min_dist, sample, Clipper};
use segment::{SegNode, Segment, SegmentSet};

pub use segment::MAX_JOIN_ANGLE;

/// Owned copy of the style fields of a way
struct WayStyle {
    class: i32,
    flags: i32,
    layer: i32,
    name: Option<String>,
}

/// Per-thread tile builder
pub struct Tiler<'a> {
    index: &'a Index,
    tid: usize,
    stream: TileStream,
    /// Node ids emitted inside the current tile (relation centres)
    exported_nodes: HashSet<i64>,
    /// Way ids emitted inside the current tile (relation members)
    exported_ways: HashSet<i64>,
    segments: SegmentSet,
    /// Scratch list of way node ids
    nids: Vec<i64>,
}

/// Saturate a layer number into the artifact's 16-bit field
fn layer16(layer: i32) -> i16 {
    layer.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

impl<'a> Tiler<'a> {
    /// Tiler reading through `index` as thread `tid`
    pub fn new(index: &'a Index, tid: usize) -> Self {
        Self {
            index,
            tid,
            stream: TileStream::new(),
            exported_nodes: HashSet::new(),
            exported_ways: HashSet::new(),
            segments: SegmentSet::new(),
            nids: Vec::new(),
        }
    }

    pub fn tid(&self) -> usize {
        self.tid
    }

    /// Read one record and map it to an owned value, releasing the handle
    fn fetch<T, F>(&self, kind: RecordType, id: i64, map: F) -> Result<Option<T>>
    where
        F: FnOnce(&Handle) -> Option<T>,
    {
        match self.index.get(self.tid, kind, id)? {
            Some(handle) => {
                let out = map(&handle);
                self.index.put(handle);
                Ok(out)
            }
            None => Ok(None),
        }
    }

    fn tile_refs(&self, kind: Option<RecordType>, tile: i64) -> Result<Vec<i64>> {
        let Some(kind) = kind else {
            return Ok(Vec::new());
        };
        Ok(self
            .fetch(kind, tile, |h| h.id_list().map(|l| l.to_vec()))?
            .unwrap_or_default())
    }

    fn coord(&self, nid: i64) -> Result<Option<(f64, f64)>> {
        self.fetch(RecordType::NodeCoord, nid, |h| h.node_coord().map(|c| (c.lat(), c.lon())))
    }

    fn way_style(&self, wid: i64) -> Result<Option<WayStyle>> {
        self.fetch(RecordType::WayInfo, wid, |h| {
            h.way_info().map(|w| WayStyle {
                class: w.class(),
                flags: w.flags(),
                layer: w.layer(),
                name: w.name().map(String::from),
            })
        })
    }

    /// Node list of a way with positions; nodes without coordinates are skipped
    fn way_nodes(&mut self, wid: i64) -> Result<Vec<SegNode>> {
        self.nids.clear();
        let nids = self.fetch(RecordType::WayNds, wid, |h| h.id_list().map(|l| l.to_vec()))?;
        if let Some(nids) = nids {
            self.nids.extend(nids);
        }

        let mut nodes = Vec::with_capacity(self.nids.len());
        for &nid in &self.nids {
            match self.coord(nid)? {
                Some((lat, lon)) => nodes.push(SegNode::new(nid, lat, lon)),
                None => debug_log!("way {} references missing node {}", wid, nid),
            }
        }
        Ok(nodes)
    }

    /// Build the artifact of tile `(zoom, x, y)`; zoom must be 9, 12 or 15
    pub fn tile(&mut self, zoom: i32, x: i32, y: i32) -> Result<Vec<u8>> {
        if !SUPPORTED_ZOOMS.contains(&zoom) {
            return Err(OsmdbError::InvalidTile { zoom, x, y });
        }
        let frame = TileFrame::new(zoom, x, y)?;
        let changeset = self.index.changeset()?;

        let built = self.build(&frame, changeset);
        self.reset();
        match built {
            Ok(tile) => Ok(tile),
            Err(e) => {
                self.stream.abort();
                Err(e)
            }
        }
    }

    fn build(&mut self, frame: &TileFrame, changeset: i64) -> Result<Vec<u8>> {
        self.stream.begin_tile(frame.zoom, frame.x, frame.y, changeset)?;
        let tile = tile_id(frame.zoom, frame.x, frame.y);
        let min_dist = min_dist(frame);

        self.gather_rels(frame, tile, min_dist)?;
        self.gather_ways(frame, tile, min_dist)?;
        self.gather_nodes(frame, tile)?;

        let out = self.stream.end_tile()?;
        tracing::debug!(
            "Tile {}/{}/{}: {} bytes, {} rel members/centres exported",
            frame.zoom, frame.x, frame.y, out.len(),
            self.exported_ways.len() + self.exported_nodes.len()
        );
        Ok(out)
    }

    fn reset(&mut self) {
        self.exported_nodes.clear();
        self.exported_ways.clear();
        self.segments.clear();
        self.nids.clear();
    }

    fn gather_rels(&mut self, frame: &TileFrame, tile: i64, min_dist: f64) -> Result<()> {
        for rid in self.tile_refs(RecordType::rel_tile(frame.zoom), tile)? {
            let info = self.fetch(RecordType::RelInfo, rid, |h| {
                h.rel_info().map(|r| {
                    (r.center_nid(), r.class(), r.flags(), r.rel_type(), r.name().map(String::from))
                })
            })?;
            let Some((center_nid, class, flags, rel_type, mut name)) = info else {
                debug_log!("tile {} references missing rel {}", tile, rid);
                continue;
            };
            let members: Vec<Member> = self
                .fetch(RecordType::RelMembers, rid, |h| h.rel_members().map(|m| m.iter().collect()))?
                .unwrap_or_default();
            let range = self.fetch(RecordType::RelRange, rid, |h| h.range().map(|r| r.bounds()))?;

            let center = self.rel_center(center_nid, &mut name)?;
            let center = center
                .or_else(|| range.map(|b| b.center()))
                .unwrap_or_else(|| frame.bounds().center());

            self.stream.begin_rel(class, flags, rel_type, center, name.as_deref())?;
            for member in members {
                self.gather_member_way(member, rel_type, min_dist)?;
            }
            self.stream.end_rel()?;
        }
        Ok(())
    }

    /// Position of a relation's centre node; an unnamed relation borrows the
    /// centre node's name. The node is not emitted again as a standalone node.
    fn rel_center(&mut self, nid: i64, name: &mut Option<String>) -> Result<Option<(f64, f64)>> {
        if nid <= 0 {
            return Ok(None);
        }
        let Some(pos) = self.coord(nid)? else {
            return Ok(None);
        };
        if name.is_none() {
            *name = self
                .fetch(RecordType::NodeInfo, nid, |h| h.node_info().and_then(|n| n.name().map(String::from)))?;
        }
        self.exported_nodes.insert(nid);
        Ok(Some(pos))
    }

    fn gather_member_way(&mut self, member: Member, rel_type: RelType, min_dist: f64) -> Result<()> {
        let Some(style) = self.way_style(member.wid)? else {
            debug_log!("rel member way {} is missing", member.wid);
            return Ok(());
        };
        let mut nodes = self.way_nodes(member.wid)?;
        sample(&mut nodes, min_dist);
        if nodes.len() < 2 {
            return Ok(());
        }
        // inner rings only mean something for multipolygons
        let inner = member.inner && rel_type == RelType::Multipolygon;

        self.stream.begin_way(style.class, style.flags, layer16(style.layer), inner, style.name.as_deref())?;
        for node in &nodes {
            self.stream.add_way_coord(node.lat, node.lon)?;
        }
        self.stream.end_way()?;
        self.exported_ways.insert(member.wid);
        Ok(())
    }

    fn gather_ways(&mut self, frame: &TileFrame, tile: i64, min_dist: f64) -> Result<()> {
        for wid in self.tile_refs(RecordType::way_tile(frame.zoom), tile)? {
            if self.exported_ways.contains(&wid) || self.segments.contains(wid) {
                continue;
            }
            let Some(style) = self.way_style(wid)? else {
                debug_log!("tile {} references missing way {}", tile, wid);
                continue;
            };
            let nodes = self.way_nodes(wid)?;
            if nodes.is_empty() {
                continue;
            }
            let range = self.fetch(RecordType::WayRange, wid, |h| h.range().map(|r| r.bounds()))?;
            let bounds = range.unwrap_or_else(|| {
                nodes.iter().fold(
                    Bounds::new(nodes[0].lat, nodes[0].lon, nodes[0].lat, nodes[0].lon),
                    |b, n| b.union(&Bounds::new(n.lat, n.lon, n.lat, n.lon)),
                )
            });
            self.segments.insert(Segment {
                wid,
                class: style.class,
                flags: style.flags,
                layer: style.layer,
                name: style.name,
                bounds,
                nodes,
            });
        }

        let joined = self.segments.join();
        if joined > 0 {
            debug_log!("tile {}: joined {} way pairs", tile, joined);
        }

        let clipper = Clipper::new(*frame);
        for nodes in self.segments.nodes_mut() {
            sample(nodes, min_dist);
            clipper.clip(nodes);
        }

        for seg in self.segments.iter() {
            if seg.nodes.len() < 2 {
                continue;
            }
            self.stream.begin_way(seg.class, seg.flags, layer16(seg.layer), false, seg.name.as_deref())?;
            for node in &seg.nodes {
                self.stream.add_way_coord(node.lat, node.lon)?;
            }
            self.stream.end_way()?;
        }
        Ok(())
    }

    fn gather_nodes(&mut self, frame: &TileFrame, tile: i64) -> Result<()> {
        for nid in self.tile_refs(RecordType::node_tile(frame.zoom), tile)? {
            if !self.exported_nodes.insert(nid) {
                continue;
            }
            let info = self.fetch(RecordType::NodeInfo, nid, |h| {
                h.node_info().map(|n| (n.class(), n.flags(), n.ele(), n.name().map(String::from)))
            })?;
            let Some((class, flags, ele, name)) = info else {
                debug_log!("tile {} references missing node {}", tile, nid);
                continue;
            };
            let Some(pos) = self.coord(nid)? else {
                continue;
            };
            self.stream.add_node(class, flags, ele.round() as i32, pos, name.as_deref())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
