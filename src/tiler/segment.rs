//! Way segments and endpoint joining
//!
//! Ways of one tile are copied into owned segments keyed by way id. Ways
//! that continue each other (shared endpoint, same style, small deflection)
//! are spliced into one segment before sampling and clipping.

use std::collections::{BTreeMap, HashMap};
use crate::storage::record::Bounds;

/// Largest deflection at a shared endpoint that still joins two ways
pub const MAX_JOIN_ANGLE: f64 = 30.0;

/// One way node with its position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegNode {
    pub nid: i64,
    pub lat: f64,
    pub lon: f64,
}

impl SegNode {
    pub fn new(nid: i64, lat: f64, lon: f64) -> Self {
        Self { nid, lat, lon }
    }
}

/// Owned copy of a way: style, bounding range, node list
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub wid: i64,
    pub class: i32,
    pub flags: i32,
    pub layer: i32,
    pub name: Option<String>,
    pub bounds: Bounds,
    pub nodes: Vec<SegNode>,
}

impl Segment {
    pub fn head(&self) -> Option<i64> {
        self.nodes.first().map(|n| n.nid)
    }

    pub fn tail(&self) -> Option<i64> {
        self.nodes.last().map(|n| n.nid)
    }

    pub fn is_loop(&self) -> bool {
        self.nodes.len() > 1 && self.head() == self.tail()
    }

    fn same_style(&self, other: &Segment) -> bool {
        self.class == other.class
            && self.layer == other.layer
            && self.flags == other.flags
            && self.name == other.name
    }

    fn joinable(&self) -> bool {
        self.nodes.len() >= 2 && !self.is_loop()
    }
}

/// Point on the unit sphere
fn unit(lat: f64, lon: f64) -> [f64; 3] {
    let (phi, lambda) = (lat.to_radians(), lon.to_radians());
    [phi.cos() * lambda.cos(), phi.cos() * lambda.sin(), phi.sin()]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Deflection in degrees between `a → b` and `b → c`
pub fn deflection(a: &SegNode, b: &SegNode, c: &SegNode) -> Option<f64> {
    let pb = unit(b.lat, b.lon);
    let d1 = sub(pb, unit(a.lat, a.lon));
    let d2 = sub(unit(c.lat, c.lon), pb);
    let norm = dot(d1, d1).sqrt() * dot(d2, d2).sqrt();
    if norm == 0.0 {
        return None;
    }
    Some((dot(d1, d2) / norm).clamp(-1.0, 1.0).acos().to_degrees())
}

/// Segments of the current tile plus the endpoint multi-map
#[derive(Debug, Default)]
pub struct SegmentSet {
    segs: BTreeMap<i64, Segment>,
    /// endpoint node id -> ids of segments starting or ending there
    ends: HashMap<i64, Vec<i64>>,
}

impl SegmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.segs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segs.is_empty()
    }

    pub fn get(&self, wid: i64) -> Option<&Segment> {
        self.segs.get(&wid)
    }

    pub fn contains(&self, wid: i64) -> bool {
        self.segs.contains_key(&wid)
    }

    /// Register a segment; a repeated way id replaces the older copy
    pub fn insert(&mut self, seg: Segment) {
        self.remove(seg.wid);
        if let (Some(head), Some(tail)) = (seg.head(), seg.tail()) {
            self.ends.entry(head).or_default().push(seg.wid);
            if tail != head {
                self.ends.entry(tail).or_default().push(seg.wid);
            }
        }
        self.segs.insert(seg.wid, seg);
    }

    fn remove(&mut self, wid: i64) -> Option<Segment> {
        let seg = self.segs.remove(&wid)?;
        for end in [seg.head(), seg.tail()].into_iter().flatten() {
            self.unlink(end, wid);
        }
        Some(seg)
    }

    fn unlink(&mut self, nid: i64, wid: i64) {
        if let Some(wids) = self.ends.get_mut(&nid) {
            wids.retain(|&w| w != wid);
            if wids.is_empty() {
                self.ends.remove(&nid);
            }
        }
    }

    /// Whether `first` ending at `nid` continues into `second` starting there
    fn can_join(&self, first: i64, second: i64, nid: i64) -> bool {
        if first == second {
            return false;
        }
        let (Some(a), Some(b)) = (self.segs.get(&first), self.segs.get(&second)) else {
            return false;
        };
        if !a.joinable() || !b.joinable() || !a.same_style(b) {
            return false;
        }
        if a.tail() != Some(nid) || b.head() != Some(nid) {
            return false;
        }
        let n = a.nodes.len();
        match deflection(&a.nodes[n - 2], &a.nodes[n - 1], &b.nodes[1]) {
            Some(angle) => angle <= MAX_JOIN_ANGLE,
            None => false,
        }
    }

    /// First `(first, second)` pair joinable at `nid`
    fn find_pair(&self, nid: i64) -> Option<(i64, i64)> {
        let wids = self.ends.get(&nid)?;
        for &first in wids {
            for &second in wids {
                if self.can_join(first, second, nid) {
                    return Some((first, second));
                }
            }
        }
        None
    }

    /// Splice `second` onto the tail of `first`; `first` keeps its way id
    fn splice(&mut self, first: i64, second: i64) {
        let Some(absorbed) = self.remove(second) else {
            return;
        };
        let Some(old_tail) = self.segs.get(&first).and_then(Segment::tail) else {
            return;
        };
        self.unlink(old_tail, first);

        let Some(seg) = self.segs.get_mut(&first) else {
            return;
        };
        seg.nodes.extend_from_slice(&absorbed.nodes[1..]);
        seg.bounds = seg.bounds.union(&absorbed.bounds);
        let new_tail = seg.tail();
        let head = seg.head();

        if let Some(tail) = new_tail {
            if Some(tail) != head {
                self.ends.entry(tail).or_default().push(first);
            }
        }
    }

    /// Join every chain of continuing ways. Returns the number of splices.
    pub fn join(&mut self) -> usize {
        let mut nids: Vec<i64> = self.ends.keys().copied().collect();
        nids.sort_unstable();

        let mut joined = 0;
        for nid in nids {
            while let Some((first, second)) = self.find_pair(nid) {
                self.splice(first, second);
                joined += 1;
            }
        }
        joined
    }

    /// Mutable access to every segment's node list
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Vec<SegNode>> {
        self.segs.values_mut().map(|s| &mut s.nodes)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.segs.values()
    }

    pub fn clear(&mut self) {
        self.segs.clear();
        self.ends.clear();
    }
}
