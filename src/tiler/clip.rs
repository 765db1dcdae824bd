//! Node reduction: min-dist sampling and the quadrant clip

use crate::tile::frame::{haversine, TileFrame};
use crate::tiler::segment::SegNode;

/// Side of the tile an outside node lies on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    Top,
    Left,
    Bottom,
    Right,
}

/// Minimum distance in meters between consecutive sampled nodes
pub fn min_dist(frame: &TileFrame) -> f64 {
    let scale = if frame.zoom == 15 { 8.0 / 32.0 } else { 8.0 / 2.0 };
    scale * frame.diagonal() / (2.0 * 256.0f64 * 256.0).sqrt()
}

/// Drop nodes closer than `min_dist` to the last kept node.
///
/// The first and the last node are always kept.
pub fn sample(nodes: &mut Vec<SegNode>, min_dist: f64) {
    let n = nodes.len();
    if n < 3 {
        return;
    }
    let last = nodes[n - 1];
    let mut kept = 1;
    for i in 1..n - 1 {
        let prev = nodes[kept - 1];
        let node = nodes[i];
        if haversine(prev.lat, prev.lon, node.lat, node.lon) >= min_dist {
            nodes[kept] = node;
            kept += 1;
        }
    }
    nodes[kept] = last;
    nodes.truncate(kept + 1);
}

/// Quadrant classifier of one tile
#[derive(Debug, Clone, Copy)]
pub struct Clipper {
    frame: TileFrame,
}

impl Clipper {
    pub fn new(frame: TileFrame) -> Self {
        Self { frame }
    }

    /// `None` inside the expanded tile, the side of the tile otherwise.
    ///
    /// The offset from the tile centre is compared with the directions of
    /// the top-left and top-right corners; the sign pair picks the side.
    pub fn quadrant(&self, lat: f64, lon: f64) -> Option<Quadrant> {
        if self.frame.contains_expanded(lat, lon) {
            return None;
        }
        let (u, v) = self.frame.uv(lat, lon);
        let (du, dv) = (u - 0.5, v - 0.5);
        // corner directions in tile space (v grows southwards)
        let tl = -du - dv;
        let tr = du - dv;
        Some(match (tl >= 0.0, tr >= 0.0) {
            (true, true) => Quadrant::Top,
            (true, false) => Quadrant::Left,
            (false, false) => Quadrant::Bottom,
            (false, true) => Quadrant::Right,
        })
    }

    /// Drop the inner nodes of every run of consecutive outside nodes that
    /// share a quadrant. Inside nodes break runs.
    ///
    /// An open way treats its first node as preceded by a node in the same
    /// quadrant, so a leading outside run loses its head. At the end, when the
    /// last two nodes share a quadrant, the last one is dropped instead of the
    /// one before it. A loop (first node id equal to the last) keeps its
    /// closing nodes.
    pub fn clip(&self, nodes: &mut Vec<SegNode>) {
        let n = nodes.len();
        if n < 2 {
            return;
        }
        let is_loop = nodes[0].nid == nodes[n - 1].nid;
        let quads: Vec<Option<Quadrant>> = nodes.iter().map(|p| self.quadrant(p.lat, p.lon)).collect();
        let mut keep = vec![true; n];

        // q0: last kept node, q1: current node, q2: next node
        let mut q0 = if is_loop { None } else { quads[0] };
        for i in 0..n - 1 {
            let (q1, q2) = (quads[i], quads[i + 1]);
            if i == n - 2 && !is_loop && q1.is_some() && q1 == q2 {
                keep[n - 1] = false;
                break;
            }
            if q1.is_some() && q0 == q1 && q1 == q2 {
                keep[i] = false;
                continue;
            }
            q0 = q1;
        }

        let mut idx = 0;
        nodes.retain(|_| {
            idx += 1;
            keep[idx - 1]
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> TileFrame {
        TileFrame::new(12, 845, 1552).unwrap()
    }

    fn at(frame: &TileFrame, nid: i64, u: f64, v: f64) -> SegNode {
        let (lat, lon) = frame.latlon(u, v);
        SegNode::new(nid, lat, lon)
    }

    fn nids(nodes: &[SegNode]) -> Vec<i64> {
        nodes.iter().map(|n| n.nid).collect()
    }

    #[test]
    fn test_quadrants() {
        let f = frame();
        let c = Clipper::new(f);
        let q = |u, v| {
            let (lat, lon) = f.latlon(u, v);
            c.quadrant(lat, lon)
        };
        assert_eq!(q(0.5, 0.5), None);
        assert_eq!(q(1.05, 0.5), None);
        assert_eq!(q(0.5, -0.5), Some(Quadrant::Top));
        assert_eq!(q(-0.5, 0.5), Some(Quadrant::Left));
        assert_eq!(q(0.5, 1.5), Some(Quadrant::Bottom));
        assert_eq!(q(1.5, 0.5), Some(Quadrant::Right));
    }

    #[test]
    fn test_run_above_top_edge_is_collapsed() {
        let f = frame();
        let mut nodes = vec![
            at(&f, 1, 0.5, 0.5),
            at(&f, 2, 0.3, -0.4),
            at(&f, 3, 0.5, -0.6),
            at(&f, 4, 0.7, -0.4),
            at(&f, 5, 0.6, 0.5),
        ];
        Clipper::new(f).clip(&mut nodes);
        assert_eq!(nids(&nodes), vec![1, 2, 4, 5]);
    }

    #[test]
    fn test_isolated_outside_node_is_kept() {
        let f = frame();
        let mut nodes = vec![
            at(&f, 1, 0.5, 0.5),
            at(&f, 2, 0.5, -0.5),
            at(&f, 3, 0.6, 0.5),
        ];
        Clipper::new(f).clip(&mut nodes);
        assert_eq!(nids(&nodes), vec![1, 2, 3]);
    }

    #[test]
    fn test_quadrant_change_and_inside_reset() {
        let f = frame();
        let mut nodes = vec![
            at(&f, 1, 0.5, -0.5),  // top
            at(&f, 2, 0.5, -0.6),  // top
            at(&f, 3, -0.5, 0.5),  // left
            at(&f, 4, -0.6, 0.5),  // left
            at(&f, 5, 0.5, 0.5),   // inside
            at(&f, 6, -0.6, 0.6),  // left
            at(&f, 7, -0.7, 0.6),  // left
            at(&f, 8, -0.8, 0.6),  // left
        ];
        Clipper::new(f).clip(&mut nodes);
        assert_eq!(nids(&nodes), vec![2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_leading_run_loses_its_head() {
        let f = frame();
        let mut nodes = vec![
            at(&f, 1, 0.4, -0.4),
            at(&f, 2, 0.5, -0.5),
            at(&f, 3, 0.6, -0.6),
            at(&f, 4, 0.5, 0.5),
        ];
        Clipper::new(f).clip(&mut nodes);
        assert_eq!(nids(&nodes), vec![3, 4]);
    }

    #[test]
    fn test_trailing_run_drops_last_node() {
        let f = frame();
        let mut nodes = vec![
            at(&f, 1, 0.5, 0.5),
            at(&f, 2, 0.4, -0.4),
            at(&f, 3, 0.5, -0.5),
            at(&f, 4, 0.6, -0.6),
        ];
        Clipper::new(f).clip(&mut nodes);
        assert_eq!(nids(&nodes), vec![1, 2, 3]);

        let mut nodes = vec![
            at(&f, 1, 0.5, 0.5),
            at(&f, 2, 0.4, -0.4),
            at(&f, 3, 0.5, -0.5),
            at(&f, 4, 0.6, -0.6),
            at(&f, 5, 0.7, -0.7),
        ];
        Clipper::new(f).clip(&mut nodes);
        assert_eq!(nids(&nodes), vec![1, 2, 4]);
    }

    #[test]
    fn test_loop_keeps_its_closing_nodes() {
        let f = frame();
        let ring = |closing: i64| {
            vec![
                at(&f, 1, 0.4, -0.4),
                at(&f, 2, 0.5, -0.5),
                at(&f, 3, 0.6, -0.4),
                at(&f, 4, 0.5, 0.5),
                at(&f, closing, 0.4, -0.4),
            ]
        };
        let clipper = Clipper::new(f);

        let mut closed = ring(1);
        clipper.clip(&mut closed);
        assert_eq!(nids(&closed), vec![1, 3, 4, 1]);

        // the same shape left open loses its leading outside run
        let mut open = ring(5);
        clipper.clip(&mut open);
        assert_eq!(nids(&open), vec![3, 4, 5]);
    }

    #[test]
    fn test_sample_keeps_endpoints() {
        let f = frame();
        let d = min_dist(&f);
        assert!(d > 0.0);

        let mut nodes: Vec<SegNode> = (0..10)
            .map(|i| at(&f, i, 0.1 + i as f64 * 0.0001, 0.5))
            .collect();
        sample(&mut nodes, d);
        assert_eq!(nids(&nodes), vec![0, 9]);

        let mut nodes: Vec<SegNode> = (0..5)
            .map(|i| at(&f, i, 0.1 + i as f64 * 0.2, 0.5))
            .collect();
        sample(&mut nodes, d);
        assert_eq!(nodes.len(), 5);
    }

    #[test]
    fn test_min_dist_scale() {
        let z12 = min_dist(&TileFrame::new(12, 845, 1552).unwrap());
        let z15 = min_dist(&TileFrame::new(15, 6760, 12416).unwrap());
        // eight times smaller tile, sixteen times smaller scale
        assert!(z15 < z12 / 100.0);
    }
}
