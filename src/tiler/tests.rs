use super::*;
use crate::storage::record::{NodeCoord, NodeInfo, RelInfo, RelMembers, WayInfo, WayNds, WayRange};
use crate::tile::{parse, TileHeader, TileNode, TileRel, TileVisitor, TileWay};
use std::path::Path;
use tempfile::tempdir;

const ZOOM: i32 = 15;
const X: i32 = 6760;
const Y: i32 = 12416;

fn frame() -> TileFrame {
    TileFrame::new(ZOOM, X, Y).unwrap()
}

#[derive(Default)]
struct Collected {
    header: Option<TileHeader>,
    rels: Vec<(Option<String>, usize)>,
    members: Vec<(bool, Vec<(i16, i16)>)>,
    ways: Vec<(Option<String>, Vec<(i16, i16)>)>,
    nodes: Vec<(i32, Option<String>)>,
}

impl TileVisitor for Collected {
    fn tile(&mut self, header: &TileHeader) -> crate::error::Result<()> {
        self.header = Some(*header);
        Ok(())
    }
    fn rel(&mut self, rel: &TileRel<'_>) -> crate::error::Result<()> {
        self.rels.push((rel.name.map(String::from), rel.count));
        Ok(())
    }
    fn member(&mut self, way: &TileWay<'_>) -> crate::error::Result<()> {
        self.members.push((way.inner, way.points().collect()));
        Ok(())
    }
    fn way(&mut self, way: &TileWay<'_>) -> crate::error::Result<()> {
        self.ways.push((way.name.map(String::from), way.points().collect()));
        Ok(())
    }
    fn node(&mut self, node: &TileNode<'_>) -> crate::error::Result<()> {
        self.nodes.push((node.class, node.name.map(String::from)));
        Ok(())
    }
}

/// Index builder placing nodes by tile-normalized position
struct Fixture {
    index: Index,
    frame: TileFrame,
    tile: i64,
}

impl Fixture {
    fn create(path: &Path) -> Self {
        let mut index = Index::create(path, 1.0).unwrap();
        index.set_changeset(4242).unwrap();
        let frame = frame();
        Fixture { index, frame, tile: tile_id(ZOOM, X, Y) }
    }

    fn node(&mut self, nid: i64, u: f64, v: f64) -> (f64, f64) {
        let (lat, lon) = self.frame.latlon(u, v);
        self.index.add_record(&NodeCoord { nid, lat, lon }).unwrap();
        (lat, lon)
    }

    fn poi(&mut self, nid: i64, class: i32, name: Option<&str>, u: f64, v: f64) {
        self.node(nid, u, v);
        let info = NodeInfo { nid, class, flags: 0, ele: 1600.4, name: name.map(String::from) };
        self.index.add_record(&info).unwrap();
        self.index.add_tile(RecordType::NodeTile15, self.tile, nid).unwrap();
    }

    fn way(&mut self, wid: i64, name: Option<&str>, nds: &[i64], listed: bool) {
        let info = WayInfo { wid, class: 10, flags: 0, layer: 0, name: name.map(String::from) };
        self.index.add_record(&info).unwrap();
        self.index.add_record(&WayNds { wid, nds: nds.to_vec() }).unwrap();
        self.index.add_record(&WayRange { wid, bounds: self.frame.bounds() }).unwrap();
        if listed {
            self.index.add_tile(RecordType::WayTile15, self.tile, wid).unwrap();
        }
    }

    fn finish(self) {
        self.index.close().unwrap();
    }
}

fn render(path: &Path) -> (Vec<u8>, Collected) {
    let index = Index::read_only(path, 1, 1.0).unwrap();
    let mut tiler = Tiler::new(&index, 0);
    let tile = tiler.tile(ZOOM, X, Y).unwrap();
    let mut collected = Collected::default();
    parse(&tile, &mut collected).unwrap();
    (tile, collected)
}

#[test]
fn test_continuing_ways_are_joined() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut fx = Fixture::create(&path);

    // way 1 heads east, way 2 continues from node 3 with a 10 degree turn
    let turn = 10f64.to_radians();
    let mut expected = Vec::new();
    expected.push(fx.node(1, 0.2, 0.5));
    expected.push(fx.node(2, 0.3, 0.5));
    expected.push(fx.node(3, 0.4, 0.5));
    expected.push(fx.node(4, 0.4 + 0.1 * turn.cos(), 0.5 + 0.1 * turn.sin()));
    expected.push(fx.node(5, 0.4 + 0.2 * turn.cos(), 0.5 + 0.2 * turn.sin()));
    fx.way(1, Some("Pearl St"), &[1, 2, 3], true);
    fx.way(2, Some("Pearl St"), &[3, 4, 5], true);
    fx.finish();

    let (_, got) = render(&path);
    let header = got.header.unwrap();
    assert_eq!(header.changeset, 4242);
    assert_eq!(header.count_ways, 1);
    assert_eq!(got.ways.len(), 1);

    let f = frame();
    let points: Vec<(i16, i16)> = expected.iter().map(|&(lat, lon)| f.point(lat, lon)).collect();
    assert_eq!(got.ways[0], (Some("Pearl St".to_string()), points));
}

#[test]
fn test_differently_named_ways_stay_apart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut fx = Fixture::create(&path);
    fx.node(1, 0.2, 0.5);
    fx.node(2, 0.3, 0.5);
    fx.node(3, 0.4, 0.5);
    fx.way(1, Some("Pearl St"), &[1, 2], true);
    fx.way(2, Some("Walnut St"), &[2, 3], true);
    fx.finish();

    let (_, got) = render(&path);
    assert_eq!(got.ways.len(), 2);
}

#[test]
fn test_outside_run_is_clipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut fx = Fixture::create(&path);
    fx.node(1, 0.5, 0.5);
    fx.node(2, 0.3, -0.4);
    fx.node(3, 0.5, -0.6);
    fx.node(4, 0.7, -0.4);
    fx.node(5, 0.6, 0.5);
    fx.way(7, None, &[1, 2, 3, 4, 5], true);
    fx.finish();

    let (_, got) = render(&path);
    assert_eq!(got.ways.len(), 1);
    assert_eq!(got.ways[0].1.len(), 4);
}

#[test]
fn test_relation_members_and_centre() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut fx = Fixture::create(&path);

    for (nid, u, v) in [(11, 0.2, 0.2), (12, 0.8, 0.2), (13, 0.8, 0.8), (14, 0.2, 0.8)] {
        fx.node(nid, u, v);
    }
    fx.way(20, None, &[11, 12, 13], false);
    fx.way(21, None, &[13, 14, 11], true);
    fx.poi(30, 5, Some("Boulder Reservoir"), 0.5, 0.5);
    fx.poi(31, 6, Some("Boat ramp"), 0.3, 0.6);

    fx.index
        .add_record(&RelInfo {
            rid: 40,
            center_nid: 30,
            class: 77,
            flags: 0,
            rel_type: RelType::Multipolygon,
            name: None,
        })
        .unwrap();
    fx.index
        .add_record(&RelMembers {
            rid: 40,
            members: vec![Member { wid: 20, inner: false }, Member { wid: 21, inner: true }],
        })
        .unwrap();
    let tile = fx.tile;
    fx.index.add_tile(RecordType::RelTile15, tile, 40).unwrap();
    fx.finish();

    let (_, got) = render(&path);
    assert_eq!(got.rels, vec![(Some("Boulder Reservoir".to_string()), 2)]);
    assert_eq!(got.members.len(), 2);
    assert!(!got.members[0].0);
    assert!(got.members[1].0);
    // way 21 was emitted as a member only
    assert!(got.ways.is_empty());
    // the centre node is not repeated
    assert_eq!(got.nodes, vec![(6, Some("Boat ramp".to_string()))]);
}

#[test]
fn test_missing_references_are_skipped() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut fx = Fixture::create(&path);
    fx.node(1, 0.2, 0.5);
    fx.node(2, 0.3, 0.5);
    // node 3 has no coordinates
    fx.way(1, None, &[1, 3, 2], true);
    let tile = fx.tile;
    fx.index.add_tile(RecordType::WayTile15, tile, 999).unwrap();
    fx.index.add_tile(RecordType::NodeTile15, tile, 998).unwrap();
    fx.index.add_tile(RecordType::RelTile15, tile, 997).unwrap();
    fx.finish();

    let (_, got) = render(&path);
    let header = got.header.unwrap();
    assert_eq!((header.count_rels, header.count_ways, header.count_nodes), (0, 1, 0));
    assert_eq!(got.ways[0].1.len(), 2);
}

#[test]
fn test_empty_tile_and_bad_zoom() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    Fixture::create(&path).finish();

    let index = Index::read_only(&path, 1, 1.0).unwrap();
    let mut tiler = Tiler::new(&index, 0);
    assert!(matches!(tiler.tile(10, 0, 0), Err(OsmdbError::InvalidTile { .. })));
    assert!(matches!(tiler.tile(9, 512, 0), Err(OsmdbError::InvalidTile { .. })));

    // the tiler recovers and stays reusable
    let tile = tiler.tile(9, 105, 193).unwrap();
    let header = parse(&tile, &mut Collected::default()).unwrap();
    assert_eq!((header.count_rels, header.count_ways, header.count_nodes), (0, 0, 0));
    assert_eq!(header.changeset, 4242);
}
