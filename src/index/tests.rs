use super::*;
use crate::config::CACHE_SIZE;
use crate::storage::record::{NodeCoord, RecordType, WayInfo, NODE_COORD_SIZE};
use std::sync::Barrier;
use std::thread;
use tempfile::tempdir;

fn coord(nid: i64) -> NodeCoord {
    NodeCoord { nid, lat: 40.0, lon: -105.0 }
}

#[test]
fn test_hit_path_loads_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    let mut index = Index::create(&path, 1.0).unwrap();
    index.add_record(&coord(12345)).unwrap();
    index.close().unwrap();

    let index = Index::read_only(&path, 1, 1.0).unwrap();
    let h = index.get(0, RecordType::NodeCoord, 12345).unwrap().unwrap();
    assert_eq!(h.node_coord().unwrap().to_record(), coord(12345));
    index.put(h);
    assert_eq!(index.stats().loads, 1);

    let h = index.get(0, RecordType::NodeCoord, 12345).unwrap().unwrap();
    assert_eq!(h.node_coord().unwrap().nid(), 12345);
    index.put(h);

    let stats = index.stats();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_missing_record_is_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let mut index = Index::create(&path, 1.0).unwrap();
    index.add_record(&coord(12345)).unwrap();
    index.close().unwrap();

    let index = Index::read_only(&path, 1, 1.0).unwrap();
    // resident entry without the record
    assert!(index.get(0, RecordType::NodeCoord, 12399).unwrap().is_none());
    // absent entry
    assert!(index.get(0, RecordType::NodeCoord, 999_999).unwrap().is_none());
    assert!(index.get(0, RecordType::WayInfo, 12345).unwrap().is_none());
}

#[test]
fn test_eviction_writes_back_dirty_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    drop(Index::create(&path, 1.0).unwrap());

    let smem = NODE_COORD_SIZE as f64 / CACHE_SIZE as f64;
    let mut index = Index::append(&path, smem).unwrap();
    let high = index.config().high_watermark();
    assert_eq!(high, NODE_COORD_SIZE);

    for k in 0..100 {
        index.add_record(&coord(100 * k)).unwrap();
        assert!(index.memory() <= high, "memory {} after add {}", index.memory(), k);
    }
    assert!(index.stats().evictions > 0);
    index.close().unwrap();

    let store = Store::open(&path, Mode::ReadOnly).unwrap();
    assert_eq!(store.count(RecordType::NodeCoord).unwrap(), 100);
    for k in 0..100 {
        let blob = store.load(RecordType::NodeCoord, k).unwrap().unwrap();
        assert_eq!(blob, coord(100 * k).encode());
    }
}

#[test]
fn test_append_extends_persisted_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    let mut index = Index::create(&path, 1.0).unwrap();
    index.add_record(&coord(500)).unwrap();
    index.close().unwrap();

    let mut index = Index::append(&path, 1.0).unwrap();
    index.add_record(&coord(501)).unwrap();
    index.close().unwrap();

    let index = Index::read_only(&path, 1, 1.0).unwrap();
    assert!(index.get(0, RecordType::NodeCoord, 500).unwrap().is_some());
    assert!(index.get(0, RecordType::NodeCoord, 501).unwrap().is_some());
}

#[test]
fn test_concurrent_get_loads_exactly_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    let info = WayInfo { wid: 777, class: 5, flags: 0, layer: 0, name: Some("Main".into()) };
    let mut index = Index::create(&path, 1.0).unwrap();
    index.add_record(&info).unwrap();
    index.close().unwrap();

    let index = Index::read_only(&path, 4, 1.0).unwrap();
    let barrier = Barrier::new(2);

    thread::scope(|s| {
        let workers: Vec<_> = (0..2)
            .map(|tid| {
                let index = &index;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    let h = index.get(tid, RecordType::WayInfo, 777).unwrap().unwrap();
                    let wid = h.way_info().unwrap().wid();
                    index.put(h);
                    wid
                })
            })
            .collect();
        for worker in workers {
            assert_eq!(worker.join().unwrap(), 777);
        }
    });

    assert_eq!(index.stats().loads, 1);
    assert_eq!(index.len(), 1);
}

#[test]
fn test_concurrent_churn_under_eviction() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    const KEYS: i64 = 8;
    const THREADS: usize = 8;
    const ROUNDS: i64 = 2_000;

    let mut index = Index::create(&path, 1.0).unwrap();
    for k in 0..KEYS {
        index.add_record(&coord(100 * k + 1)).unwrap();
    }
    index.close().unwrap();

    // room for three and a half single-record entries
    let smem = 3.5 * NODE_COORD_SIZE as f64 / CACHE_SIZE as f64;
    let index = Index::read_only(&path, THREADS, smem).unwrap();
    let barrier = Barrier::new(THREADS);

    thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|tid| {
                let index = &index;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    let mut errors = Vec::new();
                    for round in 0..ROUNDS {
                        let nid = 100 * ((round * 7 + tid as i64 * 3) % KEYS) + 1;
                        match index.get(tid, RecordType::NodeCoord, nid) {
                            Ok(Some(h)) => {
                                assert_eq!(h.node_coord().unwrap().nid(), nid);
                                index.put(h);
                            }
                            Ok(None) => errors.push(format!("node {} not found", nid)),
                            Err(e) => errors.push(e.to_string()),
                        }
                    }
                    errors
                })
            })
            .collect();
        for worker in workers {
            let errors = worker.join().unwrap();
            assert!(errors.is_empty(), "get failed: {:?}", errors);
        }
    });

    let stats = index.stats();
    assert!(stats.evictions > 0);
    // every load ends in exactly one insertion
    assert_eq!(stats.loads, stats.inserts);
    assert_eq!((stats.inserts - stats.evictions) as usize, index.len());
    assert!(index.len() <= KEYS as usize);
}

#[test]
fn test_many_readers_share_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    let mut index = Index::create(&path, 1.0).unwrap();
    for nid in 0..1000 {
        index.add_record(&coord(nid)).unwrap();
    }
    index.close().unwrap();

    let index = Index::read_only(&path, 4, 1.0).unwrap();
    thread::scope(|s| {
        for tid in 0..4 {
            let index = &index;
            s.spawn(move || {
                for nid in (0..1000).rev() {
                    let h = index.get(tid, RecordType::NodeCoord, nid).unwrap().unwrap();
                    assert_eq!(h.node_coord().unwrap().nid(), nid);
                    index.put(h);
                }
            });
        }
    });

    assert_eq!(index.stats().loads, 10);
    assert_eq!(index.len(), 10);
}

#[test]
fn test_outstanding_handle_blocks_eviction() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    let mut index = Index::create(&path, 1.0).unwrap();
    for k in 0..10 {
        index.add_record(&coord(100 * k)).unwrap();
    }
    index.close().unwrap();

    let smem = NODE_COORD_SIZE as f64 / CACHE_SIZE as f64;
    let index = Index::read_only(&path, 1, smem).unwrap();
    let pinned = index.get(0, RecordType::NodeCoord, 0).unwrap().unwrap();
    for k in 1..10 {
        let h = index.get(0, RecordType::NodeCoord, 100 * k).unwrap().unwrap();
        index.put(h);
    }
    assert!(index.is_resident(RecordType::NodeCoord, 0));
    assert_eq!(pinned.node_coord().unwrap().nid(), 0);
    index.put(pinned);
}

#[test]
fn test_lru_order_follows_recency() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    let mut index = Index::create(&path, 1.0).unwrap();
    for k in 0..3 {
        index.add_record(&coord(100 * k)).unwrap();
    }
    index.close().unwrap();

    let index = Index::read_only(&path, 1, 1.0).unwrap();
    for k in [0, 1, 2, 0] {
        let h = index.get(0, RecordType::NodeCoord, 100 * k).unwrap().unwrap();
        index.put(h);
    }
    let majors: Vec<i64> = index.lru_keys().iter().map(|key| key.major).collect();
    assert_eq!(majors, vec![1, 2, 0]);
}

#[test]
fn test_tile_refs_through_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    drop(Index::create(&path, 1.0).unwrap());

    let mut index = Index::append(&path, 1.0).unwrap();
    index.add_tile(RecordType::WayTile9, 42, 501).unwrap();
    {
        let h = index.get(0, RecordType::WayTile9, 42).unwrap().unwrap();
        let refs = h.id_list().unwrap();
        assert_eq!(refs.id(), 42);
        assert_eq!(refs.count(), 1);
        assert_eq!(refs.to_vec(), vec![501]);
    }
    index.add_tile(RecordType::WayTile9, 42, 502).unwrap();
    index.add_tile(RecordType::WayTile9, 42, 503).unwrap();
    index.close().unwrap();

    let store = Store::open(&path, Mode::ReadOnly).unwrap();
    let blob = store.load(RecordType::WayTile9, 42).unwrap().unwrap();
    let mut expected = crate::storage::record::tile_refs_header(RecordType::WayTile9, 42).to_vec();
    expected[4..8].copy_from_slice(&3u32.to_le_bytes());
    for id in [501i64, 502, 503] {
        expected.extend_from_slice(&id.to_le_bytes());
    }
    assert_eq!(blob, expected);
}

#[test]
fn test_changeset_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");

    let mut index = Index::create(&path, 1.0).unwrap();
    assert_eq!(index.changeset().unwrap(), 0);
    index.set_changeset(118_000_123).unwrap();
    index.close().unwrap();

    let index = Index::read_only(&path, 1, 1.0).unwrap();
    assert_eq!(index.changeset().unwrap(), 118_000_123);
}

#[test]
fn test_drop_flushes_dirty_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    {
        let mut index = Index::create(&path, 1.0).unwrap();
        index.add_record(&coord(7)).unwrap();
    }
    let store = Store::open(&path, Mode::ReadOnly).unwrap();
    assert_eq!(store.count(RecordType::NodeCoord).unwrap(), 1);
}

#[test]
fn test_protocol_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    drop(Index::create(&path, 1.0).unwrap());

    let mut index = Index::read_only(&path, 2, 1.0).unwrap();
    assert!(matches!(index.add_record(&coord(1)), Err(OsmdbError::Protocol(_))));
    assert!(matches!(index.set_changeset(1), Err(OsmdbError::Protocol(_))));
    assert!(matches!(
        index.get(2, RecordType::NodeCoord, 1),
        Err(OsmdbError::Protocol(_))
    ));
    drop(index);

    let mut index = Index::append(&path, 1.0).unwrap();
    assert!(index.add(RecordType::NodeTile12, 5, &[0; 16]).is_err());
    assert!(index.add_tile(RecordType::WayInfo, 5, 1).is_err());

    assert!(Index::open(&path, IndexConfig::new(Mode::Append, 4, 1.0)).is_err());
}
