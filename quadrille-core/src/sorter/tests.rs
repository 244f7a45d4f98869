use std::sync::Arc;

use crate::error::Error;
use crate::grid::GridExtent;
use crate::pbf::proto::{DenseNodes, Node, PrimitiveBlock, PrimitiveGroup, Relation, Way};
use crate::structures::MultiBlock;

use super::node_worker::NodeWorker;
use super::way_worker::WayWorker;
use super::{block_kind, Kind, Sorter, Worker};

/// Raw 1e-7-degree coordinate for a whole number of degrees.
fn raw(degrees: f64) -> i64 {
    (degrees * 1e7) as i64
}

fn plain_node_block(nodes: &[(i64, i64, i64)]) -> PrimitiveBlock {
    let nodes = nodes
        .iter()
        .map(|&(id, lon, lat)| Node { id, lat, lon })
        .collect();
    PrimitiveBlock {
        primitivegroup: vec![PrimitiveGroup {
            nodes,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn dense_node_block(nodes: &[(i64, i64, i64)]) -> PrimitiveBlock {
    let mut id = Vec::new();
    let mut lon = Vec::new();
    let mut lat = Vec::new();
    let (mut prev_id, mut prev_lon, mut prev_lat) = (0i64, 0i64, 0i64);
    for &(node_id, node_lon, node_lat) in nodes {
        id.push(node_id - prev_id);
        lon.push(node_lon - prev_lon);
        lat.push(node_lat - prev_lat);
        prev_id = node_id;
        prev_lon = node_lon;
        prev_lat = node_lat;
    }
    PrimitiveBlock {
        primitivegroup: vec![PrimitiveGroup {
            dense: Some(DenseNodes { id, lat, lon }),
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn way_block(ways: &[(i64, &[i64])]) -> PrimitiveBlock {
    let ways = ways
        .iter()
        .map(|&(id, refs)| {
            let mut deltas = Vec::with_capacity(refs.len());
            let mut prev = 0i64;
            for &node in refs {
                deltas.push(node - prev);
                prev = node;
            }
            Way { id, refs: deltas }
        })
        .collect();
    PrimitiveBlock {
        primitivegroup: vec![PrimitiveGroup {
            ways,
            ..Default::default()
        }],
        ..Default::default()
    }
}

fn relation_block(ids: &[i64]) -> PrimitiveBlock {
    PrimitiveBlock {
        primitivegroup: vec![PrimitiveGroup {
            relations: ids.iter().map(|&id| Relation { id }).collect(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn test_block_kind_classification() {
    assert_eq!(
        block_kind(&plain_node_block(&[(1, 0, 0)])).unwrap(),
        Kind::Node
    );
    assert_eq!(block_kind(&way_block(&[(1, &[2, 3])])).unwrap(), Kind::Way);
    assert_eq!(block_kind(&relation_block(&[1])).unwrap(), Kind::Relation);
    // An empty block classifies as relation and is dropped downstream.
    assert_eq!(
        block_kind(&PrimitiveBlock::default()).unwrap(),
        Kind::Relation
    );

    let mut mixed = plain_node_block(&[(1, 0, 0)]);
    mixed.primitivegroup[0].ways.push(Way {
        id: 7,
        refs: vec![1],
    });
    assert!(matches!(
        block_kind(&mixed),
        Err(Error::MixedPrimitiveBlock { .. })
    ));
}

#[test]
fn test_node_worker_projects_and_filters() {
    let mut worker = NodeWorker::new(GridExtent::world_mercator());

    let block = dense_node_block(&[
        (1, raw(-100.0), 0),
        (2, raw(-10.0), 0),
        (3, raw(10.0), raw(89.0)), // polar, dropped
        (4, raw(100.0), 0),
    ]);
    worker.process(&block);

    let result = worker.take_result();
    assert_eq!(result.index.lookup(1), 1 << 8);
    assert_eq!(result.index.lookup(2), 1 << 9);
    assert_eq!(result.index.lookup(3), 0);
    assert_eq!(result.index.lookup(4), 1 << 11);
    assert!(result.extra_nodes.is_empty());
}

#[test]
fn test_way_worker_unions_masks_and_records_spillover() {
    let mut nodes = MultiBlock::new();
    nodes.append(10, 0x0001);
    nodes.append(11, 0x0002);
    nodes.append(12, 0x0001);

    let mut worker = WayWorker::new(Arc::new(nodes));
    worker.process(&way_block(&[(100, &[10, 11, 12])]));

    let result = worker.take_result();
    assert_eq!(result.index.lookup(100), 0x0003);
    assert_eq!(result.extra_nodes.get(&10), Some(&0x0002));
    assert_eq!(result.extra_nodes.get(&11), Some(&0x0001));
    assert_eq!(result.extra_nodes.get(&12), Some(&0x0002));
    assert_eq!(result.extra_nodes.len(), 3);
}

#[test]
fn test_way_worker_ignores_unknown_refs() {
    let mut nodes = MultiBlock::new();
    nodes.append(10, 0x0004);

    let mut worker = WayWorker::new(Arc::new(nodes));
    worker.process(&way_block(&[(100, &[10, 999])]));

    let result = worker.take_result();
    assert_eq!(result.index.lookup(100), 0x0004);
    // The unknown node's empty mask differs from the union, so it shows up
    // as an extra node for every cell the way touches.
    assert_eq!(result.extra_nodes.get(&999), Some(&0x0004));
}

/// The reference computation for the end-to-end scenario: same blocks, no
/// concurrency.
fn reference_masks(
    nodes: &[(i64, i64, i64)],
    ways: &[(i64, &[i64])],
) -> (MultiBlock, MultiBlock) {
    let extent = GridExtent::world_mercator();
    let mut node_index = MultiBlock::new();
    for &(id, lon, lat) in nodes {
        if let Some(mask) = extent.cell_mask(lon, lat) {
            node_index.append(id, mask);
        }
    }
    let mut way_index = MultiBlock::new();
    for &(id, refs) in ways {
        let mask = refs.iter().fold(0u16, |acc, &n| acc | node_index.lookup(n));
        way_index.append(id, mask);
    }
    (node_index, way_index)
}

#[test]
fn test_sorter_phases_match_reference() {
    let nodes: Vec<(i64, i64, i64)> = vec![
        (1, raw(-100.0), 0),
        (2, raw(-10.0), 0),
        (3, raw(10.0), 0),
        (4, raw(100.0), 0),
    ];
    let ways: Vec<(i64, &[i64])> = vec![(100, &[1, 2]), (101, &[2, 3]), (102, &[3, 4])];

    let mut sorter = Sorter::new(2, GridExtent::world_mercator());
    sorter.append(dense_node_block(&nodes[..2])).unwrap();
    sorter.append(plain_node_block(&nodes[2..])).unwrap();
    sorter.append(way_block(&ways[..2])).unwrap();
    sorter.append(way_block(&ways[2..])).unwrap();
    let index = sorter.finish();

    // The way masks depend on every node being in the global index, so they
    // also establish that the node phase completed before the way phase ran.
    let (ref_nodes, ref_ways) = reference_masks(&nodes, &ways);
    for &(id, _, _) in &nodes {
        assert_eq!(index.nodes.lookup(id), ref_nodes.lookup(id), "node {}", id);
    }
    for &(id, _) in &ways {
        assert_eq!(index.ways.lookup(id), ref_ways.lookup(id), "way {}", id);
    }

    assert_eq!(index.ways.lookup(100), 0x0300);
    assert_eq!(index.ways.lookup(101), 0x0600);
    assert_eq!(index.ways.lookup(102), 0x0c00);

    assert_eq!(index.extra_nodes.get(&1), Some(&0x0200));
    assert_eq!(index.extra_nodes.get(&2), Some(&0x0500));
    assert_eq!(index.extra_nodes.get(&3), Some(&0x0a00));
    assert_eq!(index.extra_nodes.get(&4), Some(&0x0400));
}

#[test]
fn test_sorter_spreads_node_blocks_over_workers() {
    // More blocks than workers, each holding a disjoint ascending id range,
    // so the collect-and-merge path gets real work regardless of how the
    // dispatch interleaves.
    let mut sorter = Sorter::new(3, GridExtent::world_mercator());
    for chunk in 0..24i64 {
        let base = chunk * 1_000;
        let nodes: Vec<(i64, i64, i64)> =
            (0..100).map(|i| (base + i, raw(-10.0), 0)).collect();
        sorter.append(dense_node_block(&nodes)).unwrap();
    }
    let index = sorter.finish();

    for chunk in 0..24i64 {
        let base = chunk * 1_000;
        for i in 0..100 {
            assert_eq!(index.nodes.lookup(base + i), 1 << 9);
        }
        assert_eq!(index.nodes.lookup(base + 100), 0);
    }
}

#[test]
fn test_kind_order_is_enforced() {
    let mut sorter = Sorter::new(1, GridExtent::world_mercator());
    sorter.append(way_block(&[(100, &[1])])).unwrap();
    let err = sorter.append(plain_node_block(&[(1, 0, 0)]));
    assert!(matches!(
        err,
        Err(Error::KindOrder {
            got: Kind::Node,
            current: Kind::Way,
        })
    ));
}

#[test]
fn test_relation_blocks_are_dropped() {
    let mut sorter = Sorter::new(1, GridExtent::world_mercator());
    sorter
        .append(plain_node_block(&[(1, raw(-10.0), 0)]))
        .unwrap();
    sorter.append(way_block(&[(100, &[1])])).unwrap();
    sorter.append(relation_block(&[500])).unwrap();
    sorter.append(relation_block(&[501])).unwrap();
    let index = sorter.finish();

    // The relation transition collected the way phase; relations themselves
    // leave no trace.
    assert_eq!(index.nodes.lookup(1), 1 << 9);
    assert_eq!(index.ways.lookup(100), 1 << 9);
    assert_eq!(index.ways.lookup(500), 0);
}

#[test]
fn test_finish_without_way_blocks() {
    let mut sorter = Sorter::new(2, GridExtent::world_mercator());
    sorter
        .append(plain_node_block(&[(1, raw(-10.0), 0), (2, raw(10.0), 0)]))
        .unwrap();
    let index = sorter.finish();

    assert_eq!(index.nodes.lookup(1), 1 << 9);
    assert_eq!(index.nodes.lookup(2), 1 << 10);
    assert_eq!(index.ways.num_shards(), 0);
    assert!(index.extra_nodes.is_empty());
}
