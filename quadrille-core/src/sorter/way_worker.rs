//! Way-phase worker: unions member node masks, tracks boundary spill-over

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::pbf::proto::PrimitiveBlock;
use crate::structures::MultiBlock;

use super::{Worker, WorkerResult};

/// Consumes WAY primitive blocks against the frozen global node index.
///
/// A way's mask is the union of its member nodes' masks. Whenever a member's
/// own mask is narrower than that union, the way crosses into cells the
/// node's geometry alone did not put it in; those cells are recorded in
/// `extra_nodes` so the second pass can emit the node there too.
pub(crate) struct WayWorker {
    ways: MultiBlock,
    extra_nodes: FxHashMap<i64, u16>,
    nodes: Arc<MultiBlock>,
    refs: Vec<i64>,
    masks: Vec<u16>,
}

impl WayWorker {
    pub(crate) fn new(nodes: Arc<MultiBlock>) -> Self {
        WayWorker {
            ways: MultiBlock::new(),
            extra_nodes: FxHashMap::default(),
            nodes,
            refs: Vec::new(),
            masks: Vec::new(),
        }
    }

    fn put_way(&mut self, id: i64) {
        let mut mask = 0u16;
        self.masks.clear();
        for &node in &self.refs {
            let node_mask = self.nodes.lookup(node);
            self.masks.push(node_mask);
            mask |= node_mask;
        }

        self.ways.append(id, mask);

        for (&node, &node_mask) in self.refs.iter().zip(&self.masks) {
            if node_mask != mask {
                *self.extra_nodes.entry(node).or_insert(0) |= mask & !node_mask;
            }
        }
    }
}

impl Worker for WayWorker {
    fn process(&mut self, block: &PrimitiveBlock) {
        for group in &block.primitivegroup {
            for way in &group.ways {
                // Member refs are delta-coded like dense node ids.
                self.refs.clear();
                let mut node_id = 0i64;
                for &delta in &way.refs {
                    node_id += delta;
                    self.refs.push(node_id);
                }
                self.put_way(way.id);
            }
        }
    }

    fn take_result(&mut self) -> WorkerResult {
        WorkerResult {
            index: std::mem::take(&mut self.ways),
            extra_nodes: std::mem::take(&mut self.extra_nodes),
        }
    }
}
