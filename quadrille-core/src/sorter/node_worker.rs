//! Node-phase worker: projects each node and records its grid cell

use rustc_hash::FxHashMap;

use crate::grid::GridExtent;
use crate::pbf::proto::PrimitiveBlock;
use crate::structures::MultiBlock;

use super::{Worker, WorkerResult};

/// Consumes NODE primitive blocks into a private index. Node ids ascend
/// through the file and each block is handled by exactly one worker, so the
/// append-only ordering of [`MultiBlock`] holds per worker.
pub(crate) struct NodeWorker {
    nodes: MultiBlock,
    extent: GridExtent,
}

impl NodeWorker {
    pub(crate) fn new(extent: GridExtent) -> Self {
        NodeWorker {
            nodes: MultiBlock::new(),
            extent,
        }
    }

    fn put_node(&mut self, id: i64, lon: i64, lat: i64) {
        if let Some(mask) = self.extent.cell_mask(lon, lat) {
            self.nodes.append(id, mask);
        }
    }
}

impl Worker for NodeWorker {
    fn process(&mut self, block: &PrimitiveBlock) {
        for group in &block.primitivegroup {
            for node in &group.nodes {
                self.put_node(node.id, node.lon, node.lat);
            }

            if let Some(dense) = &group.dense {
                // Parallel delta arrays; the running sums restart per group.
                let mut id = 0i64;
                let mut lon = 0i64;
                let mut lat = 0i64;
                for ((&d_id, &d_lon), &d_lat) in dense.id.iter().zip(&dense.lon).zip(&dense.lat) {
                    id += d_id;
                    lon += d_lon;
                    lat += d_lat;
                    self.put_node(id, lon, lat);
                }
            }
        }
    }

    fn take_result(&mut self) -> WorkerResult {
        WorkerResult {
            index: std::mem::take(&mut self.nodes),
            extra_nodes: FxHashMap::default(),
        }
    }
}
