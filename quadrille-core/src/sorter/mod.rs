//! Concurrent three-phase sorter: nodes, then ways, then relations
//!
//! One worker pool per phase. The dispatch protocol is a two-step hand-off:
//! each worker advertises its private request channel on a shared rendezvous
//! queue, and [`Sorter::append`] hands the next block to whichever worker
//! advertised first. Workers answer collect requests only between blocks, so
//! draining every worker at a kind transition is a full barrier: the global
//! index of the finished phase is complete and frozen before any worker of
//! the next phase starts, and way workers can read it without locks.

mod node_worker;
mod way_worker;

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender};
use log::{debug, info};
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::grid::GridExtent;
use crate::pbf::primitive_counts;
use crate::pbf::proto::PrimitiveBlock;
use crate::structures::MultiBlock;

use node_worker::NodeWorker;
use way_worker::WayWorker;

/// Primitive kinds, in the order they appear in a planet file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Kind {
    Node,
    Way,
    Relation,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Node => "node",
            Kind::Way => "way",
            Kind::Relation => "relation",
        };
        f.write_str(name)
    }
}

/// Kind of a single-kind primitive block; an error when kinds are mixed.
/// An empty block classifies as [`Kind::Relation`] and gets dropped.
pub fn block_kind(block: &PrimitiveBlock) -> Result<Kind> {
    let (nodes, ways, relations) = primitive_counts(block);
    match (nodes, ways, relations) {
        (n, 0, 0) if n > 0 => Ok(Kind::Node),
        (0, w, 0) if w > 0 => Ok(Kind::Way),
        (0, 0, _) => Ok(Kind::Relation),
        _ => Err(Error::MixedPrimitiveBlock {
            nodes,
            ways,
            relations,
        }),
    }
}

/// Everything a worker hands back at collect time.
pub(crate) struct WorkerResult {
    pub index: MultiBlock,
    pub extra_nodes: FxHashMap<i64, u16>,
}

/// Phase-specific behavior behind the shared worker loop.
pub(crate) trait Worker {
    fn process(&mut self, block: &PrimitiveBlock);
    fn take_result(&mut self) -> WorkerResult;
}

struct WorkerHandle {
    quit_tx: Sender<()>,
    collect_tx: Sender<Sender<WorkerResult>>,
    thread: JoinHandle<()>,
}

/// Final product of the first pass: per-id grid masks for nodes and ways,
/// plus the extra cells each node must be emitted into because of ways
/// crossing cell boundaries.
pub struct GridIndex {
    pub nodes: Arc<MultiBlock>,
    pub ways: MultiBlock,
    pub extra_nodes: FxHashMap<i64, u16>,
}

/// Distributes primitive blocks over per-phase worker pools and merges their
/// partial indexes into global ones at each kind transition.
pub struct Sorter {
    work_tx: Sender<Sender<PrimitiveBlock>>,
    work_rx: Receiver<Sender<PrimitiveBlock>>,
    workers: Vec<WorkerHandle>,
    last_kind: Kind,
    num_workers: usize,
    extent: GridExtent,
    nodes: Arc<MultiBlock>,
    ways: MultiBlock,
    extra_nodes: FxHashMap<i64, u16>,
}

impl Sorter {
    /// Construct a sorter and start its node-phase workers.
    pub fn new(num_workers: usize, extent: GridExtent) -> Self {
        let (work_tx, work_rx) = bounded(0);
        let mut sorter = Sorter {
            work_tx,
            work_rx,
            workers: Vec::new(),
            last_kind: Kind::Node,
            num_workers: num_workers.max(1),
            extent,
            nodes: Arc::new(MultiBlock::new()),
            ways: MultiBlock::new(),
            extra_nodes: FxHashMap::default(),
        };
        sorter.start_node_workers();
        sorter
    }

    /// Route a single-kind block to one idle worker of the current phase.
    ///
    /// A block of a later kind first closes out the running phase: all
    /// workers are collected and merged into the global index, and the next
    /// phase's pool is started. Blocks must arrive in kind order; relation
    /// blocks pass the ordering check and are dropped.
    pub fn append(&mut self, block: PrimitiveBlock) -> Result<()> {
        let kind = block_kind(&block)?;

        if kind < self.last_kind {
            return Err(Error::KindOrder {
                got: kind,
                current: self.last_kind,
            });
        }
        if kind > self.last_kind {
            self.advance_phase(kind);
        }

        if kind == Kind::Relation {
            // Relation sorting is not implemented; the ordering check above
            // is all that happens for these blocks.
            return Ok(());
        }

        let request = self.work_rx.recv().map_err(|_| Error::WorkerLost)?;
        request.send(block).map_err(|_| Error::WorkerLost)?;
        Ok(())
    }

    /// Collect the still-running phase and return the finished indexes.
    pub fn finish(mut self) -> GridIndex {
        match self.last_kind {
            Kind::Node => {
                let (nodes, _) = self.collect();
                info!("node index collected: {} shards", nodes.num_shards());
                self.nodes = Arc::new(nodes);
            }
            Kind::Way => {
                let (ways, extra_nodes) = self.collect();
                info!(
                    "way index collected: {} shards, {} extra nodes",
                    ways.num_shards(),
                    extra_nodes.len()
                );
                self.ways = ways;
                self.extra_nodes = extra_nodes;
            }
            Kind::Relation => {}
        }

        GridIndex {
            nodes: Arc::clone(&self.nodes),
            ways: std::mem::take(&mut self.ways),
            extra_nodes: std::mem::take(&mut self.extra_nodes),
        }
    }

    fn advance_phase(&mut self, kind: Kind) {
        if self.last_kind == Kind::Node {
            let (nodes, _) = self.collect();
            info!("node index collected: {} shards", nodes.num_shards());
            self.nodes = Arc::new(nodes);
        }
        if kind == Kind::Way {
            self.start_way_workers();
        }
        if self.last_kind == Kind::Way {
            let (ways, extra_nodes) = self.collect();
            info!(
                "way index collected: {} shards, {} extra nodes",
                ways.num_shards(),
                extra_nodes.len()
            );
            self.ways = ways;
            self.extra_nodes = extra_nodes;
        }
        self.last_kind = kind;
    }

    /// Drain every worker of the current phase: request its partial result,
    /// merge it, and shut the worker down. Serves as the phase barrier.
    fn collect(&mut self) -> (MultiBlock, FxHashMap<i64, u16>) {
        let mut merged = MultiBlock::new();
        let mut extra = FxHashMap::default();

        for handle in self.workers.drain(..) {
            let (reply_tx, reply_rx) = bounded(0);
            let result = handle
                .collect_tx
                .send(reply_tx)
                .ok()
                .and_then(|_| reply_rx.recv().ok());
            let _ = handle.quit_tx.send(());

            if let Some(mut result) = result {
                debug!(
                    "worker handed back {} shards, {} extra nodes",
                    result.index.num_shards(),
                    result.extra_nodes.len()
                );
                merged.merge(&mut result.index);
                for (id, mask) in result.extra_nodes {
                    *extra.entry(id).or_insert(0) |= mask;
                }
            }

            // A worker that dropped its channels panicked; re-raise here.
            if let Err(panic) = handle.thread.join() {
                std::panic::resume_unwind(panic);
            }
        }

        (merged, extra)
    }

    fn start_node_workers(&mut self) {
        let extent = self.extent;
        self.start_workers(move |_| NodeWorker::new(extent));
    }

    fn start_way_workers(&mut self) {
        let nodes = Arc::clone(&self.nodes);
        self.start_workers(move |_| WayWorker::new(Arc::clone(&nodes)));
    }

    fn start_workers<W, F>(&mut self, make: F)
    where
        W: Worker + Send + 'static,
        F: Fn(usize) -> W,
    {
        for i in 0..self.num_workers {
            let (quit_tx, quit_rx) = bounded(0);
            let (collect_tx, collect_rx) = bounded::<Sender<WorkerResult>>(0);
            let work_tx = self.work_tx.clone();
            let worker = make(i);
            let thread = thread::spawn(move || worker_loop(worker, work_tx, collect_rx, quit_rx));
            self.workers.push(WorkerHandle {
                quit_tx,
                collect_tx,
                thread,
            });
        }
    }

    fn shutdown(&mut self) {
        for handle in self.workers.drain(..) {
            let _ = handle.quit_tx.send(());
            let _ = handle.thread.join();
        }
    }
}

impl Drop for Sorter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The shared worker loop: advertise availability, then wait for the
/// dispatched block. Collect requests are only served between blocks, which
/// is what makes collect a barrier.
fn worker_loop<W: Worker>(
    mut worker: W,
    work_tx: Sender<Sender<PrimitiveBlock>>,
    collect_rx: Receiver<Sender<WorkerResult>>,
    quit_rx: Receiver<()>,
) {
    let (request_tx, request_rx) = bounded::<PrimitiveBlock>(0);

    loop {
        select! {
            send(work_tx, request_tx.clone()) -> offered => {
                if offered.is_err() {
                    return;
                }
                // The dispatcher took our request channel; the block it is
                // about to send must be received even if collect or quit are
                // also pending.
                select! {
                    recv(request_rx) -> block => match block {
                        Ok(block) => worker.process(&block),
                        Err(_) => return,
                    },
                    recv(collect_rx) -> request => match request {
                        Ok(reply) => {
                            let _ = reply.send(worker.take_result());
                        }
                        Err(_) => return,
                    },
                    recv(quit_rx) -> _ => return,
                }
            }
            recv(collect_rx) -> request => match request {
                Ok(reply) => {
                    let _ = reply.send(worker.take_result());
                }
                Err(_) => return,
            },
            recv(quit_rx) -> _ => return,
        }
    }
}
