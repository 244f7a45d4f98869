//! Quadrille - first-pass grid classifier for OSM full-history planet files
//!
//! Streams a planet file once and assigns every node and way to cells of a
//! fixed 4x4 Web Mercator grid, producing in-memory id → cell-mask indexes
//! for a downstream tiling pass:
//! - Compressed block containers (pairs/array dual representation, the
//!   Roaring Bitmaps idea extended to 16-bit values)
//! - A sharded append-only index over the full 64-bit id space
//! - A framed PBF reader with parallel blob decode and order preservation
//! - A three-phase concurrent sorter (nodes → ways → relations) with a
//!   collect-and-merge barrier between phases

pub mod error;
pub mod grid;
pub mod pbf;
pub mod sorter;
pub mod structures;

pub use error::{Error, Result};
pub use grid::GridExtent;
pub use pbf::{BlockStream, PbfReader};
pub use sorter::{GridIndex, Kind, Sorter};
pub use structures::{Block, MultiBlock};
