mod block;
mod multi_block;

pub use block::{Block, BlockIter, BLOCK_FULL_LEN, BLOCK_IDX_BITS, BLOCK_VAL_BITS};
pub use multi_block::MultiBlock;
