//! Error types for quadrille

use std::io;

use crate::sorter::Kind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("expected an {expected} blob, got {got:?}")]
    UnexpectedBlobType { expected: &'static str, got: String },

    #[error("required feature {0:?} is not supported")]
    UnsupportedFeature(String),

    #[error("blob carries neither raw nor zlib data")]
    UnsupportedCompression,

    #[error("corrupt input: {0}")]
    Corrupt(String),

    #[error("primitive block mixes {nodes} nodes, {ways} ways and {relations} relations")]
    MixedPrimitiveBlock {
        nodes: usize,
        ways: usize,
        relations: usize,
    },

    #[error("a {got} block cannot follow {current} blocks; kinds must arrive in order")]
    KindOrder { got: Kind, current: Kind },

    #[error("worker pool has shut down")]
    WorkerLost,
}

pub type Result<T> = std::result::Result<T, Error>;
