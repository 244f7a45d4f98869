//! OSMPBF wire messages, the subset this pipeline consumes
//!
//! Hand-written `prost` definitions for the `fileformat.proto` and
//! `osmformat.proto` messages. Tag numbers match the published schema;
//! fields this pipeline never reads (tags, info arrays, changesets) are left
//! out and skipped by the decoder as unknown tags.

/// Framing header in front of every blob.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BlobHeader {
    /// `"OSMHeader"` for the first blob, `"OSMData"` after that.
    #[prost(string, tag = "1")]
    pub r#type: String,

    #[prost(bytes = "vec", optional, tag = "2")]
    pub indexdata: Option<Vec<u8>>,

    /// Size of the [`Blob`] message that follows the header.
    #[prost(int32, tag = "3")]
    pub datasize: i32,
}

/// A blob payload: uncompressed bytes or a zlib stream plus its inflated
/// size.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Blob {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub raw: Option<Vec<u8>>,

    #[prost(int32, optional, tag = "2")]
    pub raw_size: Option<i32>,

    #[prost(bytes = "vec", optional, tag = "3")]
    pub zlib_data: Option<Vec<u8>>,

    #[prost(bytes = "vec", optional, tag = "4")]
    pub lzma_data: Option<Vec<u8>>,
}

/// Contents of the leading `OSMHeader` blob.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderBlock {
    #[prost(message, optional, tag = "1")]
    pub bbox: Option<HeaderBBox>,

    /// Features a reader must understand to process the file.
    #[prost(string, repeated, tag = "4")]
    pub required_features: Vec<String>,

    #[prost(string, repeated, tag = "5")]
    pub optional_features: Vec<String>,

    #[prost(string, optional, tag = "16")]
    pub writingprogram: Option<String>,

    #[prost(string, optional, tag = "17")]
    pub source: Option<String>,
}

/// File bounding box, in nanodegrees.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeaderBBox {
    #[prost(sint64, tag = "1")]
    pub left: i64,
    #[prost(sint64, tag = "2")]
    pub right: i64,
    #[prost(sint64, tag = "3")]
    pub top: i64,
    #[prost(sint64, tag = "4")]
    pub bottom: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StringTable {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub s: Vec<Vec<u8>>,
}

/// One decoded `OSMData` payload: a string table, coordinate scaling, and a
/// list of primitive groups.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrimitiveBlock {
    #[prost(message, optional, tag = "1")]
    pub stringtable: Option<StringTable>,

    #[prost(message, repeated, tag = "2")]
    pub primitivegroup: Vec<PrimitiveGroup>,

    /// Coordinate granularity in nanodegree units. Reserved for tag
    /// decoding; this pipeline consumes raw 1e-7-degree integers.
    #[prost(int32, optional, tag = "17", default = "100")]
    pub granularity: Option<i32>,

    #[prost(int64, optional, tag = "19", default = "0")]
    pub lat_offset: Option<i64>,

    #[prost(int64, optional, tag = "20", default = "0")]
    pub lon_offset: Option<i64>,

    #[prost(int32, optional, tag = "18", default = "1000")]
    pub date_granularity: Option<i32>,
}

/// A group holds exactly one of: plain nodes, dense nodes, ways, relations.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrimitiveGroup {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<Node>,

    #[prost(message, optional, tag = "2")]
    pub dense: Option<DenseNodes>,

    #[prost(message, repeated, tag = "3")]
    pub ways: Vec<Way>,

    #[prost(message, repeated, tag = "4")]
    pub relations: Vec<Relation>,
}

/// A plain (non-dense) node with absolute coordinates.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Node {
    #[prost(sint64, tag = "1")]
    pub id: i64,
    #[prost(sint64, tag = "8")]
    pub lat: i64,
    #[prost(sint64, tag = "9")]
    pub lon: i64,
}

/// Parallel delta-coded arrays; entry `i` is the running sum of the first
/// `i + 1` deltas of each array.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DenseNodes {
    #[prost(sint64, repeated, packed = "true", tag = "1")]
    pub id: Vec<i64>,
    #[prost(sint64, repeated, packed = "true", tag = "8")]
    pub lat: Vec<i64>,
    #[prost(sint64, repeated, packed = "true", tag = "9")]
    pub lon: Vec<i64>,
}

/// A way; `refs` holds delta-coded member node ids.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Way {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(sint64, repeated, packed = "true", tag = "8")]
    pub refs: Vec<i64>,
}

/// Relations are counted for block classification but not processed.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Relation {
    #[prost(int64, tag = "1")]
    pub id: i64,
}
