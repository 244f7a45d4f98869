//! Reader for the OSM PBF container format
//!
//! A planet file is a sequence of framed blobs: a 4-byte big-endian length,
//! a [`proto::BlobHeader`], then the [`proto::Blob`] itself, holding either
//! raw bytes or a zlib stream. The first blob is an `OSMHeader`; everything
//! after it is `OSMData` decoding to a [`proto::PrimitiveBlock`].
//!
//! [`PbfReader::blocks`] runs a small pipeline: one thread reads frames off
//! the input in file order, blob inflation and protobuf decode fan out onto
//! the rayon pool, and a consumer thread reassembles results in file order.
//! Downstream phases depend on ascending-id delivery, so order preservation
//! is part of the contract here. Blocks that mix primitive kinds are split
//! into single-kind blocks before they reach the stream.

pub mod proto;

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::thread;

use byteorder::{BigEndian, ReadBytesExt};
use crossbeam_channel::{bounded, Receiver};
use flate2::read::ZlibDecoder;
use prost::Message;

use crate::error::{Error, Result};
use proto::{Blob, BlobHeader, HeaderBlock, PrimitiveBlock, PrimitiveGroup};

/// Required features this reader understands; anything else is fatal.
const SUPPORTED_FEATURES: [&str; 3] = ["OsmSchema-V0.6", "DenseNodes", "HistoricalInformation"];

/// Sequential reader over a framed planet file.
pub struct PbfReader<R> {
    input: R,
}

impl PbfReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(PbfReader::new(BufReader::new(file)))
    }
}

impl<R: Read + Send + 'static> PbfReader<R> {
    pub fn new(input: R) -> Self {
        PbfReader { input }
    }

    /// Read and validate the leading `OSMHeader` blob.
    pub fn read_header(&mut self) -> Result<HeaderBlock> {
        let (header, data) = read_frame(&mut self.input)?.ok_or_else(|| Error::UnexpectedBlobType {
            expected: "OSMHeader",
            got: "end of file".to_string(),
        })?;
        if header.r#type != "OSMHeader" {
            return Err(Error::UnexpectedBlobType {
                expected: "OSMHeader",
                got: header.r#type,
            });
        }

        let payload = decode_payload(&data)?;
        let block = HeaderBlock::decode(payload.as_slice())?;
        for feature in &block.required_features {
            if !SUPPORTED_FEATURES.contains(&feature.as_str()) {
                return Err(Error::UnsupportedFeature(feature.clone()));
            }
        }
        Ok(block)
    }

    /// Start the background read/decode pipeline and return the ordered
    /// stream of single-kind primitive blocks.
    pub fn blocks(self) -> BlockStream {
        let lookahead = thread::available_parallelism().map(usize::from).unwrap_or(1);
        let (slot_tx, slot_rx) = bounded::<Receiver<Decoded>>(lookahead);
        let (out_tx, out_rx) = bounded::<Result<PrimitiveBlock>>(lookahead);

        let mut input = self.input;
        thread::spawn(move || loop {
            let (header, data) = match read_frame(&mut input) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    let _ = slot_tx.send(ready_slot(Err(err)));
                    break;
                }
            };
            if header.r#type != "OSMData" {
                let _ = slot_tx.send(ready_slot(Err(Error::UnexpectedBlobType {
                    expected: "OSMData",
                    got: header.r#type,
                })));
                break;
            }

            // Queue the reply slot before spawning the decode job, so the
            // consumer sees slots in file order no matter how the jobs race.
            let (tx, rx) = bounded::<Decoded>(1);
            if slot_tx.send(rx).is_err() {
                break; // stream was dropped
            }
            rayon::spawn(move || {
                let _ = tx.send(decode_data_block(&data));
            });
        });

        thread::spawn(move || {
            for slot in slot_rx.iter() {
                match slot.recv() {
                    Ok(Ok(blocks)) => {
                        for block in blocks {
                            if out_tx.send(Ok(block)).is_err() {
                                return;
                            }
                        }
                    }
                    Ok(Err(err)) => {
                        if out_tx.send(Err(err)).is_err() {
                            return;
                        }
                    }
                    Err(_) => return,
                }
            }
        });

        BlockStream { out_rx }
    }
}

type Decoded = Result<Vec<PrimitiveBlock>>;

/// Ordered stream of decoded, single-kind primitive blocks. Decode errors
/// surface as stream items; the stream ends after the first one.
pub struct BlockStream {
    out_rx: Receiver<Result<PrimitiveBlock>>,
}

impl Iterator for BlockStream {
    type Item = Result<PrimitiveBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        self.out_rx.recv().ok()
    }
}

/// A pre-resolved slot for results that need no decode job.
fn ready_slot(result: Decoded) -> Receiver<Decoded> {
    let (tx, rx) = bounded(1);
    let _ = tx.send(result);
    rx
}

/// Read one `(BlobHeader, blob bytes)` frame. `None` on a clean EOF at a
/// frame boundary.
fn read_frame<R: Read>(input: &mut R) -> Result<Option<(BlobHeader, Vec<u8>)>> {
    let length = match input.read_u32::<BigEndian>() {
        Ok(length) => length,
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err.into()),
    };

    let mut buf = vec![0u8; length as usize];
    input.read_exact(&mut buf)?;
    let header = BlobHeader::decode(buf.as_slice())?;

    if header.datasize < 0 {
        return Err(Error::Corrupt(format!("negative blob size {}", header.datasize)));
    }
    let mut data = vec![0u8; header.datasize as usize];
    input.read_exact(&mut data)?;

    Ok(Some((header, data)))
}

/// Extract a blob's payload bytes, inflating zlib data to its declared size.
fn decode_payload(data: &[u8]) -> Result<Vec<u8>> {
    let blob = Blob::decode(data)?;

    if let Some(raw) = blob.raw {
        return Ok(raw);
    }
    if let Some(zlib) = blob.zlib_data {
        let size = blob.raw_size.unwrap_or(0);
        if size < 0 {
            return Err(Error::Corrupt(format!("negative raw size {}", size)));
        }
        let mut payload = vec![0u8; size as usize];
        ZlibDecoder::new(zlib.as_slice()).read_exact(&mut payload)?;
        return Ok(payload);
    }
    Err(Error::UnsupportedCompression)
}

fn decode_data_block(data: &[u8]) -> Result<Vec<PrimitiveBlock>> {
    let payload = decode_payload(data)?;
    let block = PrimitiveBlock::decode(payload.as_slice())?;
    Ok(split_single_kind(block))
}

/// Count the primitives of each kind in a block.
pub fn primitive_counts(block: &PrimitiveBlock) -> (usize, usize, usize) {
    let mut nodes = 0;
    let mut ways = 0;
    let mut relations = 0;
    for group in &block.primitivegroup {
        nodes += group.nodes.len();
        if let Some(dense) = &group.dense {
            nodes += dense.id.len();
        }
        ways += group.ways.len();
        relations += group.relations.len();
    }
    (nodes, ways, relations)
}

/// The sorter takes one primitive kind per block. A block that mixes kinds
/// is split into up to three, in nodes/ways/relations order, all sharing the
/// original's string table and coordinate scaling.
fn split_single_kind(block: PrimitiveBlock) -> Vec<PrimitiveBlock> {
    let (nodes, ways, relations) = primitive_counts(&block);
    let kinds = [nodes, ways, relations].iter().filter(|&&n| n > 0).count();
    if kinds <= 1 {
        return vec![block];
    }

    let mut out = Vec::with_capacity(kinds);

    if nodes > 0 {
        let mut split = header_only(&block);
        for group in &block.primitivegroup {
            if !group.nodes.is_empty() {
                split.primitivegroup.push(PrimitiveGroup {
                    nodes: group.nodes.clone(),
                    ..Default::default()
                });
            }
            if let Some(dense) = &group.dense {
                if !dense.id.is_empty() {
                    split.primitivegroup.push(PrimitiveGroup {
                        dense: Some(dense.clone()),
                        ..Default::default()
                    });
                }
            }
        }
        out.push(split);
    }

    if ways > 0 {
        let mut split = header_only(&block);
        for group in &block.primitivegroup {
            if !group.ways.is_empty() {
                split.primitivegroup.push(PrimitiveGroup {
                    ways: group.ways.clone(),
                    ..Default::default()
                });
            }
        }
        out.push(split);
    }

    if relations > 0 {
        let mut split = header_only(&block);
        for group in &block.primitivegroup {
            if !group.relations.is_empty() {
                split.primitivegroup.push(PrimitiveGroup {
                    relations: group.relations.clone(),
                    ..Default::default()
                });
            }
        }
        out.push(split);
    }

    out
}

fn header_only(block: &PrimitiveBlock) -> PrimitiveBlock {
    PrimitiveBlock {
        stringtable: block.stringtable.clone(),
        primitivegroup: Vec::new(),
        granularity: block.granularity,
        lat_offset: block.lat_offset,
        lon_offset: block.lon_offset,
        date_granularity: block.date_granularity,
    }
}
