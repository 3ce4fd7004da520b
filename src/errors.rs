//! Definitions of error related things.

use thiserror::Error;

use crate::laszip::{CompressorType, LazItemType};

/// Errors of this crate
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LasZipError {
    /// The configuration or the tag record describing it is not valid
    #[error("invalid data: {0}")]
    InvalidData(#[from] Violation),
    /// The compression version used for the item is not supported
    #[error("item {0:?} with compression version {1} is not supported")]
    UnsupportedLazItemVersion(LazItemType, u16),
    /// The type of compressor exists but it is not supported for this operation
    #[error("compressor type {0:?} is not supported")]
    UnsupportedCompressorType(CompressorType),
    /// The point format id is not supported
    #[error("point format {0} is not supported")]
    UnsupportedPointFormat(u8),
    /// Wrapper around an io error from the std lib
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("the len of the buffer ({buffer_len}) is not a multiple of the point size {point_size}")]
    BufferLenNotMultipleOfPointSize { buffer_len: usize, point_size: usize },
    /// The chunk table could not be found in the file
    /// and it is required for the operation.
    #[error("the chunk table could not be found")]
    MissingChunkTable,
    /// The chunk table was found but could not be decoded,
    /// and the chunks are variably sized so it cannot be rebuilt.
    #[error("the chunk table is corrupt: {0}")]
    CorruptChunkTable(String),
    /// The chunk that was just read did not end where the chunk table says
    /// the next one starts.
    #[error("chunk {chunk_index} is corrupt: next chunk expected at offset {expected}, stream is at {actual}")]
    PreviousChunkCorrupt {
        chunk_index: usize,
        expected: u64,
        actual: u64,
    },
    /// A chunk stores a number of points that disagrees with the chunk table
    /// or with the chunk size.
    #[error("chunk {chunk_index} stores {actual} points, expected {expected}")]
    ChunkPointCountMismatch {
        chunk_index: usize,
        expected: u64,
        actual: u64,
    },
    /// The operation requires a seekable stream
    #[error("the stream is not seekable")]
    NotSeekable,
    /// All the chunks listed by the chunk table have been read
    #[error("no more points to read")]
    ReadPastEnd,
    /// An explicitly addressed chunk already holds `chunk_size` points
    #[error("chunk {key} is full")]
    ChunkFull { key: u32 },
    /// The chunk key was already recorded or would leave a gap in the chunk sequence
    #[error("invalid chunk key {key}: {reason}")]
    InvalidChunkKey { key: u32, reason: &'static str },
    /// A fixed-size chunk that is not the last one was closed before being full
    #[error("chunk {key} holds {point_count} points but is not the last chunk (chunk size is {chunk_size})")]
    ChunkNotFull {
        key: u32,
        point_count: u64,
        chunk_size: u32,
    },
    /// Fewer points were supplied than announced
    #[error("expected {expected} points, got {actual}")]
    NotEnoughPoints { expected: u64, actual: u64 },
    /// The operation only makes sense with variable-size chunks
    #[error("operation requires variable-size chunks")]
    NotVariablyChunked,
}

/// The constraint that a configuration or tag record broke.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("compressor code {0} is not defined")]
    UnknownCompressor(u16),
    #[error("coder code {0} is not defined")]
    UnknownCoder(u16),
    #[error("item #{index} has unknown type code {code}")]
    UnknownItemType { index: usize, code: u16 },
    #[error("item #{index} ({item_type:?}) must be {expected} bytes, found {actual}")]
    ItemSize {
        index: usize,
        item_type: LazItemType,
        expected: u16,
        actual: u16,
    },
    #[error("item #{index} ({item_type:?}) must have a size multiple of {width}, found {actual}")]
    ItemSizeNotMultiple {
        index: usize,
        item_type: LazItemType,
        width: u16,
        actual: u16,
    },
    #[error("item #{index} ({item_type:?}) does not exist in version {version}")]
    ItemVersion {
        index: usize,
        item_type: LazItemType,
        version: u16,
    },
    #[error("item #{index} version {version} cannot be used with compressor {compressor:?}")]
    IncompatibleCompressor {
        index: usize,
        compressor: CompressorType,
        version: u16,
    },
    #[error("items add up to {items_size} bytes but points are {point_size} bytes")]
    PointSize { items_size: u32, point_size: u32 },
    #[error("no items")]
    NoItems,
    #[error("compressor {0:?} needs a chunk size greater than 0")]
    ZeroChunkSize(CompressorType),
}
