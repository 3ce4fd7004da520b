//! Module with the important structs that people wishing
//! to compress or decompress LAZ data can use
//!
//! It defines the [`PointReader`] & [`PointWriter`]
//! as well as the [`ZipConfiguration`] and its wire form, the [`TagRecord`].
pub use chunk_table::{
    ChunkTable, ChunkTableEntry, ChunkTableHeader, CHUNK_TABLE_OFFSET_SIZE,
    UNKNOWN_CHUNK_TABLE_OFFSET,
};
pub use chunked::{ChunkedReader, ChunkedWriter};
pub use items::{item_types_of_point_format, LazItem, LazItemType};
pub use point_codec::{compress_buffer, decompress_buffer, PointReader, PointWriter};
pub use pointwise::{PointWiseReader, PointWiseWriter};
pub use raw::{RawReader, RawWriter};
pub use stream::{ByteStream, CachingReader, ForwardOnly, Segment, SegmentedBuffer};
pub use vlr::{
    Coder, CompressorType, TagItem, TagRecord, TagTrailer, Version, ZipConfiguration,
    ZipConfigurationBuilder, DEFAULT_CHUNK_SIZE,
};

mod chunk_table;
mod chunked;
mod items;
mod point_codec;
mod pointwise;
mod raw;
mod stream;
mod vlr;
