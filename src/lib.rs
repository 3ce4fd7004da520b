//! LASzip chunked point compression in Rust
//!
//! Points are grouped in chunks that can each be decompressed on their own,
//! a chunk table stored after the points tells where each chunk starts.
//!
//! [`PointWriter`] and [`PointReader`] are the two types that users wishing
//! to compress and / or decompress points should use, the
//! [`ZipConfiguration`] says how the points are laid out and compressed.
//!
//! # PointWriter Examples
//!
//! ```
//! use laz_chunked::{CompressorType, LasZipError, PointWriter, ZipConfiguration};
//!
//! # fn main() -> Result<(), LasZipError> {
//! // Here we use a Cursor but a std::fs::File will work just fine
//! let mut compressed_output = std::io::Cursor::new(vec![]);
//!
//! // Point format 0, no extra bytes, 20 bytes per point
//! let config = ZipConfiguration::from_format(0, 0, CompressorType::PointWiseChunked, 2)?;
//! let mut writer = PointWriter::new(&mut compressed_output, &config)?;
//!
//! let point = vec![0u8; 20];
//! writer.write_next(&point)?;
//! writer.close()?; // don't forget to call close, it writes the chunk table
//! # Ok(())
//! # }
//! ```
//!
//! The configuration can also be built from items, to change the chunk size
//! or to use variable-size chunks
//!
//! ```
//! use laz_chunked::{
//!     CompressorType, LasZipError, LazItem, LazItemType, PointWriter, ZipConfigurationBuilder,
//! };
//!
//! # fn main() -> Result<(), LasZipError> {
//! let mut compressed_output = std::io::Cursor::new(vec![]);
//! let config = ZipConfigurationBuilder::new(vec![
//!     LazItem::new(LazItemType::Point10, 2),
//!     LazItem::new(LazItemType::RGB12, 2),
//! ])
//! .with_variable_chunk_size()
//! .build();
//!
//! let mut writer = PointWriter::new(&mut compressed_output, &config)?;
//! let points = vec![0u8; 26 * 3];
//! writer.write_chunk(&points, 3)?;
//! writer.close()?;
//! assert_eq!(writer.chunk_totals(), Some(vec![3]));
//! # Ok(())
//! # }
//! ```
//!
//! # PointReader Examples
//!
//! The reader needs the same configuration, usually rebuilt from the
//! [`TagRecord`] stored with the points
//!
//! ```
//! use laz_chunked::{CompressorType, LasZipError, PointReader, PointWriter, TagRecord, ZipConfiguration};
//! use std::io::Cursor;
//!
//! # fn main() -> Result<(), LasZipError> {
//! let config = ZipConfiguration::from_format(0, 0, CompressorType::PointWiseChunked, 2)?;
//! let tag = config.to_tag().to_bytes()?;
//!
//! let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config)?;
//! writer.write_many(&[1u8; 20 * 5])?;
//! writer.close()?;
//! let compressed = writer.into_inner().into_inner();
//!
//! let config = ZipConfiguration::from_tag(&TagRecord::from_buffer(&tag)?)?;
//! let mut reader = PointReader::new(Cursor::new(compressed), &config)?;
//! let mut point = vec![0u8; 20];
//! reader.move_to_point(4)?;
//! reader.read_next(&mut point)?;
//! assert_eq!(point, vec![1u8; 20]);
//! # Ok(())
//! # }
//! ```
//!
//! # Async
//!
//! With the default 'async' feature, additional `_async` methods are exposed
//! on [`PointReader`] and [`PointWriter`]. They yield to the runtime between
//! points, the I/O itself stays blocking.

pub mod compressors;
pub mod decoders;
pub mod decompressors;
pub mod encoders;
pub mod models;

pub mod errors;
pub mod fields;
pub mod laszip;
pub mod record;

pub use errors::{LasZipError, Violation};
pub use laszip::{compress_buffer, decompress_buffer};
pub use laszip::{
    ByteStream, CachingReader, ChunkTable, ChunkTableEntry, Coder, CompressorType, ForwardOnly,
    LazItem, LazItemType, PointReader, PointWriter, Segment, SegmentedBuffer, TagRecord,
    ZipConfiguration, ZipConfigurationBuilder,
};

/// Result type of the fallible operations of this crate
pub type Result<T> = std::result::Result<T, LasZipError>;
