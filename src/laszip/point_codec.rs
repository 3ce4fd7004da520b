//! The readers and writers of points, one variant per [`CompressorType`].
use std::io::{Cursor, Read, Seek, Write};

use crate::laszip::chunked::{ChunkedReader, ChunkedWriter};
use crate::laszip::pointwise::{PointWiseReader, PointWiseWriter};
use crate::laszip::raw::{RawReader, RawWriter};
use crate::laszip::{ByteStream, CompressorType, ZipConfiguration};
use crate::record::{
    LayeredPointRecordCompressor, LayeredPointRecordDecompressor, SequentialPointRecordCompressor,
    SequentialPointRecordDecompressor,
};
use crate::LasZipError;

type InMemory = Cursor<Vec<u8>>;

/// Reads points, whatever the way they were compressed.
///
/// # Example
///
/// ```
/// use laz_chunked::{CompressorType, PointReader, PointWriter, ZipConfiguration};
/// use std::io::Cursor;
///
/// # fn main() -> laz_chunked::Result<()> {
/// let config = ZipConfiguration::from_format(1, 0, CompressorType::PointWiseChunked, 2)?;
/// let points = vec![7u8; 28 * 10];
///
/// let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config)?;
/// writer.write_many(&points)?;
/// writer.close()?;
/// let compressed = writer.into_inner().into_inner();
///
/// let mut reader = PointReader::new(Cursor::new(compressed), &config)?;
/// let mut point = vec![0u8; 28];
/// reader.move_to_point(9)?;
/// reader.read_next(&mut point)?;
/// assert_eq!(point, &points[9 * 28..]);
/// # Ok(())
/// # }
/// ```
pub enum PointReader<R: Read> {
    Raw(RawReader<R>),
    PointWise(PointWiseReader<R>),
    PointWiseChunked(ChunkedReader<R, SequentialPointRecordDecompressor<R>>),
    LayeredChunked(ChunkedReader<R, LayeredPointRecordDecompressor<R>>),
}

macro_rules! on_reader {
    ($self:expr, $reader:ident => $e:expr) => {
        match $self {
            PointReader::Raw($reader) => $e,
            PointReader::PointWise($reader) => $e,
            PointReader::PointWiseChunked($reader) => $e,
            PointReader::LayeredChunked($reader) => $e,
        }
    };
}

impl<R: Read + Seek + ByteStream> PointReader<R> {
    /// Creates the reader matching the compressor of the configuration.
    ///
    /// The stream must be positioned at the start of the point data.
    pub fn new(stream: R, config: &ZipConfiguration) -> crate::Result<Self> {
        let reader = match config.compressor() {
            CompressorType::None => PointReader::Raw(RawReader::new(stream, config)?),
            CompressorType::PointWise => {
                PointReader::PointWise(PointWiseReader::new(stream, config)?)
            }
            CompressorType::PointWiseChunked => {
                PointReader::PointWiseChunked(ChunkedReader::new(stream, config)?)
            }
            CompressorType::LayeredChunked => {
                PointReader::LayeredChunked(ChunkedReader::new(stream, config)?)
            }
        };
        Ok(reader)
    }

    pub fn record_size(&self) -> usize {
        on_reader!(self, reader => reader.record_size())
    }

    /// Reads the next point into `out`, which must be exactly one point long.
    pub fn read_next(&mut self, out: &mut [u8]) -> crate::Result<()> {
        on_reader!(self, reader => reader.read_next(out))
    }

    /// Reads as many points as `out` can hold
    pub fn read_many(&mut self, out: &mut [u8]) -> crate::Result<()> {
        let point_size = self.record_size();
        check_buffer(out.len(), point_size)?;
        for point in out.chunks_exact_mut(point_size) {
            self.read_next(point)?;
        }
        Ok(())
    }

    /// Goes to the point at index `target`, so that it is the next one read.
    ///
    /// Returns `Ok(false)` when the point does not exist or cannot be reached
    /// (going backward in a stream that is not seekable).
    pub fn move_to_point(&mut self, target: u64) -> crate::Result<bool> {
        on_reader!(self, reader => reader.move_to_point(target))
    }

    /// Goes to the first point of the chunk.
    ///
    /// Fails with [`LasZipError::UnsupportedCompressorType`] when points are not chunked.
    pub fn move_to_chunk(&mut self, index: usize) -> crate::Result<bool> {
        match self {
            PointReader::PointWiseChunked(reader) => reader.move_to_chunk(index),
            PointReader::LayeredChunked(reader) => reader.move_to_chunk(index),
            PointReader::Raw(_) => Err(LasZipError::UnsupportedCompressorType(
                CompressorType::None,
            )),
            PointReader::PointWise(_) => Err(LasZipError::UnsupportedCompressorType(
                CompressorType::PointWise,
            )),
        }
    }

    /// Index of the next point read
    pub fn point_index(&self) -> u64 {
        on_reader!(self, reader => reader.point_index())
    }

    /// Index of the current chunk, None when points are not chunked
    pub fn chunk_index(&self) -> Option<usize> {
        match self {
            PointReader::PointWiseChunked(reader) => Some(reader.chunk_index()),
            PointReader::LayeredChunked(reader) => Some(reader.chunk_index()),
            _ => None,
        }
    }

    /// Number of points in each chunk, only known for variable-size chunks
    pub fn chunk_totals(&self) -> Option<Vec<u64>> {
        match self {
            PointReader::PointWiseChunked(reader) => reader.chunk_totals(),
            PointReader::LayeredChunked(reader) => reader.chunk_totals(),
            _ => None,
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        on_reader!(self, reader => reader.get_mut())
    }

    pub fn get_ref(&self) -> &R {
        on_reader!(self, reader => reader.get_ref())
    }

    pub fn into_inner(self) -> R {
        on_reader!(self, reader => reader.into_inner())
    }
}

#[cfg(feature = "async")]
impl<R: Read + Seek + ByteStream> PointReader<R> {
    /// Same as [`read_next`](Self::read_next), yields to the runtime after the point
    pub async fn read_async(&mut self, out: &mut [u8]) -> crate::Result<()> {
        self.read_next(out)?;
        tokio::task::yield_now().await;
        Ok(())
    }

    /// Same as [`read_many`](Self::read_many), yields to the runtime between points
    pub async fn read_many_async(&mut self, out: &mut [u8]) -> crate::Result<()> {
        let point_size = self.record_size();
        check_buffer(out.len(), point_size)?;
        for point in out.chunks_exact_mut(point_size) {
            self.read_async(point).await?;
        }
        Ok(())
    }

    /// Same as [`move_to_point`](Self::move_to_point),
    /// yields to the runtime between the points decompressed to reach the target
    pub async fn move_to_point_async(&mut self, target: u64) -> crate::Result<bool> {
        match self {
            PointReader::PointWiseChunked(reader) => reader.move_to_point_async(target).await,
            PointReader::LayeredChunked(reader) => reader.move_to_point_async(target).await,
            PointReader::Raw(reader) => {
                let to_skip = match reader.prepare_move(target)? {
                    Some(to_skip) => to_skip,
                    None => return Ok(false),
                };
                for _ in 0..to_skip {
                    if !reader.skip_one()? {
                        return Ok(false);
                    }
                    tokio::task::yield_now().await;
                }
                Ok(true)
            }
            PointReader::PointWise(reader) => {
                let to_skip = match reader.prepare_move(target)? {
                    Some(to_skip) => to_skip,
                    None => return Ok(false),
                };
                for _ in 0..to_skip {
                    if !reader.skip_one()? {
                        return Ok(false);
                    }
                    tokio::task::yield_now().await;
                }
                Ok(true)
            }
        }
    }
}

/// Writes points, compressing them the way the configuration says.
pub enum PointWriter<W: Write> {
    Raw(RawWriter<W>),
    PointWise(PointWiseWriter<W>),
    PointWiseChunked(ChunkedWriter<W, SequentialPointRecordCompressor<InMemory>>),
    LayeredChunked(ChunkedWriter<W, LayeredPointRecordCompressor<InMemory>>),
}

macro_rules! on_writer {
    ($self:expr, $writer:ident => $e:expr) => {
        match $self {
            PointWriter::Raw($writer) => $e,
            PointWriter::PointWise($writer) => $e,
            PointWriter::PointWiseChunked($writer) => $e,
            PointWriter::LayeredChunked($writer) => $e,
        }
    };
}

impl<W: Write + Seek + ByteStream> PointWriter<W> {
    /// Creates the writer matching the compressor of the configuration.
    ///
    /// Compressed writers write the offset to the chunk table right away.
    pub fn new(stream: W, config: &ZipConfiguration) -> crate::Result<Self> {
        let writer = match config.compressor() {
            CompressorType::None => PointWriter::Raw(RawWriter::new(stream, config)?),
            CompressorType::PointWise => {
                PointWriter::PointWise(PointWiseWriter::new(stream, config)?)
            }
            CompressorType::PointWiseChunked => {
                PointWriter::PointWiseChunked(ChunkedWriter::new(stream, config)?)
            }
            CompressorType::LayeredChunked => {
                PointWriter::LayeredChunked(ChunkedWriter::new(stream, config)?)
            }
        };
        Ok(writer)
    }

    pub fn record_size(&self) -> usize {
        on_writer!(self, writer => writer.record_size())
    }

    /// Writes one point, `point` must be exactly one point long
    pub fn write_next(&mut self, point: &[u8]) -> crate::Result<()> {
        on_writer!(self, writer => writer.write_next(point))
    }

    /// Writes a point given as its record and its extra bytes
    pub fn write_with_extra_bytes(
        &mut self,
        record: &[u8],
        extra_bytes: &[u8],
    ) -> crate::Result<()> {
        let mut point = Vec::with_capacity(record.len() + extra_bytes.len());
        point.extend_from_slice(record);
        point.extend_from_slice(extra_bytes);
        self.write_next(&point)
    }

    /// Writes all the points of the buffer
    pub fn write_many(&mut self, points: &[u8]) -> crate::Result<()> {
        let point_size = self.record_size();
        check_buffer(points.len(), point_size)?;
        for point in points.chunks_exact(point_size) {
            self.write_next(point)?;
        }
        Ok(())
    }

    /// Writes the point into the chunk with the given key.
    ///
    /// Fails with [`LasZipError::UnsupportedCompressorType`] when points are not chunked.
    pub fn write_to_chunk(&mut self, key: u32, point: &[u8]) -> crate::Result<()> {
        match self {
            PointWriter::PointWiseChunked(writer) => writer.write_to_chunk(key, point),
            PointWriter::LayeredChunked(writer) => writer.write_to_chunk(key, point),
            PointWriter::Raw(_) => Err(LasZipError::UnsupportedCompressorType(
                CompressorType::None,
            )),
            PointWriter::PointWise(_) => Err(LasZipError::UnsupportedCompressorType(
                CompressorType::PointWise,
            )),
        }
    }

    /// Ends the current chunk, only for variable-size chunks.
    pub fn finish_current_chunk(&mut self) -> crate::Result<()> {
        match self {
            PointWriter::PointWiseChunked(writer) => writer.finish_current_chunk(),
            PointWriter::LayeredChunked(writer) => writer.finish_current_chunk(),
            _ => Err(LasZipError::NotVariablyChunked),
        }
    }

    /// Writes the points as one chunk, only for variable-size chunks.
    pub fn write_chunk(&mut self, points: &[u8], point_count: u64) -> crate::Result<()> {
        match self {
            PointWriter::PointWiseChunked(writer) => writer.write_chunk(points, point_count),
            PointWriter::LayeredChunked(writer) => writer.write_chunk(points, point_count),
            _ => Err(LasZipError::NotVariablyChunked),
        }
    }

    /// Must be called once all the points are written.
    pub fn close(&mut self) -> crate::Result<()> {
        on_writer!(self, writer => writer.close())
    }

    /// Key of the chunk the next point goes to, None when points are not chunked
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            PointWriter::PointWiseChunked(writer) => Some(writer.chunk_index()),
            PointWriter::LayeredChunked(writer) => Some(writer.chunk_index()),
            _ => None,
        }
    }

    /// Number of points in each chunk, known once the writer is closed
    pub fn chunk_totals(&self) -> Option<Vec<u64>> {
        match self {
            PointWriter::PointWiseChunked(writer) => writer.chunk_totals(),
            PointWriter::LayeredChunked(writer) => writer.chunk_totals(),
            _ => None,
        }
    }

    pub fn get_mut(&mut self) -> &mut W {
        on_writer!(self, writer => writer.get_mut())
    }

    pub fn get_ref(&self) -> &W {
        on_writer!(self, writer => writer.get_ref())
    }

    pub fn into_inner(self) -> W {
        on_writer!(self, writer => writer.into_inner())
    }
}

#[cfg(feature = "async")]
impl<W: Write + Seek + ByteStream> PointWriter<W> {
    /// Same as [`write_next`](Self::write_next), yields to the runtime after the point
    pub async fn write_async(&mut self, point: &[u8]) -> crate::Result<()> {
        self.write_next(point)?;
        tokio::task::yield_now().await;
        Ok(())
    }

    /// Same as [`write_many`](Self::write_many), yields to the runtime between points
    pub async fn write_many_async(&mut self, points: &[u8]) -> crate::Result<()> {
        let point_size = self.record_size();
        check_buffer(points.len(), point_size)?;
        for point in points.chunks_exact(point_size) {
            self.write_async(point).await?;
        }
        Ok(())
    }

    /// Same as [`close`](Self::close)
    pub async fn close_async(&mut self) -> crate::Result<()> {
        self.close()?;
        tokio::task::yield_now().await;
        Ok(())
    }
}

fn check_buffer(buffer_len: usize, point_size: usize) -> crate::Result<()> {
    if point_size == 0 || buffer_len % point_size != 0 {
        return Err(LasZipError::BufferLenNotMultipleOfPointSize {
            buffer_len,
            point_size,
        });
    }
    Ok(())
}

/// Compresses all the points of the buffer
///
/// The data written is organized like this:
///  1) offset to the chunk_table (i64), for compressed data
///  2) the points data
///  3) the chunk table, for chunked data
///
/// Returns the number of points in each chunk, for chunked data.
pub fn compress_buffer<W: Write + Seek + ByteStream>(
    dst: W,
    uncompressed_points: &[u8],
    config: &ZipConfiguration,
) -> crate::Result<Option<Vec<u64>>> {
    let mut writer = PointWriter::new(dst, config)?;
    writer.write_many(uncompressed_points)?;
    writer.close()?;
    Ok(writer.chunk_totals())
}

/// Decompresses as many points as `decompressed_points` can hold.
///
/// `compressed_points_data` must start with the offset to the chunk table.
///
/// # Important
///
/// In a LAZ file, the chunk table offset is counted from the start of the
/// file, here it is counted from the start of the buffer.
pub fn decompress_buffer(
    compressed_points_data: &[u8],
    decompressed_points: &mut [u8],
    config: &ZipConfiguration,
) -> crate::Result<()> {
    let mut reader = PointReader::new(Cursor::new(compressed_points_data), config)?;
    reader.read_many(decompressed_points)
}
