//! Points compressed in one continuous stream, without chunks.
//!
//! Seeking backward means decompressing again from the first point.
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use tracing::debug;

use crate::laszip::chunk_table::{write_chunk_table_offset_placeholder, CHUNK_TABLE_OFFSET_SIZE};
use crate::laszip::{ByteStream, CompressorType, Segment, ZipConfiguration};
use crate::record::{
    FromLazItems, RecordCompressor, RecordDecompressor, SequentialPointRecordCompressor,
    SequentialPointRecordDecompressor,
};
use crate::LasZipError;

fn check_compressor(config: &ZipConfiguration) -> crate::Result<()> {
    if config.compressor() != CompressorType::PointWise {
        return Err(LasZipError::UnsupportedCompressorType(config.compressor()));
    }
    config.validate(0)
}

pub struct PointWiseReader<R: Read> {
    record_decompressor: SequentialPointRecordDecompressor<R>,
    points_start: u64,
    point_index: u64,
    scratch: Vec<u8>,
}

impl<R: Read + Seek + ByteStream> PointWiseReader<R> {
    /// Creates a reader on a stream positioned at the start of the point data
    pub fn new(mut stream: R, config: &ZipConfiguration) -> crate::Result<Self> {
        check_compressor(config)?;
        stream.switch_segment(Segment::PointData)?;
        // There is no chunk table to look for, the offset is skipped
        let mut offset = [0u8; CHUNK_TABLE_OFFSET_SIZE as usize];
        stream.read_exact(&mut offset)?;
        let points_start = stream.seek(SeekFrom::Current(0))?;
        Ok(Self {
            record_decompressor: SequentialPointRecordDecompressor::from_laz_items(
                stream,
                config.items(),
            )?,
            points_start,
            point_index: 0,
            scratch: vec![0u8; config.items_size() as usize],
        })
    }

    pub fn read_next(&mut self, out: &mut [u8]) -> crate::Result<()> {
        let record_size = self.record_decompressor.record_size();
        if out.len() != record_size {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: out.len(),
                point_size: record_size,
            });
        }
        if let Err(error) = self.record_decompressor.decompress_next(out) {
            if self.point_index == 0 && error.kind() == ErrorKind::UnexpectedEof {
                return Err(LasZipError::ReadPastEnd);
            }
            return Err(error.into());
        }
        self.point_index += 1;
        Ok(())
    }

    pub(crate) fn prepare_move(&mut self, target: u64) -> crate::Result<Option<u64>> {
        if target >= self.point_index {
            return Ok(Some(target - self.point_index));
        }
        if !self.record_decompressor.get_ref().is_seekable() {
            return Ok(None);
        }
        debug!(target, "restarting decompression from the first point");
        let points_start = self.points_start;
        self.record_decompressor
            .get_mut()
            .seek(SeekFrom::Start(points_start))?;
        self.record_decompressor.reset();
        self.point_index = 0;
        Ok(Some(target))
    }

    pub(crate) fn skip_one(&mut self) -> crate::Result<bool> {
        let mut scratch = std::mem::take(&mut self.scratch);
        let result = self.read_next(&mut scratch);
        self.scratch = scratch;
        match result {
            Ok(()) => Ok(true),
            Err(LasZipError::ReadPastEnd) => Ok(false),
            Err(error) => Err(error),
        }
    }

    pub fn move_to_point(&mut self, target: u64) -> crate::Result<bool> {
        let to_skip = match self.prepare_move(target)? {
            Some(to_skip) => to_skip,
            None => return Ok(false),
        };
        for _ in 0..to_skip {
            if !self.skip_one()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn point_index(&self) -> u64 {
        self.point_index
    }

    pub fn record_size(&self) -> usize {
        self.record_decompressor.record_size()
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.record_decompressor.get_mut()
    }

    pub fn get_ref(&self) -> &R {
        self.record_decompressor.get_ref()
    }

    pub fn into_inner(self) -> R {
        self.record_decompressor.into_inner()
    }
}

pub struct PointWiseWriter<W: Write> {
    record_compressor: SequentialPointRecordCompressor<W>,
    point_count: u64,
    closed: bool,
}

impl<W: Write + Seek + ByteStream> PointWiseWriter<W> {
    pub fn new(mut stream: W, config: &ZipConfiguration) -> crate::Result<Self> {
        check_compressor(config)?;
        stream.switch_segment(Segment::PointData)?;
        write_chunk_table_offset_placeholder(&mut stream)?;
        Ok(Self {
            record_compressor: SequentialPointRecordCompressor::from_laz_items(
                stream,
                config.items(),
            )?,
            point_count: 0,
            closed: false,
        })
    }

    pub fn write_next(&mut self, point: &[u8]) -> crate::Result<()> {
        let record_size = self.record_compressor.record_size();
        if point.len() != record_size {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: point.len(),
                point_size: record_size,
            });
        }
        self.record_compressor.compress_next(point)?;
        self.point_count += 1;
        Ok(())
    }

    /// Flushes the compressor, calling it again does nothing
    pub fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        if self.point_count > 0 {
            self.record_compressor.done()?;
        }
        self.record_compressor.get_mut().flush()?;
        self.closed = true;
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_compressor.record_size()
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.record_compressor.get_mut()
    }

    pub fn get_ref(&self) -> &W {
        self.record_compressor.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.record_compressor.into_inner()
    }
}
