//! Points stored as they are, without compression.
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

use crate::laszip::{ByteStream, Segment, ZipConfiguration};
use crate::LasZipError;

pub struct RawReader<R> {
    stream: R,
    record_size: usize,
    points_start: u64,
    point_index: u64,
    scratch: Vec<u8>,
}

impl<R: Read + Seek + ByteStream> RawReader<R> {
    /// Creates a reader on a stream positioned on the first point
    pub fn new(mut stream: R, config: &ZipConfiguration) -> crate::Result<Self> {
        config.validate(0)?;
        stream.switch_segment(Segment::PointData)?;
        let points_start = stream.seek(SeekFrom::Current(0))?;
        let record_size = config.items_size() as usize;
        Ok(Self {
            stream,
            record_size,
            points_start,
            point_index: 0,
            scratch: vec![0u8; record_size],
        })
    }

    pub fn read_next(&mut self, out: &mut [u8]) -> crate::Result<()> {
        if out.len() != self.record_size {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: out.len(),
                point_size: self.record_size,
            });
        }
        match self.stream.read_exact(out) {
            Ok(()) => {
                self.point_index += 1;
                Ok(())
            }
            Err(error) if error.kind() == ErrorKind::UnexpectedEof => Err(LasZipError::ReadPastEnd),
            Err(error) => Err(error.into()),
        }
    }

    /// Prepares a move to the point, returns the number of points
    /// that have to be read to reach it.
    pub(crate) fn prepare_move(&mut self, target: u64) -> crate::Result<Option<u64>> {
        if target >= self.point_index {
            return Ok(Some(target - self.point_index));
        }
        if !self.stream.is_seekable() {
            return Ok(None);
        }
        let offset = self.points_start + target * self.record_size as u64;
        self.stream.seek(SeekFrom::Start(offset))?;
        self.point_index = target;
        Ok(Some(0))
    }

    /// Reads a point and forgets it, returns false when there was no point left
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
        self.record_size
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.stream
    }

    pub fn get_ref(&self) -> &R {
        &self.stream
    }

    pub fn into_inner(self) -> R {
        self.stream
    }
}

pub struct RawWriter<W> {
    stream: W,
    record_size: usize,
}

impl<W: Write + ByteStream> RawWriter<W> {
    pub fn new(mut stream: W, config: &ZipConfiguration) -> crate::Result<Self> {
        config.validate(0)?;
        stream.switch_segment(Segment::PointData)?;
        Ok(Self {
            stream,
            record_size: config.items_size() as usize,
        })
    }

    pub fn write_next(&mut self, point: &[u8]) -> crate::Result<()> {
        if point.len() != self.record_size {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: point.len(),
                point_size: self.record_size,
            });
        }
        self.stream.write_all(point)?;
        Ok(())
    }

    pub fn close(&mut self) -> crate::Result<()> {
        self.stream.flush()?;
        Ok(())
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.stream
    }

    pub fn get_ref(&self) -> &W {
        &self.stream
    }

    pub fn into_inner(self) -> W {
        self.stream
    }
}
