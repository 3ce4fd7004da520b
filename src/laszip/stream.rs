//! The byte streams compressed points are read from and written to.
//!
//! On top of `Read`/`Write` + `Seek`, a [`ByteStream`] tells whether it can really seek,
//! is told which part of the LAZ data is being accessed (so that it can store the parts
//! separately), and can be hinted about spans that are about to be read.
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};

/// The parts LAZ data is made of
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Segment {
    Header,
    VariableLengthRecords,
    PointData,
    ChunkTableHeader,
    ChunkTable,
    Chunk(u32),
    ExtendedVariableLengthRecords,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Header => write!(f, "header"),
            Segment::VariableLengthRecords => write!(f, "variable-length-records"),
            Segment::PointData => write!(f, "point-data"),
            Segment::ChunkTableHeader => write!(f, "chunk-table-header"),
            Segment::ChunkTable => write!(f, "chunk-table"),
            Segment::Chunk(index) => write!(f, "chunk_{}", index),
            Segment::ExtendedVariableLengthRecords => write!(f, "extended-variable-length-records"),
        }
    }
}

/// Capabilities of a stream beyond `Read`/`Write` and `Seek`.
///
/// All the methods have defaults that fit a plain seekable stream.
pub trait ByteStream {
    /// Returns false when the stream can only go forward,
    /// `Seek` is then only used to query the position.
    fn is_seekable(&self) -> bool {
        true
    }

    /// Tells the stream which part of the data is accessed next.
    fn switch_segment(&mut self, _segment: Segment) -> std::io::Result<()> {
        Ok(())
    }

    /// Hints that `length` bytes starting at `offset` are about to be read.
    ///
    /// The hint is advisory: a stream may ignore it.
    fn cache(&mut self, _offset: u64, _length: u64) -> std::io::Result<()> {
        Ok(())
    }
}

impl<T> ByteStream for Cursor<T> {}

impl ByteStream for File {}

impl<'a, S: ByteStream + ?Sized> ByteStream for &'a mut S {
    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn switch_segment(&mut self, segment: Segment) -> std::io::Result<()> {
        (**self).switch_segment(segment)
    }

    fn cache(&mut self, offset: u64, length: u64) -> std::io::Result<()> {
        (**self).cache(offset, length)
    }
}

impl<R: Read + Seek + ByteStream> ByteStream for BufReader<R> {
    fn is_seekable(&self) -> bool {
        self.get_ref().is_seekable()
    }

    fn switch_segment(&mut self, segment: Segment) -> std::io::Result<()> {
        if self.get_ref().is_seekable() {
            // drops the buffered bytes, they may belong to another segment
            self.seek(SeekFrom::Current(0))?;
        }
        self.get_mut().switch_segment(segment)
    }

    fn cache(&mut self, offset: u64, length: u64) -> std::io::Result<()> {
        self.get_mut().cache(offset, length)
    }
}

impl<W: Write + ByteStream> ByteStream for BufWriter<W> {
    fn is_seekable(&self) -> bool {
        self.get_ref().is_seekable()
    }

    fn switch_segment(&mut self, segment: Segment) -> std::io::Result<()> {
        self.flush()?;
        self.get_mut().switch_segment(segment)
    }

    fn cache(&mut self, offset: u64, length: u64) -> std::io::Result<()> {
        self.get_mut().cache(offset, length)
    }
}

/// Adapter that hides the seeking capabilities of a stream,
/// like a pipe or a socket would.
///
/// Seeking is only possible with `SeekFrom::Current(0)`, to query the position.
#[derive(Debug)]
pub struct ForwardOnly<S> {
    inner: S,
    position: u64,
}

impl<S> ForwardOnly<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, position: 0 }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read> Read for ForwardOnly<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        Ok(n)
    }
}

impl<S: Write> Write for ForwardOnly<S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl<S> Seek for ForwardOnly<S> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.position),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "stream is forward only",
            )),
        }
    }
}

impl<S> ByteStream for ForwardOnly<S> {
    fn is_seekable(&self) -> bool {
        false
    }
}

/// In-memory storage that keeps each [`Segment`] in its own buffer.
///
/// Positions are those of the segments laid one after the other.
/// Switching to a segment that exists moves to its start, switching to a new
/// one appends it when the position is at the end.
/// Only the last segment can grow.
#[derive(Debug, Default, Clone)]
pub struct SegmentedBuffer {
    segments: Vec<(Segment, Vec<u8>)>,
    position: u64,
}

impl SegmentedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of bytes in all the segments
    pub fn len(&self) -> u64 {
        self.segments
            .iter()
            .map(|(_, bytes)| bytes.len() as u64)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the bytes of the segment if it exists
    pub fn segment(&self, segment: Segment) -> Option<&[u8]> {
        self.segments
            .iter()
            .find(|(s, _)| *s == segment)
            .map(|(_, bytes)| bytes.as_slice())
    }

    /// The segments in the order they were created
    pub fn segments(&self) -> impl Iterator<Item = Segment> + '_ {
        self.segments.iter().map(|(s, _)| *s)
    }

    /// All the bytes, segments laid one after the other
    pub fn to_vec(&self) -> Vec<u8> {
        self.segments
            .iter()
            .flat_map(|(_, bytes)| bytes.iter().copied())
            .collect()
    }

    pub fn into_inner(self) -> Vec<(Segment, Vec<u8>)> {
        self.segments
    }

    /// Returns the index of the segment that holds `position`
    /// and the offset of `position` in it.
    fn locate(&self, position: u64) -> Option<(usize, usize)> {
        let mut start = 0u64;
        for (index, (_, bytes)) in self.segments.iter().enumerate() {
            let end = start + bytes.len() as u64;
            if position < end {
                return Some((index, (position - start) as usize));
            }
            start = end;
        }
        None
    }

    fn start_of(&self, index: usize) -> u64 {
        self.segments[..index]
            .iter()
            .map(|(_, bytes)| bytes.len() as u64)
            .sum()
    }
}

impl Read for SegmentedBuffer {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let (index, offset) = match self.locate(self.position) {
            Some(location) => location,
            None => return Ok(0),
        };
        let available = &self.segments[index].1[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for SegmentedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.segments.is_empty() {
            self.segments.push((Segment::Header, Vec::new()));
        }
        let n = match self.locate(self.position) {
            Some((index, offset)) => {
                let is_last = index == self.segments.len() - 1;
                let bytes = &mut self.segments[index].1;
                if is_last {
                    let overwritten = (bytes.len() - offset).min(buf.len());
                    bytes[offset..offset + overwritten].copy_from_slice(&buf[..overwritten]);
                    bytes.extend_from_slice(&buf[overwritten..]);
                    buf.len()
                } else {
                    let n = (bytes.len() - offset).min(buf.len());
                    bytes[offset..offset + n].copy_from_slice(&buf[..n]);
                    n
                }
            }
            None if self.position == self.len() => {
                if let Some((_, bytes)) = self.segments.last_mut() {
                    bytes.extend_from_slice(buf);
                }
                buf.len()
            }
            None => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "cannot write past the end of a segmented buffer",
                ));
            }
        };
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for SegmentedBuffer {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(offset) => {
                self.position = offset;
                return Ok(offset);
            }
            SeekFrom::End(offset) => (self.len(), offset),
            SeekFrom::Current(offset) => (self.position, offset),
        };
        let new_position = if offset >= 0 {
            base.checked_add(offset as u64)
        } else {
            base.checked_sub(offset.unsigned_abs())
        };
        match new_position {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

impl ByteStream for SegmentedBuffer {
    fn switch_segment(&mut self, segment: Segment) -> std::io::Result<()> {
        match self.segments.iter().position(|(s, _)| *s == segment) {
            Some(index) => self.position = self.start_of(index),
            None if self.position == self.len() => self.segments.push((segment, Vec::new())),
            None => {}
        }
        Ok(())
    }
}

/// Reader that honours the [`ByteStream::cache`] hints by loading the
/// hinted span in memory and serving reads from there.
#[derive(Debug)]
pub struct CachingReader<R> {
    inner: R,
    // position of self, the one seen by the user
    position: u64,
    // position of inner
    inner_position: u64,
    cache_start: u64,
    cache: Vec<u8>,
    cached_bytes_served: u64,
}

impl<R: Read + Seek> CachingReader<R> {
    pub fn new(mut inner: R) -> std::io::Result<Self> {
        let position = inner.seek(SeekFrom::Current(0))?;
        Ok(Self {
            inner,
            position,
            inner_position: position,
            cache_start: 0,
            cache: Vec::new(),
            cached_bytes_served: 0,
        })
    }

    /// Number of bytes that were read from the cache instead of the inner reader
    pub fn cached_bytes_served(&self) -> u64 {
        self.cached_bytes_served
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn cached_span(&self) -> std::ops::Range<u64> {
        self.cache_start..self.cache_start + self.cache.len() as u64
    }
}

impl<R: Read + Seek> Read for CachingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.cached_span().contains(&self.position) {
            let offset = (self.position - self.cache_start) as usize;
            let available = &self.cache[offset..];
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            self.position += n as u64;
            self.cached_bytes_served += n as u64;
            return Ok(n);
        }

        if self.inner_position != self.position {
            self.inner_position = self.inner.seek(SeekFrom::Start(self.position))?;
        }
        let n = self.inner.read(buf)?;
        self.position += n as u64;
        self.inner_position += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for CachingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.position = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(offset) => {
                let new_position = if offset >= 0 {
                    self.position.checked_add(offset as u64)
                } else {
                    self.position.checked_sub(offset.unsigned_abs())
                };
                new_position.ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "invalid seek to a negative or overflowing position",
                    )
                })?
            }
            SeekFrom::End(_) => {
                self.inner_position = self.inner.seek(pos)?;
                self.inner_position
            }
        };
        Ok(self.position)
    }
}

impl<R: Read + Seek + ByteStream> ByteStream for CachingReader<R> {
    fn switch_segment(&mut self, segment: Segment) -> std::io::Result<()> {
        if self.inner_position != self.position {
            self.inner_position = self.inner.seek(SeekFrom::Start(self.position))?;
        }
        self.inner.switch_segment(segment)?;
        self.inner_position = self.inner.seek(SeekFrom::Current(0))?;
        self.position = self.inner_position;
        Ok(())
    }

    fn cache(&mut self, offset: u64, length: u64) -> std::io::Result<()> {
        if self.cached_span().start <= offset && offset + length <= self.cached_span().end {
            return Ok(());
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.cache.clear();
        let read = self.inner.by_ref().take(length).read_to_end(&mut self.cache)?;
        self.cache_start = offset;
        self.inner_position = offset + read as u64;
        Ok(())
    }
}
