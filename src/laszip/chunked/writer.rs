use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::io::{Cursor, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::{debug, trace, warn};

use crate::laszip::chunk_table::{
    update_chunk_table_offset, write_chunk_table_offset_placeholder, ChunkTable,
    ChunkTableEntry, CHUNK_TABLE_OFFSET_SIZE,
};
use crate::laszip::{ByteStream, LazItem, Segment, ZipConfiguration};
use crate::record::{FromLazItems, RecordCompressor};
use crate::LasZipError;

/// A chunk being compressed
struct ChunkWrapper<C> {
    record_compressor: C,
    point_count: u64,
    /// No more points can be added, the compressed bytes are ready to be recorded
    finalized: bool,
}

/// Writes points compressed in chunks.
///
/// Chunks are compressed in memory and written to the destination in the order of their key,
/// as soon as all the chunks before them are written.
///
/// # Fixed-Size
///
/// - Use [`write_next`] and/or [`write_many`], chunking is managed by the writer.
/// - Or use [`write_to_chunk`] to say in which chunk each point goes.
/// - Use [`close`] when all the points are written.
///
/// # Variable-Size
///
/// - Use [`write_next`] and/or [`write_many`] then [`finish_current_chunk`]
///   to end a chunk.
/// - Or use [`write_chunk`] to write whole chunks.
/// - Use [`close`] when all the points are written.
///
/// [`write_next`]: Self::write_next
/// [`write_many`]: Self::write_many
/// [`write_to_chunk`]: Self::write_to_chunk
/// [`write_chunk`]: Self::write_chunk
/// [`finish_current_chunk`]: Self::finish_current_chunk
/// [`close`]: Self::close
pub struct ChunkedWriter<W, C> {
    stream: W,
    items: Vec<LazItem>,
    chunk_size: u32,
    variable_size_chunks: bool,
    record_size: usize,
    seekable: bool,
    placeholder_position: u64,
    chunk_table: ChunkTable,
    wrappers: BTreeMap<u32, ChunkWrapper<C>>,
    /// Chunk used by the points that are written without a key
    default_key: u32,
    /// Key of the next chunk to be written to the destination
    next_key: u32,
    /// Position where the next chunk will be written
    end: u64,
    closed: bool,
}

impl<W, C> ChunkedWriter<W, C>
where
    W: Write + Seek + ByteStream,
    C: RecordCompressor<Cursor<Vec<u8>>> + FromLazItems<Cursor<Vec<u8>>>,
{
    /// Creates a writer, the offset to the chunk table is written right away
    pub fn new(mut stream: W, config: &ZipConfiguration) -> crate::Result<Self> {
        if !config.compressor().is_chunked() {
            return Err(LasZipError::UnsupportedCompressorType(config.compressor()));
        }
        config.validate(0)?;
        let record_size =
            C::from_laz_items(Cursor::new(Vec::new()), config.items())?.record_size();

        stream.switch_segment(Segment::PointData)?;
        let seekable = stream.is_seekable();
        if !seekable {
            warn!("stream is not seekable, the offset to the chunk table will follow the table");
        }
        let placeholder_position = write_chunk_table_offset_placeholder(&mut stream)?;

        Ok(Self {
            stream,
            items: config.items().to_vec(),
            chunk_size: config.chunk_size(),
            variable_size_chunks: config.uses_variable_size_chunks(),
            record_size,
            seekable,
            placeholder_position,
            chunk_table: ChunkTable::default(),
            wrappers: BTreeMap::new(),
            default_key: 0,
            next_key: 0,
            end: placeholder_position + CHUNK_TABLE_OFFSET_SIZE,
            closed: false,
        })
    }

    fn check_point_size(&self, point: &[u8]) -> crate::Result<()> {
        if point.len() != self.record_size {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: point.len(),
                point_size: self.record_size,
            });
        }
        Ok(())
    }

    /// Compresses the point into the current chunk
    pub fn write_next(&mut self, point: &[u8]) -> crate::Result<()> {
        self.check_point_size(point)?;
        loop {
            if self.default_key < self.next_key {
                self.default_key = self.next_key;
            }
            match self.wrappers.get(&self.default_key) {
                Some(wrapper) if wrapper.finalized => self.default_key += 1,
                _ => break,
            }
        }
        self.write_to(self.default_key, point)
    }

    /// Compresses all the points contained in the `points` slice
    pub fn write_many(&mut self, points: &[u8]) -> crate::Result<()> {
        if self.record_size == 0 || points.len() % self.record_size != 0 {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: points.len(),
                point_size: self.record_size,
            });
        }
        for point in points.chunks_exact(self.record_size) {
            self.write_next(point)?;
        }
        Ok(())
    }

    /// Compresses the point into the chunk with the given key.
    ///
    /// Keys are the indices of the chunks in the output,
    /// a new key must be the one just after the highest key in use.
    pub fn write_to_chunk(&mut self, key: u32, point: &[u8]) -> crate::Result<()> {
        self.check_point_size(point)?;
        if let Some(wrapper) = self.wrappers.get(&key) {
            if wrapper.finalized {
                return Err(LasZipError::ChunkFull { key });
            }
        }
        self.write_to(key, point)
    }

    fn write_to(&mut self, key: u32, point: &[u8]) -> crate::Result<()> {
        let full_size = if self.variable_size_chunks {
            None
        } else {
            Some(u64::from(self.chunk_size))
        };
        let wrapper = self.wrapper_for(key)?;
        wrapper.record_compressor.compress_next(point)?;
        wrapper.point_count += 1;
        if Some(wrapper.point_count) == full_size {
            self.finalize(key)?;
        }
        Ok(())
    }

    fn wrapper_for(&mut self, key: u32) -> crate::Result<&mut ChunkWrapper<C>> {
        if key < self.next_key {
            return Err(LasZipError::InvalidChunkKey {
                key,
                reason: "the chunk was already written",
            });
        }
        let next_new_key = self.next_key.saturating_add(self.wrappers.len() as u32);
        if key > next_new_key {
            return Err(LasZipError::InvalidChunkKey {
                key,
                reason: "the chunks before it were not started",
            });
        }
        let wrapper = match self.wrappers.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(ChunkWrapper {
                record_compressor: C::from_laz_items(Cursor::new(Vec::new()), &self.items)?,
                point_count: 0,
                finalized: false,
            }),
        };
        Ok(wrapper)
    }

    /// Ends the chunk the points without key go to.
    ///
    /// Only valid for variable-size chunks.
    /// Does nothing if no point was written to the chunk.
    pub fn finish_current_chunk(&mut self) -> crate::Result<()> {
        if !self.variable_size_chunks {
            return Err(LasZipError::NotVariablyChunked);
        }
        let key = self.default_key;
        match self.wrappers.get(&key) {
            Some(wrapper) if !wrapper.finalized => {
                self.finalize(key)?;
                self.default_key = key + 1;
            }
            _ => {}
        }
        Ok(())
    }

    /// Ends the chunk with the given key.
    ///
    /// Only valid for variable-size chunks.
    pub fn finish_chunk(&mut self, key: u32) -> crate::Result<()> {
        if !self.variable_size_chunks {
            return Err(LasZipError::NotVariablyChunked);
        }
        if !self.wrappers.contains_key(&key) {
            return Err(LasZipError::InvalidChunkKey {
                key,
                reason: "no point was written to the chunk",
            });
        }
        self.finalize(key)
    }

    /// Writes the points as one chunk.
    ///
    /// Only valid for variable-size chunks, `points` must hold exactly `point_count` points.
    pub fn write_chunk(&mut self, points: &[u8], point_count: u64) -> crate::Result<()> {
        if !self.variable_size_chunks {
            return Err(LasZipError::NotVariablyChunked);
        }
        if self.record_size == 0 || points.len() % self.record_size != 0 {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: points.len(),
                point_size: self.record_size,
            });
        }
        let actual = (points.len() / self.record_size) as u64;
        if actual != point_count {
            return Err(LasZipError::NotEnoughPoints {
                expected: point_count,
                actual,
            });
        }
        if point_count == 0 {
            return Ok(());
        }
        self.finish_current_chunk()?;
        self.write_many(points)?;
        self.finish_current_chunk()
    }

    fn finalize(&mut self, key: u32) -> crate::Result<()> {
        if let Some(wrapper) = self.wrappers.get_mut(&key) {
            if !wrapper.finalized {
                wrapper.record_compressor.done()?;
                wrapper.finalized = true;
                debug!(chunk = key, points = wrapper.point_count, "finalized chunk");
            }
        }
        self.record_ready()
    }

    /// Writes the finalized chunks that have no unwritten chunk before them
    fn record_ready(&mut self) -> crate::Result<()> {
        loop {
            let key = self.next_key;
            match self.wrappers.get(&key) {
                Some(wrapper) if wrapper.finalized => {}
                _ => break,
            }
            let wrapper = match self.wrappers.remove(&key) {
                Some(wrapper) => wrapper,
                None => break,
            };
            let bytes = wrapper.record_compressor.into_inner().into_inner();

            self.stream.switch_segment(Segment::Chunk(key))?;
            self.stream.write_all(&bytes)?;
            self.chunk_table.push(ChunkTableEntry {
                point_count: wrapper.point_count,
                byte_count: bytes.len() as u64,
            });
            trace!(chunk = key, offset = self.end, bytes = bytes.len(), "wrote chunk");
            self.end += bytes.len() as u64;
            self.next_key += 1;
        }
        Ok(())
    }

    /// Writes the chunks still in memory and the chunk table.
    ///
    /// Must be called when all the points are written,
    /// calling it again does nothing.
    pub fn close(&mut self) -> crate::Result<()> {
        if self.closed {
            return Ok(());
        }
        if !self.variable_size_chunks {
            let last_key = self.wrappers.keys().next_back().copied();
            for (&key, wrapper) in &self.wrappers {
                if Some(key) != last_key && wrapper.point_count < u64::from(self.chunk_size) {
                    return Err(LasZipError::ChunkNotFull {
                        key,
                        point_count: wrapper.point_count,
                        chunk_size: self.chunk_size,
                    });
                }
            }
        }
        let keys: Vec<u32> = self.wrappers.keys().copied().collect();
        for key in keys {
            self.finalize(key)?;
        }

        self.stream.switch_segment(Segment::ChunkTableHeader)?;
        let table_start = self.stream.seek(SeekFrom::Current(0))?;
        if self.seekable {
            update_chunk_table_offset(&mut self.stream, self.placeholder_position)?;
        }
        self.chunk_table.write_header_to(&mut self.stream)?;
        self.stream.switch_segment(Segment::ChunkTable)?;
        self.chunk_table
            .write_entries_to(&mut self.stream, self.variable_size_chunks)?;
        if !self.seekable {
            self.stream.write_i64::<LittleEndian>(table_start as i64)?;
        }
        self.stream.flush()?;
        debug!(
            chunks = self.chunk_table.len(),
            offset = table_start,
            "wrote chunk table"
        );
        self.closed = true;
        Ok(())
    }

    /// The number of points of each chunk, known once the writer is closed
    pub fn chunk_totals(&self) -> Option<Vec<u64>> {
        if self.closed {
            Some(
                self.chunk_table
                    .as_ref()
                    .iter()
                    .map(|entry| entry.point_count)
                    .collect(),
            )
        } else {
            None
        }
    }

    /// Table of the chunks written so far
    pub fn chunk_table(&self) -> &ChunkTable {
        &self.chunk_table
    }

    /// Key of the chunk the points without key go to
    pub fn chunk_index(&self) -> u32 {
        self.default_key
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
