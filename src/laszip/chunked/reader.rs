use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::marker::PhantomData;

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::{debug, trace, warn};

use crate::laszip::chunk_table::{
    read_chunk_table_offset, ChunkTable, CHUNK_TABLE_OFFSET_SIZE,
};
use crate::laszip::{ByteStream, Segment, ZipConfiguration};
use crate::record::{FromLazItems, RecordDecompressor};
use crate::LasZipError;

/// The reader reserves room for this many chunk starts at a time
const STARTS_BATCH: usize = 256;

/// Reads points that are compressed in chunks.
///
/// The chunk table is used to know where chunks start, to check that each chunk
/// ends where the next one starts, and to go to any point without
/// decompressing the chunks before it.
///
/// When the table is missing or damaged (and chunks have a fixed size),
/// it is rebuilt while reading.
pub struct ChunkedReader<R, D> {
    record_decompressor: D,
    chunk_size: u32,
    variable_size_chunks: bool,
    seekable: bool,
    // start offset of the chunks, the ones before `tabled` come from the chunk table,
    // the others were observed while reading
    starts: Vec<u64>,
    tabled: usize,
    // Only for variable-size chunks,
    // totals[i] is the number of points before chunk i
    totals: Vec<u64>,
    // when true, `starts` also holds the end of the last chunk
    table_complete: bool,
    chunk_index: usize,
    points_read_in_chunk: u64,
    points_in_chunk: u64,
    point_index: u64,
    scratch: Vec<u8>,
    _stream: PhantomData<R>,
}

impl<R, D> ChunkedReader<R, D>
where
    R: Read + Seek + ByteStream,
    D: RecordDecompressor<R> + FromLazItems<R>,
{
    /// Creates a reader on a stream positioned at the start of the point data,
    /// that is, on the offset to the chunk table.
    pub fn new(mut stream: R, config: &ZipConfiguration) -> crate::Result<Self> {
        if !config.compressor().is_chunked() {
            return Err(LasZipError::UnsupportedCompressorType(config.compressor()));
        }
        config.validate(0)?;

        stream.switch_segment(Segment::PointData)?;
        let data_start = stream.seek(SeekFrom::Current(0))?;
        let points_start = data_start + CHUNK_TABLE_OFFSET_SIZE;
        let variable_size_chunks = config.uses_variable_size_chunks();
        let seekable = stream.is_seekable();

        let mut reader = Self {
            record_decompressor: D::from_laz_items(stream, config.items())?,
            chunk_size: config.chunk_size(),
            variable_size_chunks,
            seekable,
            starts: Vec::new(),
            tabled: 0,
            totals: Vec::new(),
            table_complete: false,
            chunk_index: 0,
            points_read_in_chunk: 0,
            points_in_chunk: 0,
            point_index: 0,
            scratch: vec![0u8; config.items_size() as usize],
            _stream: PhantomData,
        };
        reader.acquire_chunk_table(data_start)?;

        if reader.seekable {
            reader.stream_mut().seek(SeekFrom::Start(points_start))?;
        }
        reader.stream_mut().switch_segment(Segment::Chunk(0))?;
        reader.begin_chunk()?;
        Ok(reader)
    }

    /// Finds and decodes the chunk table, the stream is left somewhere
    /// after the offset to the chunk table.
    fn acquire_chunk_table(&mut self, data_start: u64) -> crate::Result<()> {
        let points_start = data_start + CHUNK_TABLE_OFFSET_SIZE;
        let variable_size_chunks = self.variable_size_chunks;

        let table_offset = if self.seekable {
            match read_chunk_table_offset(self.stream_mut(), data_start) {
                Ok(offset) => offset,
                Err(error) if error.kind() == ErrorKind::UnexpectedEof => None,
                Err(error) => {
                    let empty = ChunkTable::default();
                    return self.salvage(points_start, None, &empty, error.into());
                }
            }
        } else {
            let offset = self.stream_mut().read_i64::<LittleEndian>()?;
            if offset != data_start as i64 {
                if variable_size_chunks {
                    return Err(LasZipError::NotSeekable);
                }
                warn!("stream is not seekable, reading without the chunk table");
                self.seed(points_start);
                return Ok(());
            }
            None
        };

        let table_offset = match table_offset {
            Some(offset) => offset,
            None => {
                if variable_size_chunks {
                    return Err(LasZipError::MissingChunkTable);
                }
                warn!("no chunk table was written, it will be rebuilt while reading");
                self.seed(points_start);
                return Ok(());
            }
        };

        let mut chunk_table = ChunkTable::default();
        let result = self
            .stream_mut()
            .seek(SeekFrom::Start(table_offset))
            .map_err(LasZipError::from)
            .and_then(|_| {
                chunk_table.read_into(self.record_decompressor.get_mut(), variable_size_chunks)
            });
        if let Err(error) = result {
            return self.salvage(points_start, Some(table_offset), &chunk_table, error);
        }

        let valid = self.use_entries(points_start, table_offset, &chunk_table);
        if valid != chunk_table.len() {
            let error = LasZipError::CorruptChunkTable(format!(
                "entry {} does not describe a chunk within the point data",
                valid
            ));
            return self.salvage(points_start, Some(table_offset), &chunk_table, error);
        }
        self.table_complete = true;
        debug!(
            chunks = chunk_table.len(),
            offset = table_offset,
            "decoded chunk table"
        );
        Ok(())
    }

    /// Keeps what can be kept from a damaged chunk table.
    fn salvage(
        &mut self,
        points_start: u64,
        table_offset: Option<u64>,
        chunk_table: &ChunkTable,
        error: LasZipError,
    ) -> crate::Result<()> {
        if self.variable_size_chunks {
            return Err(match error {
                error @ LasZipError::CorruptChunkTable(_) => error,
                other => LasZipError::CorruptChunkTable(other.to_string()),
            });
        }
        let table_offset = table_offset.unwrap_or(u64::MAX);
        let valid = self.use_entries(points_start, table_offset, chunk_table);
        warn!(
            error = %error,
            salvaged_entries = valid,
            "chunk table is damaged, it will be rebuilt while reading"
        );
        Ok(())
    }

    /// Turns entries into chunk starts, up to the first entry that is not valid.
    ///
    /// Returns the number of entries used.
    fn use_entries(
        &mut self,
        points_start: u64,
        table_offset: u64,
        chunk_table: &ChunkTable,
    ) -> usize {
        self.starts.clear();
        self.totals.clear();
        self.push_start(points_start);
        if self.variable_size_chunks {
            self.totals.push(0);
        }

        let mut start = points_start;
        let mut total = 0u64;
        let mut valid = 0;
        for entry in chunk_table {
            let end = start + entry.byte_count;
            if entry.byte_count == 0
                || end > table_offset
                || (self.variable_size_chunks && entry.point_count == 0)
            {
                break;
            }
            self.push_start(end);
            if self.variable_size_chunks {
                total += entry.point_count;
                self.totals.push(total);
            }
            start = end;
            valid += 1;
        }
        self.tabled = self.starts.len();
        valid
    }

    /// Starts without any table, only the start of the first chunk is known
    fn seed(&mut self, points_start: u64) {
        self.starts.clear();
        self.push_start(points_start);
        self.tabled = 1;
    }

    fn push_start(&mut self, start: u64) {
        if self.starts.len() == self.starts.capacity() {
            self.starts.reserve_exact(STARTS_BATCH);
        }
        self.starts.push(start);
    }

    fn stream_mut(&mut self) -> &mut R {
        self.record_decompressor.get_mut()
    }

    fn stream_position(&mut self) -> std::io::Result<u64> {
        self.stream_mut().stream_position()
    }

    /// Number of chunks, when the chunk table was fully decoded
    pub fn number_of_chunks(&self) -> Option<usize> {
        if self.table_complete {
            Some(self.starts.len() - 1)
        } else {
            None
        }
    }

    fn is_past_last_chunk(&self, index: usize) -> bool {
        self.number_of_chunks()
            .map_or(false, |number_of_chunks| index >= number_of_chunks)
    }

    /// Number of points in the chunk, as far as the table and configuration tell
    fn points_in_chunk(&self, index: usize) -> u64 {
        if self.variable_size_chunks {
            match (self.totals.get(index), self.totals.get(index + 1)) {
                (Some(start), Some(end)) => end - start,
                _ => u64::MAX,
            }
        } else {
            u64::from(self.chunk_size)
        }
    }

    fn first_point_of_chunk(&self, index: usize) -> u64 {
        if self.variable_size_chunks {
            self.totals.get(index).copied().unwrap_or(u64::MAX)
        } else {
            index as u64 * u64::from(self.chunk_size)
        }
    }

    /// Prepares the decompression of the current chunk,
    /// the stream must be at its start.
    fn begin_chunk(&mut self) -> crate::Result<()> {
        self.record_decompressor.reset();
        self.points_read_in_chunk = 0;
        self.points_in_chunk = self.points_in_chunk(self.chunk_index);
        let index = self.chunk_index;
        if let (Some(&start), Some(&end)) = (self.starts.get(index), self.starts.get(index + 1)) {
            self.stream_mut().cache(start, end - start)?;
        }
        Ok(())
    }

    fn start_next_chunk(&mut self) -> crate::Result<()> {
        let next = self.chunk_index + 1;
        if self.is_past_last_chunk(next) {
            return Err(LasZipError::ReadPastEnd);
        }

        let position = self.stream_position()?;
        if next < self.tabled && self.starts[next] != position {
            return Err(LasZipError::PreviousChunkCorrupt {
                chunk_index: next - 1,
                expected: self.starts[next],
                actual: position,
            });
        }
        self.stream_mut().switch_segment(Segment::Chunk(next as u32))?;
        if next == self.starts.len() {
            self.push_start(position);
        }
        self.chunk_index = next;
        trace!(chunk = next, offset = position, "starting chunk");
        self.begin_chunk()
    }

    /// Decompresses the next point into `out`.
    pub fn read_next(&mut self, out: &mut [u8]) -> crate::Result<()> {
        let point_size = self.record_decompressor.record_size();
        if out.len() != point_size {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: out.len(),
                point_size,
            });
        }
        if self.points_read_in_chunk >= self.points_in_chunk {
            self.start_next_chunk()?;
        }
        let first_of_chunk = self.points_read_in_chunk == 0;
        if first_of_chunk && self.is_past_last_chunk(self.chunk_index) {
            return Err(LasZipError::ReadPastEnd);
        }
        let in_last_chunk = self.is_past_last_chunk(self.chunk_index + 1);

        if let Err(error) = self.record_decompressor.decompress_next(out) {
            if error.kind() == ErrorKind::UnexpectedEof {
                if in_last_chunk {
                    self.points_in_chunk = self.points_read_in_chunk;
                    return Err(LasZipError::ReadPastEnd);
                }
                // Without a complete table, the end of the last chunk is
                // only found by running into the end of the stream.
                if first_of_chunk && !self.table_complete {
                    return Err(LasZipError::ReadPastEnd);
                }
            }
            return Err(error.into());
        }
        match self.record_decompressor.chunk_point_count() {
            Some(count) if first_of_chunk => {
                self.check_chunk_point_count(count)?;
                self.points_in_chunk = count;
            }
            Some(_) => {}
            None if in_last_chunk && !self.variable_size_chunks => {
                // The count of the last fixed-size chunk is not stored, a point
                // that needed bytes past the chunk was not part of it.
                let end = self.starts[self.chunk_index + 1];
                if self.stream_position()? > end {
                    self.points_in_chunk = self.points_read_in_chunk;
                    return Err(LasZipError::ReadPastEnd);
                }
            }
            None => {}
        }
        self.points_read_in_chunk += 1;
        self.point_index += 1;
        Ok(())
    }

    /// Checks the point count a chunk stores against the table and the chunk size.
    fn check_chunk_point_count(&self, count: u64) -> crate::Result<()> {
        let index = self.chunk_index;
        let expected = self.points_in_chunk(index);
        let valid = if self.variable_size_chunks {
            expected == u64::MAX || count == expected
        } else {
            // only the last chunk may be short
            let may_be_short = !self.table_complete || self.is_past_last_chunk(index + 1);
            count == expected || (may_be_short && count > 0 && count < expected)
        };
        if valid {
            Ok(())
        } else {
            Err(LasZipError::ChunkPointCountMismatch {
                chunk_index: index,
                expected,
                actual: count,
            })
        }
    }

    /// Decompresses as many points as `out` can hold
    pub fn read_many(&mut self, out: &mut [u8]) -> crate::Result<()> {
        let point_size = self.record_decompressor.record_size();
        if point_size == 0 || out.len() % point_size != 0 {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: out.len(),
                point_size,
            });
        }
        for point in out.chunks_exact_mut(point_size) {
            self.read_next(point)?;
        }
        Ok(())
    }

    /// Goes to the point at index `target`, so that the next point read is that one.
    ///
    /// Returns `Ok(false)` when the point cannot be reached: it does not exist,
    /// or the stream is not seekable and the point was already read.
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

    /// Same as [`move_to_point`](Self::move_to_point),
    /// but yields to the runtime between each point decompressed.
    #[cfg(feature = "async")]
    pub async fn move_to_point_async(&mut self, target: u64) -> crate::Result<bool> {
        let to_skip = match self.prepare_move(target)? {
            Some(to_skip) => to_skip,
            None => return Ok(false),
        };
        for _ in 0..to_skip {
            if !self.skip_one()? {
                return Ok(false);
            }
            tokio::task::yield_now().await;
        }
        Ok(true)
    }

    /// Goes to the first point of the chunk.
    pub fn move_to_chunk(&mut self, index: usize) -> crate::Result<bool> {
        if self.variable_size_chunks && index >= self.totals.len() {
            return Ok(false);
        }
        let target = self.first_point_of_chunk(index);
        self.move_to_point(target)
    }

    /// Decompresses one point, discarding it.
    ///
    /// Returns false when there were no point left.
    fn skip_one(&mut self) -> crate::Result<bool> {
        let mut scratch = std::mem::take(&mut self.scratch);
        let result = self.read_next(&mut scratch);
        self.scratch = scratch;
        match result {
            Ok(()) => Ok(true),
            Err(LasZipError::ReadPastEnd) => Ok(false),
            Err(error) => Err(error),
        }
    }

    /// Positions the decompression as close as possible to `target`.
    ///
    /// Returns the number of points that remain to be skipped,
    /// or None if the target cannot be reached.
    fn prepare_move(&mut self, target: u64) -> crate::Result<Option<u64>> {
        let current = self.point_index;
        if !self.seekable {
            return Ok(target.checked_sub(current));
        }

        let (mut chunk, _) = match self.locate(target) {
            Some(location) => location,
            None => return Ok(None),
        };
        let last_known = self.starts.len() - 1;
        if chunk > last_known {
            chunk = last_known;
        }

        if chunk != self.chunk_index || target < current {
            self.reinitialize_at(chunk)?;
        }
        Ok(Some(target - self.point_index))
    }

    /// Returns the chunk that contains the point and the index of the point in that chunk.
    fn locate(&self, target: u64) -> Option<(usize, u64)> {
        if self.variable_size_chunks {
            let total = *self.totals.last()?;
            if target >= total {
                return None;
            }
            let chunk = self.totals.partition_point(|&first| first <= target) - 1;
            Some((chunk, target - self.totals[chunk]))
        } else {
            let chunk_size = u64::from(self.chunk_size);
            let chunk = (target / chunk_size) as usize;
            if self.is_past_last_chunk(chunk) {
                return None;
            }
            Some((chunk, target % chunk_size))
        }
    }

    fn reinitialize_at(&mut self, chunk: usize) -> crate::Result<()> {
        let start = self.starts[chunk];
        debug!(chunk, offset = start, "re-initializing decompression");
        self.stream_mut().seek(SeekFrom::Start(start))?;
        self.stream_mut().switch_segment(Segment::Chunk(chunk as u32))?;
        self.chunk_index = chunk;
        self.point_index = self.first_point_of_chunk(chunk);
        self.begin_chunk()
    }

    /// Index of the chunk the last point read belongs to
    pub fn chunk_index(&self) -> usize {
        self.chunk_index
    }

    /// Index of the next point that will be read
    pub fn point_index(&self) -> u64 {
        self.point_index
    }

    /// The number of points of each chunk, only known for variable-size chunks
    pub fn chunk_totals(&self) -> Option<Vec<u64>> {
        if self.variable_size_chunks {
            Some(self.totals.windows(2).map(|w| w[1] - w[0]).collect())
        } else {
            None
        }
    }

    /// Start offsets of the chunks known so far
    pub fn chunk_starts(&self) -> &[u64] {
        let known = if self.table_complete {
            self.starts.len() - 1
        } else {
            self.starts.len()
        };
        &self.starts[..known]
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
