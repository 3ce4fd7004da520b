//! The chunk table: where it is, how its entries are coded.
//!
//! The point data starts with the offset to the table (an `i64`), the table
//! itself follows the last chunk: an 8 byte header then the entries, arithmetic
//! coded as deltas of the previous entry.
use std::convert::TryFrom;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Index;
use std::slice::SliceIndex;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::compressors::IntegerCompressorBuilder;
use crate::decoders::ArithmeticDecoder;
use crate::decompressors::IntegerDecompressorBuilder;
use crate::encoders::ArithmeticEncoder;
use crate::laszip::{ByteStream, ZipConfiguration};
use crate::LasZipError;

// integer coder contexts
const POINT_COUNT_CONTEXT: u32 = 0;
const BYTE_COUNT_CONTEXT: u32 = 1;

/// Converts a number of elements to the integer type its count is stored as.
///
/// A count that does not fit is an error, it is never truncated.
pub(crate) fn count_field<T: TryFrom<usize>>(count: usize, what: &str) -> std::io::Result<T> {
    T::try_from(count).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} {} are too many to be counted", count, what),
        )
    })
}

/// Value of the chunk table offset when the writer could not go back to update it.
///
/// The real offset is then the last 8 bytes of the data.
pub const UNKNOWN_CHUNK_TABLE_OFFSET: i64 = -1;

/// Size in bytes of the offset to the chunk table.
///
/// These bytes are the very first ones of the point data.
pub const CHUNK_TABLE_OFFSET_SIZE: u64 = 8;

/// Number of entries the writer reserves the first time
const INITIAL_WRITER_CAPACITY: usize = 1024;

/// Size of one compressed chunk, in points and in bytes.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChunkTableEntry {
    pub point_count: u64,
    pub byte_count: u64,
}

/// The 8 bytes that precede the entries
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChunkTableHeader {
    pub version: u32,
    pub number_of_chunks: u32,
}

impl ChunkTableHeader {
    pub const SIZE: u64 = 8;

    pub fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
        let version = src.read_u32::<LittleEndian>()?;
        let number_of_chunks = src.read_u32::<LittleEndian>()?;
        Ok(Self {
            version,
            number_of_chunks,
        })
    }

    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u32::<LittleEndian>(self.version)?;
        dst.write_u32::<LittleEndian>(self.number_of_chunks)?;
        Ok(())
    }
}

/// One entry per chunk, in chunk order.
///
/// Point counts are only stored for variable-size chunks,
/// fixed-size chunks all hold `chunk_size` points.
#[derive(Default, Debug, Clone, Eq, PartialEq)]
pub struct ChunkTable(Vec<ChunkTableEntry>);

impl ChunkTable {
    /// Follows the offset at the current position of `src` and reads the table.
    ///
    /// `src` must be positioned on the offset, at the start of the point data.
    /// It is left on the first chunk.
    ///
    /// With fixed-size chunks every entry gets `chunk_size` points,
    /// which overstates the last chunk when it is not full.
    pub fn read_from<R: Read + Seek + ByteStream>(
        mut src: R,
        config: &ZipConfiguration,
    ) -> crate::Result<Self> {
        let data_start = src.seek(SeekFrom::Current(0))?;
        let chunk_table_start =
            read_chunk_table_offset(&mut src, data_start)?.ok_or(LasZipError::MissingChunkTable)?;
        src.seek(SeekFrom::Start(chunk_table_start))?;
        let mut chunk_table = ChunkTable::default();
        chunk_table.read_into(&mut src, config.uses_variable_size_chunks())?;
        src.seek(SeekFrom::Start(data_start + CHUNK_TABLE_OFFSET_SIZE))?;

        if !config.uses_variable_size_chunks() {
            for entry in &mut chunk_table.0 {
                entry.point_count = u64::from(config.chunk_size());
            }
        }
        Ok(chunk_table)
    }

    /// Reads the header and the entries of a chunk table.
    ///
    /// The `src` position **must** be at the start of the chunk table.
    ///
    /// The entries are pushed as they are decoded: when an error is returned,
    /// `self` holds the entries decoded before the failure.
    pub fn read_into<R: Read>(
        &mut self,
        mut src: &mut R,
        contains_point_count: bool,
    ) -> crate::Result<()> {
        let header = ChunkTableHeader::read_from(&mut src)?;
        if header.version != 0 {
            return Err(LasZipError::CorruptChunkTable(format!(
                "unknown chunk table version {}",
                header.version
            )));
        }
        if header.number_of_chunks == 0 {
            return Ok(());
        }

        let mut decompressor = IntegerDecompressorBuilder::new()
            .bits(32)
            .contexts(2)
            .build();
        let mut decoder = ArithmeticDecoder::new(&mut src);
        decoder.read_init_bytes()?;

        let mut previous_entry = ChunkTableEntry::default();
        for _ in 0..header.number_of_chunks {
            let mut current_entry = ChunkTableEntry::default();
            if contains_point_count {
                current_entry.point_count = u64::from(decompressor.decompress(
                    &mut decoder,
                    previous_entry.point_count as i32,
                    POINT_COUNT_CONTEXT,
                )? as u32);
            }
            current_entry.byte_count = u64::from(decompressor.decompress(
                &mut decoder,
                previous_entry.byte_count as i32,
                BYTE_COUNT_CONTEXT,
            )? as u32);

            self.push(current_entry);
            previous_entry = current_entry;
        }
        Ok(())
    }

    /// Writes the header and the entries of the chunk table.
    ///
    /// When the table is empty, only the header is written.
    pub fn write_to<W: Write>(&self, mut dst: W, write_point_count: bool) -> std::io::Result<()> {
        self.write_header_to(&mut dst)?;
        self.write_entries_to(&mut dst, write_point_count)
    }

    pub(crate) fn write_header_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        ChunkTableHeader {
            version: 0,
            number_of_chunks: count_field(self.len(), "chunks")?,
        }
        .write_to(dst)
    }

    pub(crate) fn write_entries_to<W: Write>(
        &self,
        mut dst: &mut W,
        write_point_count: bool,
    ) -> std::io::Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let mut encoder = ArithmeticEncoder::new(&mut dst);
        let mut compressor = IntegerCompressorBuilder::new().bits(32).contexts(2).build();

        let mut previous_entry = ChunkTableEntry::default();
        for current_entry in &self.0 {
            if write_point_count {
                compressor.compress(
                    &mut encoder,
                    previous_entry.point_count as i32,
                    current_entry.point_count as i32,
                    POINT_COUNT_CONTEXT,
                )?;
                previous_entry.point_count = current_entry.point_count;
            }
            compressor.compress(
                &mut encoder,
                previous_entry.byte_count as i32,
                current_entry.byte_count as i32,
                BYTE_COUNT_CONTEXT,
            )?;
            previous_entry.byte_count = current_entry.byte_count;
        }
        encoder.done()?;
        Ok(())
    }
}

impl ChunkTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Adds an entry, growing by 1024 entries first, then by doubling.
    pub fn push(&mut self, entry: ChunkTableEntry) {
        if self.0.len() == self.0.capacity() {
            let additional = self.0.capacity().max(INITIAL_WRITER_CAPACITY);
            self.0.reserve_exact(additional);
        }
        self.0.push(entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.0.capacity()
    }

    /// Total number of points in the chunks
    pub fn point_count(&self) -> u64 {
        self.0.iter().map(|entry| entry.point_count).sum()
    }
}

impl AsRef<[ChunkTableEntry]> for ChunkTable {
    fn as_ref(&self) -> &[ChunkTableEntry] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ChunkTable {
    type Item = &'a ChunkTableEntry;
    type IntoIter = std::slice::Iter<'a, ChunkTableEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<I> Index<I> for ChunkTable
where
    I: SliceIndex<[ChunkTableEntry]>,
{
    type Output = <I as SliceIndex<[ChunkTableEntry]>>::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.0[index]
    }
}

/// Writes the 8 bytes reserved for the offset to the chunk table.
///
/// Seekable destinations get the position of the placeholder itself,
/// as the real value is written over it once known.
/// Other destinations get [`UNKNOWN_CHUNK_TABLE_OFFSET`].
///
/// Returns the position of the placeholder.
pub(crate) fn write_chunk_table_offset_placeholder<W: Write + Seek + ByteStream>(
    dst: &mut W,
) -> std::io::Result<u64> {
    let position = dst.seek(SeekFrom::Current(0))?;
    let placeholder = if dst.is_seekable() {
        position as i64
    } else {
        UNKNOWN_CHUNK_TABLE_OFFSET
    };
    dst.write_i64::<LittleEndian>(placeholder)?;
    Ok(position)
}

/// Overwrites the placeholder at `placeholder_position` with the current
/// position of `dst`, where the chunk table starts.
///
/// `dst` is put back where it was.
pub(crate) fn update_chunk_table_offset<W: Write + Seek>(
    dst: &mut W,
    placeholder_position: u64,
) -> std::io::Result<()> {
    let table_position = dst.seek(SeekFrom::Current(0))?;
    dst.seek(SeekFrom::Start(placeholder_position))?;
    dst.write_i64::<LittleEndian>(table_position as i64)?;
    dst.seek(SeekFrom::Start(table_position))?;
    Ok(())
}

/// Reads the offset to the chunk table.
///
/// `src` must be on the offset, which is at `data_start`.
/// Returns `None` when the writer never wrote a chunk table.
///
/// The position of `src` is left wherever the offset was read.
pub(crate) fn read_chunk_table_offset<R: Read + Seek>(
    src: &mut R,
    data_start: u64,
) -> std::io::Result<Option<u64>> {
    let mut offset = src.read_i64::<LittleEndian>()?;
    if offset == data_start as i64 {
        return Ok(None);
    }
    if offset == UNKNOWN_CHUNK_TABLE_OFFSET {
        // The writer could not update the offset,
        // so it was written at the end of the data
        src.seek(SeekFrom::End(-(CHUNK_TABLE_OFFSET_SIZE as i64)))?;
        offset = src.read_i64::<LittleEndian>()?;
        if offset == UNKNOWN_CHUNK_TABLE_OFFSET || offset == data_start as i64 {
            return Ok(None);
        }
    }

    if offset < (data_start + CHUNK_TABLE_OFFSET_SIZE) as i64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "offset to chunk table ({}) is before the points ({})",
                offset, data_start
            ),
        ));
    }
    Ok(Some(offset as u64))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::laszip::ForwardOnly;

    fn entries(counts: &[(u64, u64)]) -> ChunkTable {
        let mut table = ChunkTable::default();
        for &(point_count, byte_count) in counts {
            table.push(ChunkTableEntry {
                point_count,
                byte_count,
            });
        }
        table
    }

    #[test]
    fn variable_table_round_trip() {
        let table = entries(&[(50, 1234), (50, 1100), (7, 90)]);
        let mut bytes = Vec::new();
        table.write_to(&mut bytes, true).unwrap();

        let mut read_back = ChunkTable::default();
        read_back
            .read_into(&mut Cursor::new(bytes), true)
            .unwrap();
        assert_eq!(read_back, table);
        assert_eq!(read_back.point_count(), 107);
    }

    #[test]
    fn counts_are_never_truncated() {
        assert_eq!(count_field::<u16>(usize::from(u16::MAX), "items").unwrap(), u16::MAX);
        let error = count_field::<u16>(usize::from(u16::MAX) + 1, "items").unwrap_err();
        assert_eq!(error.kind(), std::io::ErrorKind::InvalidInput);
        #[cfg(target_pointer_width = "64")]
        assert!(count_field::<u32>(u32::MAX as usize + 1, "chunks").is_err());
    }

    #[test]
    fn empty_table_has_no_body() {
        let mut bytes = Vec::new();
        ChunkTable::default().write_to(&mut bytes, false).unwrap();
        assert_eq!(bytes, vec![0u8; 8]);
    }

    #[test]
    fn truncated_table_keeps_decoded_entries() {
        let table = entries(&(0..200).map(|i| (0, 1000 + i * 37)).collect::<Vec<_>>());
        let mut bytes = Vec::new();
        table.write_to(&mut bytes, false).unwrap();
        bytes.truncate(bytes.len() / 2);

        let mut read_back = ChunkTable::default();
        let result = read_back.read_into(&mut Cursor::new(bytes), false);
        assert!(result.is_err());
        assert!(read_back.len() < table.len());
        assert_eq!(read_back[..], table[..read_back.len()]);
    }

    #[test]
    fn unknown_version_is_corrupt() {
        let mut bytes = Vec::new();
        ChunkTableHeader {
            version: 3,
            number_of_chunks: 1,
        }
        .write_to(&mut bytes)
        .unwrap();
        let result = ChunkTable::default().read_into(&mut Cursor::new(bytes), false);
        assert!(matches!(result, Err(LasZipError::CorruptChunkTable(_))));
    }

    #[test]
    fn writer_growth_policy() {
        let mut table = ChunkTable::default();
        table.push(ChunkTableEntry::default());
        assert_eq!(table.capacity(), 1024);
        for _ in 1..1025 {
            table.push(ChunkTableEntry::default());
        }
        assert_eq!(table.capacity(), 2048);
    }

    #[test]
    fn placeholder_depends_on_seekability() {
        let mut seekable = Cursor::new(vec![0u8; 4]);
        seekable.set_position(4);
        assert_eq!(write_chunk_table_offset_placeholder(&mut seekable).unwrap(), 4);
        seekable.set_position(4);
        assert_eq!(read_chunk_table_offset(&mut seekable, 4).unwrap(), None);

        let mut forward_only = ForwardOnly::new(Vec::new());
        write_chunk_table_offset_placeholder(&mut forward_only).unwrap();
        assert_eq!(forward_only.into_inner(), (-1i64).to_le_bytes().to_vec());
    }

    #[test]
    fn offset_at_the_end() {
        let mut data = Vec::new();
        data.extend_from_slice(&(-1i64).to_le_bytes());
        data.extend_from_slice(&[0u8; 16]);
        data.extend_from_slice(&20i64.to_le_bytes());
        let mut src = Cursor::new(data);
        assert_eq!(read_chunk_table_offset(&mut src, 0).unwrap(), Some(20));
    }

    #[test]
    fn update_offset() {
        let mut dst = Cursor::new(Vec::new());
        let position = write_chunk_table_offset_placeholder(&mut dst).unwrap();
        dst.write_all(&[1, 2, 3]).unwrap();
        update_chunk_table_offset(&mut dst, position).unwrap();
        assert_eq!(dst.position(), 11);
        assert_eq!(&dst.get_ref()[..8], &11i64.to_le_bytes());
    }
}
