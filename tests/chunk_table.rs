use std::io::Cursor;

use laz_chunked::laszip::{ChunkedReader, UNKNOWN_CHUNK_TABLE_OFFSET};
use laz_chunked::record::SequentialPointRecordDecompressor;
use laz_chunked::{
    ChunkTable, ChunkTableEntry, CompressorType, ForwardOnly, LasZipError, LazItem, LazItemType,
    PointReader, PointWriter, ZipConfiguration, ZipConfigurationBuilder,
};

const POINT_SIZE: usize = 20;

fn points(count: usize) -> Vec<u8> {
    (0..count * POINT_SIZE)
        .map(|i| ((i / POINT_SIZE) as u8).wrapping_add((i % POINT_SIZE) as u8 * 11))
        .collect()
}

fn fixed_config(chunk_size: u32) -> ZipConfiguration {
    ZipConfigurationBuilder::new(vec![LazItem::new(LazItemType::Point10, 2)])
        .with_chunk_size(chunk_size)
        .build()
}

fn variable_config() -> ZipConfiguration {
    ZipConfigurationBuilder::new(vec![LazItem::new(LazItemType::Point10, 2)])
        .with_variable_chunk_size()
        .build()
}

fn layered_config(chunk_size: u32) -> ZipConfiguration {
    ZipConfigurationBuilder::new(vec![LazItem::new(LazItemType::Byte14(POINT_SIZE as u16), 3)])
        .with_compressor(CompressorType::LayeredChunked)
        .with_chunk_size(chunk_size)
        .build()
}

fn compress(points: &[u8], config: &ZipConfiguration) -> Vec<u8> {
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), config).unwrap();
    writer.write_many(points).unwrap();
    writer.close().unwrap();
    writer.into_inner().into_inner()
}

fn table_offset(data: &[u8]) -> usize {
    let mut offset = [0u8; 8];
    offset.copy_from_slice(&data[..8]);
    i64::from_le_bytes(offset) as usize
}

fn read_all(reader: &mut PointReader<Cursor<Vec<u8>>>, count: usize) -> Vec<u8> {
    let mut read = vec![0u8; count * POINT_SIZE];
    reader.read_many(&mut read).unwrap();
    read
}

#[test]
fn chunk_totals_add_up_to_the_point_count() {
    let config = fixed_config(64);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_many(&points(1_000)).unwrap();
    assert_eq!(writer.chunk_totals(), None);
    writer.close().unwrap();

    let totals = writer.chunk_totals().unwrap();
    assert_eq!(totals.iter().sum::<u64>(), 1_000);
    assert_eq!(totals.len(), 16);
    assert!(totals[..15].iter().all(|&total| total == 64));
    assert_eq!(totals[15], 1_000 - 15 * 64);
}

#[test]
fn the_table_is_read_back() {
    let config = fixed_config(30);
    let data = compress(&points(100), &config);

    let table = ChunkTable::read_from(Cursor::new(&data), &config).unwrap();
    assert_eq!(table.len(), 4);
    // entries of fixed-size chunks all say chunk_size points
    assert!(table.into_iter().all(|entry| entry.point_count == 30));
    let chunk_bytes: u64 = table.into_iter().map(|entry| entry.byte_count).sum();
    assert_eq!(8 + chunk_bytes as usize, table_offset(&data));
}

#[test]
fn a_table_that_was_never_written_is_rebuilt() {
    let config = fixed_config(10);
    let points = points(25);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_many(&points).unwrap();
    // not closed: the 2 full chunks are written, the offset still points to itself
    let data = writer.into_inner().into_inner();
    assert_eq!(table_offset(&data), 0);

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    assert_eq!(read_all(&mut reader, 20), &points[..20 * POINT_SIZE]);
    let mut point = [0u8; POINT_SIZE];
    assert!(matches!(
        reader.read_next(&mut point),
        Err(LasZipError::ReadPastEnd)
    ));

    // the chunks found while reading can be jumped to
    assert!(reader.move_to_point(13).unwrap());
    reader.read_next(&mut point).unwrap();
    assert_eq!(&point[..], &points[13 * POINT_SIZE..14 * POINT_SIZE]);
}

#[test]
fn seeking_forward_without_table_discovers_the_chunks() {
    let config = fixed_config(10);
    let points = points(45);
    let mut data = compress(&points, &config);
    // make the offset point to itself, as if the writer never closed
    data[..8].copy_from_slice(&0i64.to_le_bytes());

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    let mut point = [0u8; POINT_SIZE];
    assert!(reader.move_to_point(37).unwrap());
    reader.read_next(&mut point).unwrap();
    assert_eq!(&point[..], &points[37 * POINT_SIZE..38 * POINT_SIZE]);

    assert!(reader.move_to_point(12).unwrap());
    reader.read_next(&mut point).unwrap();
    assert_eq!(&point[..], &points[12 * POINT_SIZE..13 * POINT_SIZE]);
}

#[test]
fn a_truncated_table_is_salvaged() {
    let config = fixed_config(5);
    let points = points(200);
    let mut data = compress(&points, &config);
    let offset = table_offset(&data);
    // header and a few bytes of the entries
    data.truncate(offset + 8 + 6);

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    assert_eq!(read_all(&mut reader, 200), points);
    let mut point = [0u8; POINT_SIZE];
    assert!(matches!(
        reader.read_next(&mut point),
        Err(LasZipError::ReadPastEnd)
    ));

    assert!(reader.move_to_point(123).unwrap());
    reader.read_next(&mut point).unwrap();
    assert_eq!(&point[..], &points[123 * POINT_SIZE..124 * POINT_SIZE]);
}

#[test]
fn an_offset_before_the_points_is_ignored() {
    let config = fixed_config(16);
    let points = points(50);
    let mut data = compress(&points, &config);
    data[..8].copy_from_slice(&4i64.to_le_bytes());

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    assert_eq!(read_all(&mut reader, 50), points);
}

#[test]
fn a_chunk_that_does_not_end_where_the_next_starts_is_corrupt() {
    let config = fixed_config(10);
    let points = points(30);
    let mut data = compress(&points, &config);

    let table = ChunkTable::read_from(Cursor::new(&data), &config).unwrap();
    let mut corrupted = ChunkTable::default();
    for (index, entry) in table.into_iter().enumerate() {
        let byte_count = match index {
            0 => entry.byte_count + 1,
            1 => entry.byte_count - 1,
            _ => entry.byte_count,
        };
        corrupted.push(ChunkTableEntry {
            point_count: entry.point_count,
            byte_count,
        });
    }
    let offset = table_offset(&data);
    data.truncate(offset);
    corrupted.write_to(&mut data, false).unwrap();

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    let mut read = vec![0u8; 10 * POINT_SIZE];
    reader.read_many(&mut read).unwrap();
    assert_eq!(read, &points[..10 * POINT_SIZE]);

    let mut point = [0u8; POINT_SIZE];
    match reader.read_next(&mut point) {
        Err(LasZipError::PreviousChunkCorrupt {
            chunk_index,
            expected,
            actual,
        }) => {
            assert_eq!(chunk_index, 0);
            assert_eq!(expected, actual + 1);
        }
        other => panic!("expected a corrupt chunk, got {:?}", other),
    }
}

#[test]
fn non_seekable_writer_appends_the_offset() {
    let config = fixed_config(10);
    let points = points(35);
    let mut writer = PointWriter::new(ForwardOnly::new(Cursor::new(Vec::new())), &config).unwrap();
    writer.write_many(&points).unwrap();
    writer.close().unwrap();
    let data = writer.into_inner().into_inner().into_inner();

    assert_eq!(&data[..8], &UNKNOWN_CHUNK_TABLE_OFFSET.to_le_bytes());
    let mut appended = [0u8; 8];
    appended.copy_from_slice(&data[data.len() - 8..]);
    let offset = i64::from_le_bytes(appended) as usize;
    assert!(offset > 8 && offset < data.len() - 8);

    let mut reader = PointReader::new(Cursor::new(data.clone()), &config).unwrap();
    assert!(reader.move_to_point(31).unwrap());
    let mut point = [0u8; POINT_SIZE];
    reader.read_next(&mut point).unwrap();
    assert_eq!(&point[..], &points[31 * POINT_SIZE..32 * POINT_SIZE]);

    let mut reader = PointReader::new(ForwardOnly::new(Cursor::new(data)), &config).unwrap();
    let mut read = vec![0u8; points.len()];
    reader.read_many(&mut read).unwrap();
    assert_eq!(read, points);
}

#[test]
fn variable_size_chunks_need_their_table() {
    let config = variable_config();
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_chunk(&points(7), 7).unwrap();
    writer.write_chunk(&points(3), 3).unwrap();
    let unfinished = writer.into_inner().into_inner();
    assert!(matches!(
        PointReader::new(Cursor::new(unfinished), &config),
        Err(LasZipError::MissingChunkTable)
    ));

    let mut data = compress(&points(12), &config);
    let offset = table_offset(&data);
    data.truncate(offset + 9);
    assert!(matches!(
        PointReader::new(Cursor::new(data), &config),
        Err(LasZipError::CorruptChunkTable(_))
    ));

    let data = compress(&points(12), &config);
    assert!(matches!(
        PointReader::new(ForwardOnly::new(Cursor::new(data)), &config),
        Err(LasZipError::NotSeekable)
    ));
}

#[test]
fn variable_size_chunk_totals_are_read_back() {
    let config = variable_config();
    let sizes = [4usize, 1, 9, 2];
    let all_points = points(16);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    let mut start = 0;
    for &size in &sizes {
        let end = start + size * POINT_SIZE;
        writer.write_chunk(&all_points[start..end], size as u64).unwrap();
        start = end;
    }
    writer.close().unwrap();
    assert_eq!(writer.chunk_totals(), Some(vec![4, 1, 9, 2]));

    let data = writer.into_inner().into_inner();
    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    assert_eq!(reader.chunk_totals(), Some(vec![4, 1, 9, 2]));

    let mut point = [0u8; POINT_SIZE];
    assert!(reader.move_to_chunk(2).unwrap());
    assert_eq!(reader.point_index(), 5);
    reader.read_next(&mut point).unwrap();
    assert_eq!(&point[..], &all_points[5 * POINT_SIZE..6 * POINT_SIZE]);
    assert!(!reader.move_to_chunk(4).unwrap());

    assert!(reader.move_to_point(15).unwrap());
    reader.read_next(&mut point).unwrap();
    assert_eq!(&point[..], &all_points[15 * POINT_SIZE..]);
    assert!(matches!(
        reader.read_next(&mut point),
        Err(LasZipError::ReadPastEnd)
    ));
}

#[test]
fn a_chunk_storing_too_few_points_is_corrupt() {
    let config = layered_config(5);
    let points = points(15);
    let mut data = compress(&points, &config);
    // layered chunks start with their point count
    assert_eq!(&data[8..12], &5u32.to_le_bytes());
    data[8..12].copy_from_slice(&3u32.to_le_bytes());

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    let mut point = [0u8; POINT_SIZE];
    match reader.read_next(&mut point) {
        Err(LasZipError::ChunkPointCountMismatch {
            chunk_index,
            expected,
            actual,
        }) => {
            assert_eq!(chunk_index, 0);
            assert_eq!(expected, 5);
            assert_eq!(actual, 3);
        }
        other => panic!("expected a point count mismatch, got {:?}", other),
    }
}

#[test]
fn a_variable_size_chunk_must_store_its_table_count() {
    let config = ZipConfigurationBuilder::new(vec![LazItem::new(
        LazItemType::Byte14(POINT_SIZE as u16),
        3,
    )])
    .with_compressor(CompressorType::LayeredChunked)
    .with_variable_chunk_size()
    .build();
    let all_points = points(6);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_chunk(&all_points[..4 * POINT_SIZE], 4).unwrap();
    writer.write_chunk(&all_points[4 * POINT_SIZE..], 2).unwrap();
    writer.close().unwrap();
    let mut data = writer.into_inner().into_inner();
    assert_eq!(&data[8..12], &4u32.to_le_bytes());
    data[8..12].copy_from_slice(&2u32.to_le_bytes());

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    assert_eq!(reader.chunk_totals(), Some(vec![4, 2]));
    let mut point = [0u8; POINT_SIZE];
    assert!(matches!(
        reader.read_next(&mut point),
        Err(LasZipError::ChunkPointCountMismatch {
            chunk_index: 0,
            expected: 4,
            actual: 2,
        })
    ));
}

#[test]
fn moving_past_a_short_last_chunk_finds_nothing() {
    let config = fixed_config(10);
    let points = points(15);
    let data = compress(&points, &config);

    let mut reader = PointReader::new(Cursor::new(data.clone()), &config).unwrap();
    assert_eq!(read_all(&mut reader, 15), points);
    assert!(!reader.move_to_point(17).unwrap());

    let mut reader = PointReader::new(Cursor::new(data.clone()), &config).unwrap();
    assert!(!reader.move_to_point(17).unwrap());
    assert!(reader.move_to_point(14).unwrap());
    let mut point = [0u8; POINT_SIZE];
    reader.read_next(&mut point).unwrap();
    assert_eq!(&point[..], &points[14 * POINT_SIZE..]);

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    assert_eq!(read_all(&mut reader, 15), points);
    assert!(matches!(
        reader.read_next(&mut point),
        Err(LasZipError::ReadPastEnd)
    ));
    assert!(matches!(
        reader.read_next(&mut point),
        Err(LasZipError::ReadPastEnd)
    ));
}

#[test]
fn the_chunked_reader_wants_one_whole_point() {
    let config = fixed_config(10);
    let points = points(12);
    let data = compress(&points, &config);
    let mut reader =
        ChunkedReader::<_, SequentialPointRecordDecompressor<_>>::new(Cursor::new(data), &config)
            .unwrap();
    assert!(matches!(
        reader.read_next(&mut [0u8; 10]),
        Err(LasZipError::BufferLenNotMultipleOfPointSize {
            buffer_len: 10,
            point_size: POINT_SIZE,
        })
    ));
    assert_eq!(reader.point_index(), 0);
    let mut point = [0u8; POINT_SIZE];
    reader.read_next(&mut point).unwrap();
    assert_eq!(&point[..], &points[..POINT_SIZE]);
}
