use std::io::Cursor;

use laz_chunked::laszip::ChunkedWriter;
use laz_chunked::record::SequentialPointRecordCompressor;
use laz_chunked::{
    LasZipError, LazItem, LazItemType, PointReader, PointWriter, ZipConfiguration,
    ZipConfigurationBuilder,
};

const POINT_SIZE: usize = 20;

fn point(index: u8) -> Vec<u8> {
    let mut point = vec![index; POINT_SIZE];
    point[..4].copy_from_slice(&(i32::from(index) * 1000).to_le_bytes());
    point
}

fn config(chunk_size: u32) -> ZipConfiguration {
    ZipConfigurationBuilder::new(vec![LazItem::new(LazItemType::Point10, 2)])
        .with_chunk_size(chunk_size)
        .build()
}

fn read_back(data: Vec<u8>, config: &ZipConfiguration, count: usize) -> Vec<Vec<u8>> {
    let mut reader = PointReader::new(Cursor::new(data), config).unwrap();
    (0..count)
        .map(|_| {
            let mut point = vec![0u8; POINT_SIZE];
            reader.read_next(&mut point).unwrap();
            point
        })
        .collect()
}

#[test]
fn chunks_are_written_in_key_order() {
    let config = config(2);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_to_chunk(0, &point(0)).unwrap();
    writer.write_to_chunk(1, &point(2)).unwrap();
    writer.write_to_chunk(2, &point(4)).unwrap();
    writer.write_to_chunk(1, &point(3)).unwrap();
    writer.write_to_chunk(2, &point(5)).unwrap();
    // chunks 1 and 2 wait for chunk 0
    assert_eq!(writer.get_ref().get_ref().len(), 8);
    writer.write_to_chunk(0, &point(1)).unwrap();
    assert!(writer.get_ref().get_ref().len() > 8);
    writer.write_to_chunk(3, &point(6)).unwrap();
    writer.close().unwrap();
    assert_eq!(writer.chunk_totals(), Some(vec![2, 2, 2, 1]));

    let data = writer.into_inner().into_inner();
    let points = read_back(data, &config, 7);
    for (index, read) in points.iter().enumerate() {
        assert_eq!(read, &point(index as u8));
    }
}

#[test]
fn points_without_key_follow_the_keyed_ones() {
    let config = config(3);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    assert_eq!(writer.chunk_index(), Some(0));
    writer.write_next(&point(0)).unwrap();
    writer.write_to_chunk(1, &point(3)).unwrap();
    writer.write_next(&point(1)).unwrap();
    writer.write_next(&point(2)).unwrap();
    writer.write_to_chunk(1, &point(4)).unwrap();
    writer.write_to_chunk(1, &point(5)).unwrap();
    // chunks 0 and 1 are full, points go to the next one
    writer.write_next(&point(6)).unwrap();
    assert_eq!(writer.chunk_index(), Some(2));
    writer.close().unwrap();

    let data = writer.into_inner().into_inner();
    let points = read_back(data, &config, 7);
    for (index, read) in points.iter().enumerate() {
        assert_eq!(read, &point(index as u8));
    }
}

#[test]
fn keys_cannot_leave_gaps_or_go_back() {
    let config = config(2);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    assert!(matches!(
        writer.write_to_chunk(1, &point(0)),
        Err(LasZipError::InvalidChunkKey { key: 1, .. })
    ));
    writer.write_to_chunk(0, &point(0)).unwrap();
    writer.write_to_chunk(1, &point(1)).unwrap();
    assert!(matches!(
        writer.write_to_chunk(3, &point(2)),
        Err(LasZipError::InvalidChunkKey { key: 3, .. })
    ));

    writer.write_to_chunk(0, &point(2)).unwrap();
    // chunk 0 is full and written
    assert!(matches!(
        writer.write_to_chunk(0, &point(3)),
        Err(LasZipError::InvalidChunkKey { key: 0, .. })
    ));
}

#[test]
fn full_chunks_refuse_points() {
    let config = config(2);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_to_chunk(0, &point(0)).unwrap();
    writer.write_to_chunk(1, &point(1)).unwrap();
    writer.write_to_chunk(1, &point(2)).unwrap();
    // chunk 1 is full but waits for chunk 0
    assert!(matches!(
        writer.write_to_chunk(1, &point(3)),
        Err(LasZipError::ChunkFull { key: 1 })
    ));
}

#[test]
fn only_the_last_chunk_can_be_short() {
    let config = config(4);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_to_chunk(0, &point(0)).unwrap();
    writer.write_to_chunk(0, &point(1)).unwrap();
    for index in 2..6 {
        writer.write_to_chunk(1, &point(index)).unwrap();
    }
    writer.write_to_chunk(2, &point(6)).unwrap();
    match writer.close() {
        Err(LasZipError::ChunkNotFull {
            key,
            point_count,
            chunk_size,
        }) => {
            assert_eq!(key, 0);
            assert_eq!(point_count, 2);
            assert_eq!(chunk_size, 4);
        }
        other => panic!("expected a chunk that is not full, got {:?}", other),
    }
}

#[test]
fn variable_size_chunks_are_ended_by_the_user() {
    let config = ZipConfigurationBuilder::new(vec![LazItem::new(LazItemType::Point10, 2)])
        .with_variable_chunk_size()
        .build();
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_next(&point(0)).unwrap();
    writer.write_next(&point(1)).unwrap();
    writer.finish_current_chunk().unwrap();
    // nothing to end
    writer.finish_current_chunk().unwrap();
    assert_eq!(writer.chunk_index(), Some(1));

    let mut points = point(2);
    points.extend(point(3));
    points.extend(point(4));
    assert!(matches!(
        writer.write_chunk(&points, 4),
        Err(LasZipError::NotEnoughPoints {
            expected: 4,
            actual: 3
        })
    ));
    writer.write_chunk(&points, 3).unwrap();
    writer.write_next(&point(5)).unwrap();
    writer.close().unwrap();
    assert_eq!(writer.chunk_totals(), Some(vec![2, 3, 1]));

    let data = writer.into_inner().into_inner();
    let read = read_back(data, &config, 6);
    for (index, read) in read.iter().enumerate() {
        assert_eq!(read, &point(index as u8));
    }
}

#[test]
fn fixed_size_chunks_cannot_be_ended() {
    let config = config(10);
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_next(&point(0)).unwrap();
    assert!(matches!(
        writer.finish_current_chunk(),
        Err(LasZipError::NotVariablyChunked)
    ));
    assert!(matches!(
        writer.write_chunk(&point(1), 1),
        Err(LasZipError::NotVariablyChunked)
    ));
}

#[test]
fn keyed_variable_size_chunks() {
    let config = ZipConfigurationBuilder::new(vec![LazItem::new(LazItemType::Point10, 2)])
        .with_variable_chunk_size()
        .build();
    let mut writer: ChunkedWriter<_, SequentialPointRecordCompressor<Cursor<Vec<u8>>>> =
        ChunkedWriter::new(Cursor::new(Vec::new()), &config).unwrap();
    writer.write_to_chunk(0, &point(0)).unwrap();
    writer.write_to_chunk(1, &point(1)).unwrap();
    writer.write_to_chunk(1, &point(2)).unwrap();
    writer.finish_chunk(1).unwrap();
    assert!(writer.chunk_table().is_empty());
    assert!(matches!(
        writer.finish_chunk(2),
        Err(LasZipError::InvalidChunkKey { key: 2, .. })
    ));
    writer.finish_chunk(0).unwrap();
    assert_eq!(writer.chunk_table().len(), 2);
    assert_eq!(writer.chunk_table().point_count(), 3);
    writer.close().unwrap();

    let data = writer.into_inner().into_inner();
    let read = read_back(data, &config, 3);
    for (index, read) in read.iter().enumerate() {
        assert_eq!(read, &point(index as u8));
    }
}
