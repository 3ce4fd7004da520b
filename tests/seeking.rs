use std::io::Cursor;

use proptest::prelude::*;

use laz_chunked::{
    CompressorType, ForwardOnly, LasZipError, LazItem, LazItemType, PointReader, PointWriter,
    ZipConfiguration, ZipConfigurationBuilder,
};

const POINT_SIZE: usize = 28;

fn points(count: usize) -> Vec<u8> {
    (0..count)
        .flat_map(|index| {
            let mut point = [0u8; POINT_SIZE];
            point[..4].copy_from_slice(&(index as i32 * 7).to_le_bytes());
            point[4..8].copy_from_slice(&(-(index as i32) * 3).to_le_bytes());
            point[8..12].copy_from_slice(&((index % 17) as i32).to_le_bytes());
            point[20..].copy_from_slice(&(index as f64 * 0.25).to_le_bytes());
            point.to_vec()
        })
        .collect()
}

fn config(compressor: CompressorType, chunk_size: u32) -> ZipConfiguration {
    let version = if compressor == CompressorType::LayeredChunked {
        3
    } else {
        2
    };
    // Layered chunks need the items of the extended formats,
    // Byte14 makes them the same size as the legacy ones
    let items = if compressor == CompressorType::LayeredChunked {
        vec![LazItem::new(LazItemType::Byte14(POINT_SIZE as u16), version)]
    } else {
        vec![
            LazItem::new(LazItemType::Point10, version),
            LazItem::new(LazItemType::GpsTime, version),
        ]
    };
    ZipConfigurationBuilder::new(items)
        .with_compressor(compressor)
        .with_chunk_size(chunk_size)
        .build()
}

fn compress(points: &[u8], config: &ZipConfiguration) -> Vec<u8> {
    let mut writer = PointWriter::new(Cursor::new(Vec::new()), config).unwrap();
    writer.write_many(points).unwrap();
    writer.close().unwrap();
    writer.into_inner().into_inner()
}

fn point(points: &[u8], index: u64) -> &[u8] {
    let start = index as usize * POINT_SIZE;
    &points[start..start + POINT_SIZE]
}

fn check_seek(compressor: CompressorType, chunk_size: u32, count: u64, current: u64, target: u64) {
    let config = config(compressor, chunk_size);
    let points = points(count as usize);
    let data = compress(&points, &config);

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    let mut out = vec![0u8; POINT_SIZE];
    assert!(reader.move_to_point(current).unwrap());
    reader.read_next(&mut out).unwrap();
    assert_eq!(out, point(&points, current));

    assert!(reader.move_to_point(target).unwrap());
    assert_eq!(reader.point_index(), target);
    reader.read_next(&mut out).unwrap();
    assert_eq!(out, point(&points, target));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn seeking_reads_the_same_point_as_a_scan(
        chunk_size in 1u32..40,
        count in 1u64..200,
        current_ratio in 0.0f64..1.0,
        target_ratio in 0.0f64..1.0,
    ) {
        let current = (current_ratio * count as f64) as u64;
        let target = (target_ratio * count as f64) as u64;
        check_seek(CompressorType::PointWiseChunked, chunk_size, count, current, target);
    }

    #[test]
    fn seeking_in_layered_chunks(
        chunk_size in 1u32..40,
        count in 1u64..200,
        current_ratio in 0.0f64..1.0,
        target_ratio in 0.0f64..1.0,
    ) {
        let current = (current_ratio * count as f64) as u64;
        let target = (target_ratio * count as f64) as u64;
        check_seek(CompressorType::LayeredChunked, chunk_size, count, current, target);
    }
}

#[test]
fn seeking_within_the_current_chunk_goes_forward() {
    check_seek(CompressorType::PointWiseChunked, 50, 120, 10, 40);
    check_seek(CompressorType::PointWiseChunked, 50, 120, 40, 10);
    check_seek(CompressorType::PointWiseChunked, 50, 120, 110, 0);
    check_seek(CompressorType::PointWiseChunked, 50, 120, 0, 119);
}

#[test]
fn every_kind_of_reader_seeks() {
    let points = points(90);
    for &compressor in &[CompressorType::None, CompressorType::PointWise] {
        let config = config(compressor, 0);
        let data = compress(&points, &config);
        let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
        let mut out = vec![0u8; POINT_SIZE];
        for &target in &[50u64, 3, 89, 0] {
            assert!(reader.move_to_point(target).unwrap(), "{:?}", compressor);
            reader.read_next(&mut out).unwrap();
            assert_eq!(out, point(&points, target), "{:?}", compressor);
        }
        assert!(matches!(
            reader.move_to_chunk(0),
            Err(LasZipError::UnsupportedCompressorType(_))
        ));
    }
}

#[test]
fn move_to_chunk_goes_to_its_first_point() {
    let config = config(CompressorType::PointWiseChunked, 25);
    let points = points(110);
    let data = compress(&points, &config);

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    let mut out = vec![0u8; POINT_SIZE];
    for &chunk in &[3usize, 0, 4, 1] {
        assert!(reader.move_to_chunk(chunk).unwrap());
        reader.read_next(&mut out).unwrap();
        assert_eq!(out, point(&points, chunk as u64 * 25));
        assert_eq!(reader.chunk_index(), Some(chunk));
    }
    assert!(!reader.move_to_chunk(5).unwrap());
}

#[test]
fn points_past_the_last_chunk_cannot_be_reached() {
    let config = config(CompressorType::PointWiseChunked, 10);
    let data = compress(&points(30), &config);

    let mut reader = PointReader::new(Cursor::new(data), &config).unwrap();
    assert!(!reader.move_to_point(30).unwrap());
    assert!(!reader.move_to_point(1_000).unwrap());
    assert!(reader.move_to_point(29).unwrap());
}

#[test]
fn forward_only_streams_cannot_go_back() {
    let points = points(60);
    let kinds = [
        CompressorType::None,
        CompressorType::PointWise,
        CompressorType::PointWiseChunked,
        CompressorType::LayeredChunked,
    ];
    for &compressor in &kinds {
        let config = config(compressor, 16);
        let data = compress(&points, &config);

        let mut reader = PointReader::new(ForwardOnly::new(Cursor::new(data)), &config).unwrap();
        let mut out = vec![0u8; POINT_SIZE];
        assert!(reader.move_to_point(35).unwrap(), "{:?}", compressor);
        reader.read_next(&mut out).unwrap();
        assert_eq!(out, point(&points, 35), "{:?}", compressor);

        assert!(!reader.move_to_point(10).unwrap(), "{:?}", compressor);
        assert_eq!(reader.point_index(), 36);
        reader.read_next(&mut out).unwrap();
        assert_eq!(out, point(&points, 36), "{:?}", compressor);
    }
}
