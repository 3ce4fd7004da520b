//! Record (point) compressors and decompressors.
//!
//! A record compressor codes whole points by delegating each item of the point
//! to the matching field codec of [`crate::fields`].
use std::io::{Read, Write};
use std::ops::Range;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::decoders::ArithmeticDecoder;
use crate::encoders::ArithmeticEncoder;
use crate::fields::{
    ItemCompressor, ItemDecompressor, LayeredItemCompressor, LayeredItemDecompressor,
};
use crate::laszip::LazItem;
use crate::LasZipError;

pub trait RecordDecompressor<R> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()>;
    fn record_size(&self) -> usize;

    fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()>;
    /// Forgets everything about the previous points,
    /// the next point decompressed is a first point again.
    fn reset(&mut self);

    /// Number of points of the current chunk, for codecs that store it in the chunk.
    fn chunk_point_count(&self) -> Option<u64> {
        None
    }

    fn get_mut(&mut self) -> &mut R;
    fn get_ref(&self) -> &R;
    fn into_inner(self) -> R;
}

pub trait RecordCompressor<W> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()>;
    fn record_size(&self) -> usize;

    fn compress_next(&mut self, input: &[u8]) -> std::io::Result<()>;
    /// Writes whatever the compressor still holds
    fn done(&mut self) -> std::io::Result<()>;
    /// Forgets everything about the previous points,
    /// the next point compressed is a first point again.
    fn reset(&mut self);

    fn get_mut(&mut self) -> &mut W;
    fn get_ref(&self) -> &W;
    fn into_inner(self) -> W;
}

/// Creates a record codec on a stream for the given items.
///
/// Used by the chunked reader & writer, which need to create codecs themselves.
pub trait FromLazItems<S>: Sized {
    fn from_laz_items(stream: S, laz_items: &[LazItem]) -> crate::Result<Self>;
}

const SEQUENTIAL_VERSIONS: [u16; 2] = [1, 2];
const LAYERED_VERSIONS: [u16; 2] = [3, 4];

/// Validates the items and checks that the codec handles their versions.
fn checked_items(laz_items: &[LazItem], supported: &[u16]) -> crate::Result<Vec<LazItem>> {
    for (index, item) in laz_items.iter().enumerate() {
        item.validate(index)?;
        if !supported.contains(&item.version()) {
            return Err(LasZipError::UnsupportedLazItemVersion(
                item.item_type(),
                item.version(),
            ));
        }
    }
    Ok(laz_items.to_vec())
}

/// Where each item lies in a point.
fn field_ranges(laz_items: &[LazItem]) -> Vec<Range<usize>> {
    let mut start = 0;
    laz_items
        .iter()
        .map(|item| {
            let range = start..start + usize::from(item.size());
            start = range.end;
            range
        })
        .collect()
}

fn record_size_of(ranges: &[Range<usize>]) -> usize {
    ranges.last().map_or(0, |range| range.end)
}

/// Decompresses points coded one after the other in a single arithmetic coded stream.
///
/// The first point of the stream is stored raw, the decoder is primed
/// right after it.
pub struct SequentialPointRecordDecompressor<R: Read> {
    laz_items: Vec<LazItem>,
    ranges: Vec<Range<usize>>,
    fields: Vec<ItemDecompressor>,
    decoder: ArithmeticDecoder<R>,
    at_start: bool,
}

impl<R: Read> SequentialPointRecordDecompressor<R> {
    pub fn new(input: R) -> Self {
        Self {
            laz_items: vec![],
            ranges: vec![],
            fields: vec![],
            decoder: ArithmeticDecoder::new(input),
            at_start: true,
        }
    }
}

impl<R: Read> RecordDecompressor<R> for SequentialPointRecordDecompressor<R> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        self.laz_items = checked_items(laz_items, &SEQUENTIAL_VERSIONS)?;
        self.ranges = field_ranges(&self.laz_items);
        self.reset();
        Ok(())
    }

    fn record_size(&self) -> usize {
        record_size_of(&self.ranges)
    }

    fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()> {
        let fields = self.fields.iter_mut().zip(&self.ranges);
        if self.at_start {
            for (field, range) in fields {
                field.decompress_first(self.decoder.get_mut(), &mut out[range.clone()])?;
            }
            self.decoder.read_init_bytes()?;
            self.at_start = false;
        } else {
            for (field, range) in fields {
                field.decompress_with(&mut self.decoder, &mut out[range.clone()])?;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.fields = self.laz_items.iter().map(ItemDecompressor::new).collect();
        self.at_start = true;
    }

    fn get_mut(&mut self) -> &mut R {
        self.decoder.get_mut()
    }

    fn get_ref(&self) -> &R {
        self.decoder.get_ref()
    }

    fn into_inner(self) -> R {
        self.decoder.into_inner()
    }
}

impl<R: Read> FromLazItems<R> for SequentialPointRecordDecompressor<R> {
    fn from_laz_items(stream: R, laz_items: &[LazItem]) -> crate::Result<Self> {
        let mut decompressor = Self::new(stream);
        decompressor.set_fields_from(laz_items)?;
        Ok(decompressor)
    }
}

pub struct SequentialPointRecordCompressor<W: Write> {
    laz_items: Vec<LazItem>,
    ranges: Vec<Range<usize>>,
    fields: Vec<ItemCompressor>,
    encoder: ArithmeticEncoder<W>,
    at_start: bool,
}

impl<W: Write> SequentialPointRecordCompressor<W> {
    pub fn new(output: W) -> Self {
        Self {
            laz_items: vec![],
            ranges: vec![],
            fields: vec![],
            encoder: ArithmeticEncoder::new(output),
            at_start: true,
        }
    }
}

impl<W: Write> RecordCompressor<W> for SequentialPointRecordCompressor<W> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        self.laz_items = checked_items(laz_items, &SEQUENTIAL_VERSIONS)?;
        self.ranges = field_ranges(&self.laz_items);
        self.reset();
        Ok(())
    }

    fn record_size(&self) -> usize {
        record_size_of(&self.ranges)
    }

    fn compress_next(&mut self, input: &[u8]) -> std::io::Result<()> {
        let fields = self.fields.iter_mut().zip(&self.ranges);
        if self.at_start {
            for (field, range) in fields {
                field.compress_first(self.encoder.get_mut(), &input[range.clone()])?;
            }
            self.at_start = false;
        } else {
            for (field, range) in fields {
                field.compress_with(&mut self.encoder, &input[range.clone()])?;
            }
        }
        Ok(())
    }

    fn done(&mut self) -> std::io::Result<()> {
        self.encoder.done()
    }

    fn reset(&mut self) {
        self.encoder.reset();
        self.fields = self.laz_items.iter().map(ItemCompressor::new).collect();
        self.at_start = true;
    }

    fn get_mut(&mut self) -> &mut W {
        self.encoder.get_mut()
    }

    fn get_ref(&self) -> &W {
        self.encoder.get_ref()
    }

    fn into_inner(self) -> W {
        self.encoder.into_inner()
    }
}

impl<W: Write> FromLazItems<W> for SequentialPointRecordCompressor<W> {
    fn from_laz_items(stream: W, laz_items: &[LazItem]) -> crate::Result<Self> {
        let mut compressor = Self::new(stream);
        compressor.set_fields_from(laz_items)?;
        Ok(compressor)
    }
}

/// Decompresses chunks where each field of the points is in its own layer.
///
/// A layered chunk holds, in order: its number of points (u32),
/// its first point stored raw, the byte count of every layer,
/// then the layers themselves.
pub struct LayeredPointRecordDecompressor<R: Read> {
    laz_items: Vec<LazItem>,
    ranges: Vec<Range<usize>>,
    fields: Vec<LayeredItemDecompressor>,
    input: R,
    // None until the head of the chunk was read
    chunk_point_count: Option<u32>,
}

impl<R: Read> LayeredPointRecordDecompressor<R> {
    pub fn new(input: R) -> Self {
        Self {
            laz_items: vec![],
            ranges: vec![],
            fields: vec![],
            input,
            chunk_point_count: None,
        }
    }

    fn read_chunk_head(&mut self, first_point: &mut [u8]) -> std::io::Result<()> {
        let point_count = self.input.read_u32::<LittleEndian>()?;
        for (field, range) in self.fields.iter_mut().zip(&self.ranges) {
            field.init_first_point(&mut self.input, &mut first_point[range.clone()])?;
        }
        for field in &mut self.fields {
            field.read_layers_sizes(&mut self.input)?;
        }
        for field in &mut self.fields {
            field.read_layers(&mut self.input)?;
        }
        self.chunk_point_count = Some(point_count);
        Ok(())
    }
}

impl<R: Read> RecordDecompressor<R> for LayeredPointRecordDecompressor<R> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        self.laz_items = checked_items(laz_items, &LAYERED_VERSIONS)?;
        self.ranges = field_ranges(&self.laz_items);
        self.reset();
        Ok(())
    }

    fn record_size(&self) -> usize {
        record_size_of(&self.ranges)
    }

    fn decompress_next(&mut self, out: &mut [u8]) -> std::io::Result<()> {
        if self.chunk_point_count.is_none() {
            return self.read_chunk_head(out);
        }
        for (field, range) in self.fields.iter_mut().zip(&self.ranges) {
            field.decompress_field_with(&mut out[range.clone()])?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.fields = self
            .laz_items
            .iter()
            .map(LayeredItemDecompressor::new)
            .collect();
        self.chunk_point_count = None;
    }

    /// Only known once the first point of the chunk was decompressed.
    fn chunk_point_count(&self) -> Option<u64> {
        self.chunk_point_count.map(u64::from)
    }

    fn get_mut(&mut self) -> &mut R {
        &mut self.input
    }

    fn get_ref(&self) -> &R {
        &self.input
    }

    fn into_inner(self) -> R {
        self.input
    }
}

impl<R: Read> FromLazItems<R> for LayeredPointRecordDecompressor<R> {
    fn from_laz_items(stream: R, laz_items: &[LazItem]) -> crate::Result<Self> {
        let mut decompressor = Self::new(stream);
        decompressor.set_fields_from(laz_items)?;
        Ok(decompressor)
    }
}

/// Compresses points into layers.
///
/// Nothing is written to the destination until [`done`](RecordCompressor::done)
/// is called, as the number of points comes first.
pub struct LayeredPointRecordCompressor<W: Write> {
    laz_items: Vec<LazItem>,
    ranges: Vec<Range<usize>>,
    fields: Vec<LayeredItemCompressor>,
    first_point: Vec<u8>,
    point_count: u32,
    dst: W,
}

impl<W: Write> LayeredPointRecordCompressor<W> {
    pub fn new(dst: W) -> Self {
        Self {
            laz_items: vec![],
            ranges: vec![],
            fields: vec![],
            first_point: vec![],
            point_count: 0,
            dst,
        }
    }
}

impl<W: Write> RecordCompressor<W> for LayeredPointRecordCompressor<W> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        self.laz_items = checked_items(laz_items, &LAYERED_VERSIONS)?;
        self.ranges = field_ranges(&self.laz_items);
        self.reset();
        Ok(())
    }

    fn record_size(&self) -> usize {
        record_size_of(&self.ranges)
    }

    fn compress_next(&mut self, point: &[u8]) -> std::io::Result<()> {
        let fields = self.fields.iter_mut().zip(&self.ranges);
        if self.point_count == 0 {
            self.first_point.clear();
            self.first_point.extend_from_slice(point);
            for (field, range) in fields {
                field.init_first_point(&point[range.clone()]);
            }
        } else {
            for (field, range) in fields {
                field.compress_field_with(&point[range.clone()])?;
            }
        }
        self.point_count += 1;
        Ok(())
    }

    fn done(&mut self) -> std::io::Result<()> {
        if self.point_count == 0 {
            return Ok(());
        }
        self.dst.write_u32::<LittleEndian>(self.point_count)?;
        self.dst.write_all(&self.first_point)?;
        for field in &mut self.fields {
            field.write_layers_sizes(&mut self.dst)?;
        }
        for field in &mut self.fields {
            field.write_layers(&mut self.dst)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.fields = self
            .laz_items
            .iter()
            .map(LayeredItemCompressor::new)
            .collect();
        self.first_point.clear();
        self.point_count = 0;
    }

    fn get_mut(&mut self) -> &mut W {
        &mut self.dst
    }

    fn get_ref(&self) -> &W {
        &self.dst
    }

    fn into_inner(self) -> W {
        self.dst
    }
}

impl<W: Write> FromLazItems<W> for LayeredPointRecordCompressor<W> {
    fn from_laz_items(stream: W, laz_items: &[LazItem]) -> crate::Result<Self> {
        let mut compressor = Self::new(stream);
        compressor.set_fields_from(laz_items)?;
        Ok(compressor)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::laszip::LazItemType;

    #[test]
    fn empty_sequential_stream() {
        let items = [LazItem::new(LazItemType::Integer(4), 2)];
        let mut compressor =
            SequentialPointRecordCompressor::from_laz_items(Cursor::new(Vec::<u8>::new()), &items)
                .unwrap();
        compressor.done().unwrap();
        assert_eq!(compressor.into_inner().into_inner(), vec![1, 0, 0, 0]);
    }

    #[test]
    fn single_sequential_point() {
        let items = [LazItem::new(LazItemType::Integer(4), 2)];
        let mut compressor =
            SequentialPointRecordCompressor::from_laz_items(Cursor::new(Vec::<u8>::new()), &items)
                .unwrap();
        compressor.compress_next(&[0, 0, 0, 0]).unwrap();
        compressor.done().unwrap();
        assert_eq!(
            compressor.into_inner().into_inner(),
            vec![0, 0, 0, 0, 1, 0, 0, 0]
        );
    }

    fn points(count: usize, size: usize) -> Vec<u8> {
        (0..count * size)
            .map(|i| ((i * 31) ^ (i / size * 7)) as u8)
            .collect()
    }

    #[test]
    fn sequential_round_trip() {
        let items = [
            LazItem::new(LazItemType::Point10, 2),
            LazItem::new(LazItemType::GpsTime, 2),
            LazItem::new(LazItemType::Byte(3), 2),
        ];
        let data = points(100, 31);

        let mut compressor =
            SequentialPointRecordCompressor::from_laz_items(Cursor::new(Vec::<u8>::new()), &items)
                .unwrap();
        assert_eq!(compressor.record_size(), 31);
        for point in data.chunks_exact(31) {
            compressor.compress_next(point).unwrap();
        }
        compressor.done().unwrap();
        let compressed = compressor.into_inner().into_inner();

        let compressed_len = compressed.len() as u64;
        let mut decompressor =
            SequentialPointRecordDecompressor::from_laz_items(Cursor::new(compressed), &items)
                .unwrap();
        let mut point = [0u8; 31];
        for expected in data.chunks_exact(31) {
            decompressor.decompress_next(&mut point).unwrap();
            assert_eq!(&point[..], expected);
        }
        assert_eq!(decompressor.get_ref().position(), compressed_len);
    }

    #[test]
    fn layered_round_trip() {
        let items = [
            LazItem::new(LazItemType::Point14, 3),
            LazItem::new(LazItemType::RGBNIR14, 3),
        ];
        let data = points(50, 38);

        let mut compressor =
            LayeredPointRecordCompressor::from_laz_items(Cursor::new(Vec::<u8>::new()), &items)
                .unwrap();
        for point in data.chunks_exact(38) {
            compressor.compress_next(point).unwrap();
        }
        // nothing is written before done
        assert!(compressor.get_ref().get_ref().is_empty());
        compressor.done().unwrap();
        let compressed = compressor.into_inner().into_inner();

        let compressed_len = compressed.len() as u64;
        let mut decompressor =
            LayeredPointRecordDecompressor::from_laz_items(Cursor::new(compressed), &items)
                .unwrap();
        let mut point = [0u8; 38];
        for expected in data.chunks_exact(38) {
            decompressor.decompress_next(&mut point).unwrap();
            assert_eq!(&point[..], expected);
        }
        assert_eq!(decompressor.chunk_point_count(), Some(50));
        assert_eq!(decompressor.get_ref().position(), compressed_len);
    }

    #[test]
    fn versions_are_checked() {
        let items = [LazItem::new(LazItemType::Point14, 3)];
        assert!(matches!(
            SequentialPointRecordCompressor::from_laz_items(Vec::<u8>::new(), &items),
            Err(LasZipError::UnsupportedLazItemVersion(LazItemType::Point14, 3))
        ));
        let items = [LazItem::new(LazItemType::Point10, 2)];
        assert!(LayeredPointRecordDecompressor::from_laz_items(&[0u8; 0][..], &items).is_err());
    }
}
