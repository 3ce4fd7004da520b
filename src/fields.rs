//! Per-point field codecs.
//!
//! Every item is seen as a sequence of little-endian integers (its layout).
//! Each integer is predicted from the same integer of the previous point and only
//! the correction is coded, 64-bit integers are coded as two 32-bit halves.
//!
//! The sequential codecs ([`ItemCompressor`], [`ItemDecompressor`]) share the
//! arithmetic coder of the record, the layered ones ([`LayeredItemCompressor`],
//! [`LayeredItemDecompressor`]) give each integer of the layout its own layer.
use std::io::{Cursor, Read, Write};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
use crate::decoders::ArithmeticDecoder;
use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
use crate::encoders::ArithmeticEncoder;
use crate::laszip::{LazItem, LazItemType};

/// An integer of an item layout
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Primitive {
    U8,
    U16,
    U32,
    U64,
}

impl Primitive {
    pub fn size(self) -> usize {
        match self {
            Primitive::U8 => 1,
            Primitive::U16 => 2,
            Primitive::U32 => 4,
            Primitive::U64 => 8,
        }
    }

    fn bits(self) -> u32 {
        match self {
            Primitive::U8 => 8,
            Primitive::U16 => 16,
            Primitive::U32 | Primitive::U64 => 32,
        }
    }

    /// Number of 32-bit words the primitive is coded as
    fn num_words(self) -> usize {
        match self {
            Primitive::U64 => 2,
            _ => 1,
        }
    }

    fn read_words(self, bytes: &[u8]) -> [i32; 2] {
        match self {
            Primitive::U8 => [i32::from(bytes[0]), 0],
            Primitive::U16 => [i32::from(LittleEndian::read_u16(bytes)), 0],
            Primitive::U32 => [LittleEndian::read_u32(bytes) as i32, 0],
            Primitive::U64 => {
                let value = LittleEndian::read_u64(bytes);
                [value as u32 as i32, (value >> 32) as u32 as i32]
            }
        }
    }

    fn write_words(self, words: [i32; 2], bytes: &mut [u8]) {
        match self {
            Primitive::U8 => bytes[0] = words[0] as u8,
            Primitive::U16 => LittleEndian::write_u16(bytes, words[0] as u16),
            Primitive::U32 => LittleEndian::write_u32(bytes, words[0] as u32),
            Primitive::U64 => {
                let value = u64::from(words[0] as u32) | u64::from(words[1] as u32) << 32;
                LittleEndian::write_u64(bytes, value)
            }
        }
    }

    fn compressor(self) -> IntegerCompressor {
        IntegerCompressorBuilder::new()
            .bits(self.bits())
            .contexts(self.num_words() as u32)
            .build()
    }

    fn decompressor(self) -> IntegerDecompressor {
        IntegerDecompressorBuilder::new()
            .bits(self.bits())
            .contexts(self.num_words() as u32)
            .build()
    }
}

/// Returns the layout of the item.
///
/// The sizes of the primitives add up to the size of the item
/// as long as the item is valid (see [`LazItem::validate`]).
pub fn layout_of(item: &LazItem) -> Vec<Primitive> {
    use Primitive::*;
    let repeat = |primitive: Primitive| {
        vec![primitive; usize::from(item.size()) / primitive.size()]
    };
    match item.item_type() {
        // x y z, intensity, flags, classification, scan angle, user data, point source id
        LazItemType::Point10 => vec![U32, U32, U32, U16, U8, U8, U8, U8, U16],
        LazItemType::GpsTime => vec![U64],
        LazItemType::RGB12 | LazItemType::RGB14 => vec![U16, U16, U16],
        LazItemType::RGBNIR14 => vec![U16, U16, U16, U16],
        // descriptor index, offset, packet size, return point, dx dy dz
        LazItemType::WavePacket13 | LazItemType::WavePacket14 => {
            vec![U8, U64, U32, U32, U32, U32, U32]
        }
        // same as Point10 then scanner channel & flags, extended classification, gps time
        LazItemType::Point14 => vec![U32, U32, U32, U16, U8, U8, U8, U8, U16, U16, U64],
        LazItemType::Byte(_) | LazItemType::Byte14(_) => repeat(U8),
        LazItemType::Short(_) => repeat(U16),
        LazItemType::Integer(_) | LazItemType::Float(_) => repeat(U32),
        LazItemType::Long(_) | LazItemType::Double(_) => repeat(U64),
    }
}

fn layout_size(layout: &[Primitive]) -> usize {
    layout.iter().map(|p| p.size()).sum()
}

/// Iterates over the primitives of a layout with their byte range in the item
fn with_ranges(
    layout: &[Primitive],
) -> impl Iterator<Item = (Primitive, std::ops::Range<usize>)> + '_ {
    layout.iter().scan(0usize, |start, primitive| {
        let range = *start..*start + primitive.size();
        *start = range.end;
        Some((*primitive, range))
    })
}

/***************************************************************************************************
                    Sequential
***************************************************************************************************/

pub struct ItemCompressor {
    layout: Vec<Primitive>,
    last: Vec<u8>,
    compressors: Vec<IntegerCompressor>,
}

impl ItemCompressor {
    pub fn new(item: &LazItem) -> Self {
        let layout = layout_of(item);
        Self {
            last: vec![0u8; layout_size(&layout)],
            compressors: layout.iter().map(|p| p.compressor()).collect(),
            layout,
        }
    }

    /// The first point is written raw
    pub fn compress_first<W: Write>(&mut self, dst: &mut W, buf: &[u8]) -> std::io::Result<()> {
        dst.write_all(buf)?;
        self.last.copy_from_slice(buf);
        Ok(())
    }

    pub fn compress_with<W: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<W>,
        buf: &[u8],
    ) -> std::io::Result<()> {
        for ((primitive, range), ic) in with_ranges(&self.layout).zip(&mut self.compressors) {
            let last = primitive.read_words(&self.last[range.clone()]);
            let current = primitive.read_words(&buf[range]);
            for context in 0..primitive.num_words() {
                ic.compress(encoder, last[context], current[context], context as u32)?;
            }
        }
        self.last.copy_from_slice(buf);
        Ok(())
    }
}

pub struct ItemDecompressor {
    layout: Vec<Primitive>,
    last: Vec<u8>,
    decompressors: Vec<IntegerDecompressor>,
}

impl ItemDecompressor {
    pub fn new(item: &LazItem) -> Self {
        let layout = layout_of(item);
        Self {
            last: vec![0u8; layout_size(&layout)],
            decompressors: layout.iter().map(|p| p.decompressor()).collect(),
            layout,
        }
    }

    pub fn decompress_first<R: Read>(
        &mut self,
        src: &mut R,
        first_point: &mut [u8],
    ) -> std::io::Result<()> {
        src.read_exact(first_point)?;
        self.last.copy_from_slice(first_point);
        Ok(())
    }

    pub fn decompress_with<R: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<R>,
        buf: &mut [u8],
    ) -> std::io::Result<()> {
        for ((primitive, range), idc) in with_ranges(&self.layout).zip(&mut self.decompressors) {
            let last = primitive.read_words(&self.last[range.clone()]);
            let mut current = [0i32; 2];
            for context in 0..primitive.num_words() {
                current[context] = idc.decompress(decoder, last[context], context as u32)?;
            }
            primitive.write_words(current, &mut self.last[range]);
        }
        buf.copy_from_slice(&self.last);
        Ok(())
    }
}

/***************************************************************************************************
                    Layered
***************************************************************************************************/

struct CompressionLayer {
    encoder: ArithmeticEncoder<Cursor<Vec<u8>>>,
    compressor: IntegerCompressor,
    changed: bool,
}

pub struct LayeredItemCompressor {
    layout: Vec<Primitive>,
    last: Vec<u8>,
    layers: Vec<CompressionLayer>,
}

impl LayeredItemCompressor {
    pub fn new(item: &LazItem) -> Self {
        let layout = layout_of(item);
        Self {
            last: vec![0u8; layout_size(&layout)],
            layers: layout
                .iter()
                .map(|p| CompressionLayer {
                    encoder: ArithmeticEncoder::new(Cursor::new(Vec::new())),
                    compressor: p.compressor(),
                    changed: false,
                })
                .collect(),
            layout,
        }
    }

    pub fn init_first_point(&mut self, first_point: &[u8]) {
        self.last.copy_from_slice(first_point);
    }

    pub fn compress_field_with(&mut self, current_point: &[u8]) -> std::io::Result<()> {
        for ((primitive, range), layer) in with_ranges(&self.layout).zip(&mut self.layers) {
            let last_bytes = &self.last[range.clone()];
            let current_bytes = &current_point[range];
            layer.changed |= last_bytes != current_bytes;

            let last = primitive.read_words(last_bytes);
            let current = primitive.read_words(current_bytes);
            for context in 0..primitive.num_words() {
                layer.compressor.compress(
                    &mut layer.encoder,
                    last[context],
                    current[context],
                    context as u32,
                )?;
            }
        }
        self.last.copy_from_slice(current_point);
        Ok(())
    }

    /// Terminates the layers and writes their sizes.
    ///
    /// Layers whose value never changed are not stored, their size is 0.
    pub fn write_layers_sizes<W: Write>(&mut self, dst: &mut W) -> std::io::Result<()> {
        for layer in &mut self.layers {
            if layer.changed {
                layer.encoder.done()?;
                let size = layer.encoder.get_ref().get_ref().len();
                dst.write_u32::<LittleEndian>(size as u32)?;
            } else {
                dst.write_u32::<LittleEndian>(0)?;
            }
        }
        Ok(())
    }

    pub fn write_layers<W: Write>(&mut self, dst: &mut W) -> std::io::Result<()> {
        for layer in self.layers.iter().filter(|layer| layer.changed) {
            dst.write_all(layer.encoder.get_ref().get_ref())?;
        }
        Ok(())
    }
}

struct DecompressionLayer {
    decoder: ArithmeticDecoder<Cursor<Vec<u8>>>,
    decompressor: IntegerDecompressor,
    size: u32,
}

pub struct LayeredItemDecompressor {
    layout: Vec<Primitive>,
    last: Vec<u8>,
    layers: Vec<DecompressionLayer>,
}

impl LayeredItemDecompressor {
    pub fn new(item: &LazItem) -> Self {
        let layout = layout_of(item);
        Self {
            last: vec![0u8; layout_size(&layout)],
            layers: layout
                .iter()
                .map(|p| DecompressionLayer {
                    decoder: ArithmeticDecoder::new(Cursor::new(Vec::new())),
                    decompressor: p.decompressor(),
                    size: 0,
                })
                .collect(),
            layout,
        }
    }

    pub fn init_first_point<R: Read>(
        &mut self,
        src: &mut R,
        first_point: &mut [u8],
    ) -> std::io::Result<()> {
        src.read_exact(first_point)?;
        self.last.copy_from_slice(first_point);
        Ok(())
    }

    pub fn read_layers_sizes<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        for layer in &mut self.layers {
            layer.size = src.read_u32::<LittleEndian>()?;
        }
        Ok(())
    }

    pub fn read_layers<R: Read>(&mut self, src: &mut R) -> std::io::Result<()> {
        for layer in &mut self.layers {
            let size = u64::from(layer.size);
            let cursor = layer.decoder.get_mut();
            cursor.set_position(0);
            let buffer = cursor.get_mut();
            buffer.clear();
            // the size comes from the stream, let the source bound the allocation
            let read = src.by_ref().take(size).read_to_end(buffer)?;
            if read as u64 != size {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "layer is truncated",
                ));
            }

            layer.decoder.reset();
            if size > 0 {
                layer.decoder.read_init_bytes()?;
            }
        }
        Ok(())
    }

    pub fn decompress_field_with(&mut self, current_point: &mut [u8]) -> std::io::Result<()> {
        for ((primitive, range), layer) in with_ranges(&self.layout).zip(&mut self.layers) {
            if layer.size == 0 {
                // unchanged, keep the last value
                continue;
            }
            let last = primitive.read_words(&self.last[range.clone()]);
            let mut current = [0i32; 2];
            for context in 0..primitive.num_words() {
                current[context] = layer.decompressor.decompress(
                    &mut layer.decoder,
                    last[context],
                    context as u32,
                )?;
            }
            primitive.write_words(current, &mut self.last[range]);
        }
        current_point.copy_from_slice(&self.last);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_match_item_sizes() {
        let items = [
            LazItemType::Point10,
            LazItemType::GpsTime,
            LazItemType::RGB12,
            LazItemType::WavePacket13,
            LazItemType::Point14,
            LazItemType::RGB14,
            LazItemType::RGBNIR14,
            LazItemType::WavePacket14,
            LazItemType::Byte(5),
            LazItemType::Short(6),
            LazItemType::Integer(8),
            LazItemType::Long(16),
            LazItemType::Float(4),
            LazItemType::Double(8),
            LazItemType::Byte14(3),
        ];
        for item_type in &items {
            let item = LazItem::new(*item_type, 2);
            assert_eq!(
                layout_size(&layout_of(&item)),
                usize::from(item.size()),
                "{:?}",
                item_type
            );
        }
    }

    #[test]
    fn words_round_trip() {
        let mut bytes = [0u8; 8];
        let value = 0xDEAD_BEEF_0123_4567u64;
        Primitive::U64.write_words(
            Primitive::U64.read_words(&value.to_le_bytes()),
            &mut bytes,
        );
        assert_eq!(u64::from_le_bytes(bytes), value);
    }

    #[test]
    fn unchanged_layers_are_empty() {
        let item = LazItem::new(LazItemType::RGB14, 3);
        let mut compressor = LayeredItemCompressor::new(&item);
        compressor.init_first_point(&[1, 0, 2, 0, 3, 0]);
        // only the blue channel changes
        compressor.compress_field_with(&[1, 0, 2, 0, 4, 0]).unwrap();
        compressor.compress_field_with(&[1, 0, 2, 0, 9, 1]).unwrap();

        let mut sizes = Vec::new();
        compressor.write_layers_sizes(&mut sizes).unwrap();
        assert_eq!(&sizes[..8], &[0u8; 8]);
        let blue_size = u32::from_le_bytes([sizes[8], sizes[9], sizes[10], sizes[11]]);
        assert!(blue_size > 0);

        let mut layers = Vec::new();
        compressor.write_layers(&mut layers).unwrap();
        assert_eq!(layers.len(), blue_size as usize);

        let mut src = Cursor::new([vec![1u8, 0, 2, 0, 3, 0], sizes, layers].concat());
        let mut decompressor = LayeredItemDecompressor::new(&item);
        let mut point = [0u8; 6];
        decompressor.init_first_point(&mut src, &mut point).unwrap();
        decompressor.read_layers_sizes(&mut src).unwrap();
        decompressor.read_layers(&mut src).unwrap();
        decompressor.decompress_field_with(&mut point).unwrap();
        assert_eq!(point, [1, 0, 2, 0, 4, 0]);
        decompressor.decompress_field_with(&mut point).unwrap();
        assert_eq!(point, [1, 0, 2, 0, 9, 1]);
        assert_eq!(src.position() as usize, src.get_ref().len());
    }
}
