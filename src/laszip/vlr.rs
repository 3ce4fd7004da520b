//! The laszip tag record and the typed configuration it describes.
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::errors::Violation;
use crate::laszip::chunk_table::count_field;
use crate::laszip::items::{is_extended_point_format, item_types_of_point_format};
use crate::laszip::{LazItem, LazItemType};

pub const DEFAULT_CHUNK_SIZE: u32 = 50_000;

/// Version of the laszip library that wrote the record
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub revision: u16,
}

impl Version {
    fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            major: src.read_u8()?,
            minor: src.read_u8()?,
            revision: src.read_u16::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u8(self.major)?;
        dst.write_u8(self.minor)?;
        dst.write_u16::<LittleEndian>(self.revision)?;
        Ok(())
    }
}

impl Default for Version {
    fn default() -> Self {
        Self {
            major: 3,
            minor: 4,
            revision: 3,
        }
    }
}

/// Layout of the point data.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CompressorType {
    /// Raw points
    None = 0,
    /// A single arithmetic coded stream, no chunk table
    PointWise = 1,
    /// Independent chunks of points coded one after the other
    PointWiseChunked = 2,
    /// Independent chunks, each field of the points coded in its own layer
    LayeredChunked = 3,
}

impl CompressorType {
    pub fn from_u16(t: u16) -> Option<Self> {
        match t {
            0 => Some(CompressorType::None),
            1 => Some(CompressorType::PointWise),
            2 => Some(CompressorType::PointWiseChunked),
            3 => Some(CompressorType::LayeredChunked),
            _ => None,
        }
    }

    pub fn is_chunked(self) -> bool {
        matches!(
            self,
            CompressorType::PointWiseChunked | CompressorType::LayeredChunked
        )
    }

    /// Returns the compressor to use for items of the given version.
    fn coerced_for(self, version: u16) -> Self {
        match self {
            CompressorType::LayeredChunked if version < 3 => CompressorType::PointWiseChunked,
            CompressorType::PointWise | CompressorType::PointWiseChunked if version >= 3 => {
                CompressorType::LayeredChunked
            }
            other => other,
        }
    }
}

impl Default for CompressorType {
    fn default() -> Self {
        CompressorType::PointWiseChunked
    }
}

/// The entropy coder, the arithmetic coder is the only one
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Coder {
    Arithmetic = 0,
}

impl Coder {
    pub fn from_u16(t: u16) -> Option<Self> {
        match t {
            0 => Some(Coder::Arithmetic),
            _ => None,
        }
    }
}

/// The two `i64` that end the tag record header.
///
/// Records written by laszip before version 3 store point and byte counts there,
/// later versions store where the special EVLRs are.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TagTrailer {
    Legacy {
        num_points: i64,
        num_bytes: i64,
    },
    Modern {
        // -1 if unused
        number_of_special_evlrs: i64,
        // -1 if unused
        offset_to_special_evlrs: i64,
    },
}

impl TagTrailer {
    fn from_pair(version: Version, first: i64, second: i64) -> Self {
        if version.major < 3 {
            TagTrailer::Legacy {
                num_points: first,
                num_bytes: second,
            }
        } else {
            TagTrailer::Modern {
                number_of_special_evlrs: first,
                offset_to_special_evlrs: second,
            }
        }
    }

    fn pair(&self) -> (i64, i64) {
        match *self {
            TagTrailer::Legacy {
                num_points,
                num_bytes,
            } => (num_points, num_bytes),
            TagTrailer::Modern {
                number_of_special_evlrs,
                offset_to_special_evlrs,
            } => (number_of_special_evlrs, offset_to_special_evlrs),
        }
    }
}

impl Default for TagTrailer {
    fn default() -> Self {
        TagTrailer::Modern {
            number_of_special_evlrs: -1,
            offset_to_special_evlrs: -1,
        }
    }
}

/// An item of the tag record, as found on the wire
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TagItem {
    pub item_type: u16,
    pub size: u16,
    pub version: u16,
}

impl From<LazItem> for TagItem {
    fn from(item: LazItem) -> Self {
        Self {
            item_type: item.item_type.into(),
            size: item.size,
            version: item.version,
        }
    }
}

/// The record_data of the laszip VLR.
///
/// The record keeps the raw codes, so reading it only fails
/// when the data is truncated.
/// [`ZipConfiguration::from_tag`] gives them their meaning.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TagRecord {
    pub compressor: u16,
    pub coder: u16,
    pub version: Version,
    pub options: u32,
    pub chunk_size: u32,
    pub trailer: TagTrailer,
    pub items: Vec<TagItem>,
}

impl TagRecord {
    /// The user id of the LasZip VLR header.
    pub const USER_ID: &'static str = "laszip encoded";
    /// The record id of the LasZip VLR header.
    pub const RECORD_ID: u16 = 22204;
    /// The description of the LasZip VLR header.
    pub const DESCRIPTION: &'static str = "http://laszip.org";

    /// Size of the fixed part of the record
    pub const HEADER_SIZE: usize = 34;
    /// Size taken by each item
    pub const ITEM_SIZE: usize = 6;

    /// Tries to read the record from the record_data buffer
    pub fn from_buffer(record_data: &[u8]) -> crate::Result<Self> {
        let mut cursor = std::io::Cursor::new(record_data);
        Self::read_from(&mut cursor)
    }

    /// Tries to read the record from the record_data source
    pub fn read_from<R: Read>(src: &mut R) -> crate::Result<Self> {
        let compressor = src.read_u16::<LittleEndian>()?;
        let coder = src.read_u16::<LittleEndian>()?;
        let version = Version::read_from(src)?;
        let options = src.read_u32::<LittleEndian>()?;
        let chunk_size = src.read_u32::<LittleEndian>()?;
        let first = src.read_i64::<LittleEndian>()?;
        let second = src.read_i64::<LittleEndian>()?;

        let num_items = src.read_u16::<LittleEndian>()?;
        let mut items = Vec::with_capacity(usize::from(num_items));
        for _ in 0..num_items {
            items.push(TagItem {
                item_type: src.read_u16::<LittleEndian>()?,
                size: src.read_u16::<LittleEndian>()?,
                version: src.read_u16::<LittleEndian>()?,
            });
        }

        Ok(Self {
            compressor,
            coder,
            version,
            options,
            chunk_size,
            trailer: TagTrailer::from_pair(version, first, second),
            items,
        })
    }

    /// Writes the record data, the VLR header must be written before-hand
    ///
    /// Fails, without writing anything, when there are more items than a record can count.
    pub fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        let num_items: u16 = count_field(self.items.len(), "items")?;
        dst.write_u16::<LittleEndian>(self.compressor)?;
        dst.write_u16::<LittleEndian>(self.coder)?;
        self.version.write_to(dst)?;
        dst.write_u32::<LittleEndian>(self.options)?;
        dst.write_u32::<LittleEndian>(self.chunk_size)?;
        let (first, second) = self.trailer.pair();
        dst.write_i64::<LittleEndian>(first)?;
        dst.write_i64::<LittleEndian>(second)?;
        dst.write_u16::<LittleEndian>(num_items)?;
        for item in &self.items {
            dst.write_u16::<LittleEndian>(item.item_type)?;
            dst.write_u16::<LittleEndian>(item.size)?;
            dst.write_u16::<LittleEndian>(item.version)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(Self::HEADER_SIZE + Self::ITEM_SIZE * self.items.len());
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }
}

/// Describes how the points of a stream are compressed:
/// the compressor, the chunking and the items a point is made of.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ZipConfiguration {
    compressor: CompressorType,
    coder: Coder,
    version: Version,
    options: u32,
    /// Number of points per chunk
    chunk_size: u32,
    trailer: TagTrailer,
    items: Vec<LazItem>,
}

impl ZipConfiguration {
    /// Sentinel value to indicate that chunks have a variable size.
    pub const VARIABLE_CHUNK_SIZE: u32 = u32::MAX;

    /// Creates the configuration for a LAS point format.
    ///
    /// The `requested_version` is clamped to what the format supports
    /// (1..=2 for formats 0 to 5, 3..=4 for formats 6 to 10), and the compressor
    /// is coerced to one that can use that version.
    pub fn from_format(
        point_format_id: u8,
        num_extra_bytes: u16,
        compressor: CompressorType,
        requested_version: u16,
    ) -> crate::Result<Self> {
        let item_types = item_types_of_point_format(point_format_id)?;
        let extended = is_extended_point_format(point_format_id);

        let version = if compressor == CompressorType::None {
            0
        } else if extended {
            requested_version.max(3).min(4)
        } else {
            requested_version.max(1).min(2)
        };

        let mut items: Vec<LazItem> = item_types
            .iter()
            .map(|item_type| match item_type {
                // only ever had one version
                LazItemType::WavePacket13 => LazItem::new(*item_type, version.min(1)),
                _ => LazItem::new(*item_type, version),
            })
            .collect();
        if num_extra_bytes > 0 {
            let extra_bytes = if extended {
                LazItemType::Byte14(num_extra_bytes)
            } else {
                LazItemType::Byte(num_extra_bytes)
            };
            items.push(LazItem::new(extra_bytes, version));
        }

        let compressor = if compressor == CompressorType::None {
            compressor
        } else {
            compressor.coerced_for(version)
        };
        let chunk_size = if compressor == CompressorType::PointWise {
            0
        } else {
            DEFAULT_CHUNK_SIZE
        };

        Ok(Self {
            compressor,
            coder: Coder::Arithmetic,
            version: Version::default(),
            options: 0,
            chunk_size,
            trailer: TagTrailer::default(),
            items,
        })
    }

    /// Gives their meaning to the codes of the tag record.
    ///
    /// The sizes and versions are not checked, see [`validate`](Self::validate).
    pub fn from_tag(tag: &TagRecord) -> crate::Result<Self> {
        let compressor = CompressorType::from_u16(tag.compressor)
            .ok_or(Violation::UnknownCompressor(tag.compressor))?;
        let coder = Coder::from_u16(tag.coder).ok_or(Violation::UnknownCoder(tag.coder))?;
        let items = tag
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                let item_type = LazItemType::from_code(item.item_type, item.size).ok_or(
                    Violation::UnknownItemType {
                        index,
                        code: item.item_type,
                    },
                )?;
                Ok(LazItem {
                    item_type,
                    size: item.size,
                    version: item.version,
                })
            })
            .collect::<Result<Vec<_>, Violation>>()?;

        Ok(Self {
            compressor,
            coder,
            version: tag.version,
            options: tag.options,
            chunk_size: tag.chunk_size,
            trailer: tag.trailer,
            items,
        })
    }

    pub fn to_tag(&self) -> TagRecord {
        TagRecord {
            compressor: self.compressor as u16,
            coder: self.coder as u16,
            version: self.version,
            options: self.options,
            chunk_size: self.chunk_size,
            trailer: self.trailer,
            items: self.items.iter().copied().map(TagItem::from).collect(),
        }
    }

    /// Checks that every item is legal and that they fit the compressor.
    ///
    /// When `point_size` is not 0, the items must add up to it.
    pub fn validate(&self, point_size: u16) -> crate::Result<()> {
        if self.items.is_empty() {
            return Err(Violation::NoItems.into());
        }
        for (index, item) in self.items.iter().enumerate() {
            item.validate(index)?;
            let compatible = match self.compressor {
                CompressorType::None => true,
                CompressorType::PointWise | CompressorType::PointWiseChunked => item.version < 3,
                CompressorType::LayeredChunked => item.version >= 3,
            };
            if !compatible {
                return Err(Violation::IncompatibleCompressor {
                    index,
                    compressor: self.compressor,
                    version: item.version,
                }
                .into());
            }
        }

        if self.compressor.is_chunked() && self.chunk_size == 0 {
            return Err(Violation::ZeroChunkSize(self.compressor).into());
        }

        let items_size = self.items_size();
        if point_size != 0 && items_size != u32::from(point_size) {
            return Err(Violation::PointSize {
                items_size,
                point_size: u32::from(point_size),
            }
            .into());
        }
        Ok(())
    }

    pub fn compressor(&self) -> CompressorType {
        self.compressor
    }

    pub fn coder(&self) -> Coder {
        self.coder
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn options(&self) -> u32 {
        self.options
    }

    pub fn trailer(&self) -> TagTrailer {
        self.trailer
    }

    /// Returns the chunk size, that is, the number of points
    /// in each chunk.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn uses_variable_size_chunks(&self) -> bool {
        self.chunk_size == Self::VARIABLE_CHUNK_SIZE
    }

    /// Returns the items compressed by this configuration
    pub fn items(&self) -> &[LazItem] {
        &self.items
    }

    /// Returns the sum of the size of the items, which should correspond to the
    /// size of a point record.
    pub fn items_size(&self) -> u32 {
        self.items.iter().map(|item| u32::from(item.size)).sum()
    }

    /// Number of extra bytes at the end of each point
    pub fn num_extra_bytes(&self) -> u16 {
        self.items
            .iter()
            .filter(|item| {
                matches!(
                    item.item_type,
                    LazItemType::Byte(_) | LazItemType::Byte14(_)
                )
            })
            .map(|item| item.size)
            .sum()
    }
}

/// Builds a [`ZipConfiguration`] from a list of items.
///
/// # Example
///
/// ```
/// use laz_chunked::{LazItem, LazItemType, ZipConfigurationBuilder};
///
/// let config = ZipConfigurationBuilder::new(vec![
///         LazItem::new(LazItemType::Point10, 2),
///         LazItem::new(LazItemType::RGB12, 2),
///     ])
///     .with_chunk_size(5_000)
///     .build();
/// assert_eq!(config.items_size(), 26);
/// assert!(config.validate(26).is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ZipConfigurationBuilder {
    items: Vec<LazItem>,
    compressor: CompressorType,
    chunk_size: u32,
    options: u32,
}

impl ZipConfigurationBuilder {
    pub fn new(items: Vec<LazItem>) -> Self {
        Self {
            items,
            compressor: CompressorType::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            options: 0,
        }
    }

    pub fn with_compressor(mut self, compressor: CompressorType) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_variable_chunk_size(mut self) -> Self {
        self.chunk_size = ZipConfiguration::VARIABLE_CHUNK_SIZE;
        self
    }

    pub fn with_options(mut self, options: u32) -> Self {
        self.options = options;
        self
    }

    /// Builds the configuration.
    ///
    /// A layered compressor is downgraded to a point-wise chunked one
    /// when an item uses a version older than 3.
    pub fn build(self) -> ZipConfiguration {
        let mut compressor = self.compressor;
        if compressor == CompressorType::LayeredChunked
            && self.items.iter().any(|item| item.version < 3)
        {
            compressor = CompressorType::PointWiseChunked;
        }
        let chunk_size = if compressor == CompressorType::PointWise {
            0
        } else {
            self.chunk_size
        };
        ZipConfiguration {
            compressor,
            coder: Coder::Arithmetic,
            version: Version::default(),
            options: self.options,
            chunk_size,
            trailer: TagTrailer::default(),
            items: self.items,
        }
    }
}
