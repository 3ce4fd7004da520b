//! The kinds of fields a point record is made of, and the rules they obey.
use crate::errors::Violation;
use crate::LasZipError;

/// The different type of data / fields found in the definition of LAS points
///
/// Variants that carry a `u16` have a variable size, the value is that size in bytes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum LazItemType {
    /// ExtraBytes for point formats <= 5
    Byte(u16),
    /// Extra bytes made of `i16` / `u16`
    Short(u16),
    /// Extra bytes made of `i32` / `u32`
    Integer(u16),
    /// Extra bytes made of `i64` / `u64`
    Long(u16),
    /// Extra bytes made of `f32`
    Float(u16),
    /// Extra bytes made of `f64`
    Double(u16),
    /// The point format 0, base of formats 1 to 5
    Point10,
    /// GpsTime for point formats <= 5
    GpsTime,
    /// RGB for point formats <= 5
    RGB12,
    /// Wave packet descriptor for point formats 4 & 5
    WavePacket13,
    /// The point format 6, base of formats 7 to 10
    Point14,
    /// RGB for point formats >= 6
    RGB14,
    /// RGB + Nir for point formats >= 6
    RGBNIR14,
    /// Wave packet descriptor for point formats 9 & 10
    WavePacket14,
    /// ExtraBytes for point formats >= 6
    Byte14(u16),
}

impl LazItemType {
    /// Builds the item type from its wire code.
    ///
    /// `size` is only used by the variably sized kinds.
    pub fn from_code(code: u16, size: u16) -> Option<Self> {
        let item_type = match code {
            0 => LazItemType::Byte(size),
            1 => LazItemType::Short(size),
            2 => LazItemType::Integer(size),
            3 => LazItemType::Long(size),
            4 => LazItemType::Float(size),
            5 => LazItemType::Double(size),
            6 => LazItemType::Point10,
            7 => LazItemType::GpsTime,
            8 => LazItemType::RGB12,
            9 => LazItemType::WavePacket13,
            10 => LazItemType::Point14,
            11 => LazItemType::RGB14,
            12 => LazItemType::RGBNIR14,
            13 => LazItemType::WavePacket14,
            14 => LazItemType::Byte14(size),
            _ => return None,
        };
        Some(item_type)
    }

    pub fn size(&self) -> u16 {
        match self.fixed_size() {
            Some(size) => size,
            None => match *self {
                LazItemType::Byte(size)
                | LazItemType::Short(size)
                | LazItemType::Integer(size)
                | LazItemType::Long(size)
                | LazItemType::Float(size)
                | LazItemType::Double(size)
                | LazItemType::Byte14(size) => size,
                _ => 0,
            },
        }
    }

    fn fixed_size(&self) -> Option<u16> {
        match self {
            LazItemType::Point10 => Some(20),
            LazItemType::GpsTime => Some(8),
            LazItemType::RGB12 | LazItemType::RGB14 => Some(6),
            LazItemType::RGBNIR14 => Some(8),
            LazItemType::WavePacket13 | LazItemType::WavePacket14 => Some(29),
            LazItemType::Point14 => Some(30),
            _ => None,
        }
    }

    /// Size of one element of the variably sized kinds
    pub(crate) fn element_width(&self) -> u16 {
        match self {
            LazItemType::Short(_) => 2,
            LazItemType::Integer(_) | LazItemType::Float(_) => 4,
            LazItemType::Long(_) | LazItemType::Double(_) => 8,
            _ => 1,
        }
    }

    fn legal_versions(&self) -> &'static [u16] {
        match self {
            LazItemType::WavePacket13 => &[0, 1],
            LazItemType::WavePacket14 => &[0, 3, 4],
            LazItemType::Point14
            | LazItemType::RGB14
            | LazItemType::RGBNIR14
            | LazItemType::Byte14(_) => &[0, 2, 3, 4],
            _ => &[0, 1, 2],
        }
    }
}

impl From<LazItemType> for u16 {
    fn from(t: LazItemType) -> Self {
        match t {
            LazItemType::Byte(_) => 0,
            LazItemType::Short(_) => 1,
            LazItemType::Integer(_) => 2,
            LazItemType::Long(_) => 3,
            LazItemType::Float(_) => 4,
            LazItemType::Double(_) => 5,
            LazItemType::Point10 => 6,
            LazItemType::GpsTime => 7,
            LazItemType::RGB12 => 8,
            LazItemType::WavePacket13 => 9,
            LazItemType::Point14 => 10,
            LazItemType::RGB14 => 11,
            LazItemType::RGBNIR14 => 12,
            LazItemType::WavePacket14 => 13,
            LazItemType::Byte14(_) => 14,
        }
    }
}

/// One field of the point record and the version
/// of the compression algorithm used for it.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LazItem {
    pub(crate) item_type: LazItemType,
    pub(crate) size: u16,
    pub(crate) version: u16,
}

impl LazItem {
    pub fn new(item_type: LazItemType, version: u16) -> Self {
        Self {
            item_type,
            size: item_type.size(),
            version,
        }
    }

    pub fn item_type(&self) -> LazItemType {
        self.item_type
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// Checks the size and version of the item against what its kind allows.
    ///
    /// `index` is the position of the item in the record, it is only used
    /// to describe the violation.
    pub fn validate(&self, index: usize) -> Result<(), Violation> {
        let item_type = self.item_type;
        match item_type.fixed_size() {
            Some(expected) if expected != self.size => {
                return Err(Violation::ItemSize {
                    index,
                    item_type,
                    expected,
                    actual: self.size,
                });
            }
            Some(_) => {}
            None => {
                let width = item_type.element_width();
                if self.size == 0 || self.size % width != 0 || item_type.size() != self.size {
                    return Err(Violation::ItemSizeNotMultiple {
                        index,
                        item_type,
                        width,
                        actual: self.size,
                    });
                }
            }
        }

        if !item_type.legal_versions().contains(&self.version) {
            return Err(Violation::ItemVersion {
                index,
                item_type,
                version: self.version,
            });
        }
        Ok(())
    }
}

/// Returns the kinds of items that make up a point of the given format.
///
/// The extra bytes are not part of the list.
pub fn item_types_of_point_format(point_format_id: u8) -> crate::Result<&'static [LazItemType]> {
    use LazItemType::*;
    let item_types: &'static [LazItemType] = match point_format_id {
        0 => &[Point10],
        1 => &[Point10, GpsTime],
        2 => &[Point10, RGB12],
        3 => &[Point10, GpsTime, RGB12],
        4 => &[Point10, GpsTime, WavePacket13],
        5 => &[Point10, GpsTime, RGB12, WavePacket13],
        6 => &[Point14],
        7 => &[Point14, RGB14],
        8 => &[Point14, RGBNIR14],
        9 => &[Point14, WavePacket14],
        10 => &[Point14, RGBNIR14, WavePacket14],
        _ => return Err(LasZipError::UnsupportedPointFormat(point_format_id)),
    };
    Ok(item_types)
}

/// Returns true for the point formats introduced by LAS 1.4
pub(crate) fn is_extended_point_format(point_format_id: u8) -> bool {
    point_format_id >= 6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..15u16 {
            let item_type = LazItemType::from_code(code, 4).unwrap();
            assert_eq!(u16::from(item_type), code);
        }
        assert!(LazItemType::from_code(15, 4).is_none());
    }

    #[test]
    fn point_format_sizes() {
        let expected = [20u16, 28, 26, 34, 57, 63, 30, 36, 38, 59, 67];
        for (format, expected) in expected.iter().enumerate() {
            let size: u16 = item_types_of_point_format(format as u8)
                .unwrap()
                .iter()
                .map(LazItemType::size)
                .sum();
            assert_eq!(size, *expected, "point format {}", format);
        }
        assert!(item_types_of_point_format(11).is_err());
    }

    #[test]
    fn wrong_size_is_rejected() {
        let item = LazItem {
            item_type: LazItemType::Point10,
            size: 21,
            version: 2,
        };
        assert_eq!(
            item.validate(3),
            Err(Violation::ItemSize {
                index: 3,
                item_type: LazItemType::Point10,
                expected: 20,
                actual: 21
            })
        );
    }

    #[test]
    fn multiple_of_width() {
        assert!(LazItem::new(LazItemType::Double(16), 2).validate(0).is_ok());
        assert!(matches!(
            LazItem::new(LazItemType::Double(12), 2).validate(0),
            Err(Violation::ItemSizeNotMultiple { width: 8, .. })
        ));
        assert!(matches!(
            LazItem::new(LazItemType::Byte(0), 2).validate(0),
            Err(Violation::ItemSizeNotMultiple { width: 1, .. })
        ));
    }

    #[test]
    fn versions() {
        assert!(LazItem::new(LazItemType::WavePacket13, 2).validate(0).is_err());
        assert!(LazItem::new(LazItemType::WavePacket14, 2).validate(0).is_err());
        assert!(LazItem::new(LazItemType::Point14, 2).validate(0).is_ok());
        assert!(LazItem::new(LazItemType::Point10, 3).validate(0).is_err());
    }
}
