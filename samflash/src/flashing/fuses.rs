//! Fuse access through the NVM user row.
//!
//! Fuses live in the user row, a 512 byte flash section outside the main
//! array that survives ordinary erases. A fuse field is addressed as an
//! inclusive bit range, counted LSB first from the start of the row: bit
//! `n` is bit `n % 8` of byte `n / 8`.

use crate::config::ConfigError;

/// An inclusive bit range addressing a fuse field inside the user row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuseRange {
    start: u16,
    end: u16,
}

impl FuseRange {
    /// Creates a range spanning bits `start..=end`.
    ///
    /// The range must be ordered and at most 32 bits wide so the field
    /// fits a `u32`.
    pub fn new(start: u16, end: u16) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvalidFuseRange { start, end });
        }
        if end - start >= 32 {
            return Err(ConfigError::FuseRangeTooWide { start, end });
        }
        Ok(Self { start, end })
    }

    /// The first bit of the field.
    pub fn start(&self) -> u16 {
        self.start
    }

    /// The last bit of the field, inclusive.
    pub fn end(&self) -> u16 {
        self.end
    }

    /// Assembles the field value from the row bytes, LSB first.
    pub(crate) fn extract(&self, row: &[u8]) -> u32 {
        let mut value = 0;
        for (bit, pos) in (self.start..=self.end).enumerate() {
            if row[usize::from(pos) / 8] & (1 << (pos % 8)) != 0 {
                value |= 1 << bit;
            }
        }
        value
    }

    /// Scatters the field value into the row bytes, LSB first.
    ///
    /// Bits of `value` beyond the width of the range are ignored.
    pub(crate) fn apply(&self, row: &mut [u8], value: u32) {
        for (bit, pos) in (self.start..=self.end).enumerate() {
            let byte = &mut row[usize::from(pos) / 8];
            if value & (1 << bit) != 0 {
                *byte |= 1 << (pos % 8);
            } else {
                *byte &= !(1 << (pos % 8));
            }
        }
    }
}

/// Where the bytes for a fuse write come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuseSource {
    /// A field value, scattered into the row through a [`FuseRange`].
    Value(u32),
    /// A whole row image. Longer buffers are truncated to the row size.
    Buffer(Vec<u8>),
}

/// A fuse operation against the user row.
///
/// The flags combine: a single operation can write and then verify in
/// one go. The current row is always read first, so a field write only
/// touches the bits its range names.
#[derive(Debug, Clone, Default)]
pub struct FuseOp {
    /// Report the current row or field value.
    pub read: bool,
    /// Erase and rewrite the row.
    pub write: bool,
    /// Read the row back and compare it against the source.
    pub verify: bool,
    /// The fuse section. Only section 0, the user row, exists on this family.
    pub section: u8,
    /// The field to operate on. `None` addresses the whole row.
    pub range: Option<FuseRange>,
    /// The data for write and verify.
    pub source: Option<FuseSource>,
}

impl FuseOp {
    /// Reads the whole user row.
    pub fn read_row() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    /// Reads a single fuse field.
    pub fn read_field(range: FuseRange) -> Self {
        Self {
            read: true,
            range: Some(range),
            ..Default::default()
        }
    }

    /// Writes a single fuse field, preserving the rest of the row.
    pub fn write_field(range: FuseRange, value: u32) -> Self {
        Self {
            write: true,
            range: Some(range),
            source: Some(FuseSource::Value(value)),
            ..Default::default()
        }
    }

    /// Replaces the user row with the given bytes.
    pub fn write_row(data: Vec<u8>) -> Self {
        Self {
            write: true,
            source: Some(FuseSource::Buffer(data)),
            ..Default::default()
        }
    }

    /// Additionally verifies the row after the other phases ran.
    #[must_use]
    pub fn and_verify(mut self) -> Self {
        self.verify = true;
        self
    }
}

/// What a fuse operation read back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuseReport {
    /// The user row contents, when a whole row read was requested.
    pub row: Option<Vec<u8>>,
    /// The field value, when a field read was requested.
    pub value: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case(0, 7, 0x78; "first byte")]
    #[test_case(4, 11, 0x67; "nibble straddle")]
    #[test_case(0, 31, 0x1234_5678; "full word")]
    #[test_case(8, 8, 0x0; "single clear bit")]
    #[test_case(9, 9, 0x1; "single set bit")]
    fn extract_counts_bits_lsb_first(start: u16, end: u16, expected: u32) {
        let mut row = [0u8; 512];
        row[..4].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        let range = FuseRange::new(start, end).unwrap();
        assert_eq!(range.extract(&row), expected);
    }

    #[test]
    fn apply_scatters_lsb_first() {
        let mut row = [0u8; 512];
        FuseRange::new(32, 47).unwrap().apply(&mut row, 0xcafe);
        assert_eq!(&row[4..6], &[0xfe, 0xca]);
        assert_eq!(row[3], 0);
        assert_eq!(row[6], 0);
    }

    #[test]
    fn apply_clears_bits_inside_the_range() {
        let mut row = [0xff_u8; 512];
        FuseRange::new(8, 15).unwrap().apply(&mut row, 0);
        assert_eq!(row[0], 0xff);
        assert_eq!(row[1], 0);
        assert_eq!(row[2], 0xff);
    }

    #[test]
    fn apply_ignores_value_bits_beyond_the_range() {
        let mut row = [0u8; 512];
        let range = FuseRange::new(0, 3).unwrap();
        range.apply(&mut row, 0xffff_ffff);
        assert_eq!(row[0], 0x0f);
        assert_eq!(range.extract(&row), 0xf);
    }

    #[test_case(7, 7, 0x1; "single bit")]
    #[test_case(2, 6, 0x15; "inside one byte")]
    #[test_case(13, 27, 0x5a5a; "byte straddle")]
    #[test_case(24, 55, 0xdead_beef; "across four bytes")]
    fn apply_then_extract_round_trips(start: u16, end: u16, value: u32) {
        let mut row = [0xff_u8; 512];
        let range = FuseRange::new(start, end).unwrap();
        range.apply(&mut row, value);
        assert_eq!(range.extract(&row), value);
    }

    #[test]
    fn ranges_must_be_ordered() {
        assert_eq!(
            FuseRange::new(9, 3),
            Err(ConfigError::InvalidFuseRange { start: 9, end: 3 })
        );
    }

    #[test_case(0, 31; "exactly a word")]
    #[test_case(100, 100; "single bit")]
    fn range_widths_up_to_a_word_are_fine(start: u16, end: u16) {
        assert!(FuseRange::new(start, end).is_ok());
    }

    #[test_case(0, 32; "one bit past a word")]
    #[test_case(0, u16::MAX; "the whole bit address space")]
    fn ranges_wider_than_a_word_are_rejected(start: u16, end: u16) {
        assert_eq!(
            FuseRange::new(start, end),
            Err(ConfigError::FuseRangeTooWide { start, end })
        );
    }
}
