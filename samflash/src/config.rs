//! Device descriptors and the options a session is created with.

use crate::flashing::{FuseOp, FuseSource};

/// One supported device, identified by its DSU device ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamDevice {
    /// Identification word with the revision field cleared.
    pub did: u32,
    /// The device name as printed on the package.
    pub name: &'static str,
    /// Program flash size in bytes.
    pub flash_size: u32,
}

/// Everything a [`Session`](crate::Session) needs to know about the work it
/// is going to do.
///
/// The options are checked once against the identified device during
/// [`Session::attach`](crate::Session::attach); the individual operations run
/// on pre-validated values.
#[derive(Debug, Clone, Default)]
pub struct FlashOptions {
    /// Byte offset into program flash for programming, verification and
    /// read-back. Must be a multiple of the row size.
    pub offset: u32,
    /// The image used by programming and verification. Does not need to be
    /// padded; programming pads the final row with the erased byte value.
    pub image: Option<Vec<u8>>,
    /// Number of bytes a read-back returns. Zero reads nothing.
    pub read_size: u32,
    /// The user row operation executed by [`Session::fuse`](crate::Session::fuse).
    pub fuse: Option<FuseOp>,
}

impl FlashOptions {
    /// Options that do nothing until filled in.
    pub fn new() -> Self {
        Self::default()
    }
}

/// A conflict between the requested options and the device geometry.
///
/// These correspond to caller mistakes. They are all fatal; nothing in this
/// crate retries or degrades.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The flash offset must align to the erase granule.
    #[error("offset {offset:#010x} is not a multiple of the {row_size} byte row size")]
    UnalignedOffset {
        /// The offending offset.
        offset: u32,
        /// The row size of the identified device.
        row_size: u32,
    },
    /// The image does not fit the device.
    #[error("{size} byte image at offset {offset:#010x} exceeds the {flash_size} byte flash")]
    ImageOutOfBounds {
        /// Requested flash offset.
        offset: u32,
        /// Unpadded image length.
        size: usize,
        /// Flash size of the identified device.
        flash_size: u32,
    },
    /// The read-back span does not fit the device.
    #[error("{size} byte read at offset {offset:#010x} exceeds the {flash_size} byte flash")]
    ReadOutOfBounds {
        /// Requested flash offset.
        offset: u32,
        /// Requested read length.
        size: u32,
        /// Flash size of the identified device.
        flash_size: u32,
    },
    /// Programming or verification was requested without an image.
    #[error("no image data supplied")]
    MissingImage,
    /// Only fuse section 0 exists on these devices.
    #[error("unsupported fuse section {section}")]
    UnsupportedFuseSection {
        /// The requested section index.
        section: u8,
    },
    /// The fuse bit range is empty or outside the user row.
    #[error("invalid fuse bit range {start}..={end}")]
    InvalidFuseRange {
        /// First bit of the range.
        start: u16,
        /// Last bit of the range.
        end: u16,
    },
    /// Fuse field values are transported in a `u32`.
    #[error("fuse bit range {start}..={end} is wider than 32 bits")]
    FuseRangeTooWide {
        /// First bit of the range.
        start: u16,
        /// Last bit of the range.
        end: u16,
    },
    /// A bit range and a whole-row buffer cannot be combined.
    #[error("a fuse bit range and a whole-row buffer are mutually exclusive")]
    ConflictingFuseSource,
    /// A scalar fuse value is meaningless without a bit range.
    #[error("a scalar fuse value needs a bit range")]
    ValueWithoutRange,
    /// A fuse write or range verify needs reference data.
    #[error("fuse operation needs a value or a whole-row buffer")]
    MissingFuseSource,
    /// Whole-row verification needs a reference buffer.
    #[error("please specify a fuse bit range for verification")]
    MissingVerifyReference,
}

/// Check `options` against the geometry of the identified device.
///
/// Mistakes that only materialize in a specific fuse phase (missing write
/// source, missing verify reference, bad section) are reported by that phase
/// instead, so the phases before it still run.
pub(crate) fn validate(
    options: &FlashOptions,
    flash_size: u32,
    row_size: u32,
    user_row_size: u32,
) -> Result<(), ConfigError> {
    if options.offset % row_size != 0 {
        return Err(ConfigError::UnalignedOffset {
            offset: options.offset,
            row_size,
        });
    }

    if let Some(image) = &options.image {
        // Summed in u64, an image length can exceed u32 on 64 bit hosts.
        if u64::from(options.offset) + image.len() as u64 > u64::from(flash_size) {
            return Err(ConfigError::ImageOutOfBounds {
                offset: options.offset,
                size: image.len(),
                flash_size,
            });
        }
    }

    if options.read_size > 0
        && options
            .offset
            .checked_add(options.read_size)
            .map_or(true, |end| end > flash_size)
    {
        return Err(ConfigError::ReadOutOfBounds {
            offset: options.offset,
            size: options.read_size,
            flash_size,
        });
    }

    if let Some(fuse) = &options.fuse {
        if let Some(range) = &fuse.range {
            if u32::from(range.end()) >= user_row_size * 8 {
                return Err(ConfigError::InvalidFuseRange {
                    start: range.start(),
                    end: range.end(),
                });
            }
            if matches!(fuse.source, Some(FuseSource::Buffer(_))) {
                return Err(ConfigError::ConflictingFuseSource);
            }
        } else if matches!(fuse.source, Some(FuseSource::Value(_))) {
            return Err(ConfigError::ValueWithoutRange);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::flashing::{FuseOp, FuseRange, FuseSource};

    use super::*;

    const FLASH_SIZE: u32 = 1024 * 1024;
    const ROW_SIZE: u32 = 8192;
    const USER_ROW_SIZE: u32 = 512;

    fn check(options: &FlashOptions) -> Result<(), ConfigError> {
        validate(options, FLASH_SIZE, ROW_SIZE, USER_ROW_SIZE)
    }

    #[test]
    fn default_options_pass() {
        assert_eq!(check(&FlashOptions::new()), Ok(()));
    }

    #[test]
    fn offset_must_be_row_aligned() {
        let mut options = FlashOptions::new();
        options.offset = 512;
        assert_eq!(
            check(&options),
            Err(ConfigError::UnalignedOffset {
                offset: 512,
                row_size: ROW_SIZE
            })
        );
    }

    #[test]
    fn image_must_fit_the_flash() {
        let mut options = FlashOptions::new();
        options.offset = FLASH_SIZE - ROW_SIZE;
        options.image = Some(vec![0; ROW_SIZE as usize + 1]);
        assert!(matches!(
            check(&options),
            Err(ConfigError::ImageOutOfBounds { .. })
        ));
    }

    #[test]
    fn image_at_the_end_of_flash_is_fine() {
        let mut options = FlashOptions::new();
        options.offset = FLASH_SIZE - ROW_SIZE;
        options.image = Some(vec![0; ROW_SIZE as usize]);
        assert_eq!(check(&options), Ok(()));
    }

    // The zeroed pages stay untouched, only the length matters here.
    #[cfg(target_pointer_width = "64")]
    #[test]
    fn image_lengths_beyond_the_address_space_are_rejected() {
        let mut options = FlashOptions::new();
        options.image = Some(vec![0; (1 << 32) + 512]);
        assert!(matches!(
            check(&options),
            Err(ConfigError::ImageOutOfBounds { size, .. }) if size == (1 << 32) + 512
        ));
    }

    #[test]
    fn read_span_must_fit_the_flash() {
        let mut options = FlashOptions::new();
        options.read_size = FLASH_SIZE + 512;
        assert!(matches!(
            check(&options),
            Err(ConfigError::ReadOutOfBounds { .. })
        ));
    }

    #[test]
    fn read_span_overflow_is_caught() {
        let mut options = FlashOptions::new();
        options.offset = FLASH_SIZE - ROW_SIZE;
        options.read_size = u32::MAX - 100;
        assert!(matches!(
            check(&options),
            Err(ConfigError::ReadOutOfBounds { .. })
        ));
    }

    #[test]
    fn fuse_range_must_stay_inside_the_user_row() {
        let mut options = FlashOptions::new();
        options.fuse = Some(FuseOp {
            read: true,
            range: Some(FuseRange::new(4090, 4100).unwrap()),
            ..Default::default()
        });
        assert!(matches!(
            check(&options),
            Err(ConfigError::InvalidFuseRange { .. })
        ));
    }

    #[test]
    fn range_and_buffer_conflict() {
        let mut options = FlashOptions::new();
        options.fuse = Some(FuseOp {
            write: true,
            range: Some(FuseRange::new(0, 7).unwrap()),
            source: Some(FuseSource::Buffer(vec![0; 4])),
            ..Default::default()
        });
        assert_eq!(check(&options), Err(ConfigError::ConflictingFuseSource));
    }

    #[test]
    fn scalar_value_needs_a_range() {
        let mut options = FlashOptions::new();
        options.fuse = Some(FuseOp {
            write: true,
            source: Some(FuseSource::Value(1)),
            ..Default::default()
        });
        assert_eq!(check(&options), Err(ConfigError::ValueWithoutRange));
    }
}
