use crate::config::ConfigError;
use crate::error::Error;

/// Describes any error that happened during a flash operation.
#[derive(Debug, thiserror::Error)]
pub enum FlashError {
    /// The probe access failed while the operation was running.
    ///
    /// Boxed because [`Error`] in turn carries a `FlashError` variant.
    #[error("probe access failed during the flash operation")]
    Probe(#[source] Box<Error>),
    /// The security bit is set and the NVM controller refuses writes.
    #[error("device is locked, perform a chip erase before programming")]
    DeviceLocked,
    /// The flash contents differ from the image.
    #[error(
        "verification failed at address {address:#010x}: expected {expected:#04x}, read {actual:#04x}"
    )]
    VerifyFailed {
        /// Address of the first mismatching byte.
        address: u32,
        /// The byte the image holds.
        expected: u8,
        /// The byte read back from flash.
        actual: u8,
    },
    /// A user row byte read back differently than written.
    #[error("fuse byte {index} expected {expected:#04x}, got {actual:#04x}")]
    FuseByteMismatch {
        /// Byte offset within the user row.
        index: usize,
        /// The byte the reference buffer holds.
        expected: u8,
        /// The byte read back from the user row.
        actual: u8,
    },
    /// A fuse field read back differently than written.
    #[error("fuse verification failed: expected {expected:#x} ({expected}), got {actual:#x} ({actual})")]
    FuseFieldMismatch {
        /// The value the field was expected to hold.
        expected: u32,
        /// The value extracted from the user row.
        actual: u32,
    },
    /// The operation was handed options it cannot work with.
    #[error("invalid flash options")]
    Config(#[from] ConfigError),
}

impl From<Error> for FlashError {
    fn from(error: Error) -> Self {
        FlashError::Probe(Box::new(error))
    }
}
