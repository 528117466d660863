//! The memory access seam between this crate and the debug probe.
//!
//! All flash algorithms in this crate drive the target exclusively through
//! [`MemoryInterface`]. The transport behind it (CMSIS-DAP, J-Link, a mock in
//! tests) is the caller's business.

use std::time::Duration;

use crate::error::Error;

/// Word and block access to the target's memory space.
///
/// Accesses use 32 bit addresses; the supported devices are 32 bit parts and
/// all flash controller arithmetic fits in a `u32`.
pub trait MemoryInterface {
    /// Read a 32 bit word from `address`.
    fn read_word_32(&mut self, address: u32) -> Result<u32, Error>;

    /// Write a 32 bit word to `address`.
    fn write_word_32(&mut self, address: u32, data: u32) -> Result<(), Error>;

    /// Read a block of 8 bit words at `address`.
    fn read_8(&mut self, address: u32, data: &mut [u8]) -> Result<(), Error>;

    /// Write a block of 8 bit words at `address`.
    fn write_8(&mut self, address: u32, data: &[u8]) -> Result<(), Error>;

    /// Flush any pending accesses on batching transports.
    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Block for `duration`.
    ///
    /// Lives on this trait so tests can neutralize waits; the default simply
    /// parks the thread.
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A memory mapped register, accessed as one aligned 32 bit word.
pub trait MemoryMappedRegister:
    Clone + From<u32> + Into<u32> + Sized + std::fmt::Debug
{
    /// The register's address in the target memory map.
    const ADDRESS: u32;
    /// The register's name.
    const NAME: &'static str;
}

pub(crate) fn read_register<R: MemoryMappedRegister>(
    probe: &mut dyn MemoryInterface,
) -> Result<R, Error> {
    let value = probe.read_word_32(R::ADDRESS)?;
    Ok(R::from(value))
}

pub(crate) fn write_register<R: MemoryMappedRegister>(
    probe: &mut dyn MemoryInterface,
    register: R,
) -> Result<(), Error> {
    tracing::trace!("Writing {}: {:?}", R::NAME, register);
    probe.write_word_32(R::ADDRESS, register.into())
}
