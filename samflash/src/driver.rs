//! Interface for device family specific flash algorithms.

use crate::config::{ConfigError, FlashOptions, SamDevice};
use crate::error::Error;
use crate::flashing::{FlashError, FlashProgress, FuseOp, FuseReport};
use crate::memory::MemoryInterface;

/// A flash algorithm for one SAM device family.
///
/// Implementations are stateless. All device state lives behind the
/// [`MemoryInterface`] that is passed into every operation, so a single
/// `&'static` instance can serve any number of sessions.
pub trait FlashDriver: Send + Sync {
    /// Reads the device identification word from the DSU.
    fn read_device_id(&self, probe: &mut dyn MemoryInterface) -> Result<u32, Error>;

    /// Looks up the device belonging to an identification word.
    ///
    /// Returns `None` if the word does not match any device of this family.
    fn identify(&self, did: u32) -> Option<SamDevice>;

    /// All devices this driver supports.
    fn devices(&self) -> &'static [SamDevice];

    /// Checks the session options against the geometry of the device.
    fn validate_options(
        &self,
        device: &SamDevice,
        options: &FlashOptions,
    ) -> Result<(), ConfigError>;

    /// Erases the entire flash and clears the security bit.
    fn erase_all(&self, probe: &mut dyn MemoryInterface) -> Result<(), FlashError>;

    /// Sets the security bit, locking the device until the next chip erase.
    fn lock(&self, probe: &mut dyn MemoryInterface) -> Result<(), FlashError>;

    /// Programs the image from the options into the flash.
    fn program(
        &self,
        probe: &mut dyn MemoryInterface,
        options: &FlashOptions,
        progress: &FlashProgress,
    ) -> Result<(), FlashError>;

    /// Compares the image from the options against the flash contents.
    fn verify(
        &self,
        probe: &mut dyn MemoryInterface,
        options: &FlashOptions,
        progress: &FlashProgress,
    ) -> Result<(), FlashError>;

    /// Reads flash contents back, starting at the offset from the options.
    fn read(
        &self,
        probe: &mut dyn MemoryInterface,
        options: &FlashOptions,
        progress: &FlashProgress,
    ) -> Result<Vec<u8>, FlashError>;

    /// Runs a fuse operation against the user row.
    fn fuse(&self, probe: &mut dyn MemoryInterface, op: &FuseOp) -> Result<FuseReport, FlashError>;

    /// Releases the core and lets the firmware run.
    fn deselect(&self, probe: &mut dyn MemoryInterface) -> Result<(), Error>;
}
