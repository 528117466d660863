use crate::config::{FlashOptions, SamDevice};
use crate::driver::FlashDriver;
use crate::error::Error;
use crate::flashing::{FlashProgress, FuseReport};
use crate::memory::MemoryInterface;
use crate::permissions::Permissions;
use crate::registry;

/// A session to a halted SAM device.
///
/// The session owns the probe. [`Session::attach`] halts the core and
/// identifies the device; all flash operations run against that halted
/// core. Dropping the session (or calling [`Session::detach`]) resets
/// the device and lets the firmware run.
pub struct Session {
    probe: Box<dyn MemoryInterface>,
    driver: &'static dyn FlashDriver,
    device: SamDevice,
    options: FlashOptions,
    permissions: Permissions,
    detached: bool,
}

impl Session {
    /// Halts the core, identifies the device and checks the options
    /// against its flash geometry.
    ///
    /// Returns [`Error::UnknownDevice`] when no registered family claims
    /// the identification word.
    pub fn attach(
        mut probe: Box<dyn MemoryInterface>,
        options: FlashOptions,
        permissions: Permissions,
    ) -> Result<Self, Error> {
        crate::core::halt_and_reset(probe.as_mut())?;
        probe.flush()?;

        let mut did = 0;
        for driver in registry::families() {
            did = driver.read_device_id(probe.as_mut())?;
            if let Some(device) = driver.identify(did) {
                driver.validate_options(&device, &options)?;
                return Ok(Self {
                    probe,
                    driver,
                    device,
                    options,
                    permissions,
                    detached: false,
                });
            }
        }
        Err(Error::UnknownDevice { did })
    }

    /// The identified device.
    pub fn device(&self) -> &SamDevice {
        &self.device
    }

    /// The options this session was attached with.
    pub fn options(&self) -> &FlashOptions {
        &self.options
    }

    /// Erases the entire flash and clears the security bit.
    ///
    /// Requires [`Permissions::allow_erase_all`].
    pub fn erase_all(&mut self, progress: &FlashProgress) -> Result<(), Error> {
        self.permissions.erase_all()?;
        progress.started_erasing();
        match self.driver.erase_all(self.probe.as_mut()) {
            Ok(()) => {
                progress.finished_erasing();
                Ok(())
            }
            Err(error) => {
                progress.failed_erasing();
                Err(error.into())
            }
        }
    }

    /// Sets the security bit. The device refuses debug access from the
    /// next reset on, until a chip erase clears it again.
    ///
    /// Requires [`Permissions::allow_lock`].
    pub fn lock(&mut self) -> Result<(), Error> {
        self.permissions.lock()?;
        Ok(self.driver.lock(self.probe.as_mut())?)
    }

    /// Programs the image from the options into the flash.
    pub fn program(&mut self, progress: &FlashProgress) -> Result<(), Error> {
        match self
            .driver
            .program(self.probe.as_mut(), &self.options, progress)
        {
            Ok(()) => Ok(()),
            Err(error) => {
                progress.failed_programming();
                Err(error.into())
            }
        }
    }

    /// Compares the image from the options against the flash contents.
    pub fn verify(&mut self, progress: &FlashProgress) -> Result<(), Error> {
        match self
            .driver
            .verify(self.probe.as_mut(), &self.options, progress)
        {
            Ok(()) => Ok(()),
            Err(error) => {
                progress.failed_verifying();
                Err(error.into())
            }
        }
    }

    /// Reads `read_size` bytes of flash, starting at the offset from the
    /// options.
    pub fn read(&mut self, progress: &FlashProgress) -> Result<Vec<u8>, Error> {
        match self
            .driver
            .read(self.probe.as_mut(), &self.options, progress)
        {
            Ok(data) => Ok(data),
            Err(error) => {
                progress.failed_reading();
                Err(error.into())
            }
        }
    }

    /// Runs the fuse operation from the options against the user row.
    ///
    /// Returns an empty report when the options carry no fuse operation.
    pub fn fuse(&mut self) -> Result<FuseReport, Error> {
        match &self.options.fuse {
            Some(op) => Ok(self.driver.fuse(self.probe.as_mut(), op)?),
            None => Ok(FuseReport::default()),
        }
    }

    /// Resets the device and lets the firmware run.
    pub fn detach(mut self) -> Result<(), Error> {
        self.detached = true;
        self.driver.deselect(self.probe.as_mut())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        if let Err(error) = self.driver.deselect(self.probe.as_mut()) {
            tracing::warn!("Failed to release the target: {}", error);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device", &self.device)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
