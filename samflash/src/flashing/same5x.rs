//! Flash algorithm for the SAM D5x/E5x family.
//!
//! These parts carry a Cortex-M4 and the second revision of the NVM
//! controller: 8 KiB erase blocks split into 512 byte pages, commands
//! issued through `CTRLB`, and a 512 byte user row written as quad words.

use std::time::Duration;

use bitfield::bitfield;
use static_assertions::const_assert_eq;

use crate::config::{ConfigError, FlashOptions, SamDevice};
use crate::driver::FlashDriver;
use crate::error::Error;
use crate::flashing::{FlashError, FlashProgress, FuseOp, FuseReport, FuseSource};
use crate::memory::{read_register, write_register, MemoryInterface, MemoryMappedRegister};

/// Start of the main flash array.
pub const FLASH_ADDR: u32 = 0;
/// Size of one erase block.
pub const FLASH_ROW_SIZE: u32 = 8192;
/// Size of one programmable page.
pub const FLASH_PAGE_SIZE: u32 = 512;
/// Pages per erase block.
pub const PAGES_IN_ERASE_BLOCK: u32 = FLASH_ROW_SIZE / FLASH_PAGE_SIZE;
/// Start of the user row.
pub const USER_ROW_ADDR: u32 = 0x0080_4000;
/// Size of the user row.
pub const USER_ROW_SIZE: u32 = 512;
/// The user row is written in quad word chunks of this size.
pub const USER_ROW_PAGE_SIZE: u32 = 16;

const_assert_eq!(FLASH_ROW_SIZE % FLASH_PAGE_SIZE, 0);
const_assert_eq!(PAGES_IN_ERASE_BLOCK, 16);
const_assert_eq!(USER_ROW_SIZE / USER_ROW_PAGE_SIZE, 32);

/// Masks the revision field out of the DSU device identification word.
const DEVICE_ID_MASK: u32 = 0xffff_f0ff;

/// `NVMCTRL.CTRLB`, the command register.
pub const NVMCTRL_CTRLB: u32 = 0x4100_4004;
/// `NVMCTRL.ADDR`, the target address for commands.
pub const NVMCTRL_ADDR: u32 = 0x4100_4014;

bitfield! {
    /// `DSU.CTRL`, `DSU.STATUSA` and `DSU.STATUSB`, accessed as one word.
    #[derive(Copy, Clone)]
    pub struct DsuCtrlStatus(u32);
    impl Debug;
    /// STATUSB.PROT, the device is locked.
    pub protected, _: 16;
    /// STATUSA.DONE, the last DSU operation finished.
    pub done, _: 8;
    /// CTRL.CE, starts the chip erase.
    pub chip_erase, set_chip_erase: 4;
}

impl From<u32> for DsuCtrlStatus {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<DsuCtrlStatus> for u32 {
    fn from(value: DsuCtrlStatus) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for DsuCtrlStatus {
    const ADDRESS: u32 = 0x4100_2100;
    const NAME: &'static str = "DSU_CTRL_STATUS";
}

bitfield! {
    /// `DSU.DID`, the device identification word.
    #[derive(Copy, Clone)]
    pub struct DsuDid(u32);
    impl Debug;
    /// Processor, 6 on the Cortex-M4 parts.
    pub u8, processor, _: 31, 28;
    pub u8, family, _: 27, 23;
    pub u8, series, _: 21, 16;
    pub u8, die, _: 15, 12;
    /// Die revision, counted from 0 for revision A.
    pub u8, revision, _: 11, 8;
    /// Selects the part within the family.
    pub u8, devsel, _: 7, 0;
}

impl DsuDid {
    /// The identification word with the revision field masked out, as the
    /// device table stores it.
    pub fn device_id(&self) -> u32 {
        self.0 & DEVICE_ID_MASK
    }

    /// The die revision as the letter printed on the package.
    pub fn revision_letter(&self) -> char {
        char::from(b'A' + self.revision())
    }
}

impl From<u32> for DsuDid {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<DsuDid> for u32 {
    fn from(value: DsuDid) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for DsuDid {
    const ADDRESS: u32 = 0x4100_2118;
    const NAME: &'static str = "DSU_DID";
}

bitfield! {
    /// `NVMCTRL.CTRLA`, the controller configuration.
    #[derive(Copy, Clone)]
    pub struct NvmCtrla(u32);
    impl Debug;
    pub cachedis1, set_cachedis1: 15;
    pub cachedis0, set_cachedis0: 14;
    pub u8, prm, set_prm: 7, 6;
    pub u8, wmode, set_wmode: 5, 4;
    pub autows, set_autows: 2;
}

impl NvmCtrla {
    /// Manual write mode. The page buffer is only committed by an
    /// explicit command.
    pub const WMODE_MANUAL: u8 = 0;
    /// Manual power reduction mode.
    pub const PRM_MANUAL: u8 = 3;

    /// The configuration used while programming: automatic wait states,
    /// manual writes, manual power reduction and both caches disabled.
    pub fn manual_write() -> Self {
        let mut value = Self(0);
        value.set_autows(true);
        value.set_wmode(Self::WMODE_MANUAL);
        value.set_prm(Self::PRM_MANUAL);
        value.set_cachedis0(true);
        value.set_cachedis1(true);
        value
    }
}

impl From<u32> for NvmCtrla {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<NvmCtrla> for u32 {
    fn from(value: NvmCtrla) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for NvmCtrla {
    const ADDRESS: u32 = 0x4100_4000;
    const NAME: &'static str = "NVMCTRL_CTRLA";
}

bitfield! {
    /// `NVMCTRL.INTFLAG` and `NVMCTRL.STATUS`, accessed as one word.
    #[derive(Copy, Clone)]
    pub struct NvmStatus(u32);
    impl Debug;
    /// STATUS.READY, the controller accepts the next command.
    pub ready, _: 16;
}

impl From<u32> for NvmStatus {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<NvmStatus> for u32 {
    fn from(value: NvmStatus) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for NvmStatus {
    const ADDRESS: u32 = 0x4100_4010;
    const NAME: &'static str = "NVMCTRL_INTFLAG_STATUS";
}

/// NVM controller commands, with the execution key in the upper byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum NvmCommand {
    /// Erases the 512 byte page at `NVMCTRL.ADDR`. The main array only
    /// erases in whole blocks, so this is for the user row.
    ErasePage = 0xa500,
    /// Erases the 8 KiB block at `NVMCTRL.ADDR`.
    EraseBlock = 0xa501,
    /// Commits the page buffer to the page at `NVMCTRL.ADDR`.
    WritePage = 0xa503,
    /// Commits the first quad word of the page buffer to `NVMCTRL.ADDR`.
    WriteQuadWord = 0xa504,
    /// Unlocks the region containing `NVMCTRL.ADDR`.
    UnlockRegion = 0xa512,
    /// Clears the page buffer.
    PageBufferClear = 0xa515,
    /// Sets the security bit, locking the device.
    SetSecurityBit = 0xa516,
}

impl NvmCommand {
    pub(crate) fn from_key(value: u32) -> Option<Self> {
        match value {
            0xa500 => Some(Self::ErasePage),
            0xa501 => Some(Self::EraseBlock),
            0xa503 => Some(Self::WritePage),
            0xa504 => Some(Self::WriteQuadWord),
            0xa512 => Some(Self::UnlockRegion),
            0xa515 => Some(Self::PageBufferClear),
            0xa516 => Some(Self::SetSecurityBit),
            _ => None,
        }
    }
}

static DEVICES: [SamDevice; 11] = [
    SamDevice {
        did: 0x6184_0000,
        name: "SAM E54P20A",
        flash_size: 1024 * 1024,
    },
    SamDevice {
        did: 0x6184_0001,
        name: "SAM E54P19A",
        flash_size: 512 * 1024,
    },
    SamDevice {
        did: 0x6006_0000,
        name: "SAM D51P20A",
        flash_size: 1024 * 1024,
    },
    SamDevice {
        did: 0x6006_0001,
        name: "SAM D51P19A",
        flash_size: 512 * 1024,
    },
    SamDevice {
        did: 0x6006_0002,
        name: "SAM D51N20A",
        flash_size: 1024 * 1024,
    },
    SamDevice {
        did: 0x6006_0003,
        name: "SAM D51N19A",
        flash_size: 512 * 1024,
    },
    SamDevice {
        did: 0x6006_0004,
        name: "SAM D51J20A",
        flash_size: 1024 * 1024,
    },
    SamDevice {
        did: 0x6006_0005,
        name: "SAM D51J19A",
        flash_size: 512 * 1024,
    },
    SamDevice {
        did: 0x6006_0006,
        name: "SAM D51J18A",
        flash_size: 256 * 1024,
    },
    SamDevice {
        did: 0x6006_0007,
        name: "SAM D51G19A",
        flash_size: 512 * 1024,
    },
    SamDevice {
        did: 0x6006_0008,
        name: "SAM D51G18A",
        flash_size: 256 * 1024,
    },
];

/// The flash driver for the SAM D5x/E5x family.
#[derive(Debug)]
pub struct Same5x;

fn wait_ready(probe: &mut dyn MemoryInterface) -> Result<(), FlashError> {
    loop {
        let status: NvmStatus = read_register(probe)?;
        if status.ready() {
            return Ok(());
        }
    }
}

/// Issues a command and waits for the controller to accept the next one.
fn command(probe: &mut dyn MemoryInterface, command: NvmCommand) -> Result<(), FlashError> {
    tracing::trace!("NVMCTRL command {:?}", command);
    probe.write_word_32(NVMCTRL_CTRLB, command as u32)?;
    wait_ready(probe)
}

fn is_protected(probe: &mut dyn MemoryInterface) -> Result<bool, FlashError> {
    let status: DsuCtrlStatus = read_register(probe)?;
    Ok(status.protected())
}

impl FlashDriver for Same5x {
    fn read_device_id(&self, probe: &mut dyn MemoryInterface) -> Result<u32, Error> {
        let did: DsuDid = read_register(probe)?;
        tracing::debug!("DSU_DID = {:#010x}", u32::from(did));
        Ok(did.into())
    }

    fn identify(&self, did: u32) -> Option<SamDevice> {
        let did = DsuDid::from(did);
        let device = DEVICES
            .iter()
            .find(|device| device.did == did.device_id())?;
        tracing::info!("Target: {} (Rev {})", device.name, did.revision_letter());
        Some(*device)
    }

    fn devices(&self) -> &'static [SamDevice] {
        &DEVICES
    }

    fn validate_options(
        &self,
        device: &SamDevice,
        options: &FlashOptions,
    ) -> Result<(), ConfigError> {
        crate::config::validate(options, device.flash_size, FLASH_ROW_SIZE, USER_ROW_SIZE)
    }

    fn erase_all(&self, probe: &mut dyn MemoryInterface) -> Result<(), FlashError> {
        tracing::debug!("Starting the chip erase");
        let mut control = DsuCtrlStatus(0);
        control.set_chip_erase(true);
        write_register(probe, control)?;
        probe.sleep(Duration::from_millis(100));
        loop {
            let status: DsuCtrlStatus = read_register(probe)?;
            if status.done() {
                return Ok(());
            }
        }
    }

    fn lock(&self, probe: &mut dyn MemoryInterface) -> Result<(), FlashError> {
        // The key is written to CTRLA and takes effect without a ready poll.
        probe.write_word_32(NvmCtrla::ADDRESS, NvmCommand::SetSecurityBit as u32)?;
        Ok(())
    }

    fn program(
        &self,
        probe: &mut dyn MemoryInterface,
        options: &FlashOptions,
        progress: &FlashProgress,
    ) -> Result<(), FlashError> {
        let image = options.image.as_ref().ok_or(ConfigError::MissingImage)?;
        if is_protected(probe)? {
            return Err(FlashError::DeviceLocked);
        }

        write_register(probe, NvmCtrla::manual_write())?;

        let mut data = image.clone();
        let rows = data.len().div_ceil(FLASH_ROW_SIZE as usize);
        data.resize(rows * FLASH_ROW_SIZE as usize, 0xff);

        let mut address = FLASH_ADDR + options.offset;
        tracing::debug!("Programming {} bytes at {:#010x}", data.len(), address);
        progress.started_programming(data.len() as u32);

        for row in data.chunks_exact(FLASH_ROW_SIZE as usize) {
            let row_address = address;
            probe.write_word_32(NVMCTRL_ADDR, address)?;
            command(probe, NvmCommand::UnlockRegion)?;
            command(probe, NvmCommand::EraseBlock)?;

            for page in row.chunks_exact(FLASH_PAGE_SIZE as usize) {
                probe.write_word_32(NVMCTRL_ADDR, address)?;
                command(probe, NvmCommand::PageBufferClear)?;
                probe.write_8(address, page)?;
                command(probe, NvmCommand::WritePage)?;
                address += FLASH_PAGE_SIZE;
            }
            progress.row_programmed(row_address);
        }

        progress.finished_programming();
        Ok(())
    }

    fn verify(
        &self,
        probe: &mut dyn MemoryInterface,
        options: &FlashOptions,
        progress: &FlashProgress,
    ) -> Result<(), FlashError> {
        let image = options.image.as_ref().ok_or(ConfigError::MissingImage)?;
        tracing::debug!("Verifying {} bytes", image.len());
        progress.started_verifying();

        let mut address = FLASH_ADDR + options.offset;
        let mut page = vec![0; FLASH_PAGE_SIZE as usize];
        for block in image.chunks(FLASH_PAGE_SIZE as usize) {
            // The tail is compared against a full page read.
            probe.read_8(address, &mut page)?;
            if let Some(index) = block
                .iter()
                .zip(page.iter())
                .position(|(expected, actual)| expected != actual)
            {
                return Err(FlashError::VerifyFailed {
                    address: address + index as u32,
                    expected: block[index],
                    actual: page[index],
                });
            }
            progress.page_verified(address);
            address += FLASH_PAGE_SIZE;
        }

        progress.finished_verifying();
        Ok(())
    }

    fn read(
        &self,
        probe: &mut dyn MemoryInterface,
        options: &FlashOptions,
        progress: &FlashProgress,
    ) -> Result<Vec<u8>, FlashError> {
        tracing::debug!(
            "Reading {} bytes at {:#010x}",
            options.read_size,
            FLASH_ADDR + options.offset
        );
        progress.started_reading();

        let pages = options.read_size.div_ceil(FLASH_PAGE_SIZE);
        let mut data = vec![0; (pages * FLASH_PAGE_SIZE) as usize];
        let mut address = FLASH_ADDR + options.offset;
        for chunk in data.chunks_exact_mut(FLASH_PAGE_SIZE as usize) {
            probe.read_8(address, chunk)?;
            progress.page_read(address);
            address += FLASH_PAGE_SIZE;
        }
        data.truncate(options.read_size as usize);

        progress.finished_reading();
        Ok(data)
    }

    fn fuse(&self, probe: &mut dyn MemoryInterface, op: &FuseOp) -> Result<FuseReport, FlashError> {
        if op.section != 0 {
            return Err(ConfigError::UnsupportedFuseSection {
                section: op.section,
            }
            .into());
        }

        let mut row = vec![0; USER_ROW_SIZE as usize];
        probe.read_8(USER_ROW_ADDR, &mut row)?;

        let mut report = FuseReport::default();
        if op.read {
            match &op.range {
                Some(range) => report.value = Some(range.extract(&row)),
                None => report.row = Some(row.clone()),
            }
        }

        if op.write {
            match (&op.source, &op.range) {
                (Some(FuseSource::Buffer(data)), _) => {
                    let length = data.len().min(row.len());
                    row[..length].copy_from_slice(&data[..length]);
                }
                (Some(FuseSource::Value(value)), Some(range)) => range.apply(&mut row, *value),
                (Some(FuseSource::Value(_)), None) => {
                    return Err(ConfigError::ValueWithoutRange.into());
                }
                (None, _) => return Err(ConfigError::MissingFuseSource.into()),
            }

            tracing::debug!("Writing the user row");
            probe.write_word_32(NVMCTRL_ADDR, USER_ROW_ADDR)?;
            command(probe, NvmCommand::ErasePage)?;
            command(probe, NvmCommand::PageBufferClear)?;

            let mut address = USER_ROW_ADDR;
            for quad in row.chunks_exact(USER_ROW_PAGE_SIZE as usize) {
                probe.write_word_32(NVMCTRL_ADDR, USER_ROW_ADDR)?;
                probe.write_8(address, quad)?;
                command(probe, NvmCommand::WriteQuadWord)?;
                address += USER_ROW_PAGE_SIZE;
            }
        }

        if op.verify {
            let mut check = vec![0; USER_ROW_SIZE as usize];
            probe.read_8(USER_ROW_ADDR, &mut check)?;
            match (&op.source, &op.range) {
                (Some(FuseSource::Buffer(data)), _) => {
                    let length = data.len().min(check.len());
                    if let Some(index) = data[..length]
                        .iter()
                        .zip(check.iter())
                        .position(|(expected, actual)| expected != actual)
                    {
                        return Err(FlashError::FuseByteMismatch {
                            index,
                            expected: data[index],
                            actual: check[index],
                        });
                    }
                }
                (Some(FuseSource::Value(value)), Some(range)) => {
                    let actual = range.extract(&check);
                    if actual != *value {
                        return Err(FlashError::FuseFieldMismatch {
                            expected: *value,
                            actual,
                        });
                    }
                }
                (Some(FuseSource::Value(_)), None) => {
                    return Err(ConfigError::ValueWithoutRange.into());
                }
                (None, Some(_)) => return Err(ConfigError::MissingFuseSource.into()),
                (None, None) => return Err(ConfigError::MissingVerifyReference.into()),
            }
        }

        Ok(report)
    }

    fn deselect(&self, probe: &mut dyn MemoryInterface) -> Result<(), Error> {
        crate::core::reset_and_run(probe)
    }
}
