//! A programmable stand-in for a debug probe.
#![allow(missing_docs)] // Don't require docs for test code

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::core::{Aircr, Demcr, Dhcsr};
use crate::error::Error;
use crate::flashing::{
    DsuCtrlStatus, DsuDid, NvmCommand, NvmCtrla, NvmStatus, FLASH_PAGE_SIZE, FLASH_ROW_SIZE,
    NVMCTRL_ADDR, NVMCTRL_CTRLB, USER_ROW_ADDR, USER_ROW_SIZE,
};
use crate::memory::{MemoryInterface, MemoryMappedRegister};

#[derive(Debug)]
struct FakeState {
    did: u32,
    flash: Vec<u8>,
    user_row: Vec<u8>,
    staged: Vec<(u32, u8)>,
    nvm_address: u32,
    ctrla: u32,
    protected: bool,
    security_bit: bool,
    erasing: bool,
    done: bool,
    erase_latency: u32,
    erase_polls_left: u32,
    ready_latency: u32,
    ready_polls_left: u32,
    word_writes: Vec<(u32, u32)>,
    block_reads: Vec<(u32, usize)>,
    sleeps: Vec<Duration>,
    dsu_polls: u32,
    nvm_status_polls: u32,
}

/// A fake DSU and NVM controller behind the [`MemoryInterface`].
///
/// The fake models just enough device behavior for the flash algorithm:
/// commands move staged bytes into the flash image, the chip erase wipes
/// it, and every register access is recorded so tests can assert the
/// exact wire traffic.
///
/// Cloning shares the state, so tests can keep a handle after boxing the
/// probe into a session.
#[derive(Debug, Clone)]
pub struct FakeProbe {
    state: Rc<RefCell<FakeState>>,
}

impl FakeProbe {
    pub fn new(did: u32, flash_size: u32) -> Self {
        Self {
            state: Rc::new(RefCell::new(FakeState {
                did,
                flash: vec![0xff; flash_size as usize],
                user_row: vec![0xff; USER_ROW_SIZE as usize],
                staged: Vec::new(),
                nvm_address: 0,
                ctrla: 0,
                protected: false,
                security_bit: false,
                erasing: false,
                done: false,
                erase_latency: 0,
                erase_polls_left: 0,
                ready_latency: 0,
                ready_polls_left: 0,
                word_writes: Vec::new(),
                block_reads: Vec::new(),
                sleeps: Vec::new(),
                dsu_polls: 0,
                nvm_status_polls: 0,
            })),
        }
    }

    /// A SAM D51J19A at die revision D.
    pub fn samd51j19a() -> Self {
        Self::new(0x6006_0305, 512 * 1024)
    }

    /// A SAM E54P20A at die revision D.
    pub fn same54p20a() -> Self {
        Self::new(0x6184_0300, 1024 * 1024)
    }

    /// Marks the device as locked.
    #[must_use]
    pub fn with_protection(self) -> Self {
        self.state.borrow_mut().protected = true;
        self
    }

    #[must_use]
    pub fn with_flash_contents(self, address: u32, data: &[u8]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            let start = address as usize;
            state.flash[start..start + data.len()].copy_from_slice(data);
        }
        self
    }

    #[must_use]
    pub fn with_user_row(self, data: &[u8]) -> Self {
        {
            let mut state = self.state.borrow_mut();
            state.user_row[..data.len()].copy_from_slice(data);
        }
        self
    }

    /// Lets the ready flag stay low for `polls` status reads after every
    /// NVM command.
    #[must_use]
    pub fn with_ready_latency(self, polls: u32) -> Self {
        self.state.borrow_mut().ready_latency = polls;
        self
    }

    /// Lets the done flag stay low for `polls` status reads after the
    /// chip erase was started.
    #[must_use]
    pub fn with_erase_latency(self, polls: u32) -> Self {
        self.state.borrow_mut().erase_latency = polls;
        self
    }

    pub fn flash(&self) -> Vec<u8> {
        self.state.borrow().flash.clone()
    }

    pub fn user_row(&self) -> Vec<u8> {
        self.state.borrow().user_row.clone()
    }

    pub fn protected(&self) -> bool {
        self.state.borrow().protected
    }

    pub fn security_bit(&self) -> bool {
        self.state.borrow().security_bit
    }

    /// Every word write, in order.
    pub fn word_writes(&self) -> Vec<(u32, u32)> {
        self.state.borrow().word_writes.clone()
    }

    /// Every block read as `(address, length)`, in order.
    pub fn block_reads(&self) -> Vec<(u32, usize)> {
        self.state.borrow().block_reads.clone()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state.borrow().sleeps.clone()
    }

    pub fn dsu_polls(&self) -> u32 {
        self.state.borrow().dsu_polls
    }

    pub fn nvm_status_polls(&self) -> u32 {
        self.state.borrow().nvm_status_polls
    }

    /// Corrupts one flash byte behind the algorithm's back.
    pub fn set_flash_byte(&self, address: u32, value: u8) {
        self.state.borrow_mut().flash[address as usize] = value;
    }
}

fn execute(state: &mut FakeState, command: NvmCommand) {
    state.ready_polls_left = state.ready_latency;
    let address = state.nvm_address;
    match command {
        NvmCommand::ErasePage => {
            if let Some(offset) = user_row_offset(address) {
                assert_eq!(offset, 0, "page erase must target the row start");
                state.user_row.fill(0xff);
            } else {
                let start = address as usize;
                state.flash[start..start + FLASH_PAGE_SIZE as usize].fill(0xff);
            }
        }
        NvmCommand::EraseBlock => {
            let start = address as usize;
            state.flash[start..start + FLASH_ROW_SIZE as usize].fill(0xff);
        }
        NvmCommand::WritePage | NvmCommand::WriteQuadWord => commit(state),
        NvmCommand::PageBufferClear => state.staged.clear(),
        NvmCommand::UnlockRegion => {}
        NvmCommand::SetSecurityBit => state.security_bit = true,
    }
}

/// Moves staged bytes into the flash image or the user row.
fn commit(state: &mut FakeState) {
    for (address, byte) in std::mem::take(&mut state.staged) {
        if let Some(offset) = user_row_offset(address) {
            state.user_row[offset] = byte;
        } else {
            state.flash[address as usize] = byte;
        }
    }
}

fn user_row_offset(address: u32) -> Option<usize> {
    let offset = address.checked_sub(USER_ROW_ADDR)?;
    (offset < USER_ROW_SIZE).then_some(offset as usize)
}

impl MemoryInterface for FakeProbe {
    fn read_word_32(&mut self, address: u32) -> Result<u32, Error> {
        let mut state = self.state.borrow_mut();
        match address {
            DsuDid::ADDRESS => Ok(state.did),
            DsuCtrlStatus::ADDRESS => {
                state.dsu_polls += 1;
                if state.erasing {
                    if state.erase_polls_left == 0 {
                        state.erasing = false;
                        state.done = true;
                        state.protected = false;
                        state.security_bit = false;
                        state.flash.fill(0xff);
                    } else {
                        state.erase_polls_left -= 1;
                    }
                }
                let mut value = 0;
                if state.done {
                    value |= 1 << 8;
                }
                if state.protected {
                    value |= 1 << 16;
                }
                Ok(value)
            }
            NvmStatus::ADDRESS => {
                state.nvm_status_polls += 1;
                if state.ready_polls_left == 0 {
                    Ok(1 << 16)
                } else {
                    state.ready_polls_left -= 1;
                    Ok(0)
                }
            }
            NvmCtrla::ADDRESS => Ok(state.ctrla),
            NVMCTRL_ADDR => Ok(state.nvm_address),
            _ => panic!("read from unmapped register {address:#010x}"),
        }
    }

    fn write_word_32(&mut self, address: u32, data: u32) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        state.word_writes.push((address, data));
        match address {
            Dhcsr::ADDRESS | Demcr::ADDRESS | Aircr::ADDRESS => {}
            DsuCtrlStatus::ADDRESS => {
                if data & (1 << 4) != 0 {
                    state.erasing = true;
                    state.done = false;
                    state.erase_polls_left = state.erase_latency;
                }
            }
            NvmCtrla::ADDRESS => {
                if data == NvmCommand::SetSecurityBit as u32 {
                    state.security_bit = true;
                } else {
                    state.ctrla = data;
                }
            }
            NVMCTRL_CTRLB => {
                let command = NvmCommand::from_key(data)
                    .unwrap_or_else(|| panic!("unknown NVMCTRL command {data:#06x}"));
                execute(&mut state, command);
            }
            NVMCTRL_ADDR => state.nvm_address = data,
            _ => panic!("write to unmapped register {address:#010x}"),
        }
        Ok(())
    }

    fn read_8(&mut self, address: u32, data: &mut [u8]) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        state.block_reads.push((address, data.len()));
        if let Some(offset) = user_row_offset(address) {
            data.copy_from_slice(&state.user_row[offset..offset + data.len()]);
        } else {
            let start = address as usize;
            data.copy_from_slice(&state.flash[start..start + data.len()]);
        }
        Ok(())
    }

    fn write_8(&mut self, address: u32, data: &[u8]) -> Result<(), Error> {
        let mut state = self.state.borrow_mut();
        for (index, byte) in data.iter().enumerate() {
            state.staged.push((address + index as u32, *byte));
        }
        Ok(())
    }

    fn sleep(&mut self, duration: Duration) {
        self.state.borrow_mut().sleeps.push(duration);
    }
}
