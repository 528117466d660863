//! Cortex-M debug control. Just enough of the System Control Space to stop
//! the core before flash operations and to let it run again afterwards.

use bitfield::bitfield;

use crate::error::Error;
use crate::memory::{write_register, MemoryInterface, MemoryMappedRegister};

bitfield! {
    /// Debug Halting Control and Status Register, `DHCSR` (see armv7-M Architecture Reference
    /// Manual C1.6.2)
    ///
    /// To write this register successfully, the debug key has to be set via
    /// [`Dhcsr::enable_write`] every time it is written.
    #[derive(Copy, Clone)]
    pub struct Dhcsr(u32);
    impl Debug;
    /// Indicates whether the processor has been reset since the last read of DHCSR.
    pub s_reset_st, _: 25;
    /// Indicates whether the processor is in Debug state.
    pub s_halt, _: 17;
    /// Processor halt bit. Writes are ignored unless `c_debugen` is set as well.
    pub c_halt, set_c_halt: 1;
    /// Halting debug enable bit.
    pub c_debugen, set_c_debugen: 0;
}

impl Dhcsr {
    /// This function sets the bit to enable writes to this register.
    ///
    /// C1.6.3 Debug Halting Control and Status Register, DHCSR:
    /// Debug key:
    /// Software must write 0xA05F to this field to enable write accesses to bits
    /// \[15:0\], otherwise the processor ignores the write access.
    pub fn enable_write(&mut self) {
        self.0 &= !(0xffff << 16);
        self.0 |= 0xa05f << 16;
    }
}

impl From<u32> for Dhcsr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Dhcsr> for u32 {
    fn from(value: Dhcsr) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for Dhcsr {
    const ADDRESS: u32 = 0xe000_edf0;
    const NAME: &'static str = "DHCSR";
}

bitfield! {
    /// Debug Exception and Monitor Control Register, `DEMCR` (see armv7-M Architecture
    /// Reference Manual C1.6.5)
    #[derive(Copy, Clone)]
    pub struct Demcr(u32);
    impl Debug;
    /// Global enable for DWT and ITM features.
    pub trcena, set_trcena: 24;
    /// Debug trap on a HardFault exception.
    pub vc_harderr, set_vc_harderr: 10;
    /// Reset vector catch. Halts a running system when a local reset occurs.
    pub vc_corereset, set_vc_corereset: 0;
}

impl From<u32> for Demcr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Demcr> for u32 {
    fn from(value: Demcr) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for Demcr {
    const ADDRESS: u32 = 0xe000_edfc;
    const NAME: &'static str = "DEMCR";
}

bitfield! {
    /// Application Interrupt and Reset Control Register, `AIRCR` (see armv7-M Architecture
    /// Reference Manual B3.2.6)
    #[derive(Copy, Clone)]
    pub struct Aircr(u32);
    impl Debug;
    /// Vector key. Writes are ignored unless the key reads 0x05fa.
    pub get_vectkeystat, set_vectkey: 31, 16;
    /// System reset request bit.
    pub sysresetreq, set_sysresetreq: 2;
}

impl Aircr {
    /// Set the vector key so the write is accepted.
    pub fn vectkey(&mut self) {
        self.set_vectkey(0x05fa);
    }
}

impl From<u32> for Aircr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Aircr> for u32 {
    fn from(value: Aircr) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for Aircr {
    const ADDRESS: u32 = 0xe000_ed0c;
    const NAME: &'static str = "AIRCR";
}

/// Halt the core and arm the reset vector catch, then reset.
///
/// After this the core sits halted at the reset vector with all peripherals in
/// their reset state, which is the only safe place to drive the flash
/// controller from.
pub(crate) fn halt_and_reset(probe: &mut dyn MemoryInterface) -> Result<(), Error> {
    let mut dhcsr = Dhcsr(0);
    dhcsr.set_c_debugen(true);
    dhcsr.set_c_halt(true);
    dhcsr.enable_write();
    write_register(probe, dhcsr)?;

    let mut demcr = Demcr(0);
    demcr.set_vc_corereset(true);
    write_register(probe, demcr)?;

    system_reset(probe)
}

/// Drop the reset vector catch and reset once more, so the target boots
/// normally.
pub(crate) fn reset_and_run(probe: &mut dyn MemoryInterface) -> Result<(), Error> {
    write_register(probe, Demcr(0))?;
    system_reset(probe)
}

fn system_reset(probe: &mut dyn MemoryInterface) -> Result<(), Error> {
    let mut aircr = Aircr(0);
    aircr.vectkey();
    aircr.set_sysresetreq(true);
    write_register(probe, aircr)
}
