//! Flash programming for the Microchip SAM D5x/E5x family.
//!
//! This crate drives the DSU and the NVM controller of the Cortex-M4 SAM
//! parts through whatever memory access a debug probe exposes. After
//! halting the core and identifying the device from `DSU.DID`, it
//! programs, verifies, reads back and locks the flash, including the
//! fuses in the NVM user row.
//!
//! The probe side is abstracted by [`MemoryInterface`]: anything that can
//! read and write target memory can host a [`Session`].
//!
//! # Usage
//!
//! ```no_run
//! use samflash::flashing::FlashProgress;
//! use samflash::{FlashOptions, Permissions, Session};
//!
//! # fn open_probe() -> Box<dyn samflash::MemoryInterface> { unimplemented!() }
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut options = FlashOptions::new();
//!     options.image = Some(std::fs::read("firmware.bin")?);
//!
//!     let mut session = Session::attach(open_probe(), options, Permissions::new())?;
//!     session.program(&FlashProgress::empty())?;
//!     session.verify(&FlashProgress::empty())?;
//!     session.detach()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod config;
mod core;
pub mod driver;
mod error;
#[cfg(any(test, feature = "test"))]
pub mod fake_probe;
pub mod flashing;
mod memory;
mod permissions;
pub mod registry;
mod session;

pub use config::{ConfigError, FlashOptions, SamDevice};
pub use error::Error;
#[cfg(any(test, feature = "test"))]
pub use fake_probe::FakeProbe;
pub use memory::{MemoryInterface, MemoryMappedRegister};
pub use permissions::{MissingPermissions, Permissions};
pub use session::Session;
