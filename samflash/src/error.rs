use crate::config::ConfigError;
use crate::flashing::FlashError;
use crate::permissions::MissingPermissions;

/// The top level error of this crate.
///
/// Everything a [`Session`](crate::Session) can fail with funnels into this
/// type. Probe transport failures show up as [`Error::Probe`], carrying
/// whatever error the [`MemoryInterface`](crate::MemoryInterface)
/// implementation produced.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An access through the probe failed.
    #[error("probe access failed")]
    Probe(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
    /// The identification word did not match any supported device.
    #[error("unknown target device (DSU_DID = {did:#010x})")]
    UnknownDevice {
        /// The full identification word, including the revision field.
        did: u32,
    },
    /// The session options do not fit the identified device.
    #[error("invalid session options")]
    Config(#[from] ConfigError),
    /// The operation was not permitted by the session [`Permissions`](crate::Permissions).
    #[error("the operation was not allowed")]
    MissingPermissions(#[from] MissingPermissions),
    /// A flash operation failed.
    #[error("a flash operation failed")]
    Flash(#[from] FlashError),
}

impl Error {
    /// Wrap a transport error produced by a [`MemoryInterface`](crate::MemoryInterface)
    /// implementation.
    pub fn probe(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Probe(Box::new(source))
    }
}
