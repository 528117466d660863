/// The permissions to do certain operations.
///
/// Some operations are irreversible or wipe user data. The caller has to
/// opt into each of them explicitly before a [`Session`](crate::Session)
/// will carry them out.
#[non_exhaustive]
#[derive(Debug, Clone, Default)]
pub struct Permissions {
    /// Whether the chip erase is allowed.
    erase_all: bool,
    /// Whether setting the security bit is allowed.
    lock: bool,
}

impl Permissions {
    /// Constructs a new [`Permissions`] object with the default values
    /// (everything disallowed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows the chip erase, which wipes the entire flash and clears the
    /// security bit.
    #[must_use]
    pub fn allow_erase_all(self) -> Self {
        Self {
            erase_all: true,
            ..self
        }
    }

    /// Allows setting the security bit, which locks the device until the
    /// next chip erase.
    #[must_use]
    pub fn allow_lock(self) -> Self {
        Self { lock: true, ..self }
    }

    pub(crate) fn erase_all(&self) -> Result<(), MissingPermissions> {
        if self.erase_all {
            Ok(())
        } else {
            Err(MissingPermissions {
                operation: "erase_all".into(),
            })
        }
    }

    pub(crate) fn lock(&self) -> Result<(), MissingPermissions> {
        if self.lock {
            Ok(())
        } else {
            Err(MissingPermissions {
                operation: "lock".into(),
            })
        }
    }
}

/// An operation could not be performed because it lacked the permission to do so.
#[derive(Debug, Clone, thiserror::Error)]
#[error("An operation could not be performed because it lacked the permission to do so: {operation}")]
pub struct MissingPermissions {
    /// The operation that was denied.
    pub operation: String,
}
