//! Registry of all supported device families.

use crate::config::SamDevice;
use crate::driver::FlashDriver;
use crate::flashing::Same5x;

static FAMILIES: [&dyn FlashDriver; 1] = [&Same5x];

/// All registered family drivers, in probing order.
pub(crate) fn families() -> impl Iterator<Item = &'static dyn FlashDriver> {
    FAMILIES.iter().copied()
}

/// Returns every device known to the registry.
///
/// ```
/// for device in samflash::registry::devices() {
///     println!("{} ({:#010x})", device.name, device.did);
/// }
/// ```
pub fn devices() -> impl Iterator<Item = &'static SamDevice> {
    FAMILIES.iter().flat_map(|family| family.devices().iter())
}
