//! Process-wide `libcryptsetup` settings

use raw;

use crate::device;

/// Enable internal `libcryptsetup` debugging. Debug messages are forwarded to the `log` crate
/// at debug level and are never attached to errors.
pub fn enable_debug(debug: bool) {
    if debug {
        device::set_debug_level(raw::crypt_debug_level::CRYPT_DEBUG_ALL);
    } else {
        device::set_debug_level(raw::crypt_debug_level::CRYPT_DEBUG_NONE);
    }
}

/// Directory device-mapper devices are created in, usually `/dev/mapper`
pub fn crypt_dir() -> Option<String> {
    device::crypt_dir()
}
