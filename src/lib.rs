#![deny(warnings)]
//! Safe bindings to `libcryptsetup`
//!
//! The wrappers around the native calls are generated at build time by `cryptsetup-gen` from a
//! declarative schema. Each wrapper collects the messages `libcryptsetup` logs while it runs and
//! returns them with the error, so failures explain themselves even when several threads use
//! the library.
//!
//! ```no_run
//! use cryptsetup_glue::*;
//! # fn foo() -> Result<()> {
//! let mut device = open("/tmp/disk.img")?;
//! device.format(b"passphrase", &CryptParams::luks())?;
//! let slot = device.add_key(b"passphrase", b"another passphrase")?;
//! # Ok(())
//! # }
//! ```

extern crate errno;
extern crate libc;
extern crate libcryptsetup_sys as raw;
extern crate parking_lot;
extern crate uuid;

#[macro_use]
extern crate log;

pub mod api;
mod capture;
pub mod device;
pub mod global;
mod logcalls;
mod marshal;
pub mod params;

pub use api::{open, CryptDevice, CryptDeviceHandle};
pub use device::{CryptError, Error, Keyslot, Result};
pub use global::{crypt_dir, enable_debug};
pub use params::{CipherParams, CryptParams, Keyfile, Luks1Params, Luks2Params, PlainParams};
pub use raw::{crypt_active_device, crypt_device_type, crypt_keyslot_info, crypt_rng_type};
