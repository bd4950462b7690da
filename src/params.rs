//! Parameters for formatting and loading crypt devices
//!
//! Unset values fall back to the defaults below when the parameters are converted to their
//! native form.

use std::ffi::CString;
use std::fs;
use std::path::{Path, PathBuf};
use std::ptr;

use libc::{c_char, c_void};
use raw;

use crate::device::{self, Result};
use crate::marshal;

pub const DEFAULT_CIPHER: &str = "aes";
pub const DEFAULT_CIPHER_MODE: &str = "xts-plain64";
pub const DEFAULT_HASH: &str = "sha256";
/// Volume key size in bytes
pub const DEFAULT_VOLUME_KEY_SIZE: usize = 32;

/// Cipher selection shared by all device types
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CipherParams {
    pub cipher: Option<String>,
    pub cipher_mode: Option<String>,
    /// Volume key size in bytes
    pub volume_key_size: Option<usize>,
}

impl CipherParams {
    pub fn cipher(&self) -> &str {
        self.cipher.as_deref().unwrap_or(DEFAULT_CIPHER)
    }

    pub fn cipher_mode(&self) -> &str {
        self.cipher_mode.as_deref().unwrap_or(DEFAULT_CIPHER_MODE)
    }

    pub fn volume_key_size(&self) -> usize {
        self.volume_key_size.unwrap_or(DEFAULT_VOLUME_KEY_SIZE)
    }
}

/// Plain dm-crypt, no on-disk header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlainParams {
    pub cipher: CipherParams,
    /// Hash used to turn the passphrase into the volume key
    pub hash: Option<String>,
    /// Offset of the encrypted data, in sectors
    pub offset: u64,
    /// IV offset, in sectors
    pub skip: u64,
    /// Size of the mapping in sectors, 0 means the whole device
    pub size: u64,
    /// 0 means 512 bytes
    pub sector_size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Luks1Params {
    pub cipher: CipherParams,
    /// Hash used for the header digests and PBKDF2
    pub hash: Option<String>,
    /// Data alignment in sectors, 0 lets `libcryptsetup` decide
    pub data_alignment: usize,
    /// Keep the data on a separate device, the header stays on the formatted one
    pub data_device: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Luks2Params {
    pub cipher: CipherParams,
    pub data_alignment: usize,
    pub data_device: Option<PathBuf>,
    /// Encryption sector size in bytes, 0 means 512
    pub sector_size: u32,
    pub label: Option<String>,
    pub subsystem: Option<String>,
}

/// A key stored in a file: `size` bytes starting at `offset`, a size of 0 reads up to the end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyfile {
    pub path: PathBuf,
    pub size: usize,
    pub offset: usize,
}

impl Keyfile {
    /// The whole content of the file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Keyfile {
        Keyfile {
            path: path.as_ref().to_owned(),
            size: 0,
            offset: 0,
        }
    }

    pub fn size(mut self, size: usize) -> Keyfile {
        self.size = size;
        self
    }

    pub fn offset(mut self, offset: usize) -> Keyfile {
        self.offset = offset;
        self
    }

    /// The path as passed to `libcryptsetup`, a missing file is reported before any native call
    pub(crate) fn checked_path(&self, param: &'static str) -> Result<&str> {
        fs::metadata(&self.path)?;
        device::path_str(param, &self.path)
    }
}

/// Parameters of one of the supported device types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptParams {
    Plain(PlainParams),
    Luks1(Luks1Params),
    Luks2(Luks2Params),
}

impl CryptParams {
    /// LUKS1 with all defaults
    pub fn luks() -> CryptParams {
        CryptParams::Luks1(Luks1Params::default())
    }

    /// LUKS2 with all defaults
    pub fn luks2() -> CryptParams {
        CryptParams::Luks2(Luks2Params::default())
    }

    /// Plain dm-crypt with all defaults
    pub fn plain() -> CryptParams {
        CryptParams::Plain(PlainParams::default())
    }

    pub fn device_type(&self) -> raw::crypt_device_type {
        match *self {
            CryptParams::Plain(_) => raw::crypt_device_type::PLAIN,
            CryptParams::Luks1(_) => raw::crypt_device_type::LUKS1,
            CryptParams::Luks2(_) => raw::crypt_device_type::LUKS2,
        }
    }

    pub fn cipher(&self) -> &CipherParams {
        match *self {
            CryptParams::Plain(ref p) => &p.cipher,
            CryptParams::Luks1(ref p) => &p.cipher,
            CryptParams::Luks2(ref p) => &p.cipher,
        }
    }

    /// Whether the device type stores passphrases in key slots
    pub fn has_keyslots(&self) -> bool {
        !matches!(*self, CryptParams::Plain(_))
    }

    pub(crate) fn to_native(&self) -> Result<NativeParams> {
        let mut strings = Strings::default();
        let payload = match *self {
            CryptParams::Plain(ref p) => Payload::Plain(raw::crypt_params_plain {
                hash: strings.keep("hash", p.hash.as_deref().unwrap_or(DEFAULT_HASH))?,
                offset: p.offset,
                skip: p.skip,
                size: p.size,
                sector_size: p.sector_size,
            }),
            CryptParams::Luks1(ref p) => Payload::Luks1(raw::crypt_params_luks1 {
                hash: strings.keep("hash", p.hash.as_deref().unwrap_or(DEFAULT_HASH))?,
                data_alignment: p.data_alignment,
                data_device: strings.keep_path("data_device", p.data_device.as_ref())?,
            }),
            CryptParams::Luks2(ref p) => Payload::Luks2(raw::crypt_params_luks2 {
                pbkdf: ptr::null(),
                integrity: ptr::null(),
                integrity_params: ptr::null(),
                data_alignment: p.data_alignment,
                data_device: strings.keep_path("data_device", p.data_device.as_ref())?,
                sector_size: p.sector_size,
                label: strings.keep_opt("label", p.label.as_deref())?,
                subsystem: strings.keep_opt("subsystem", p.subsystem.as_deref())?,
            }),
        };
        Ok(NativeParams {
            _strings: strings.0,
            payload,
        })
    }
}

#[derive(Default)]
struct Strings(Vec<CString>);

impl Strings {
    fn keep(&mut self, param: &'static str, value: &str) -> Result<*const c_char> {
        let c_value = marshal::string(param, value)?;
        let p = c_value.as_ptr();
        self.0.push(c_value);
        Ok(p)
    }

    fn keep_opt(&mut self, param: &'static str, value: Option<&str>) -> Result<*const c_char> {
        match value {
            Some(v) => self.keep(param, v),
            None => Ok(ptr::null()),
        }
    }

    fn keep_path(&mut self, param: &'static str, value: Option<&PathBuf>) -> Result<*const c_char> {
        match value {
            Some(path) => {
                let path = device::path_str(param, path)?;
                self.keep(param, path)
            }
            None => Ok(ptr::null()),
        }
    }
}

enum Payload {
    Plain(raw::crypt_params_plain),
    Luks1(raw::crypt_params_luks1),
    Luks2(raw::crypt_params_luks2),
}

/// A native parameter struct together with the strings it points into
pub(crate) struct NativeParams {
    _strings: Vec<CString>,
    payload: Payload,
}

impl marshal::Opaque for NativeParams {
    fn as_mut_ptr(&mut self) -> *mut c_void {
        match self.payload {
            Payload::Plain(ref mut p) => p as *mut raw::crypt_params_plain as *mut c_void,
            Payload::Luks1(ref mut p) => p as *mut raw::crypt_params_luks1 as *mut c_void,
            Payload::Luks2(ref mut p) => p as *mut raw::crypt_params_luks2 as *mut c_void,
        }
    }
}
