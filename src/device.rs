//! Error types and thin wrappers around single native calls

use std::error;
use std::ffi::CStr;
use std::fmt;
use std::io;
use std::path::Path;
use std::result;
use std::str::FromStr;

use errno;
use libc;
use raw;
use ::uuid::Uuid;

use crate::capture;
use crate::logcalls;

/// Raw pointer to the native device context
pub type RawDevice = *mut raw::crypt_device;

pub type Result<T> = result::Result<T, Error>;
pub type Keyslot = u8;

pub(crate) const ANY_KEYSLOT: libc::c_int = raw::CRYPT_ANY_SLOT;

/// A failed native call: the negated return code and the messages it logged, oldest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptError {
    pub errno: errno::Errno,
    pub messages: Vec<String>,
}

impl CryptError {
    pub fn new(errno: errno::Errno, messages: Vec<String>) -> CryptError {
        CryptError { errno, messages }
    }
}

impl fmt::Display for CryptError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.messages.is_empty() {
            write!(f, "{}", self.errno)
        } else {
            write!(f, "{}: {}", self.errno, self.messages.join("; "))
        }
    }
}

impl error::Error for CryptError {}

#[derive(Debug)]
pub enum Error {
    /// An argument was rejected before anything was passed to `libcryptsetup`
    Precondition { param: &'static str, reason: &'static str },
    CryptsetupError(CryptError),
    /// Activation and deactivation need root, the native error is present if the kernel refused
    PermissionDenied(Option<CryptError>),
    /// The handle was closed
    DeviceClosed,
    /// The header was written but the passphrase could not be added to a key slot
    PartialFormat(CryptError),
    /// A key file could not be read
    IOError(io::Error),
}

impl Error {
    /// The native error, if there is one
    pub fn crypt_error(&self) -> Option<&CryptError> {
        match *self {
            Error::CryptsetupError(ref e) | Error::PartialFormat(ref e) => Some(e),
            Error::PermissionDenied(ref e) => e.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Precondition { param, reason } => write!(f, "invalid {}: {}", param, reason),
            Error::CryptsetupError(ref e) => write!(f, "{}", e),
            Error::PermissionDenied(None) => write!(f, "permission denied"),
            Error::PermissionDenied(Some(ref e)) => write!(f, "permission denied: {}", e),
            Error::DeviceClosed => write!(f, "device is closed"),
            Error::PartialFormat(ref e) => write!(f, "device formatted but adding the key failed: {}", e),
            Error::IOError(ref e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::CryptsetupError(ref e) | Error::PartialFormat(ref e) => Some(e),
            Error::PermissionDenied(Some(ref e)) => Some(e),
            Error::IOError(ref e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IOError(e)
    }
}

impl From<CryptError> for Error {
    fn from(e: CryptError) -> Self {
        Error::CryptsetupError(e)
    }
}

unsafe fn str_from_c_str<'a>(c_str: *const libc::c_char) -> Option<&'a str> {
    if c_str.is_null() {
        None
    } else {
        CStr::from_ptr(c_str).to_str().ok()
    }
}

pub(crate) fn path_str<'a>(param: &'static str, path: &'a Path) -> Result<&'a str> {
    path.to_str().ok_or(Error::Precondition {
        param,
        reason: "path is not valid UTF-8",
    })
}

pub(crate) fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Allocate a context for the device at `path`
pub(crate) fn init(path: &Path) -> Result<RawDevice> {
    let device = path_str("device", path)?;
    logcalls::init(device)
}

pub(crate) fn free(cd: RawDevice) {
    capture::serialized(|| unsafe { raw::crypt_free(cd) })
}

pub(crate) fn uuid(cd: RawDevice) -> Option<Uuid> {
    capture::serialized(|| {
        let res = unsafe { str_from_c_str(raw::crypt_get_uuid(cd)) };
        res.and_then(|uuid_str| Uuid::parse_str(uuid_str).ok())
    })
}

pub(crate) fn device_name(cd: RawDevice) -> Option<String> {
    capture::serialized(|| {
        let res = unsafe { str_from_c_str(raw::crypt_get_device_name(cd)) };
        res.map(|r| r.to_owned())
    })
}

pub(crate) fn device_type(cd: RawDevice) -> Option<raw::crypt_device_type> {
    capture::serialized(|| {
        let res = unsafe { str_from_c_str(raw::crypt_get_type(cd)) };
        res.and_then(|res_str| raw::crypt_device_type::from_str(res_str).ok())
    })
}

pub(crate) fn keyslot_status(cd: RawDevice, slot: Keyslot) -> raw::crypt_keyslot_info {
    capture::serialized(|| unsafe { raw::crypt_keyslot_status(cd, slot as libc::c_int) })
}

pub(crate) fn keyslot_max(device_type: raw::crypt_device_type) -> Option<Keyslot> {
    let c_type = match std::ffi::CString::new(device_type.to_str()) {
        Ok(c_type) => c_type,
        Err(_) => return None,
    };
    let res = capture::serialized(|| unsafe { raw::crypt_keyslot_max(c_type.as_ptr()) });
    if res < 0 {
        None
    } else {
        Some(res as Keyslot)
    }
}

pub(crate) fn rng_type(cd: RawDevice) -> Result<raw::crypt_rng_type> {
    let res = logcalls::get_rng_type(cd)?;
    raw::crypt_rng_type::from_raw(res).ok_or_else(|| {
        Error::CryptsetupError(CryptError::new(
            errno::Errno(libc::EINVAL),
            vec![format!("unknown RNG type {}", res)],
        ))
    })
}

pub(crate) fn set_rng_type(cd: RawDevice, rng_type: raw::crypt_rng_type) {
    capture::serialized(|| unsafe { raw::crypt_set_rng_type(cd, rng_type) })
}

#[allow(deprecated)]
pub(crate) fn set_iteration_time(cd: RawDevice, iteration_time_ms: u64) {
    capture::serialized(|| unsafe { raw::crypt_set_iteration_time(cd, iteration_time_ms) })
}

pub(crate) fn crypt_dir() -> Option<String> {
    capture::serialized(|| {
        let res = unsafe { str_from_c_str(raw::crypt_get_dir()) };
        res.map(|r| r.to_owned())
    })
}

pub(crate) fn set_debug_level(level: raw::crypt_debug_level) {
    capture::serialized(|| unsafe { raw::crypt_set_debug_level(level) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypt_error_display_joins_messages() {
        let e = CryptError::new(errno::Errno(libc::EINVAL), vec!["first".to_owned(), "second".to_owned()]);
        let shown = e.to_string();
        assert!(shown.ends_with(": first; second"), "{}", shown);
        assert_eq!(errno::Errno(libc::EINVAL).to_string(), CryptError::new(errno::Errno(libc::EINVAL), vec![]).to_string());
    }

    #[test]
    fn test_crypt_error_is_reachable_from_error() {
        let e = CryptError::new(errno::Errno(libc::EPERM), vec!["denied".to_owned()]);
        assert_eq!(Some(&e), Error::PermissionDenied(Some(e.clone())).crypt_error());
        assert_eq!(Some(&e), Error::PartialFormat(e.clone()).crypt_error());
        assert_eq!(None, Error::DeviceClosed.crypt_error());
    }

    #[test]
    fn test_precondition_display() {
        let e = Error::Precondition {
            param: "volume_key",
            reason: "must not be empty",
        };
        assert_eq!("invalid volume_key: must not be empty", e.to_string());
    }

    #[test]
    fn test_crypt_dir_is_known() {
        assert!(crypt_dir().is_some());
    }

    #[test]
    fn test_keyslot_max() {
        assert_eq!(Some(8), keyslot_max(raw::crypt_device_type::LUKS1));
    }
}
