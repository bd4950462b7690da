//! Conversions from host values to native arguments, used by the generated wrappers
//!
//! Owned conversions (`CString`s) live in the caller's stack frame for the duration of the
//! native call, borrowed buffers are passed without copying.

use std::ffi::CString;
use std::ptr;

use libc::{c_char, c_void};

use crate::device::{Error, Result};

/// A native parameter struct that can be handed to `libcryptsetup` as `void *`
pub(crate) trait Opaque {
    fn as_mut_ptr(&mut self) -> *mut c_void;
}

pub(crate) fn string(param: &'static str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| Error::Precondition {
        param,
        reason: "contains a nul byte",
    })
}

pub(crate) fn opt_string(param: &'static str, value: Option<&str>) -> Result<Option<CString>> {
    value.map(|v| string(param, v)).transpose()
}

pub(crate) fn string_ptr(value: &Option<CString>) -> *const c_char {
    value.as_ref().map_or(ptr::null(), |v| v.as_ptr())
}

/// Never null, even for an empty slice
pub(crate) fn bytes(value: &[u8]) -> *const c_char {
    value.as_ptr() as *const c_char
}

/// `None` is null, `Some(&[])` is not
pub(crate) fn opt_bytes(value: Option<&[u8]>) -> *const c_char {
    value.map_or(ptr::null(), bytes)
}

pub(crate) fn opaque(value: Option<&mut dyn Opaque>) -> *mut c_void {
    value.map_or(ptr::null_mut(), |v| v.as_mut_ptr())
}
