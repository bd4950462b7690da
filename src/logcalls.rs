//! `libcryptsetup` calls whose failures are reported through the log callback
//!
//! Everything here is generated by `cryptsetup-gen` from its operation schema at build time:
//! `sys` holds the native declarations, `glue` runs each of them inside a capture frame, and the
//! safe wrappers re-exported from this module marshal host values and interpret the result.
#![allow(unused_imports)]

pub(crate) mod sys {
    include!(concat!(env!("OUT_DIR"), "/logcalls_sys.rs"));
}

pub(crate) mod glue {
    include!(concat!(env!("OUT_DIR"), "/logcalls_glue.rs"));
}

mod host {
    include!(concat!(env!("OUT_DIR"), "/logcalls.rs"));
}

pub(crate) use self::host::*;
