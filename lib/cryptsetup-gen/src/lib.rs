//! Code generator for the `libcryptsetup` call wrappers used by `cryptsetup-glue`
//!
//! From the operation schema in [`schema`] this emits three Rust sources that always agree with
//! each other:
//!
//! * `<base>_sys.rs`: the `extern "C"` declarations of the native functions
//! * `<base>_glue.rs`: `unsafe` shims that run each native call inside a diagnostic capture frame
//! * `<base>.rs`: safe host functions that marshal arguments, call the shim and turn the native
//!   result and captured messages into a `Result`
//!
//! The output only depends on the schema, so running the generator twice gives identical files.
//!
//! ```
//! use cryptsetup_gen::{Generator, OPERATIONS};
//!
//! let artifacts = Generator::new(OPERATIONS).generate().unwrap();
//! assert!(artifacts.host.contains("pub(crate) fn keyslot_destroy("));
//! ```

use std::error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

mod emit;
pub mod schema;
pub mod types;

pub use schema::{Derive, Operation, Param, OPERATIONS};

/// Errors found while validating a schema, or while writing the artifacts
#[derive(Debug)]
pub enum Error {
    UnknownType {
        operation: &'static str,
        param: &'static str,
        tag: &'static str,
    },
    DuplicateParam {
        operation: &'static str,
        param: &'static str,
    },
    ReservedName {
        operation: &'static str,
        param: &'static str,
    },
    InvalidLengthSource {
        operation: &'static str,
        param: &'static str,
        source: &'static str,
    },
    InvalidDerivation {
        operation: &'static str,
        param: &'static str,
        reason: &'static str,
    },
    UnsupportedReturn {
        operation: &'static str,
        tag: &'static str,
    },
    ContextWithResult {
        operation: &'static str,
    },
    DuplicateOperation {
        operation: &'static str,
    },
    IOError(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::UnknownType { operation, param, tag } => {
                write!(f, "{}: parameter {} has unsupported type '{}'", operation, param, tag)
            }
            Error::DuplicateParam { operation, param } => write!(f, "{}: parameter {} is repeated", operation, param),
            Error::ReservedName { operation, param } => {
                write!(f, "{}: parameter name {} is reserved", operation, param)
            }
            Error::InvalidLengthSource {
                operation,
                param,
                source,
            } => write!(
                f,
                "{}: {} must measure an exposed string or buffer parameter, not '{}'",
                operation, param, source
            ),
            Error::InvalidDerivation {
                operation,
                param,
                reason,
            } => write!(f, "{}: parameter {}: {}", operation, param, reason),
            Error::UnsupportedReturn { operation, tag } => {
                write!(f, "{}: unsupported return type '{}'", operation, tag)
            }
            Error::ContextWithResult { operation } => {
                write!(f, "{}: operations that create a context cannot return values", operation)
            }
            Error::DuplicateOperation { operation } => write!(f, "{} is declared twice", operation),
            Error::IOError(ref e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
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

/// The generated sources, see the crate documentation for what each one holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub declarations: String,
    pub glue: String,
    pub host: String,
}

impl Artifacts {
    /// File names and contents, in the order they are written
    pub fn files(&self, base_name: &str) -> [(String, &str); 3] {
        [
            (format!("{}_sys.rs", base_name), self.declarations.as_str()),
            (format!("{}_glue.rs", base_name), self.glue.as_str()),
            (format!("{}.rs", base_name), self.host.as_str()),
        ]
    }
}

/// Builder for a generator run
pub struct Generator<'a> {
    operations: &'a [Operation],
    base_name: String,
}

impl<'a> Generator<'a> {
    pub fn new(operations: &'a [Operation]) -> Generator<'a> {
        Generator {
            operations,
            base_name: "logcalls".to_owned(),
        }
    }

    /// Base of the artifact file names, `logcalls` by default
    pub fn base_name(mut self, name: &str) -> Generator<'a> {
        self.base_name = name.to_owned();
        self
    }

    /// Validate the schema and emit all three artifacts. Nothing is emitted if any operation is invalid.
    pub fn generate(&self) -> Result<Artifacts, Error> {
        let mut resolved = Vec::with_capacity(self.operations.len());
        for (i, op) in self.operations.iter().enumerate() {
            if self.operations[..i].iter().any(|o| o.name == op.name) {
                return Err(Error::DuplicateOperation { operation: op.name });
            }
            resolved.push(emit::resolve(op)?);
        }
        Ok(Artifacts {
            declarations: emit::declarations(&resolved),
            glue: emit::glue(&resolved),
            host: emit::host(&resolved),
        })
    }

    /// Generate and write the artifacts into `dir`. Files whose content did not change are left
    /// untouched so that dependent builds are not invalidated.
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>, Error> {
        let artifacts = self.generate()?;
        let mut written = Vec::with_capacity(3);
        for (name, content) in artifacts.files(&self.base_name).iter() {
            let path = dir.as_ref().join(name);
            let unchanged = fs::read_to_string(&path).map(|c| c == *content).unwrap_or(false);
            if !unchanged {
                fs::write(&path, content)?;
            }
            written.push(path);
        }
        Ok(written)
    }
}
