//! Mapping of native parameter types to host (Rust) types and marshaling strategies

use std::fmt;

/// The native type of a parameter, parsed from its C type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeType {
    /// `const char *`, nul-terminated
    Str,
    /// `void *` pointing at bytes, the length travels in a separate parameter
    Buffer,
    /// `void *` pointing at a parameter struct owned by the caller
    Opaque,
    Int,
    UInt32,
    UInt64,
    Size,
    /// `double *` filled in by the call
    OutDouble,
    /// `uint64_t *` filled in by the call
    OutUInt64,
    /// `struct <name> *`, read and written by the call
    Struct(&'static str),
    /// One of the `crypt_*_cb` function pointer typedefs
    Callback(&'static str),
}

/// How a host value becomes its native representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Copied into a `CString`, `None` becomes NULL
    String,
    /// Borrowed as a pointer, `None` becomes NULL and `Some(&[])` a non-null pointer to zero bytes
    Bytes,
    /// Borrowed as a pointer, the host type cannot be absent
    RequiredBytes,
    /// Numeric cast
    Scalar,
    /// Passed through, the caller keeps ownership
    Opaque,
    /// A zeroed slot whose final value is returned to the caller
    Out,
}

/// The result of applying the mapping rules to one parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    /// Host type in the generated signature (or in the returned tuple for `Out`)
    pub host: String,
    pub strategy: Strategy,
    pub nullable: bool,
}

impl NativeType {
    /// Parse a C type tag. `opaque` distinguishes parameter-struct pointers from byte buffers,
    /// both of which are `void *` in the header.
    pub fn parse(tag: &'static str, opaque: bool) -> Option<NativeType> {
        let tag = tag.trim();
        let ty = match tag {
            "const char *" | "char *" => NativeType::Str,
            "void *" | "const void *" if opaque => NativeType::Opaque,
            "void *" | "const void *" => NativeType::Buffer,
            "int" => NativeType::Int,
            "uint32_t" => NativeType::UInt32,
            "uint64_t" => NativeType::UInt64,
            "size_t" => NativeType::Size,
            "double *" => NativeType::OutDouble,
            "uint64_t *" => NativeType::OutUInt64,
            _ => {
                if let Some(name) = tag.strip_prefix("struct ").and_then(|t| t.strip_suffix('*')) {
                    let name = name.trim();
                    if is_identifier(name) {
                        return Some(NativeType::Struct(name));
                    }
                } else if tag.starts_with("crypt_") && tag.ends_with("_cb") && is_identifier(tag) {
                    return Some(NativeType::Callback(tag));
                }
                return None;
            }
        };
        Some(ty)
    }

    /// The Rust FFI type used in the `extern "C"` declaration
    pub fn ffi_type(&self) -> String {
        match *self {
            NativeType::Str | NativeType::Buffer => "*const c_char".to_owned(),
            NativeType::Opaque => "*mut c_void".to_owned(),
            NativeType::Int => "c_int".to_owned(),
            NativeType::UInt32 => "u32".to_owned(),
            NativeType::UInt64 => "u64".to_owned(),
            NativeType::Size => "size_t".to_owned(),
            NativeType::OutDouble => "*mut c_double".to_owned(),
            NativeType::OutUInt64 => "*mut u64".to_owned(),
            NativeType::Struct(name) => format!("*mut raw::{}", name),
            NativeType::Callback(name) => format!("Option<raw::{}>", name),
        }
    }

    /// The native null value, for pointer-like types
    pub fn null_value(&self) -> Option<&'static str> {
        match *self {
            NativeType::Str | NativeType::Buffer => Some("ptr::null()"),
            NativeType::Opaque | NativeType::Struct(_) => Some("ptr::null_mut()"),
            NativeType::Callback(_) => Some("None"),
            _ => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            *self,
            NativeType::Int | NativeType::UInt32 | NativeType::UInt64 | NativeType::Size
        )
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            NativeType::Str => write!(f, "const char *"),
            NativeType::Buffer | NativeType::Opaque => write!(f, "void *"),
            NativeType::Int => write!(f, "int"),
            NativeType::UInt32 => write!(f, "uint32_t"),
            NativeType::UInt64 => write!(f, "uint64_t"),
            NativeType::Size => write!(f, "size_t"),
            NativeType::OutDouble => write!(f, "double *"),
            NativeType::OutUInt64 => write!(f, "uint64_t *"),
            NativeType::Struct(name) => write!(f, "struct {} *", name),
            NativeType::Callback(name) => write!(f, "{}", name),
        }
    }
}

/// Apply the mapping rules. Strings and byte buffers are nullable unless `required`, scalars and
/// out-slots never are.
pub fn map(ty: NativeType, required: bool) -> Mapping {
    let (host, strategy, nullable) = match ty {
        NativeType::Str if required => ("&str".to_owned(), Strategy::String, false),
        NativeType::Str => ("Option<&str>".to_owned(), Strategy::String, true),
        NativeType::Buffer if required => ("&[u8]".to_owned(), Strategy::RequiredBytes, false),
        NativeType::Buffer => ("Option<&[u8]>".to_owned(), Strategy::Bytes, true),
        NativeType::Opaque => ("Option<&mut dyn marshal::Opaque>".to_owned(), Strategy::Opaque, true),
        NativeType::Struct(name) => (format!("&mut raw::{}", name), Strategy::Opaque, false),
        NativeType::Callback(name) => (format!("Option<raw::{}>", name), Strategy::Opaque, true),
        NativeType::Int => ("i32".to_owned(), Strategy::Scalar, false),
        NativeType::UInt32 => ("u32".to_owned(), Strategy::Scalar, false),
        NativeType::UInt64 => ("u64".to_owned(), Strategy::Scalar, false),
        NativeType::Size => ("usize".to_owned(), Strategy::Scalar, false),
        NativeType::OutDouble => ("f64".to_owned(), Strategy::Out, false),
        NativeType::OutUInt64 => ("u64".to_owned(), Strategy::Out, false),
    };
    Mapping {
        host,
        strategy,
        nullable,
    }
}

/// Host type of a return tag. Only `int` results carry meaning in `libcryptsetup`.
pub fn map_return(tag: &str) -> Option<&'static str> {
    match tag.trim() {
        "int" => Some("i32"),
        _ => None,
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}
