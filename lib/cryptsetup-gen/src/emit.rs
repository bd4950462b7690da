use std::fmt::Write;

use crate::schema::{Derive, Operation, Param};
use crate::types::{self, Mapping, NativeType, Strategy};
use crate::Error;

pub(crate) const HEADER: &str = "// @generated by cryptsetup-gen from the operation schema, do not edit\n";

const FFI_IMPORTS: &str = "use libc::{c_char, c_double, c_int, c_void, size_t};\nuse libcryptsetup_sys as raw;\n";

// prefix of the locals holding marshaled arguments
const LOCAL_PREFIX: &str = "c_";

// names used by the generated bodies, or not valid as Rust identifiers
const RESERVED: &[&str] = &[
    "cd", "res", "stack", "capture", "as", "box", "const", "crate", "fn", "impl", "in", "loop", "match", "mod",
    "move", "mut", "ref", "self", "static", "struct", "super", "trait", "type", "unsafe", "use", "where",
];

struct ResolvedParam<'a> {
    param: &'a Param,
    ty: NativeType,
    mapping: Mapping,
}

pub(crate) struct ResolvedOp<'a> {
    op: &'a Operation,
    params: Vec<ResolvedParam<'a>>,
    returns: Option<&'static str>,
}

impl<'a> ResolvedOp<'a> {
    fn context_type(&self) -> &'static str {
        if self.op.sets_context {
            "*mut *mut raw::crypt_device"
        } else {
            "*mut raw::crypt_device"
        }
    }

    fn ffi_args(&self) -> String {
        let mut args = vec![format!("cd: {}", self.context_type())];
        args.extend(
            self.params
                .iter()
                .map(|p| format!("{}: {}", p.param.name, p.ty.ffi_type())),
        );
        args.join(", ")
    }

    fn outs(&self) -> impl Iterator<Item = &ResolvedParam<'a>> {
        self.params.iter().filter(|p| p.mapping.strategy == Strategy::Out)
    }

    fn lookup(&self, name: &str) -> Option<&ResolvedParam<'a>> {
        self.params.iter().find(|p| p.param.name == name)
    }
}

pub(crate) fn resolve(op: &Operation) -> Result<ResolvedOp, Error> {
    let mut params = Vec::with_capacity(op.params.len());
    for (i, param) in op.params.iter().enumerate() {
        if RESERVED.contains(&param.name) || param.name.starts_with(LOCAL_PREFIX) {
            return Err(Error::ReservedName {
                operation: op.name,
                param: param.name,
            });
        }
        if op.params[..i].iter().any(|p| p.name == param.name) {
            return Err(Error::DuplicateParam {
                operation: op.name,
                param: param.name,
            });
        }
        let ty = NativeType::parse(param.ty, param.opaque).ok_or(Error::UnknownType {
            operation: op.name,
            param: param.name,
            tag: param.ty,
        })?;
        let mapping = types::map(ty, param.required);
        params.push(ResolvedParam { param, ty, mapping });
    }

    for p in params.iter() {
        let invalid = |reason| Error::InvalidDerivation {
            operation: op.name,
            param: p.param.name,
            reason,
        };
        match p.param.derive {
            Derive::None => (),
            Derive::Null if p.ty.null_value().is_none() => return Err(invalid("only pointers can be null")),
            Derive::Null => (),
            Derive::LengthOf(_) if p.ty != NativeType::Size => return Err(invalid("lengths must be size_t")),
            Derive::LengthOf(source) => {
                let valid = params.iter().any(|s| {
                    s.param.name == source
                        && s.param.is_exposed()
                        && matches!(s.ty, NativeType::Str | NativeType::Buffer)
                });
                if !valid {
                    return Err(Error::InvalidLengthSource {
                        operation: op.name,
                        param: p.param.name,
                        source,
                    });
                }
            }
            Derive::LengthOr(_) if p.ty != NativeType::Size => return Err(invalid("lengths must be size_t")),
            Derive::LengthOr(source) => {
                let valid = params.iter().any(|s| {
                    s.param.name == source
                        && s.param.is_exposed()
                        && s.mapping.nullable
                        && matches!(s.ty, NativeType::Str | NativeType::Buffer)
                });
                if !valid {
                    return Err(Error::InvalidLengthSource {
                        operation: op.name,
                        param: p.param.name,
                        source,
                    });
                }
            }
        }
        if p.mapping.strategy == Strategy::Out && p.param.derive != Derive::None {
            return Err(invalid("out parameters cannot be derived"));
        }
    }

    let returns = match op.returns {
        Some(tag) => Some(types::map_return(tag).ok_or(Error::UnsupportedReturn {
            operation: op.name,
            tag,
        })?),
        None => None,
    };

    let resolved = ResolvedOp { op, params, returns };
    if op.sets_context && (resolved.returns.is_some() || resolved.outs().next().is_some()) {
        return Err(Error::ContextWithResult { operation: op.name });
    }
    Ok(resolved)
}

pub(crate) fn declarations(ops: &[ResolvedOp]) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(FFI_IMPORTS);
    out.push_str("\nextern \"C\" {\n");
    for op in ops {
        let _ = writeln!(out, "    pub fn {}({}) -> c_int;", op.op.name, op.ffi_args());
    }
    out.push_str("}\n");
    out
}

pub(crate) fn glue(ops: &[ResolvedOp]) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(FFI_IMPORTS);
    out.push_str("\nuse super::sys;\nuse crate::capture::{Capture, LogStack};\n");
    for op in ops {
        let names: Vec<&str> = Some("cd")
            .into_iter()
            .chain(op.params.iter().map(|p| p.param.name))
            .collect();
        out.push('\n');
        let _ = writeln!(out, "/// `{}` with its diagnostics captured", op.op.name);
        let _ = writeln!(
            out,
            "pub(crate) unsafe fn {}({}) -> (c_int, LogStack) {{",
            op.op.name,
            op.ffi_args()
        );
        out.push_str("    let capture = Capture::begin();\n");
        let _ = writeln!(out, "    let res = sys::{}({});", op.op.name, names.join(", "));
        out.push_str("    (res, capture.finish())\n");
        out.push_str("}\n");
    }
    out
}

pub(crate) fn host(ops: &[ResolvedOp]) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    out.push_str(FFI_IMPORTS);
    out.push_str("use std::ptr;\n\nuse super::glue;\nuse crate::device::{RawDevice, Result};\nuse crate::marshal;\n");
    for op in ops {
        out.push('\n');
        host_fn(&mut out, op);
    }
    out
}

fn host_fn(out: &mut String, op: &ResolvedOp) {
    let mut args = Vec::new();
    let mut lets = Vec::new();
    let mut call = Vec::new();

    if op.op.sets_context {
        lets.push("let mut cd: RawDevice = ptr::null_mut();".to_owned());
        call.push("&mut cd".to_owned());
    } else {
        args.push("cd: RawDevice".to_owned());
        call.push("cd".to_owned());
    }

    for p in op.params.iter() {
        let name = p.param.name;
        let local = format!("{}{}", LOCAL_PREFIX, name);

        match p.param.derive {
            Derive::Null => {
                call.push(p.ty.null_value().unwrap_or("ptr::null_mut()").to_owned());
                continue;
            }
            Derive::LengthOf(source) => {
                let len = match op.lookup(source) {
                    Some(s) if s.mapping.nullable && s.ty == NativeType::Str => format!("{}.map_or(0, str::len)", source),
                    Some(s) if s.mapping.nullable => format!("{}.map_or(0, <[u8]>::len)", source),
                    _ => format!("{}.len()", source),
                };
                lets.push(format!("let {} = {} as size_t;", local, len));
                call.push(local);
                continue;
            }
            Derive::LengthOr(source) => {
                let len = match op.lookup(source) {
                    Some(s) if s.ty == NativeType::Str => format!("{}.map_or({}, str::len)", source, name),
                    _ => format!("{}.map_or({}, <[u8]>::len)", source, name),
                };
                lets.push(format!("let {} = {} as size_t;", local, len));
                call.push(local);
                args.push(format!("{}: {}", name, p.mapping.host));
                continue;
            }
            Derive::None => (),
        }

        match p.mapping.strategy {
            Strategy::String if p.mapping.nullable => {
                lets.push(format!("let {} = marshal::opt_string(\"{}\", {})?;", local, name, name));
                call.push(format!("marshal::string_ptr(&{})", local));
            }
            Strategy::String => {
                lets.push(format!("let {} = marshal::string(\"{}\", {})?;", local, name, name));
                call.push(format!("{}.as_ptr()", local));
            }
            Strategy::Bytes => {
                lets.push(format!("let {} = marshal::opt_bytes({});", local, name));
                call.push(local);
            }
            Strategy::RequiredBytes => {
                lets.push(format!("let {} = marshal::bytes({});", local, name));
                call.push(local);
            }
            Strategy::Scalar => {
                lets.push(format!("let {} = {} as {};", local, name, p.ty.ffi_type()));
                call.push(local);
            }
            Strategy::Opaque => {
                match p.ty {
                    NativeType::Opaque => lets.push(format!("let {} = marshal::opaque({});", local, name)),
                    _ => lets.push(format!("let {}: {} = {};", local, p.ty.ffi_type(), name)),
                }
                call.push(local);
            }
            Strategy::Out => {
                let slot = match p.ty {
                    NativeType::OutDouble => "c_double = 0.0",
                    _ => "u64 = 0",
                };
                lets.push(format!("let mut {}: {};", local, slot));
                call.push(format!("&mut {}", local));
                continue;
            }
        }
        args.push(format!("{}: {}", name, p.mapping.host));
    }

    let mut results: Vec<(String, String)> = Vec::new();
    if let Some(ret) = op.returns {
        results.push((ret.to_owned(), format!("res as {}", ret)));
    }
    for p in op.outs() {
        results.push((
            p.mapping.host.clone(),
            format!("{}{} as {}", LOCAL_PREFIX, p.param.name, p.mapping.host),
        ));
    }
    if op.op.sets_context {
        results.push(("RawDevice".to_owned(), "cd".to_owned()));
    }
    let (ret_ty, ret_val) = match results.len() {
        0 => ("()".to_owned(), "()".to_owned()),
        1 => results.remove(0),
        _ => {
            let (tys, vals): (Vec<String>, Vec<String>) = results.into_iter().unzip();
            (format!("({})", tys.join(", ")), format!("({})", vals.join(", ")))
        }
    };

    let _ = writeln!(out, "/// Wraps `{}`", op.op.name);
    let _ = writeln!(
        out,
        "pub(crate) fn {}({}) -> Result<{}> {{",
        op.op.host_name(),
        args.join(", "),
        ret_ty
    );
    for l in lets {
        let _ = writeln!(out, "    {}", l);
    }
    let _ = writeln!(
        out,
        "    let (res, stack) = unsafe {{ glue::{}({}) }};",
        op.op.name,
        call.join(", ")
    );
    if op.returns.is_some() {
        out.push_str("    let res = stack.check(res)?;\n");
    } else {
        out.push_str("    stack.check(res)?;\n");
    }
    let _ = writeln!(out, "    Ok({})", ret_val);
    out.push_str("}\n");
}
