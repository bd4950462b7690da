//! The operation schema: every wrapped `libcryptsetup` function, described as plain data
//!
//! Each operation implicitly takes `struct crypt_device *cd` as its first argument, this is added
//! by the generator and never listed here. All operations return a negative errno on failure,
//! `returns` only names the type of a meaningful non-negative result.

/// How the value of a parameter is obtained when it is not supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derive {
    /// Supplied by the caller
    None,
    /// Byte length of the named buffer or string parameter, measured at call time
    LengthOf(&'static str),
    /// Byte length of the named nullable parameter when it is present, otherwise the value the
    /// caller supplied
    LengthOr(&'static str),
    /// Always the native null value
    Null,
}

/// A parameter of a native function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    /// C type of the parameter, see `types::NativeType::parse` for the accepted tags
    pub ty: &'static str,
    /// Name of the parameter, as in `libcryptsetup.h`
    pub name: &'static str,
    pub derive: Derive,
    /// Pointer parameters are nullable unless this is set
    pub required: bool,
    /// A `void *` that points at a parameter struct rather than at bytes
    pub opaque: bool,
}

impl Param {
    pub const fn new(ty: &'static str, name: &'static str) -> Param {
        Param {
            ty,
            name,
            derive: Derive::None,
            required: false,
            opaque: false,
        }
    }

    /// Nullable `const char *`
    pub const fn string(name: &'static str) -> Param {
        Param::new("const char *", name)
    }

    /// Byte buffer, nullable unless marked `required()`
    pub const fn buffer(name: &'static str) -> Param {
        Param::new("void *", name)
    }

    /// `size_t` holding the byte length of `of`
    pub const fn length_of(name: &'static str, of: &'static str) -> Param {
        Param {
            derive: Derive::LengthOf(of),
            ..Param::new("size_t", name)
        }
    }

    /// `size_t` holding the byte length of `of`, or the caller's value when `of` is absent
    pub const fn length_or(name: &'static str, of: &'static str) -> Param {
        Param {
            derive: Derive::LengthOr(of),
            ..Param::new("size_t", name)
        }
    }

    /// Pointer to a struct owned by the caller, one of the `crypt_params_*` or callback data
    pub const fn params(name: &'static str) -> Param {
        Param {
            opaque: true,
            ..Param::new("void *", name)
        }
    }

    pub const fn required(self) -> Param {
        Param { required: true, ..self }
    }

    pub const fn null(self) -> Param {
        Param {
            derive: Derive::Null,
            ..self
        }
    }

    /// Whether the caller supplies this parameter
    pub fn is_exposed(&self) -> bool {
        matches!(self.derive, Derive::None | Derive::LengthOr(_))
    }
}

/// A native function to be wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub params: &'static [Param],
    pub returns: Option<&'static str>,
    /// The context argument is `struct crypt_device **` and is filled in by the call
    pub sets_context: bool,
}

impl Operation {
    pub const fn new(name: &'static str, params: &'static [Param]) -> Operation {
        Operation {
            name,
            params,
            returns: None,
            sets_context: false,
        }
    }

    pub const fn returns(self, ty: &'static str) -> Operation {
        Operation {
            returns: Some(ty),
            ..self
        }
    }

    pub const fn sets_context(self) -> Operation {
        Operation {
            sets_context: true,
            ..self
        }
    }

    /// Name of the generated host function
    pub fn host_name(&self) -> &'static str {
        self.name.strip_prefix("crypt_").unwrap_or(self.name)
    }

    pub fn param(&self, name: &str) -> Option<&'static Param> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Operations wrapped by `cryptsetup-glue`
pub const OPERATIONS: &[Operation] = &[
    // context
    Operation::new("crypt_init", &[Param::string("device").required()]).sets_context(),
    // formatting
    Operation::new(
        "crypt_format",
        &[
            Param::string("crypt_type").required(),
            Param::string("cipher").required(),
            Param::string("cipher_mode").required(),
            Param::string("uuid"),
            // NULL generates a volume key of volume_key_size bytes
            Param::buffer("volume_key"),
            Param::length_or("volume_key_size", "volume_key"),
            Param::params("params"),
        ],
    ),
    Operation::new(
        "crypt_load",
        &[Param::string("requested_type"), Param::params("params")],
    ),
    // misc
    Operation::new("crypt_set_uuid", &[Param::string("uuid")]),
    Operation::new("crypt_set_data_device", &[Param::string("device").required()]),
    Operation::new("crypt_get_rng_type", &[]).returns("int"),
    // keyslot management
    Operation::new(
        "crypt_keyslot_add_by_passphrase",
        &[
            Param::new("int", "keyslot"),
            Param::buffer("passphrase").required(),
            Param::length_of("passphrase_size", "passphrase"),
            Param::buffer("new_passphrase").required(),
            Param::length_of("new_passphrase_size", "new_passphrase"),
        ],
    )
    .returns("int"),
    Operation::new(
        "crypt_keyslot_change_by_passphrase",
        &[
            Param::new("int", "keyslot_old"),
            Param::new("int", "keyslot_new"),
            Param::buffer("passphrase").required(),
            Param::length_of("passphrase_size", "passphrase"),
            Param::buffer("new_passphrase").required(),
            Param::length_of("new_passphrase_size", "new_passphrase"),
        ],
    )
    .returns("int"),
    Operation::new(
        "crypt_keyslot_add_by_keyfile_offset",
        &[
            Param::new("int", "keyslot"),
            Param::string("keyfile").required(),
            // 0 reads up to the end of the file
            Param::new("size_t", "keyfile_size"),
            Param::new("size_t", "keyfile_offset"),
            Param::string("new_keyfile").required(),
            Param::new("size_t", "new_keyfile_size"),
            Param::new("size_t", "new_keyfile_offset"),
        ],
    )
    .returns("int"),
    Operation::new(
        "crypt_keyslot_add_by_volume_key",
        &[
            Param::new("int", "keyslot"),
            // NULL means the volume key still held by the context after formatting
            Param::buffer("volume_key"),
            Param::length_of("volume_key_size", "volume_key"),
            Param::buffer("passphrase").required(),
            Param::length_of("passphrase_size", "passphrase"),
        ],
    )
    .returns("int"),
    Operation::new("crypt_keyslot_destroy", &[Param::new("int", "keyslot")]),
    // device activation
    Operation::new(
        "crypt_activate_by_passphrase",
        &[
            // NULL only checks the passphrase
            Param::string("name"),
            Param::new("int", "keyslot"),
            Param::buffer("passphrase").required(),
            Param::length_of("passphrase_size", "passphrase"),
            Param::new("uint32_t", "flags"),
        ],
    )
    .returns("int"),
    Operation::new(
        "crypt_activate_by_keyfile_offset",
        &[
            Param::string("name"),
            Param::new("int", "keyslot"),
            Param::string("keyfile").required(),
            Param::new("size_t", "keyfile_size"),
            Param::new("size_t", "keyfile_offset"),
            Param::new("uint32_t", "flags"),
        ],
    )
    .returns("int"),
    Operation::new("crypt_deactivate", &[Param::string("name").required()]),
    Operation::new(
        "crypt_get_active_device",
        &[
            Param::string("name").required(),
            Param::new("struct crypt_active_device *", "cad"),
        ],
    ),
    // benchmarking
    Operation::new(
        "crypt_benchmark",
        &[
            Param::string("cipher").required(),
            Param::string("cipher_mode").required(),
            Param::new("size_t", "volume_key_size"),
            Param::new("size_t", "iv_size"),
            Param::new("size_t", "buffer_size"),
            Param::new("double *", "encryption_mbs"),
            Param::new("double *", "decryption_mbs"),
        ],
    ),
    Operation::new(
        "crypt_benchmark_pbkdf",
        &[
            Param::new("struct crypt_pbkdf_type *", "pbkdf"),
            Param::buffer("password").required(),
            Param::length_of("password_size", "password"),
            Param::buffer("salt").required(),
            Param::length_of("salt_size", "salt"),
            Param::new("size_t", "volume_key_size"),
            Param::new("crypt_benchmark_cb", "progress"),
            Param::params("usrptr"),
        ],
    ),
];
