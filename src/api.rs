//! High-level API to work with `libcryptsetup` supported devices (disks)
//!
//! Every operation that can fail inside `libcryptsetup` returns the messages the library logged
//! during that call as part of the error.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::ptr;
use std::time::Duration;

use libc::{self, c_int, c_void};
use raw;
use uuid::Uuid;

use crate::device::{self, RawDevice, ANY_KEYSLOT};
pub use crate::device::{CryptError, Error, Keyslot, Result};
pub use crate::global::{crypt_dir, enable_debug};
use crate::logcalls;
use crate::marshal::{self, Opaque};
use crate::params::{CryptParams, Keyfile, DEFAULT_CIPHER, DEFAULT_CIPHER_MODE, DEFAULT_HASH, DEFAULT_VOLUME_KEY_SIZE};

const BENCHMARK_KDF_TIME_MS: u32 = 1000;

/// Open a crypt device at the specified path. The device is not loaded yet, call
/// `load()` for an existing device or `format()` for a new one.
///
/// # Examples
///
/// ```
/// use cryptsetup_glue::*;
/// # fn foo() -> Result<()> {
/// let mut device = open("/dev/loop0")?;
/// device.load(None)?;
/// println!("{:?}", device.uuid()?);
/// # Ok(())
/// # }
/// ```
pub fn open<P: AsRef<Path>>(path: P) -> Result<CryptDeviceHandle> {
    let cd = device::init(path.as_ref())?;
    debug!("opened crypt device {}", path.as_ref().display());
    Ok(CryptDeviceHandle {
        cd,
        path: path.as_ref().to_owned(),
    })
}

/// Trait representing the read-only queries on a crypt device
pub trait CryptDevice {
    /// Path the device was opened with
    fn path(&self) -> &Path;

    /// Path to the underlying device (as reported by `libcryptsetup`)
    fn device_name(&self) -> Result<String>;

    /// Type of the crypt device, `None` until it has been formatted or loaded
    fn device_type(&self) -> Result<Option<raw::crypt_device_type>>;

    /// UUID of the current device, `None` for devices without a header
    fn uuid(&self) -> Result<Option<Uuid>>;

    /// Get status of key slot
    fn keyslot_status(&self, keyslot: Keyslot) -> Result<raw::crypt_keyslot_info>;

    /// Random number generator used for new volume keys
    fn rng_type(&self) -> Result<raw::crypt_rng_type>;
}

/// An open handle on a crypt device
pub struct CryptDeviceHandle {
    /// Pointer to the raw device, null once closed
    cd: RawDevice,

    /// Path to the crypt device (useful for diagnostics)
    path: PathBuf,
}

// the context is only ever used with the global lock held
unsafe impl Send for CryptDeviceHandle {}

impl fmt::Debug for CryptDeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "CryptDeviceHandle(path={}, raw={:p})", self.path.display(), self.cd)
    }
}

impl Drop for CryptDeviceHandle {
    fn drop(&mut self) {
        if !self.cd.is_null() {
            device::free(self.cd);
            self.cd = ptr::null_mut();
        }
    }
}

impl CryptDevice for CryptDeviceHandle {
    fn path(&self) -> &Path {
        self.path.as_ref()
    }

    fn device_name(&self) -> Result<String> {
        Ok(device::device_name(self.raw()?).unwrap_or_default())
    }

    fn device_type(&self) -> Result<Option<raw::crypt_device_type>> {
        Ok(device::device_type(self.raw()?))
    }

    fn uuid(&self) -> Result<Option<Uuid>> {
        Ok(device::uuid(self.raw()?))
    }

    fn keyslot_status(&self, keyslot: Keyslot) -> Result<raw::crypt_keyslot_info> {
        Ok(device::keyslot_status(self.raw()?, keyslot))
    }

    fn rng_type(&self) -> Result<raw::crypt_rng_type> {
        device::rng_type(self.raw()?)
    }
}

impl CryptDeviceHandle {
    fn raw(&self) -> Result<RawDevice> {
        if self.cd.is_null() {
            Err(Error::DeviceClosed)
        } else {
            Ok(self.cd)
        }
    }

    /// Release the native context. Every later operation fails with `Error::DeviceClosed`.
    pub fn close(&mut self) -> Result<()> {
        let cd = self.raw()?;
        device::free(cd);
        self.cd = ptr::null_mut();
        debug!("closed crypt device {}", self.path.display());
        Ok(())
    }

    /// Write a new header with a generated volume key and add `key` to the first free key slot
    ///
    /// Plain devices have no header or key slots, for them only the mapping parameters are set.
    pub fn format(&mut self, key: &[u8], params: &CryptParams) -> Result<()> {
        self.format_with_volume_key(key, None, params)
    }

    /// Like `format()`, with an explicit volume key. `None` generates one, an empty key is rejected.
    pub fn format_with_volume_key(
        &mut self,
        key: &[u8],
        volume_key: Option<&[u8]>,
        params: &CryptParams,
    ) -> Result<()> {
        let cd = self.raw()?;
        if volume_key.map_or(false, <[u8]>::is_empty) {
            return Err(Error::Precondition {
                param: "volume_key",
                reason: "must not be empty",
            });
        }

        let cipher = params.cipher();
        let mut native = params.to_native()?;
        // an explicit volume key overrides the size from the parameters
        logcalls::format(
            cd,
            params.device_type().to_str(),
            cipher.cipher(),
            cipher.cipher_mode(),
            None,
            volume_key,
            cipher.volume_key_size(),
            Some(&mut native as &mut dyn Opaque),
        )?;
        debug!(
            "formatted {} as {} ({}-{})",
            self.path.display(),
            params.device_type().to_str(),
            cipher.cipher(),
            cipher.cipher_mode()
        );

        if !params.has_keyslots() {
            return Ok(());
        }
        match logcalls::keyslot_add_by_volume_key(cd, ANY_KEYSLOT, volume_key, key) {
            Ok(_) => Ok(()),
            Err(Error::CryptsetupError(e)) => Err(Error::PartialFormat(e)),
            Err(e) => Err(e),
        }
    }

    /// Load the header from disk. `None` detects the type, an explicit type that does not
    /// match the header fails.
    pub fn load(&mut self, params: Option<&CryptParams>) -> Result<()> {
        let cd = self.raw()?;
        let requested_type = params.map(|p| p.device_type().to_str());
        logcalls::load(cd, requested_type, None)
    }

    /// Add `new_key` to a free key slot, `existing_key` must unlock one of the active slots
    pub fn add_key(&mut self, existing_key: &[u8], new_key: &[u8]) -> Result<Keyslot> {
        let cd = self.raw()?;
        let slot = logcalls::keyslot_add_by_passphrase(cd, ANY_KEYSLOT, existing_key, new_key)?;
        Ok(slot as Keyslot)
    }

    /// Replace `existing_key` with `new_key`, returns the slot `new_key` ended up in
    pub fn update_key(&mut self, existing_key: &[u8], new_key: &[u8]) -> Result<Keyslot> {
        let cd = self.raw()?;
        let slot = logcalls::keyslot_change_by_passphrase(cd, ANY_KEYSLOT, ANY_KEYSLOT, existing_key, new_key)?;
        Ok(slot as Keyslot)
    }

    /// Add the key in `new_keyfile` to a free key slot, the key in `keyfile` must unlock one of the
    /// active slots
    pub fn add_keyfile(&mut self, keyfile: &Keyfile, new_keyfile: &Keyfile) -> Result<Keyslot> {
        let cd = self.raw()?;
        let slot = logcalls::keyslot_add_by_keyfile_offset(
            cd,
            ANY_KEYSLOT,
            keyfile.checked_path("keyfile")?,
            keyfile.size,
            keyfile.offset,
            new_keyfile.checked_path("new_keyfile")?,
            new_keyfile.size,
            new_keyfile.offset,
        )?;
        Ok(slot as Keyslot)
    }

    /// Destroy the key slot that `key` unlocks
    pub fn del_key(&mut self, key: &[u8]) -> Result<()> {
        let slot = self.check_key(key)?;
        logcalls::keyslot_destroy(self.raw()?, slot as libc::c_int)
    }

    /// Find the key slot `key` unlocks, without activating the device
    pub fn check_key(&mut self, key: &[u8]) -> Result<Keyslot> {
        let cd = self.raw()?;
        let slot = logcalls::activate_by_passphrase(cd, None, ANY_KEYSLOT, key, 0)?;
        Ok(slot as Keyslot)
    }

    /// Find the key slot the key in `keyfile` unlocks, without activating the device
    pub fn check_keyfile(&mut self, keyfile: &Keyfile) -> Result<Keyslot> {
        let cd = self.raw()?;
        let path = keyfile.checked_path("keyfile")?;
        let slot = logcalls::activate_by_keyfile_offset(cd, None, ANY_KEYSLOT, path, keyfile.size, keyfile.offset, 0)?;
        Ok(slot as Keyslot)
    }

    /// Activate the device under `/dev/mapper/<name>`. The key is checked before privileges are.
    pub fn activate(&mut self, name: &str, key: &[u8]) -> Result<Keyslot> {
        self.check_key(key)?;
        if !device::is_root() {
            return Err(Error::PermissionDenied(None));
        }
        let slot = logcalls::activate_by_passphrase(self.raw()?, Some(name), ANY_KEYSLOT, key, 0)
            .map_err(denied_if_eperm)?;
        debug!("activated {} as {}", self.path.display(), name);
        Ok(slot as Keyslot)
    }

    /// Like `activate()`, with the key read from `keyfile`
    pub fn activate_with_keyfile(&mut self, name: &str, keyfile: &Keyfile) -> Result<Keyslot> {
        self.check_keyfile(keyfile)?;
        if !device::is_root() {
            return Err(Error::PermissionDenied(None));
        }
        let path = keyfile.checked_path("keyfile")?;
        let slot = logcalls::activate_by_keyfile_offset(
            self.raw()?,
            Some(name),
            ANY_KEYSLOT,
            path,
            keyfile.size,
            keyfile.offset,
            0,
        )
        .map_err(denied_if_eperm)?;
        debug!("activated {} as {} with {}", self.path.display(), name, keyfile.path.display());
        Ok(slot as Keyslot)
    }

    /// Offset, size and flags of the active mapping `name`
    pub fn active_device(&self, name: &str) -> Result<raw::crypt_active_device> {
        let cd = self.raw()?;
        let mut active = raw::crypt_active_device::default();
        logcalls::get_active_device(cd, name, &mut active)?;
        Ok(active)
    }

    /// Remove the device-mapper mapping `name`
    pub fn deactivate(&mut self, name: &str) -> Result<()> {
        let cd = self.raw()?;
        if !device::is_root() {
            return Err(Error::PermissionDenied(None));
        }
        logcalls::deactivate(cd, name).map_err(denied_if_eperm)
    }

    /// Benchmark the default cipher, returns encryption and decryption speed in MiB/s
    pub fn benchmark(&mut self, iv_bits: usize, buffer_bytes: usize) -> Result<(f64, f64)> {
        self.benchmark_cipher(
            DEFAULT_CIPHER,
            DEFAULT_CIPHER_MODE,
            DEFAULT_VOLUME_KEY_SIZE,
            iv_bits,
            buffer_bytes,
        )
    }

    /// Benchmark a cipher, returns encryption and decryption speed in MiB/s
    pub fn benchmark_cipher(
        &mut self,
        cipher: &str,
        cipher_mode: &str,
        volume_key_size: usize,
        iv_bits: usize,
        buffer_bytes: usize,
    ) -> Result<(f64, f64)> {
        let cd = self.raw()?;
        logcalls::benchmark(cd, cipher, cipher_mode, volume_key_size, iv_bits / 8, buffer_bytes)
    }

    /// PBKDF2-SHA256 iterations per second
    pub fn benchmark_kdf(&mut self, key: &[u8], salt: &[u8]) -> Result<u64> {
        self.benchmark_pbkdf("pbkdf2", DEFAULT_HASH, key, salt)
    }

    /// Iterations (or, for argon2, the time cost) reaching one second of work for `kdf` with `hash`
    pub fn benchmark_pbkdf(&mut self, kdf: &str, hash: &str, key: &[u8], salt: &[u8]) -> Result<u64> {
        self.run_benchmark_pbkdf(kdf, hash, key, salt, None)
    }

    /// Like `benchmark_pbkdf()`, calling `progress` with the time spent so far. The benchmark is
    /// interrupted with `EINTR` as soon as `progress` returns `false`.
    pub fn benchmark_pbkdf_with_progress<F>(
        &mut self,
        kdf: &str,
        hash: &str,
        key: &[u8],
        salt: &[u8],
        mut progress: F,
    ) -> Result<u64>
    where
        F: FnMut(Duration) -> bool,
    {
        let mut progress = Progress(&mut progress);
        self.run_benchmark_pbkdf(kdf, hash, key, salt, Some(&mut progress))
    }

    fn run_benchmark_pbkdf(
        &mut self,
        kdf: &str,
        hash: &str,
        key: &[u8],
        salt: &[u8],
        progress: Option<&mut Progress>,
    ) -> Result<u64> {
        let cd = self.raw()?;
        let c_kdf = marshal::string("kdf", kdf)?;
        let c_hash = marshal::string("hash", hash)?;
        let (max_memory_kb, parallel_threads) = if kdf == "pbkdf2" { (0, 0) } else { (1024 * 1024, 4) };
        let mut pbkdf = raw::crypt_pbkdf_type {
            type_: c_kdf.as_ptr(),
            hash: c_hash.as_ptr(),
            time_ms: BENCHMARK_KDF_TIME_MS,
            iterations: 0,
            max_memory_kb,
            parallel_threads,
            flags: 0,
        };
        match progress {
            Some(progress) => logcalls::benchmark_pbkdf(
                cd,
                &mut pbkdf,
                key,
                salt,
                DEFAULT_VOLUME_KEY_SIZE,
                Some(benchmark_progress),
                Some(progress as &mut dyn Opaque),
            )?,
            None => logcalls::benchmark_pbkdf(cd, &mut pbkdf, key, salt, DEFAULT_VOLUME_KEY_SIZE, None, None)?,
        }
        Ok(pbkdf.iterations as u64)
    }

    /// Set the UUID in the header, `None` generates a new one
    pub fn set_uuid(&mut self, uuid: Option<&Uuid>) -> Result<()> {
        let cd = self.raw()?;
        let uuid = uuid.map(|u| u.hyphenated().to_string());
        logcalls::set_uuid(cd, uuid.as_deref())
    }

    /// Use `rng_type` for volume keys generated from now on
    pub fn set_rng_type(&mut self, rng_type: raw::crypt_rng_type) -> Result<()> {
        device::set_rng_type(self.raw()?, rng_type);
        Ok(())
    }

    /// Set the time spent on PBKDF2 for key slots added from now on
    pub fn set_iteration_time(&mut self, iteration_time: Duration) -> Result<()> {
        let cd = self.raw()?;
        device::set_iteration_time(cd, iteration_time.as_millis() as u64);
        Ok(())
    }

    /// Keep the encrypted data on a different device than the header
    pub fn set_data_device<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let cd = self.raw()?;
        let path = device::path_str("device", path.as_ref())?;
        logcalls::set_data_device(cd, path)
    }

    /// Number of key slots the loaded device type supports
    pub fn keyslot_max(&self) -> Result<Option<Keyslot>> {
        let device_type = self.device_type()?;
        Ok(device_type.and_then(device::keyslot_max))
    }
}

/// Progress callback handed to `crypt_benchmark_pbkdf` through its user pointer
struct Progress<'a>(&'a mut dyn FnMut(Duration) -> bool);

impl<'a> Opaque for Progress<'a> {
    fn as_mut_ptr(&mut self) -> *mut c_void {
        self as *mut Progress<'a> as *mut c_void
    }
}

extern "C" fn benchmark_progress(time_ms: u32, usrptr: *mut c_void) -> c_int {
    if usrptr.is_null() {
        return 0;
    }
    let progress = unsafe { &mut *(usrptr as *mut Progress) };
    // a panicking callback stops the benchmark instead of unwinding into C
    let keep_going = panic::catch_unwind(AssertUnwindSafe(|| (progress.0)(Duration::from_millis(time_ms as u64))))
        .unwrap_or(false);
    if keep_going {
        0
    } else {
        1
    }
}

fn denied_if_eperm(e: Error) -> Error {
    match e {
        Error::CryptsetupError(ce) if ce.errno.0 == libc::EPERM || ce.errno.0 == libc::EACCES => {
            Error::PermissionDenied(Some(ce))
        }
        e => e,
    }
}
