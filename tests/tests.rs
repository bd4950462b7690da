extern crate cryptsetup_glue;
extern crate env_logger;
#[macro_use]
extern crate expectest;
extern crate libc;
extern crate libcryptsetup_sys as raw;
extern crate serial_test;
extern crate tempfile;
extern crate uuid;

use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::PathBuf;
use std::ptr;
use std::thread;
use std::time::Duration;

use expectest::prelude::*;
use serial_test::serial;
use tempfile::{Builder, TempDir};
use uuid::Uuid;

use cryptsetup_glue::*;

const LUKS_SIZE: u64 = 1049600;

struct TestContext {
    dir: TempDir,
    name: String,
}

impl TestContext {
    fn new(name: &str) -> TestContext {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = Builder::new().prefix(name).tempdir().expect("Tempdir!");
        TestContext {
            name: name.to_owned(),
            dir,
        }
    }

    fn backing_file(&self, size: u64) -> PathBuf {
        let path = self.dir.path().join(format!("{}.image", self.name));
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .expect("create backing file");
        file.set_len(size).expect("size backing file");
        path
    }

    fn key_file(&self, name: &str, key: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, key).expect("write key file");
        path
    }

    fn new_crypt_device(&self, size: u64) -> CryptDeviceHandle {
        let mut dev = open(self.backing_file(size)).expect("open backing file");
        dev.set_iteration_time(Duration::from_millis(10)).unwrap();
        dev
    }

    fn formatted_crypt_device(&self, key: &[u8]) -> CryptDeviceHandle {
        let mut dev = self.new_crypt_device(LUKS_SIZE);
        dev.format(key, &CryptParams::luks()).expect("LUKS format should succeed");
        dev
    }
}

fn native_error(res: Result<impl std::fmt::Debug>) -> CryptError {
    match res {
        Err(Error::CryptsetupError(e)) => e,
        other => panic!("expected a native error, got {:?}", other),
    }
}

#[test]
fn test_format_close_and_load() {
    let ctx = TestContext::new("format_close_load");
    let path = ctx.backing_file(LUKS_SIZE);

    let mut dev = open(&path).unwrap();
    dev.set_iteration_time(Duration::from_millis(10)).unwrap();
    expect!(dev.format(b"my password", &CryptParams::luks())).to(be_ok());
    expect!(dev.device_type().unwrap()).to(be_some().value(crypt_device_type::LUKS1));
    expect!(dev.close()).to(be_ok());

    let mut dev = open(&path).unwrap();
    expect!(dev.load(Some(&CryptParams::luks()))).to(be_ok());
    expect!(dev.device_type().unwrap()).to(be_some().value(crypt_device_type::LUKS1));

    let e = native_error(dev.load(Some(&CryptParams::plain())));
    expect!(e.errno.0).to(be_greater_than(0));
}

#[test]
fn test_load_detects_type() {
    let ctx = TestContext::new("load_detects_type");
    let path = ctx.backing_file(LUKS_SIZE);
    {
        let mut dev = open(&path).unwrap();
        dev.set_iteration_time(Duration::from_millis(10)).unwrap();
        dev.format(b"my password", &CryptParams::luks()).unwrap();
    }

    let mut dev = open(&path).unwrap();
    expect!(dev.load(None)).to(be_ok());
    expect!(dev.device_type().unwrap()).to(be_some().value(crypt_device_type::LUKS1));
    expect!(dev.keyslot_max().unwrap()).to(be_some().value(8));
    expect!(dev.device_name().unwrap()).to(be_equal_to(path.to_str().unwrap().to_owned()));
}

#[test]
fn test_load_unformatted_device_fails() {
    let ctx = TestContext::new("load_unformatted");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);

    let e = native_error(dev.load(None));
    expect!(e.errno.0).to(be_equal_to(libc::EINVAL));
    expect!(dev.device_type().unwrap()).to(be_none());
}

#[test]
fn test_unformatted_device_errors_carry_messages() {
    let ctx = TestContext::new("unformatted_messages");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);

    let e = native_error(dev.set_uuid(Some(&Uuid::new_v4())));
    expect!(e.errno.0).to(be_equal_to(libc::EINVAL));
    expect!(e.messages.is_empty()).to(be_false());
    expect!(dev.device_type().unwrap()).to(be_none());
}

#[test]
fn test_format_grows_small_backing_file() {
    let ctx = TestContext::new("format_small_file");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE / 2);

    // a regular file is extended to fit the header, only block devices are too small
    expect!(dev.format(b"my password", &CryptParams::luks())).to(be_ok());
    let len = fs::metadata(dev.path()).unwrap().len();
    expect!(len).to(be_greater_than(LUKS_SIZE / 2));

    let path = dev.path().to_owned();
    drop(dev);
    let mut dev = open(path).unwrap();
    expect!(dev.load(None)).to(be_ok());
    expect!(dev.check_key(b"my password")).to(be_ok().value(0));
}

#[test]
fn test_add_and_delete_keys() {
    let ctx = TestContext::new("add_delete_keys");
    let mut dev = ctx.formatted_crypt_device(b"my password");

    expect!(dev.check_key(b"my password")).to(be_ok().value(0));
    expect!(dev.add_key(b"my password", b"new")).to(be_ok().value(1));
    expect!(dev.keyslot_status(1).unwrap()).to(be_equal_to(crypt_keyslot_info::CRYPT_SLOT_ACTIVE));

    expect!(dev.del_key(b"new")).to(be_ok());
    expect!(dev.keyslot_status(1).unwrap()).to(be_equal_to(crypt_keyslot_info::CRYPT_SLOT_INACTIVE));

    let e = native_error(dev.activate("add_delete_keys", b"new"));
    expect!(e.errno.0).to(be_equal_to(libc::EPERM));
}

#[test]
fn test_add_key_with_wrong_passphrase_fails() {
    let ctx = TestContext::new("add_key_wrong");
    let mut dev = ctx.formatted_crypt_device(b"my password");

    let e = native_error(dev.add_key(b"not my password", b"new"));
    expect!(e.errno.0).to(be_greater_than(0));
    expect!(dev.keyslot_status(1).unwrap()).to(be_equal_to(crypt_keyslot_info::CRYPT_SLOT_INACTIVE));
}

#[test]
fn test_update_key() {
    let ctx = TestContext::new("update_key");
    let mut dev = ctx.formatted_crypt_device(b"my password");

    expect!(dev.update_key(b"my password", b"changed")).to(be_ok());
    expect!(dev.check_key(b"changed")).to(be_ok());
    expect!(dev.check_key(b"my password")).to(be_err());
}

#[test]
fn test_activate_checks_key_before_privileges() {
    let ctx = TestContext::new("activate_privileges");
    let mut dev = ctx.formatted_crypt_device(b"my password");

    native_error(dev.activate("activate_privileges", b"wrong"));

    if unsafe { libc::geteuid() } != 0 {
        match dev.activate("activate_privileges", b"my password") {
            Err(Error::PermissionDenied(None)) => (),
            other => panic!("unexpected {:?}", other),
        }
        match dev.deactivate("activate_privileges") {
            Err(Error::PermissionDenied(None)) => (),
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn test_add_and_check_keyfile() {
    let ctx = TestContext::new("keyfile");
    let mut dev = ctx.formatted_crypt_device(b"my password");
    let existing = Keyfile::new(ctx.key_file("existing.key", b"my password"));
    let new = Keyfile::new(ctx.key_file("new.key", &[0x5a; 64]));

    expect!(dev.check_keyfile(&existing)).to(be_ok().value(0));
    expect!(dev.add_keyfile(&existing, &new)).to(be_ok().value(1));
    expect!(dev.check_keyfile(&new)).to(be_ok().value(1));
    expect!(dev.check_key(&[0x5a; 64])).to(be_ok().value(1));
}

#[test]
fn test_keyfile_offset_and_size() {
    let ctx = TestContext::new("keyfile_offset");
    let mut dev = ctx.formatted_crypt_device(b"my password");
    let padded = ctx.key_file("padded.key", b"junkmy passwordjunk");

    expect!(dev.check_keyfile(&Keyfile::new(&padded).offset(4).size(11))).to(be_ok().value(0));
    let e = native_error(dev.check_keyfile(&Keyfile::new(&padded)));
    expect!(e.errno.0).to(be_equal_to(libc::EPERM));
}

#[test]
fn test_missing_keyfile_is_reported_before_native_call() {
    let ctx = TestContext::new("keyfile_missing");
    let mut dev = ctx.formatted_crypt_device(b"my password");
    let existing = Keyfile::new(ctx.key_file("existing.key", b"my password"));
    let missing = Keyfile::new(ctx.dir.path().join("missing.key"));

    match dev.add_keyfile(&existing, &missing) {
        Err(Error::IOError(e)) => {
            expect!(e.kind()).to(be_equal_to(io::ErrorKind::NotFound));
        }
        other => panic!("unexpected {:?}", other),
    }
    expect!(dev.keyslot_status(1).unwrap()).to(be_equal_to(crypt_keyslot_info::CRYPT_SLOT_INACTIVE));
}

#[test]
fn test_activate_with_keyfile_checks_key_before_privileges() {
    let ctx = TestContext::new("keyfile_privileges");
    let mut dev = ctx.formatted_crypt_device(b"my password");
    let wrong = Keyfile::new(ctx.key_file("wrong.key", b"wrong"));
    let right = Keyfile::new(ctx.key_file("right.key", b"my password"));

    let e = native_error(dev.activate_with_keyfile("keyfile_privileges", &wrong));
    expect!(e.errno.0).to(be_equal_to(libc::EPERM));

    if unsafe { libc::geteuid() } != 0 {
        match dev.activate_with_keyfile("keyfile_privileges", &right) {
            Err(Error::PermissionDenied(None)) => (),
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn test_rng_type() {
    let ctx = TestContext::new("rng_type");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);

    expect!(dev.set_rng_type(crypt_rng_type::CRYPT_RNG_RANDOM)).to(be_ok());
    expect!(dev.rng_type()).to(be_ok().value(crypt_rng_type::CRYPT_RNG_RANDOM));
    expect!(dev.set_rng_type(crypt_rng_type::CRYPT_RNG_URANDOM)).to(be_ok());
    expect!(dev.rng_type()).to(be_ok().value(crypt_rng_type::CRYPT_RNG_URANDOM));
}

#[test]
fn test_active_device_of_unmapped_name_fails() {
    let ctx = TestContext::new("active_device");
    let dev = ctx.formatted_crypt_device(b"my password");

    let e = native_error(dev.active_device("cryptsetup-glue-not-mapped"));
    expect!(e.errno.0).to(be_greater_than(0));
}

#[test]
fn test_format_with_generated_volume_key() {
    let ctx = TestContext::new("volume_key_absent");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);

    expect!(dev.format_with_volume_key(b"my password", None, &CryptParams::luks())).to(be_ok());
    expect!(dev.check_key(b"my password")).to(be_ok().value(0));
}

#[test]
fn test_format_with_empty_volume_key_is_rejected() {
    let ctx = TestContext::new("volume_key_empty");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);

    match dev.format_with_volume_key(b"my password", Some(&[][..]), &CryptParams::luks()) {
        Err(Error::Precondition { param, .. }) => {
            expect!(param).to(be_equal_to("volume_key"));
        }
        other => panic!("unexpected {:?}", other),
    }
    // nothing reached the device
    expect!(dev.device_type().unwrap()).to(be_none());
}

#[test]
fn test_format_with_explicit_volume_key() {
    let ctx = TestContext::new("volume_key_explicit");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);

    let volume_key = [0x42u8; 32];
    expect!(dev.format_with_volume_key(b"my password", Some(&volume_key[..]), &CryptParams::luks())).to(be_ok());
    expect!(dev.check_key(b"my password")).to(be_ok());
}

#[test]
fn test_uuid() {
    let ctx = TestContext::new("uuid");
    let mut dev = ctx.formatted_crypt_device(b"my password");

    let generated = dev.uuid().unwrap();
    expect!(generated).to(be_some());

    let uuid = Uuid::new_v4();
    expect!(dev.set_uuid(Some(&uuid))).to(be_ok());
    expect!(dev.uuid().unwrap()).to(be_some().value(uuid));

    expect!(dev.set_uuid(None)).to(be_ok());
    let regenerated = dev.uuid().unwrap();
    expect!(regenerated).to(be_some());
    expect!(regenerated).not_to(be_equal_to(Some(uuid)));
}

#[test]
fn test_set_data_device() {
    let ctx = TestContext::new("data_device");
    let mut dev = ctx.formatted_crypt_device(b"my password");

    let missing = ctx.dir.path().join("missing.image");
    native_error(dev.set_data_device(&missing));
}

#[test]
fn test_closed_device_rejects_operations() {
    let ctx = TestContext::new("closed");
    let mut dev = ctx.formatted_crypt_device(b"my password");

    expect!(dev.close()).to(be_ok());
    for res in vec![
        dev.close().map(|_| ()),
        dev.load(None).map(|_| ()),
        dev.add_key(b"my password", b"new").map(|_| ()),
        dev.uuid().map(|_| ()),
        dev.rng_type().map(|_| ()),
        dev.active_device("closed").map(|_| ()),
        dev.benchmark(128, 1024 * 1024).map(|_| ()),
    ] {
        match res {
            Err(Error::DeviceClosed) => (),
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn test_open_character_device_fails() {
    let _ctx = TestContext::new("dev_null");
    let e = native_error(open("/dev/null"));
    expect!(e.errno.0).to(be_greater_than(0));
}

#[test]
fn test_benchmark() {
    let ctx = TestContext::new("benchmark");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);

    match dev.benchmark(128, 1024 * 1024) {
        Ok((encryption, decryption)) => {
            expect!(encryption).to(be_greater_than(0.0));
            expect!(decryption).to(be_greater_than(0.0));
        }
        // kernel crypto API not available, e.g. in a container
        Err(Error::CryptsetupError(e)) => {
            expect!(e.errno.0).to(be_greater_than(0));
        }
        Err(e) => panic!("unexpected {:?}", e),
    }
}

#[test]
fn test_benchmark_kdf() {
    let ctx = TestContext::new("benchmark_kdf");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);

    expect!(dev.benchmark_kdf(b"password", b"0123456789abcdef")).to(be_ok());
    let e = native_error(dev.benchmark_pbkdf("pbkdf2", "no-such-hash", b"password", b"0123456789abcdef"));
    expect!(e.errno.0).to(be_greater_than(0));
}

#[test]
fn test_benchmark_progress_can_interrupt() {
    let ctx = TestContext::new("benchmark_progress");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);

    let mut calls = 0;
    let res = dev.benchmark_pbkdf_with_progress("pbkdf2", "sha256", b"password", b"0123456789abcdef", |_| {
        calls += 1;
        false
    });
    let e = native_error(res);
    expect!(e.errno.0).to(be_equal_to(libc::EINTR));
    expect!(calls).to(be_equal_to(1));
}

#[test]
fn test_concurrent_benchmarks_get_their_own_messages() {
    let ctx = TestContext::new("concurrent");
    let paths: Vec<PathBuf> = (0..2)
        .map(|i| {
            let path = ctx.dir.path().join(format!("concurrent-{}.image", i));
            OpenOptions::new()
                .write(true)
                .create(true)
                .open(&path)
                .and_then(|f| f.set_len(LUKS_SIZE))
                .unwrap();
            path
        })
        .collect();

    let threads: Vec<_> = paths
        .into_iter()
        .enumerate()
        .map(|(i, path)| {
            thread::spawn(move || {
                let mut dev = open(path).unwrap();
                let own = format!("marker{}x", i);
                let other = format!("marker{}x", 1 - i);
                let c_own = CString::new(own.clone()).unwrap();
                for round in 0..20 {
                    // log from inside the native call, then stop it so the messages come back
                    let mut logged = 0;
                    let res = dev.benchmark_pbkdf_with_progress("pbkdf2", "sha256", b"password", b"salt", |_| {
                        for _ in 0..=round % 3 {
                            unsafe {
                                raw::crypt_log(ptr::null_mut(), raw::crypt_log_level::CRYPT_LOG_ERROR, c_own.as_ptr())
                            };
                            logged += 1;
                        }
                        thread::yield_now();
                        false
                    });
                    let e = native_error(res);
                    let own_count = e.messages.iter().filter(|m| m.contains(&own)).count();
                    let other_count = e.messages.iter().filter(|m| m.contains(&other)).count();
                    assert!(logged > 0, "nothing logged in round {}", round);
                    assert_eq!(logged, own_count, "{:?}", e.messages);
                    assert_eq!(0, other_count, "{:?}", e.messages);
                }
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }
}

#[test]
#[serial]
fn test_debug_messages_are_not_attached_to_errors() {
    let ctx = TestContext::new("debug");
    let mut dev = ctx.new_crypt_device(LUKS_SIZE);
    let quiet = native_error(dev.set_uuid(None));

    enable_debug(true);
    let verbose = native_error(dev.set_uuid(None));
    enable_debug(false);

    expect!(quiet.messages.is_empty()).to(be_false());
    expect!(verbose).to(be_equal_to(quiet));
}

#[test]
fn test_crypt_dir() {
    expect!(crypt_dir()).to(be_some());
}
