//! Correlation of `libcryptsetup` log messages with the call that produced them
//!
//! `libcryptsetup` reports failures through a single process-wide log callback. The callback
//! registered here appends every message to the innermost active capture frame. A frame is
//! pushed by `Capture::begin` and popped by `Capture::finish` (or on drop), and frames are
//! guarded by one reentrant lock, so a frame only ever sees messages from native calls made by
//! the thread that owns it.

use std::cell::RefCell;
use std::ffi::CStr;
use std::ptr;

use errno;
use libc::{c_char, c_int, c_void};
use parking_lot::{const_reentrant_mutex, Once, ReentrantMutex, ReentrantMutexGuard};
use raw;

use crate::device::{CryptError, Error, Result};

type Frames = RefCell<Vec<LogStack>>;

static FRAMES: ReentrantMutex<Frames> = const_reentrant_mutex(RefCell::new(Vec::new()));
static INSTALL: Once = Once::new();

/// The messages logged during one native call, oldest first
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct LogStack {
    messages: Vec<String>,
}

impl LogStack {
    pub(crate) fn push(&mut self, message: String) {
        self.messages.push(message);
    }

    pub(crate) fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Interpret a native result: negative values become an error carrying the captured messages
    pub(crate) fn check(self, res: c_int) -> Result<c_int> {
        if res < 0 {
            Err(Error::CryptsetupError(CryptError::new(errno::Errno(-res), self.messages)))
        } else {
            for message in self.messages() {
                debug!("{}", message);
            }
            Ok(res)
        }
    }
}

/// An active capture frame. Holds the global lock until finished or dropped.
pub(crate) struct Capture {
    guard: ReentrantMutexGuard<'static, Frames>,
    depth: usize,
    finished: bool,
}

impl Capture {
    pub(crate) fn begin() -> Capture {
        install();
        let guard = FRAMES.lock();
        let depth = {
            let mut frames = guard.borrow_mut();
            frames.push(LogStack::default());
            frames.len() - 1
        };
        Capture {
            guard,
            depth,
            finished: false,
        }
    }

    /// Stop capturing and hand over the messages
    pub(crate) fn finish(mut self) -> LogStack {
        self.finished = true;
        self.pop()
    }

    fn pop(&mut self) -> LogStack {
        let mut frames = self.guard.borrow_mut();
        // frames above ours belong to captures that were leaked
        frames.truncate(self.depth + 1);
        frames.pop().unwrap_or_default()
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.pop();
        }
    }
}

/// Run a native call that does not need capturing under the global lock
pub(crate) fn serialized<T, F: FnOnce() -> T>(f: F) -> T {
    install();
    let _guard = FRAMES.lock();
    f()
}

fn install() {
    INSTALL.call_once(|| {
        let _guard = FRAMES.lock();
        unsafe { raw::crypt_set_log_callback(ptr::null_mut(), Some(cryptsetup_log_callback), ptr::null_mut()) };
    });
}

#[cfg(test)]
pub(crate) fn active_frames() -> usize {
    FRAMES.lock().borrow().len()
}

fn push_to_top(message: &str) -> bool {
    // another thread's call in flight, or the frames are being modified on this thread
    let guard = match FRAMES.try_lock() {
        Some(guard) => guard,
        None => return false,
    };
    let pushed = match guard.try_borrow_mut() {
        Ok(mut frames) => match frames.last_mut() {
            Some(top) => {
                top.push(message.to_owned());
                true
            }
            None => false,
        },
        Err(_) => false,
    };
    pushed
}

extern "C" fn cryptsetup_log_callback(level: c_int, message: *const c_char, _usrptr: *mut c_void) {
    if message.is_null() {
        return;
    }
    let message = unsafe { CStr::from_ptr(message) }.to_string_lossy();
    let message = message.trim_end();

    match raw::crypt_log_level::from_raw(level) {
        Some(raw::crypt_log_level::CRYPT_LOG_DEBUG) | Some(raw::crypt_log_level::CRYPT_LOG_DEBUG_JSON) => {
            debug!("{}", message)
        }
        Some(raw::crypt_log_level::CRYPT_LOG_NORMAL) if !push_to_top(message) => info!("{}", message),
        Some(raw::crypt_log_level::CRYPT_LOG_ERROR) if !push_to_top(message) => error!("{}", message),
        Some(raw::crypt_log_level::CRYPT_LOG_VERBOSE) if !push_to_top(message) => debug!("{}", message),
        Some(_) => (),
        None => warn!("unknown log level {}: {}", level, message),
    }
}
