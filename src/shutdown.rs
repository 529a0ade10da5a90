// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Interrupt handling for sessions.
//!
//! A SIGINT handler writes a byte into a socket pair; a dispatcher thread
//! hands the interrupt to every subscribed hook exactly once. Once nobody is
//! subscribed the previous disposition is put back.

use std::io::Read;
use std::os::raw::c_int;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::mpsc;

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use crate::runtime::threads;
use crate::Result;

static WRITE_FD: AtomicI32 = AtomicI32::new(-1);
static NEXT_ID: AtomicU64 = AtomicU64::new(0);
static DISPATCHER: OnceCell<UnixStream> = OnceCell::new();
static HOOKS: Mutex<Hooks> = parking_lot::const_mutex(Hooks {
    subscribers: Vec::new(),
    previous: None,
});

struct Hooks {
    subscribers: Vec<(u64, mpsc::Sender<Signal>)>,
    previous: Option<SigAction>,
}

impl Hooks {
    fn catch(&mut self) -> Result<()> {
        if self.previous.is_none() {
            let action = SigAction::new(
                SigHandler::Handler(interrupt_handler),
                SaFlags::SA_RESTART,
                SigSet::empty(),
            );
            let previous = unsafe { signal::sigaction(Signal::SIGINT, &action) }?;
            self.previous = Some(previous);
        }
        Ok(())
    }

    fn release(&mut self) {
        if let Some(previous) = self.previous.take() {
            if let Err(err) = unsafe { signal::sigaction(Signal::SIGINT, &previous) } {
                log::warn!("cannot restore SIGINT disposition: {}", err);
            }
        }
    }
}

struct ErrnoProtector(c_int);

impl ErrnoProtector {
    fn new() -> Self {
        Self(errno())
    }
}

impl Drop for ErrnoProtector {
    fn drop(&mut self) {
        set_errno(self.0);
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "android"))] {
        fn errno() -> c_int {
            unsafe { *libc::__errno_location() }
        }

        fn set_errno(value: c_int) {
            unsafe { *libc::__errno_location() = value }
        }
    } else if #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))] {
        fn errno() -> c_int {
            unsafe { *libc::__error() }
        }

        fn set_errno(value: c_int) {
            unsafe { *libc::__error() = value }
        }
    } else {
        fn errno() -> c_int {
            0
        }

        fn set_errno(_: c_int) {}
    }
}

// Only async-signal-safe calls in here.
extern "C" fn interrupt_handler(_signal: c_int) {
    let _errno = ErrnoProtector::new();

    let fd = WRITE_FD.load(Ordering::SeqCst);
    if fd >= 0 {
        let byte = 1u8;
        unsafe { libc::write(fd, &byte as *const u8 as *const libc::c_void, 1) };
    }
}

fn dispatcher() -> Result<()> {
    DISPATCHER.get_or_try_init(|| -> Result<UnixStream> {
        let (reader, writer) = UnixStream::pair()?;
        writer.set_nonblocking(true)?;
        threads::spawn("pprof-session-signal", move || dispatch(reader))?;
        WRITE_FD.store(writer.as_raw_fd(), Ordering::SeqCst);
        Ok(writer)
    })?;
    Ok(())
}

fn dispatch(mut reader: UnixStream) {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                log::error!("interrupt dispatcher stopped: {}", err);
                return;
            }
        }

        let mut hooks = HOOKS.lock();
        let subscribers = std::mem::take(&mut hooks.subscribers);
        hooks.release();
        drop(hooks);

        if subscribers.is_empty() {
            // Raced with the last unsubscribe: behave as if we were never
            // installed.
            if let Err(err) = signal::raise(Signal::SIGINT) {
                log::warn!("cannot re-raise SIGINT: {}", err);
            }
            continue;
        }
        for (_, subscriber) in subscribers {
            let _ = subscriber.send(Signal::SIGINT);
        }
    }
}

/// A one-shot interrupt watcher. Dropping it cancels the watch.
pub(crate) struct ShutdownHook {
    id: u64,
}

impl ShutdownHook {
    /// Runs `on_interrupt` on a background thread when the first SIGINT
    /// arrives.
    pub(crate) fn install<F>(on_interrupt: F) -> Result<Self>
    where
        F: FnOnce(Signal) + Send + 'static,
    {
        dispatcher()?;

        let (sender, receiver) = mpsc::channel();
        threads::spawn("pprof-session-shutdown", move || {
            if let Ok(signal) = receiver.recv() {
                on_interrupt(signal);
            }
        })?;

        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let mut hooks = HOOKS.lock();
        hooks.catch()?;
        hooks.subscribers.push((id, sender));

        Ok(ShutdownHook { id })
    }
}

impl Drop for ShutdownHook {
    fn drop(&mut self) {
        let mut hooks = HOOKS.lock();
        hooks.subscribers.retain(|(id, _)| *id != self.id);
        if hooks.subscribers.is_empty() {
            hooks.release();
        }
    }
}
