// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Execution tracing.
//!
//! While a tracer is active, thread creation, contention events and user
//! annotations are appended to its sink, one event per line:
//! `<nanos since start> <thread id> <kind> <detail>`.

use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime};

use parking_lot::Mutex;

use crate::{Error, Result};

pub const TRACE_HEADER: &str = "pprof-session trace v1";

static ENABLED: AtomicBool = AtomicBool::new(false);
static TRACER: Mutex<Option<Tracer>> = parking_lot::const_mutex(None);

struct Tracer {
    out: Box<dyn Write + Send>,
    started: Instant,
}

/// Starts tracing into `out`. Only one tracer may be active per process.
pub fn start<W: Write + Send + 'static>(out: W) -> Result<()> {
    let mut tracer = TRACER.lock();
    if tracer.is_some() {
        return Err(Error::Active("execution tracing"));
    }

    let mut out: Box<dyn Write + Send> = Box::new(out);
    let unix_nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    writeln!(out, "{} {}", TRACE_HEADER, unix_nanos)?;

    *tracer = Some(Tracer {
        out,
        started: Instant::now(),
    });
    ENABLED.store(true, Ordering::SeqCst);

    Ok(())
}

/// Stops tracing and flushes the sink.
pub fn stop() -> Result<()> {
    let tracer = TRACER.lock().take();
    ENABLED.store(false, Ordering::SeqCst);

    let mut tracer = tracer.ok_or(Error::NotRunning("trace"))?;
    tracer.out.flush()?;

    Ok(())
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

pub(crate) fn event(kind: &str, detail: fmt::Arguments<'_>) {
    if !is_enabled() {
        return;
    }

    let mut tracer = TRACER.lock();
    if let Some(tracer) = tracer.as_mut() {
        let elapsed = tracer.started.elapsed().as_nanos();
        let thread = unsafe { libc::pthread_self() } as u64;
        if let Err(err) = writeln!(tracer.out, "{} {} {} {}", elapsed, thread, kind, detail) {
            log::warn!("dropping trace event: {}", err);
        }
    }
}

/// Records a user annotation.
pub fn log(category: &str, message: &str) {
    event("log", format_args!("{} {}", category, message));
}

/// Marks a region of execution; the region ends when the guard is dropped.
pub fn region(name: &str) -> Region {
    event("region-begin", format_args!("{}", name));
    Region {
        name: name.to_owned(),
    }
}

pub struct Region {
    name: String,
}

impl Drop for Region {
    fn drop(&mut self) {
        event("region-end", format_args!("{}", self.name));
    }
}
