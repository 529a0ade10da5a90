// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! The profiling subsystem the session methods drive.
//!
//! Every category exposes two narrow operations: begin/end sampling (process
//! wide rates, the cpu sampler, the tracer) and serialization of what has
//! been collected. Lookup categories are serialized by name through
//! [`write_profile`].

use std::cell::Cell;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use pprof::protos::{self, Message};
use smallvec::SmallVec;

use crate::{Error, Result};

pub mod contention;
pub mod heap;
mod proto;
pub mod threads;
pub mod tracer;

pub const MAX_DEPTH: usize = 32;

pub(crate) type Stack = SmallVec<[usize; MAX_DEPTH]>;

/// Names accepted by [`lookup`] and [`write_profile`].
pub const PROFILE_NAMES: [&str; 5] = ["allocs", "block", "goroutine", "mutex", "threadcreate"];

thread_local! {
    static SUPPRESSED: Cell<bool> = const { Cell::new(false) };
}

/// While alive, allocations made by the current thread are not sampled.
/// Held by everything that allocates while touching a sample store.
pub(crate) struct Suppress {
    _private: (),
}

impl Drop for Suppress {
    fn drop(&mut self) {
        let _ = SUPPRESSED.try_with(|suppressed| suppressed.set(false));
    }
}

/// Returns `None` if the current thread is already suppressed (or is being
/// torn down), in which case nothing must be recorded.
pub(crate) fn suppress() -> Option<Suppress> {
    match SUPPRESSED.try_with(|suppressed| suppressed.replace(true)) {
        Ok(false) => Some(Suppress { _private: () }),
        _ => None,
    }
}

pub(crate) fn capture_stack() -> Stack {
    let mut stack = Stack::new();
    backtrace::trace(|frame| {
        stack.push(frame.ip() as usize);
        stack.len() < MAX_DEPTH
    });
    stack
}

/// Finds the serializer of a named profile.
pub fn lookup(name: &str) -> Option<fn() -> protos::Profile> {
    let build: fn() -> protos::Profile = match name {
        "allocs" => heap::profile,
        "block" => contention::block_profile,
        "goroutine" => threads::goroutine_profile,
        "mutex" => contention::mutex_profile,
        "threadcreate" => threads::threadcreate_profile,
        _ => return None,
    };
    Some(build)
}

/// Serializes the named profile into `path` as an encoded pprof protobuf.
pub fn write_profile<P: AsRef<Path>>(name: &str, path: P) -> Result<()> {
    let build = lookup(name).ok_or_else(|| Error::UnknownProfile(name.to_owned()))?;

    let content = {
        let _suppress = suppress();
        build().encode_to_vec()
    };

    let mut file = File::create(path)?;
    file.write_all(&content)?;
    file.sync_all()?;

    Ok(())
}
