// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

//! Allocation sampling.
//!
//! Install [`AllocRecorder`] as the global allocator to feed the `allocs`
//! profile. Samples taken inside the allocator go to a fixed-size pending
//! buffer so that recording never allocates; [`materialize`] folds them into
//! the published profile.

use std::alloc::{GlobalAlloc, Layout};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;
use pprof::protos;
use spin::Mutex;

use super::proto::ProfileBuilder;
use super::{suppress, Stack, MAX_DEPTH};

/// One sample on average per this many allocated bytes.
pub const DEFAULT_MEM_PROFILE_RATE: usize = 512 * 1024;

const PENDING_CAPACITY: usize = 256;

static MEM_PROFILE_RATE: AtomicUsize = AtomicUsize::new(DEFAULT_MEM_PROFILE_RATE);
static ALLOCATED: AtomicUsize = AtomicUsize::new(0);

static PENDING: Mutex<Pending> = Mutex::new(Pending::new());
static PUBLISHED: Lazy<Mutex<HashMap<Stack, Bucket>>> = Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Clone, Copy)]
struct PendingSample {
    depth: usize,
    size: usize,
    ips: [usize; MAX_DEPTH],
}

impl PendingSample {
    const EMPTY: PendingSample = PendingSample {
        depth: 0,
        size: 0,
        ips: [0; MAX_DEPTH],
    };
}

struct Pending {
    len: usize,
    dropped: usize,
    samples: [PendingSample; PENDING_CAPACITY],
}

impl Pending {
    const fn new() -> Self {
        Pending {
            len: 0,
            dropped: 0,
            samples: [PendingSample::EMPTY; PENDING_CAPACITY],
        }
    }
}

#[derive(Default)]
struct Bucket {
    count: i64,
    bytes: i64,
}

/// Current sampling rate in bytes. Zero means allocations are not sampled.
pub fn mem_profile_rate() -> usize {
    MEM_PROFILE_RATE.load(Ordering::Relaxed)
}

pub fn set_mem_profile_rate(rate: usize) {
    MEM_PROFILE_RATE.store(rate, Ordering::Relaxed);
}

pub(crate) fn record_allocation(size: usize) {
    let rate = mem_profile_rate();
    if rate == 0 {
        return;
    }

    let before = ALLOCATED.fetch_add(size, Ordering::Relaxed);
    let after = before.wrapping_add(size);
    if before / rate == after / rate {
        return;
    }

    let _suppress = match suppress() {
        Some(guard) => guard,
        None => return,
    };

    let mut sample = PendingSample::EMPTY;
    sample.size = size;
    // SAFETY: the unsynchronized tracer is required here because the
    // synchronized one may allocate; reentrant allocations are suppressed.
    unsafe {
        backtrace::trace_unsynchronized(|frame| {
            if sample.depth < MAX_DEPTH {
                sample.ips[sample.depth] = frame.ip() as usize;
                sample.depth += 1;
                true
            } else {
                false
            }
        });
    }

    let mut pending = PENDING.lock();
    if pending.len < PENDING_CAPACITY {
        let index = pending.len;
        pending.samples[index] = sample;
        pending.len += 1;
    } else {
        pending.dropped += 1;
    }
}

/// Moves pending allocation samples into the published profile.
pub fn materialize() {
    let _suppress = suppress();

    let (samples, dropped) = {
        let mut pending = PENDING.lock();
        let samples = pending.samples[..pending.len].to_vec();
        let dropped = pending.dropped;
        pending.len = 0;
        pending.dropped = 0;
        (samples, dropped)
    };
    if dropped > 0 {
        log::debug!("{} allocation samples dropped, pending buffer full", dropped);
    }

    let mut published = PUBLISHED.lock();
    for sample in samples {
        let stack = Stack::from_slice(&sample.ips[..sample.depth]);
        let bucket = published.entry(stack).or_default();
        bucket.count += 1;
        bucket.bytes += sample.size as i64;
    }
}

/// Builds the `allocs` profile from materialized samples.
pub fn profile() -> protos::Profile {
    let _suppress = suppress();

    let mut builder = ProfileBuilder::new(&[("alloc_objects", "count"), ("alloc_space", "bytes")])
        .period(("space", "bytes"), mem_profile_rate() as i64);

    let published = PUBLISHED.lock();
    for (stack, bucket) in published.iter() {
        builder.add_sample(stack, vec![bucket.count, bucket.bytes]);
    }
    drop(published);

    builder.build()
}

/// A global allocator wrapper that samples allocations at the current
/// [`mem_profile_rate`].
///
/// ```ignore
/// #[global_allocator]
/// static ALLOC: pprof_session::AllocRecorder<std::alloc::System> =
///     pprof_session::AllocRecorder::new(std::alloc::System);
/// ```
pub struct AllocRecorder<T: GlobalAlloc> {
    inner: T,
}

impl<T: GlobalAlloc> AllocRecorder<T> {
    pub const fn new(inner: T) -> AllocRecorder<T> {
        AllocRecorder { inner }
    }
}

unsafe impl<T: GlobalAlloc> GlobalAlloc for AllocRecorder<T> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc(layout);
        if !ptr.is_null() {
            record_allocation(layout.size());
        }
        ptr
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let ptr = self.inner.alloc_zeroed(layout);
        if !ptr.is_null() {
            record_allocation(layout.size());
        }
        ptr
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let new_ptr = self.inner.realloc(ptr, layout, new_size);
        if !new_ptr.is_null() {
            record_allocation(new_size);
        }
        new_ptr
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.inner.dealloc(ptr, layout);
    }
}
