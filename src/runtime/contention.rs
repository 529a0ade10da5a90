// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Blocking and mutex contention sampling.
//!
//! Code that waits reports the wait through [`block_event`] or
//! [`mutex_event`]. Whether the event is kept depends on the process-wide
//! rate knobs, which are zero (disabled) until a session turns them on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use once_cell::sync::Lazy;
use pprof::protos;
use spin::Mutex;

use super::proto::ProfileBuilder;
use super::{capture_stack, tracer, Stack};

static BLOCK_PROFILE_RATE: AtomicI64 = AtomicI64::new(0);
static MUTEX_PROFILE_FRACTION: AtomicI64 = AtomicI64::new(0);

static BLOCK_TICK: AtomicU64 = AtomicU64::new(0);
static MUTEX_TICK: AtomicU64 = AtomicU64::new(0);

static BLOCK: Lazy<Mutex<HashMap<Stack, Bucket>>> = Lazy::new(|| Mutex::new(HashMap::new()));
static MUTEX: Lazy<Mutex<HashMap<Stack, Bucket>>> = Lazy::new(|| Mutex::new(HashMap::new()));

#[derive(Clone, Default)]
struct Bucket {
    count: i64,
    delay: i64,
}

/// Aims to sample one blocking event per `rate` nanoseconds spent blocked.
/// A rate of 1 keeps every event, zero or less disables sampling.
pub fn set_block_profile_rate(rate: i64) {
    BLOCK_PROFILE_RATE.store(rate.max(0), Ordering::Relaxed);
}

pub fn block_profile_rate() -> i64 {
    BLOCK_PROFILE_RATE.load(Ordering::Relaxed)
}

/// Keeps one in `fraction` mutex contention events; zero disables sampling.
/// A negative fraction only reads the current value. Returns the previous
/// fraction.
pub fn set_mutex_profile_fraction(fraction: i64) -> i64 {
    if fraction < 0 {
        return MUTEX_PROFILE_FRACTION.load(Ordering::Relaxed);
    }
    MUTEX_PROFILE_FRACTION.swap(fraction, Ordering::Relaxed)
}

fn nanos(delay: Duration) -> i64 {
    delay.as_nanos().min(i64::MAX as u128) as i64
}

/// Reports that the calling thread was blocked for `delay`.
pub fn block_event(delay: Duration) {
    let delay = nanos(delay);
    tracer::event("block", format_args!("{}ns", delay));

    let rate = block_profile_rate();
    if rate <= 0 {
        return;
    }
    if delay < rate {
        let every = (rate / delay.max(1)) as u64;
        if BLOCK_TICK.fetch_add(1, Ordering::Relaxed) % every != 0 {
            return;
        }
    }
    record(&BLOCK, delay);
}

/// Reports that a mutex was contended, making its waiters wait `delay`.
pub fn mutex_event(delay: Duration) {
    let delay = nanos(delay);
    tracer::event("mutex", format_args!("{}ns", delay));

    let fraction = MUTEX_PROFILE_FRACTION.load(Ordering::Relaxed);
    if fraction <= 0 {
        return;
    }
    if MUTEX_TICK.fetch_add(1, Ordering::Relaxed) % fraction as u64 != 0 {
        return;
    }
    record(&MUTEX, delay);
}

fn record(store: &Mutex<HashMap<Stack, Bucket>>, delay: i64) {
    let stack = capture_stack();
    let mut store = store.lock();
    let bucket = store.entry(stack).or_default();
    bucket.count += 1;
    bucket.delay += delay;
}

fn build(store: &Mutex<HashMap<Stack, Bucket>>) -> protos::Profile {
    let buckets: Vec<(Stack, Bucket)> = store
        .lock()
        .iter()
        .map(|(stack, bucket)| (stack.clone(), bucket.clone()))
        .collect();

    let mut builder = ProfileBuilder::new(&[("contentions", "count"), ("delay", "nanoseconds")])
        .period(("contentions", "count"), 1);
    for (stack, bucket) in buckets {
        builder.add_sample(&stack, vec![bucket.count, bucket.delay]);
    }
    builder.build()
}

pub fn block_profile() -> protos::Profile {
    build(&BLOCK)
}

pub fn mutex_profile() -> protos::Profile {
    build(&MUTEX)
}
