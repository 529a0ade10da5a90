// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use std::alloc::System;

use pprof_session::runtime::heap;
use pprof_session::AllocRecorder;

#[global_allocator]
static ALLOC: AllocRecorder<System> = AllocRecorder::new(System);

#[test]
fn recorder_feeds_the_allocs_profile() {
    heap::set_mem_profile_rate(1);

    let mut kept = Vec::new();
    for i in 0..64 {
        kept.push(vec![i as u8; 1024]);
    }

    heap::set_mem_profile_rate(heap::DEFAULT_MEM_PROFILE_RATE);
    heap::materialize();

    let profile = heap::profile();
    assert!(!profile.sample.is_empty());
    assert!(profile.sample.iter().all(|sample| !sample.location_id.is_empty()));
    assert_eq!(kept.len(), 64);
}
