// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use pprof_session::{cpu_profile, mem_profile};

fn main() {
    env_logger::init();

    let _profile = pprof_session::start([cpu_profile, mem_profile]);

    let mut v: Vec<u64> = Vec::new();
    for i in 0..1_000_000 {
        v.push(i * i);
    }
    println!("{}", v.iter().sum::<u64>());
}
