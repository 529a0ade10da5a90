// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Try `PROFILE=cpuprofile=cpu.pprof,memprofile=mem.pprof cargo run --example env`,
//! or `PROFILE=help` for the list of keys.

use pprof_session::{all_profiles, config_env_var, Profile};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let n: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1_000_000);

    let _profile = Profile::new()
        .with(all_profiles)
        .with(config_env_var("PROFILE"))
        .start();

    let sum: u64 = (1..=n).sum();
    log::info!("sum: {}", sum);
}
