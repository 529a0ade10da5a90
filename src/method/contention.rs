// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::path::PathBuf;

use clap::{ArgMatches, Command};

use super::{apply_file, apply_rate, file_arg, is_set, rate_arg, Knob, Method};
use crate::runtime::{self, contention};
use crate::Result;

static BLOCK_RATE: Knob = Knob::new("block profiling");
static MUTEX_FRACTION: Knob = Knob::new("mutex profiling");

/// Blocking profile. Turns block sampling on at `rate` while running and off
/// again on stop.
pub struct Block {
    filename: PathBuf,
    rate: i64,
}

impl Block {
    pub fn new<P: Into<PathBuf>>(filename: P, rate: i64) -> Self {
        Block {
            filename: filename.into(),
            rate,
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::new("block.pprof", 1)
    }
}

impl Method for Block {
    fn name(&self) -> &'static str {
        "block"
    }

    fn register_flags(&mut self, cmd: Command) -> Command {
        self.filename = PathBuf::new();
        self.rate = 1;
        cmd.arg(file_arg(
            "blockprofile",
            "write a thread blocking profile to file",
        ))
        .arg(rate_arg(
            "blockprofilerate",
            "rate",
            "1",
            "set blocking profile rate in nanoseconds blocked per sample",
        ))
    }

    fn apply_flags(&mut self, matches: &ArgMatches) {
        apply_file(matches, "blockprofile", &mut self.filename);
        apply_rate(matches, "blockprofilerate", &mut self.rate);
    }

    fn enabled(&self) -> bool {
        is_set(&self.filename) && self.rate > 0
    }

    fn start(&mut self) -> Result<()> {
        BLOCK_RATE.acquire()?;
        contention::set_block_profile_rate(self.rate);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let result = runtime::write_profile("block", &self.filename);
        contention::set_block_profile_rate(0);
        BLOCK_RATE.release();
        result
    }
}

/// Mutex contention profile, sampling one in `fraction` events while running.
pub struct Mutex {
    filename: PathBuf,
    fraction: i64,
}

impl Mutex {
    pub fn new<P: Into<PathBuf>>(filename: P, fraction: i64) -> Self {
        Mutex {
            filename: filename.into(),
            fraction,
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Mutex::new("mutex.pprof", 1)
    }
}

impl Method for Mutex {
    fn name(&self) -> &'static str {
        "mutex"
    }

    fn register_flags(&mut self, cmd: Command) -> Command {
        self.filename = PathBuf::new();
        self.fraction = 1;
        cmd.arg(file_arg(
            "mutexprofile",
            "write a mutex contention profile to the named file after execution",
        ))
        .arg(rate_arg(
            "mutexprofilefraction",
            "n",
            "1",
            "sample one in n mutex contention events",
        ))
    }

    fn apply_flags(&mut self, matches: &ArgMatches) {
        apply_file(matches, "mutexprofile", &mut self.filename);
        apply_rate(matches, "mutexprofilefraction", &mut self.fraction);
    }

    fn enabled(&self) -> bool {
        is_set(&self.filename) && self.fraction > 0
    }

    fn start(&mut self) -> Result<()> {
        MUTEX_FRACTION.acquire()?;
        contention::set_mutex_profile_fraction(self.fraction);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let result = runtime::write_profile("mutex", &self.filename);
        contention::set_mutex_profile_fraction(0);
        MUTEX_FRACTION.release();
        result
    }
}
