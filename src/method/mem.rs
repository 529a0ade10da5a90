// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

use std::path::PathBuf;

use clap::{ArgMatches, Command};

use super::{apply_file, apply_rate, file_arg, is_set, rate_arg, Knob, Method};
use crate::runtime::{self, heap};
use crate::{Error, Result};

static MEM_RATE: Knob = Knob::new("memory profiling");

/// Allocation profiling. Samples only exist when the host installed
/// [`AllocRecorder`](crate::AllocRecorder) as its global allocator.
pub struct Mem {
    filename: PathBuf,
    rate: i64,
    previous_rate: Option<usize>,
}

impl Mem {
    pub fn new<P: Into<PathBuf>>(filename: P) -> Self {
        Mem {
            filename: filename.into(),
            rate: 0,
            previous_rate: None,
        }
    }

    /// Overrides the sampling rate while this method runs. Zero or less keeps
    /// the current rate.
    pub fn with_rate(mut self, rate: i64) -> Self {
        self.rate = rate;
        self
    }
}

impl Default for Mem {
    fn default() -> Self {
        Mem::new("mem.pprof")
    }
}

impl Method for Mem {
    fn name(&self) -> &'static str {
        "mem"
    }

    fn register_flags(&mut self, cmd: Command) -> Command {
        self.filename = PathBuf::new();
        self.rate = 0;
        cmd.arg(file_arg(
            "memprofile",
            "write an allocation profile to file",
        ))
        .arg(rate_arg(
            "memprofilerate",
            "rate",
            "0",
            "set memory allocation profiling rate in bytes (0 keeps the runtime default)",
        ))
    }

    fn apply_flags(&mut self, matches: &ArgMatches) {
        apply_file(matches, "memprofile", &mut self.filename);
        apply_rate(matches, "memprofilerate", &mut self.rate);
    }

    fn enabled(&self) -> bool {
        is_set(&self.filename)
    }

    fn start(&mut self) -> Result<()> {
        MEM_RATE.acquire()?;
        self.previous_rate = Some(heap::mem_profile_rate());
        if self.rate > 0 {
            heap::set_mem_profile_rate(self.rate as usize);
        }

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let previous_rate = self.previous_rate.take().ok_or(Error::NotRunning("mem"))?;

        heap::materialize();
        let result = runtime::write_profile("allocs", &self.filename);

        heap::set_mem_profile_rate(previous_rate);
        MEM_RATE.release();

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_restored_on_stop() {
        let _lock = crate::test_lock();
        let dir = tempfile::tempdir().unwrap();
        let original = heap::mem_profile_rate();

        let mut mem = Mem::new(dir.path().join("mem.pprof")).with_rate(4096);
        mem.start().unwrap();
        assert_eq!(heap::mem_profile_rate(), 4096);
        mem.stop().unwrap();

        assert_eq!(heap::mem_profile_rate(), original);
        assert!(std::fs::metadata(dir.path().join("mem.pprof")).unwrap().len() > 0);
    }

    #[test]
    fn rate_restored_even_when_writing_fails() {
        let _lock = crate::test_lock();
        let dir = tempfile::tempdir().unwrap();
        let original = heap::mem_profile_rate();

        let mut mem = Mem::new(dir.path().join("missing").join("mem.pprof")).with_rate(1);
        mem.start().unwrap();
        assert!(mem.stop().is_err());
        assert_eq!(heap::mem_profile_rate(), original);
    }

    #[test]
    fn one_rate_owner_at_a_time() {
        let _lock = crate::test_lock();
        let dir = tempfile::tempdir().unwrap();

        let mut first = Mem::new(dir.path().join("first.pprof")).with_rate(2048);
        let mut second = Mem::new(dir.path().join("second.pprof")).with_rate(1);

        first.start().unwrap();
        assert!(matches!(second.start(), Err(Error::Active("memory profiling"))));
        assert_eq!(heap::mem_profile_rate(), 2048);
        first.stop().unwrap();

        second.start().unwrap();
        second.stop().unwrap();
    }
}
