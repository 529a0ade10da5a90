// Copyright 2020 TiKV Project Authors. Licensed under Apache-2.0.

//! Profiling criterion benchmarks with any set of methods.

use std::path::Path;

use criterion::profiler::Profiler;
use log::Level;

use crate::method::Cpu;
use crate::runner::Runner;

type Factory = Box<dyn FnMut(&Path) -> Runner>;

/// A criterion [`Profiler`] that runs a session for every profiled benchmark.
///
/// The factory receives the benchmark directory and returns the methods to
/// run; their profiles should be written somewhere under that directory.
pub struct SessionProfiler {
    factory: Factory,
    active: Option<Runner>,
}

impl SessionProfiler {
    pub fn new<F>(factory: F) -> Self
    where
        F: FnMut(&Path) -> Runner + 'static,
    {
        Self {
            factory: Box::new(factory),
            active: None,
        }
    }

    /// Writes `cpu.pprof` into each benchmark directory.
    pub fn cpu() -> Self {
        Self::new(Self::cpu_runner)
    }

    fn cpu_runner(dir: &Path) -> Runner {
        Runner::new(vec![Box::new(Cpu::new(dir.join("cpu.pprof")))])
    }
}

impl Profiler for SessionProfiler {
    fn start_profiling(&mut self, benchmark_id: &str, benchmark_dir: &Path) {
        let mut runner = (self.factory)(benchmark_dir);
        if let Err(err) = std::fs::create_dir_all(benchmark_dir) {
            runner.log(
                Level::Warn,
                format_args!("{}: cannot create {}: {}", benchmark_id, benchmark_dir.display(), err),
            );
            return;
        }

        runner.start();
        self.active = Some(runner);
    }

    fn stop_profiling(&mut self, _benchmark_id: &str, _benchmark_dir: &Path) {
        if let Some(mut runner) = self.active.take() {
            runner.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_land_in_the_benchmark_directory() {
        let _lock = crate::test_lock();
        let dir = tempfile::tempdir().unwrap();
        let bench_dir = dir.path().join("group").join("bench");

        let mut profiler = SessionProfiler::new(|dir| {
            let mut runner = SessionProfiler::cpu_runner(dir);
            runner.logger = crate::discard();
            runner
        });
        profiler.start_profiling("group/bench", &bench_dir);
        assert!(profiler.active.is_some());
        profiler.stop_profiling("group/bench", &bench_dir);
        assert!(profiler.active.is_none());

        assert!(bench_dir.join("cpu.pprof").is_file());
    }
}
