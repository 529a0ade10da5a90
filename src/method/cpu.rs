// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fs::File;
use std::io::Write;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

use clap::{ArgMatches, Command};
use pprof::protos::Message;
use pprof::{ProfilerGuard, Report};

use super::{apply_file, file_arg, is_set, Method};
use crate::{Error, Result};

/// Sampling frequency of the cpu profiler, in Hz.
pub const CPU_PROFILE_FREQUENCY: c_int = 100;

/// CPU profiling through the `pprof` sampler.
pub struct Cpu {
    filename: PathBuf,
    active: Option<(ProfilerGuard<'static>, File)>,
}

impl Cpu {
    pub fn new<P: Into<PathBuf>>(filename: P) -> Self {
        Cpu {
            filename: filename.into(),
            active: None,
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new("cpu.pprof")
    }
}

impl Method for Cpu {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn register_flags(&mut self, cmd: Command) -> Command {
        self.filename = PathBuf::new();
        cmd.arg(file_arg("cpuprofile", "write a cpu profile to file"))
    }

    fn apply_flags(&mut self, matches: &ArgMatches) {
        apply_file(matches, "cpuprofile", &mut self.filename);
    }

    fn enabled(&self) -> bool {
        is_set(&self.filename)
    }

    fn start(&mut self) -> Result<()> {
        let file = File::create(&self.filename)?;
        // The file is dropped, and so closed, if the sampler refuses to start.
        let guard = ProfilerGuard::new(CPU_PROFILE_FREQUENCY)?;
        self.active = Some((guard, file));

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let (guard, mut file) = self.active.take().ok_or(Error::NotRunning("cpu"))?;

        let report = guard.report().build();
        drop(guard);

        write_report(&report?, &self.filename, &mut file)?;
        file.sync_all()?;

        Ok(())
    }
}

#[cfg(feature = "flamegraph")]
fn write_report(report: &Report, filename: &Path, file: &mut File) -> Result<()> {
    if filename.extension().map_or(false, |ext| ext == "svg") {
        report.flamegraph(file)?;
        return Ok(());
    }
    file.write_all(&report.pprof()?.encode_to_vec())?;
    Ok(())
}

#[cfg(not(feature = "flamegraph"))]
fn write_report(report: &Report, _filename: &Path, file: &mut File) -> Result<()> {
    file.write_all(&report.pprof()?.encode_to_vec())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_sampler_is_refused() {
        let _lock = crate::test_lock();
        let dir = tempfile::tempdir().unwrap();

        let mut first = Cpu::new(dir.path().join("first.pprof"));
        let mut second = Cpu::new(dir.path().join("second.pprof"));

        first.start().unwrap();
        assert!(second.start().is_err());
        first.stop().unwrap();

        assert!(std::fs::metadata(dir.path().join("first.pprof")).unwrap().len() > 0);
        assert!(matches!(second.stop(), Err(Error::NotRunning("cpu"))));
    }
}
