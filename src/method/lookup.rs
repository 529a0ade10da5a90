// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::path::PathBuf;

use clap::{ArgMatches, Command};

use super::{apply_file, file_arg, is_set, Method};
use crate::runtime;
use crate::Result;

/// A snapshot profile looked up by name and written when the method stops.
pub struct Lookup {
    name: &'static str,
    flag: &'static str,
    help: &'static str,
    filename: PathBuf,
}

impl Lookup {
    /// Live threads, grouped by name.
    pub fn goroutine() -> Self {
        Lookup {
            name: "goroutine",
            flag: "goroutineprofile",
            help: "write a live thread profile to file",
            filename: PathBuf::from("goroutine.pprof"),
        }
    }

    /// Creation stacks of threads started through the runtime.
    pub fn threadcreate() -> Self {
        Lookup {
            name: "threadcreate",
            flag: "threadcreateprofile",
            help: "write a thread creation profile to file",
            filename: PathBuf::from("threadcreate.pprof"),
        }
    }

    pub fn with_filename<P: Into<PathBuf>>(mut self, filename: P) -> Self {
        self.filename = filename.into();
        self
    }
}

impl Method for Lookup {
    fn name(&self) -> &'static str {
        self.name
    }

    fn register_flags(&mut self, cmd: Command) -> Command {
        self.filename = PathBuf::new();
        cmd.arg(file_arg(self.flag, self.help))
    }

    fn apply_flags(&mut self, matches: &ArgMatches) {
        apply_file(matches, self.flag, &mut self.filename);
    }

    fn enabled(&self) -> bool {
        is_set(&self.filename)
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        runtime::write_profile(self.name, &self.filename)
    }
}
