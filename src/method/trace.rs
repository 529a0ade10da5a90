// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use clap::{ArgMatches, Command};

use super::{apply_file, file_arg, is_set, Method};
use crate::runtime::tracer;
use crate::Result;

/// Execution tracing into a file.
pub struct Trace {
    filename: PathBuf,
}

impl Trace {
    pub fn new<P: Into<PathBuf>>(filename: P) -> Self {
        Trace {
            filename: filename.into(),
        }
    }
}

impl Default for Trace {
    fn default() -> Self {
        Trace::new("trace.out")
    }
}

impl Method for Trace {
    fn name(&self) -> &'static str {
        "trace"
    }

    fn register_flags(&mut self, cmd: Command) -> Command {
        self.filename = PathBuf::new();
        cmd.arg(file_arg("trace", "write an execution trace to file"))
    }

    fn apply_flags(&mut self, matches: &ArgMatches) {
        apply_file(matches, "trace", &mut self.filename);
    }

    fn enabled(&self) -> bool {
        is_set(&self.filename)
    }

    fn start(&mut self) -> Result<()> {
        let file = File::create(&self.filename)?;
        tracer::start(BufWriter::new(file))
    }

    fn stop(&mut self) -> Result<()> {
        tracer::stop()
    }
}
