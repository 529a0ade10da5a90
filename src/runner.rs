// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::ffi::OsStr;
use std::fmt;
use std::sync::Arc;

use clap::{ArgMatches, Command};
use log::{Level, Log};

use crate::config;
use crate::logger;
use crate::method::Method;
use crate::Result;

/// Drives a list of methods. [`Profile`](crate::Profile) adds defaults,
/// environment configuration and the interrupt hook on top of it.
///
/// Methods can only be appended, so the running set stays valid while the
/// runner is started. Dropping a runner stops it.
pub struct Runner {
    pub logger: Arc<dyn Log>,

    methods: Vec<Box<dyn Method>>,
    running: Vec<usize>,
}

impl Default for Runner {
    fn default() -> Self {
        Runner::new(Vec::new())
    }
}

impl Runner {
    pub fn new(methods: Vec<Box<dyn Method>>) -> Self {
        Runner {
            methods,
            logger: logger::global(),
            running: Vec::new(),
        }
    }

    /// Appends a method. It takes part in the next `start`.
    pub fn add<M: Method + 'static>(&mut self, method: M) {
        self.methods.push(Box::new(method));
    }

    pub fn methods(&self) -> &[Box<dyn Method>] {
        &self.methods
    }

    pub fn register_flags(&mut self, mut cmd: Command) -> Command {
        for method in self.methods.iter_mut() {
            cmd = method.register_flags(cmd);
        }
        cmd
    }

    pub fn apply_flags(&mut self, matches: &ArgMatches) {
        for method in self.methods.iter_mut() {
            method.apply_flags(matches);
        }
    }

    /// Configures the methods from a `key=value,...` string.
    pub fn parse_config(&mut self, cfg: &str) -> Result<()> {
        config::parse(&mut self.methods, cfg)
    }

    pub(crate) fn parse_config_os(&mut self, cfg: &OsStr) -> Result<()> {
        config::parse_os(&mut self.methods, cfg)
    }

    /// Starts every enabled method. A method that fails to start is logged
    /// and skipped.
    pub fn start(&mut self) {
        for (index, method) in self.methods.iter_mut().enumerate() {
            if !method.enabled() {
                continue;
            }

            if let Err(err) = method.start() {
                logger::emit(
                    self.logger.as_ref(),
                    Level::Warn,
                    format_args!("{} profile: error starting: {}", method.name(), err),
                );
                continue;
            }

            logger::emit(
                self.logger.as_ref(),
                Level::Info,
                format_args!("{} profile: started", method.name()),
            );
            self.running.push(index);
        }
    }

    /// Stops the running methods in the order they started. Failures are
    /// logged; the running set is always cleared.
    pub fn stop(&mut self) {
        for index in std::mem::take(&mut self.running) {
            let method = &mut self.methods[index];
            match method.stop() {
                Ok(()) => logger::emit(
                    self.logger.as_ref(),
                    Level::Info,
                    format_args!("{} profile: stopped", method.name()),
                ),
                Err(err) => logger::emit(
                    self.logger.as_ref(),
                    Level::Warn,
                    format_args!("{} profile: error stopping: {}", method.name(), err),
                ),
            }
        }
    }

    /// Names of the running methods, in start order.
    pub fn running(&self) -> Vec<&'static str> {
        self.running
            .iter()
            .map(|index| self.methods[*index].name())
            .collect()
    }

    pub(crate) fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        logger::emit(self.logger.as_ref(), level, args);
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop();
    }
}
