// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Profiling methods: one per category, all driven through [`Method`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{value_parser, Arg, ArgAction, ArgMatches};

use crate::{Error, Result};

mod contention;
mod cpu;
mod lookup;
mod mem;
mod trace;

pub use contention::{Block, Mutex};
pub use cpu::{Cpu, CPU_PROFILE_FREQUENCY};
pub use lookup::Lookup;
pub use mem::Mem;
pub use trace::Trace;

/// A unit of instrumentation a session can drive.
///
/// A method is configured through flags (or the environment string, which is
/// parsed as flags), and is only started when [`Method::enabled`] holds at
/// start time. `stop` is called at most once per successful `start`.
pub trait Method: Send {
    /// Category name, used in log lines and as the flag prefix.
    fn name(&self) -> &'static str;

    /// Declares this method's flags on `cmd` and resets the bound fields to
    /// the flag defaults. Registering twice on the same command is a
    /// configuration error reported by clap.
    fn register_flags(&mut self, cmd: clap::Command) -> clap::Command;

    /// Copies parsed values of this method's flags into it.
    fn apply_flags(&mut self, matches: &ArgMatches);

    fn enabled(&self) -> bool;

    /// Begins sampling. On error nothing is left open.
    fn start(&mut self) -> Result<()>;

    /// Ends sampling and writes the profile.
    fn stop(&mut self) -> Result<()>;
}

pub(crate) fn file_arg(id: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .value_name("file")
        .help(help)
        .action(ArgAction::Set)
        .value_parser(value_parser!(PathBuf))
}

pub(crate) fn rate_arg(
    id: &'static str,
    value_name: &'static str,
    default: &'static str,
    help: &'static str,
) -> Arg {
    Arg::new(id)
        .long(id)
        .value_name(value_name)
        .help(help)
        .action(ArgAction::Set)
        .default_value(default)
        .allow_negative_numbers(true)
        .value_parser(value_parser!(i64))
}

pub(crate) fn apply_file(matches: &ArgMatches, id: &str, filename: &mut PathBuf) {
    if let Ok(Some(value)) = matches.try_get_one::<PathBuf>(id) {
        *filename = value.clone();
    }
}

pub(crate) fn apply_rate(matches: &ArgMatches, id: &str, rate: &mut i64) {
    if let Ok(Some(value)) = matches.try_get_one::<i64>(id) {
        *rate = *value;
    }
}

pub(crate) fn is_set(filename: &std::path::Path) -> bool {
    !filename.as_os_str().is_empty()
}

/// Exclusive ownership of a process-wide sampling knob. Two methods setting
/// the same rate would restore each other's values out of order.
pub(crate) struct Knob {
    held: AtomicBool,
    what: &'static str,
}

impl Knob {
    pub(crate) const fn new(what: &'static str) -> Self {
        Knob {
            held: AtomicBool::new(false),
            what,
        }
    }

    pub(crate) fn acquire(&self) -> Result<()> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| Error::Active(self.what))
    }

    pub(crate) fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Command;

    fn all() -> Vec<Box<dyn Method>> {
        vec![
            Box::new(Cpu::default()),
            Box::new(Mem::default()),
            Box::new(Lookup::goroutine()),
            Box::new(Lookup::threadcreate()),
            Box::new(Block::default()),
            Box::new(Mutex::default()),
            Box::new(Trace::default()),
        ]
    }

    fn parse(methods: &mut [Box<dyn Method>], args: &[&str]) {
        let mut cmd = Command::new("test");
        for method in methods.iter_mut() {
            cmd = method.register_flags(cmd);
        }
        let matches = cmd
            .try_get_matches_from(std::iter::once("test").chain(args.iter().copied()))
            .unwrap();
        for method in methods.iter_mut() {
            method.apply_flags(&matches);
        }
    }

    #[test]
    fn defaults_are_enabled_until_flags_are_registered() {
        let mut methods = all();
        assert!(methods.iter().all(|method| method.enabled()));

        parse(&mut methods, &[]);
        assert!(methods.iter().all(|method| !method.enabled()));
    }

    #[test]
    fn names_are_stable() {
        let names: Vec<_> = all().iter().map(|method| method.name()).collect();
        assert_eq!(
            names,
            ["cpu", "mem", "goroutine", "threadcreate", "block", "mutex", "trace"]
        );
    }

    #[test]
    fn filename_flags_enable() {
        let mut methods = all();
        parse(
            &mut methods,
            &["--memprofile=mem.out", "--trace", "trace.out"],
        );
        let enabled: Vec<_> = methods
            .iter()
            .filter(|method| method.enabled())
            .map(|method| method.name())
            .collect();
        assert_eq!(enabled, ["mem", "trace"]);
    }

    #[test]
    fn rate_gated_methods_need_a_positive_rate() {
        let mut methods = all();
        parse(
            &mut methods,
            &[
                "--blockprofile=block.out",
                "--blockprofilerate=0",
                "--mutexprofile=mutex.out",
                "--mutexprofilefraction=-1",
            ],
        );
        assert!(methods.iter().all(|method| !method.enabled()));

        parse(
            &mut methods,
            &["--blockprofile=block.out", "--mutexprofile=mutex.out"],
        );
        let enabled: Vec<_> = methods
            .iter()
            .filter(|method| method.enabled())
            .map(|method| method.name())
            .collect();
        assert_eq!(enabled, ["block", "mutex"]);
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn duplicate_registration_is_fatal() {
        let mut first = Cpu::default();
        let mut second = Cpu::default();
        let cmd = second.register_flags(first.register_flags(Command::new("test")));
        let _ = cmd.try_get_matches_from(["test"]);
    }
}
