// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::env;
use std::process;
use std::sync::Arc;

use clap::{ArgMatches, Command};
use log::{Level, Log};
use nix::sys::signal::Signal;

use crate::config;
use crate::logger;
use crate::method::{Block, Cpu, Lookup, Mem, Method, Mutex, Trace};
use crate::runner::Runner;
use crate::shutdown::ShutdownHook;

/// A profiling session.
///
/// Methods are added with options such as [`cpu_profile`]. When none are
/// added by the time flags are registered or the session starts, cpu
/// profiling is added. Dropping the session stops it.
pub struct Profile {
    runner: Arc<parking_lot::Mutex<Runner>>,
    shutdown_hook: bool,
    env_var: Option<String>,

    hook: Option<ShutdownHook>,
}

impl Default for Profile {
    fn default() -> Self {
        Profile::new()
    }
}

impl Profile {
    pub fn new() -> Self {
        Profile {
            runner: Arc::new(parking_lot::Mutex::new(Runner::default())),
            shutdown_hook: true,
            env_var: None,
            hook: None,
        }
    }

    /// Applies `option` and returns the session, for chaining.
    pub fn with<O: FnOnce(&mut Profile)>(mut self, option: O) -> Self {
        option(&mut self);
        self
    }

    /// Applies options in order.
    pub fn configure<I, O>(&mut self, options: I)
    where
        I: IntoIterator<Item = O>,
        O: FnOnce(&mut Profile),
    {
        for option in options {
            option(self);
        }
    }

    pub fn add_method<M: Method + 'static>(&mut self, method: M) {
        self.runner.lock().add(method);
    }

    fn set_defaults(runner: &mut Runner) {
        if runner.methods().is_empty() {
            runner.add(Cpu::default());
        }
    }

    /// Registers the flags of every method on `cmd`. Call after all options
    /// have been applied.
    pub fn register_flags(&mut self, cmd: Command) -> Command {
        let mut runner = self.runner.lock();
        Self::set_defaults(&mut runner);
        runner.register_flags(cmd)
    }

    pub fn apply_flags(&mut self, matches: &ArgMatches) {
        self.runner.lock().apply_flags(matches);
    }

    /// Starts every enabled method, after applying the configuration
    /// environment variable if one was set. An invalid configuration string
    /// prints usage and exits the process.
    pub fn start(mut self) -> Self {
        {
            let mut runner = self.runner.lock();
            Self::set_defaults(&mut runner);

            if let Some(key) = &self.env_var {
                let cfg = env::var_os(key).unwrap_or_default();
                if let Err(err) = runner.parse_config_os(&cfg) {
                    config::exit_usage(&err);
                }
            }

            runner.start();
        }

        self.hook = None;
        if self.shutdown_hook {
            let runner = Arc::clone(&self.runner);
            let hook = ShutdownHook::install(move |signal| {
                interrupted(&runner, signal);
                process::exit(0);
            });
            match hook {
                Ok(hook) => self.hook = Some(hook),
                Err(err) => self.runner.lock().log(
                    Level::Warn,
                    format_args!("cannot install shutdown hook: {}", err),
                ),
            }
        }

        self
    }

    /// Stops every running method. Errors are logged, never returned.
    pub fn stop(&self) {
        self.runner.lock().stop();
    }

    /// Names of the running methods, in start order.
    pub fn running(&self) -> Vec<&'static str> {
        self.runner.lock().running()
    }
}

fn interrupted(runner: &parking_lot::Mutex<Runner>, signal: Signal) {
    let mut runner = runner.lock();
    runner.log(
        Level::Info,
        format_args!("caught {}: stopping profiles", signal),
    );
    runner.stop();
}

impl Drop for Profile {
    fn drop(&mut self) {
        self.hook.take();
        self.runner.lock().stop();
    }
}

/// Creates a session from `options` and starts it.
pub fn start<I, O>(options: I) -> Profile
where
    I: IntoIterator<Item = O>,
    O: FnOnce(&mut Profile),
{
    let mut profile = Profile::new();
    profile.configure(options);
    profile.start()
}

/// Enables cpu profiling.
pub fn cpu_profile(p: &mut Profile) {
    p.add_method(Cpu::default());
}

/// Enables allocation profiling.
pub fn mem_profile(p: &mut Profile) {
    p.add_method(Mem::default());
}

/// Enables the live thread snapshot.
pub fn goroutine_profile(p: &mut Profile) {
    p.add_method(Lookup::goroutine());
}

/// Enables the thread creation profile.
pub fn threadcreation_profile(p: &mut Profile) {
    p.add_method(Lookup::threadcreate());
}

/// Enables blocking profiling.
pub fn block_profile(p: &mut Profile) {
    p.add_method(Block::default());
}

/// Enables mutex contention profiling.
pub fn mutex_profile(p: &mut Profile) {
    p.add_method(Mutex::default());
}

/// Enables execution tracing.
pub fn trace_profile(p: &mut Profile) {
    p.add_method(Trace::default());
}

/// Enables every profiling method. Running them all at once is rarely what
/// you want, so combine this with flags or [`config_env_var`].
pub fn all_profiles(p: &mut Profile) {
    let options: [fn(&mut Profile); 7] = [
        cpu_profile,
        mem_profile,
        goroutine_profile,
        threadcreation_profile,
        block_profile,
        mutex_profile,
        trace_profile,
    ];
    p.configure(options);
}

/// Sends informational messages to `logger` instead of the global logger.
pub fn with_logger(logger: Arc<dyn Log>) -> impl FnOnce(&mut Profile) {
    move |p: &mut Profile| p.runner.lock().logger = logger
}

/// Suppresses logging.
pub fn quiet(p: &mut Profile) {
    p.configure([with_logger(logger::discard())]);
}

/// Disables the interrupt hook. Programs with their own signal handling
/// should use this and make sure the session is stopped on shutdown.
pub fn no_shutdown_hook(p: &mut Profile) {
    p.shutdown_hook = false;
}

/// Reads additional configuration from the environment variable `key`.
pub fn config_env_var<K: Into<String>>(key: K) -> impl FnOnce(&mut Profile) {
    let key = key.into();
    move |p: &mut Profile| p.env_var = Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::{Capture, Fake};

    fn methods(profile: &Profile) -> Vec<&'static str> {
        profile
            .runner
            .lock()
            .methods()
            .iter()
            .map(|method| method.name())
            .collect()
    }

    #[test]
    fn defaults_to_cpu_lazily() {
        let mut profile = Profile::new().with(no_shutdown_hook);
        assert!(methods(&profile).is_empty());

        mem_profile(&mut profile);
        let _ = profile.register_flags(Command::new("test"));
        assert_eq!(methods(&profile), ["mem"]);

        let mut profile = Profile::new().with(no_shutdown_hook);
        let _ = profile.register_flags(Command::new("test"));
        let _ = profile.register_flags(Command::new("again"));
        assert_eq!(methods(&profile), ["cpu"]);
    }

    #[test]
    fn options_accumulate_in_order() {
        let mut profile = Profile::new();
        profile.configure([trace_profile, cpu_profile, block_profile]);
        profile.configure([no_shutdown_hook, all_profiles]);

        assert!(!profile.shutdown_hook);
        assert_eq!(
            methods(&profile),
            [
                "trace",
                "cpu",
                "block",
                "cpu",
                "mem",
                "goroutine",
                "threadcreate",
                "block",
                "mutex",
                "trace"
            ]
        );
    }

    #[test]
    fn later_scalar_options_win() {
        let capture = Arc::new(Capture::default());
        let profile = Profile::new()
            .with(config_env_var("FIRST"))
            .with(config_env_var("SECOND"))
            .with(quiet)
            .with(with_logger(capture.clone()));

        assert_eq!(profile.env_var.as_deref(), Some("SECOND"));
        profile.runner.lock().log(Level::Info, format_args!("hello"));
        assert_eq!(*capture.0.lock(), ["hello"]);
    }

    #[test]
    fn start_skips_disabled_and_stop_clears() {
        let _lock = crate::test_lock();
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut disabled = Fake::new("off", &calls);
        disabled.enabled = false;

        let mut profile = Profile::new().with(no_shutdown_hook).with(quiet);
        profile.add_method(Fake::new("on", &calls));
        profile.add_method(disabled);

        let profile = profile.start();
        assert_eq!(profile.running(), ["on"]);
        assert!(profile.hook.is_none());

        profile.stop();
        assert!(profile.running().is_empty());
        drop(profile);

        assert_eq!(*calls.lock(), ["start on", "stop on"]);
    }

    #[test]
    fn drop_stops_the_session() {
        let _lock = crate::test_lock();
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));

        {
            let _profile = Profile::new()
                .with(no_shutdown_hook)
                .with(quiet)
                .with(|p: &mut Profile| p.add_method(Fake::new("scoped", &calls)))
                .start();
        }

        assert_eq!(*calls.lock(), ["start scoped", "stop scoped"]);
    }

    #[test]
    fn empty_environment_value_enables_nothing() {
        let _lock = crate::test_lock();
        std::env::set_var("PPROF_SESSION_UNIT_EMPTY", "");

        let profile = Profile::new()
            .with(all_profiles)
            .with(no_shutdown_hook)
            .with(quiet)
            .with(config_env_var("PPROF_SESSION_UNIT_EMPTY"))
            .start();
        assert!(profile.running().is_empty());

        let profile = Profile::new()
            .with(all_profiles)
            .with(no_shutdown_hook)
            .with(quiet)
            .with(config_env_var("PPROF_SESSION_UNIT_UNSET"))
            .start();
        assert!(profile.running().is_empty());
    }

    #[test]
    fn shutdown_hook_is_installed_and_cancelled() {
        let _lock = crate::test_lock();
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let mut profile = Profile::new().with(quiet);
        profile.add_method(Fake::new("hooked", &calls));
        let profile = profile.start();
        assert!(profile.hook.is_some());
        drop(profile);

        assert_eq!(*calls.lock(), ["start hooked", "stop hooked"]);
    }

    #[test]
    fn interrupt_logs_then_stops() {
        let _lock = crate::test_lock();
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let capture = Arc::new(Capture::default());

        let mut profile = Profile::new()
            .with(no_shutdown_hook)
            .with(with_logger(capture.clone()));
        profile.add_method(Fake::new("interrupted", &calls));
        let profile = profile.start();

        interrupted(&profile.runner, Signal::SIGINT);
        assert!(profile.running().is_empty());
        assert_eq!(*calls.lock(), ["start interrupted", "stop interrupted"]);
        assert_eq!(
            *capture.0.lock(),
            [
                "interrupted profile: started",
                "caught SIGINT: stopping profiles",
                "interrupted profile: stopped",
            ]
        );

        drop(profile);
        assert_eq!(calls.lock().len(), 2);
    }
}
