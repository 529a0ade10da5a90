// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Configuration strings of the form `key=value,key=value`.
//!
//! Every entry is turned into the long flag `--key=value` and parsed against
//! the flags the methods register, so the environment accepts exactly what
//! the command line does. Values cannot contain commas.

use std::ffi::OsStr;
use std::fmt::Write;
use std::process;

use clap::{Arg, Command};

use crate::method::Method;
use crate::{Error, Result};

const HELP_KEYS: [&str; 2] = ["help", "h"];

/// Converts a configuration string into command-line tokens. Empty entries
/// are skipped, so an empty string yields no tokens.
pub fn config_args(cfg: &str) -> Vec<String> {
    cfg.split(',')
        .filter(|entry| !entry.is_empty())
        .map(|entry| format!("--{}", entry))
        .collect()
}

fn command(methods: &mut [Box<dyn Method>]) -> Command {
    let mut cmd = Command::new("profile")
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .args_override_self(true);
    for method in methods.iter_mut() {
        cmd = method.register_flags(cmd);
    }
    cmd
}

/// Like [`parse`], for values read from the environment. A value that is not
/// valid unicode is a configuration error.
pub(crate) fn parse_os(methods: &mut [Box<dyn Method>], cfg: &OsStr) -> Result<()> {
    match cfg.to_str() {
        Some(cfg) => parse(methods, cfg),
        None => {
            let mut cmd = command(methods);
            cmd.build();
            Err(Error::Config {
                reason: format!("invalid unicode in configuration {:?}", cfg),
                usage: usage(&cmd),
            })
        }
    }
}

pub(crate) fn parse(methods: &mut [Box<dyn Method>], cfg: &str) -> Result<()> {
    let mut cmd = command(methods);

    let args = config_args(cfg);
    let help = args.iter().any(|arg| {
        let key = arg.trim_start_matches('-');
        HELP_KEYS.contains(&key)
    });
    if help {
        cmd.build();
        return Err(Error::Help(usage(&cmd)));
    }

    let matches = match cmd.try_get_matches_from_mut(&args) {
        Ok(matches) => matches,
        Err(err) => {
            return Err(Error::Config {
                reason: reason(&err),
                usage: usage(&cmd),
            })
        }
    };
    for method in methods.iter_mut() {
        method.apply_flags(&matches);
    }

    Ok(())
}

fn reason(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let line = rendered.lines().next().unwrap_or_default();
    line.strip_prefix("error: ").unwrap_or(line).to_owned()
}

/// Lists every key as `name=value` followed by its indented description.
pub(crate) fn usage(cmd: &Command) -> String {
    let mut args: Vec<&Arg> = cmd.get_arguments().collect();
    args.sort_by(|a, b| a.get_id().as_str().cmp(b.get_id().as_str()));

    let mut out = String::new();
    for arg in args {
        let value = arg
            .get_value_names()
            .and_then(|names| names.first())
            .map(|name| name.to_string())
            .unwrap_or_else(|| "value".to_owned());
        let help = arg.get_help().map(|help| help.to_string()).unwrap_or_default();
        let _ = writeln!(out, "{}={}\n\t{}", arg.get_id(), value, help);
    }
    out
}

/// Reports a configuration error the way a flag parser would: usage on
/// stderr, then exit. Help requests exit successfully.
pub(crate) fn exit_usage(err: &Error) -> ! {
    eprint!("{}", err);
    match err {
        Error::Help(_) => process::exit(0),
        _ => process::exit(2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::{Block, Cpu, Mem};

    fn methods() -> Vec<Box<dyn Method>> {
        vec![
            Box::new(Cpu::default()),
            Box::new(Mem::default()),
            Box::new(Block::default()),
        ]
    }

    fn enabled(methods: &[Box<dyn Method>]) -> Vec<&'static str> {
        methods
            .iter()
            .filter(|method| method.enabled())
            .map(|method| method.name())
            .collect()
    }

    #[test]
    fn splits_on_commas() {
        assert!(config_args("").is_empty());
        assert_eq!(config_args("cpuprofile=cpu.out"), ["--cpuprofile=cpu.out"]);
        assert_eq!(
            config_args("cpuprofile=cpu.out,memprofilerate=1,help"),
            ["--cpuprofile=cpu.out", "--memprofilerate=1", "--help"]
        );
        assert_eq!(config_args(",trace=t.out,"), ["--trace=t.out"]);
    }

    #[test]
    fn empty_config_disables_everything() {
        let mut methods = methods();
        assert_eq!(enabled(&methods), ["cpu", "mem", "block"]);

        parse(&mut methods, "").unwrap();
        assert!(enabled(&methods).is_empty());
    }

    #[test]
    fn keys_configure_methods() {
        let mut methods = methods();
        parse(&mut methods, "memprofile=mem.out,blockprofile=block.out,blockprofilerate=0").unwrap();
        assert_eq!(enabled(&methods), ["mem"]);
    }

    #[test]
    fn last_repeated_key_wins() {
        let mut methods = methods();
        parse(&mut methods, "blockprofile=block.out,blockprofilerate=0,blockprofilerate=5").unwrap();
        assert_eq!(enabled(&methods), ["block"]);
    }

    #[test]
    fn unknown_key_lists_usage() {
        let mut methods = methods();
        match parse(&mut methods, "cpuprofile=cpu.out,bogus=1") {
            Err(Error::Config { reason, usage }) => {
                assert!(reason.contains("--bogus"), "reason: {}", reason);
                assert!(usage.contains("cpuprofile=file\n\twrite a cpu profile to file\n"));
                assert!(usage.contains("blockprofilerate=rate\n\t"));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn non_unicode_value_is_a_config_error() {
        use std::os::unix::ffi::OsStrExt;

        let mut methods = methods();
        let cfg = OsStr::from_bytes(b"cpuprofile=cpu\xff.out");
        match parse_os(&mut methods, cfg) {
            Err(Error::Config { reason, usage }) => {
                assert!(reason.contains("invalid unicode"), "reason: {}", reason);
                assert!(usage.contains("cpuprofile=file\n"));
            }
            other => panic!("unexpected result {:?}", other),
        }

        parse_os(&mut methods, OsStr::new("memprofile=mem.out")).unwrap();
        assert_eq!(enabled(&methods), ["mem"]);
    }

    #[test]
    fn malformed_value_is_a_config_error() {
        let mut methods = methods();
        assert!(matches!(
            parse(&mut methods, "memprofilerate=lots"),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn help_lists_every_key_sorted() {
        let mut methods = methods();
        match parse(&mut methods, "help") {
            Err(Error::Help(usage)) => {
                let keys: Vec<&str> = usage
                    .lines()
                    .filter(|line| !line.starts_with('\t'))
                    .map(|line| line.split('=').next().unwrap())
                    .collect();
                assert_eq!(
                    keys,
                    ["blockprofile", "blockprofilerate", "cpuprofile", "memprofile", "memprofilerate"]
                );
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
