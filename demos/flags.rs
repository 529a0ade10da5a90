// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use clap::{value_parser, Arg, Command};
use pprof_session::method::{Cpu, Mem};
use pprof_session::Runner;

fn main() {
    env_logger::init();

    let mut runner = Runner::new(vec![Box::new(Cpu::default()), Box::new(Mem::default())]);

    let cmd = Command::new("flags").arg(
        Arg::new("n")
            .short('n')
            .value_name("n")
            .help("sum the integers 1 to n")
            .default_value("1000000")
            .value_parser(value_parser!(u64)),
    );
    let matches = runner.register_flags(cmd).get_matches();
    runner.apply_flags(&matches);

    runner.start();

    let n = *matches.get_one::<u64>("n").unwrap();
    let sum: u64 = (1..=n).sum();
    println!("{}", sum);

    runner.stop();
}
