// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::fmt;
use std::sync::Arc;

use log::{Level, Log, Metadata, Record};

pub(crate) const TARGET: &str = "pprof_session";

/// Forwards to whatever logger is installed process-wide.
struct Global;

impl Log for Global {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level() && log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            log::logger().log(record);
        }
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

struct Discard;

impl Log for Discard {
    fn enabled(&self, _: &Metadata) -> bool {
        false
    }

    fn log(&self, _: &Record) {}

    fn flush(&self) {}
}

/// The default session logger: the process-wide `log` logger.
pub fn global() -> Arc<dyn Log> {
    Arc::new(Global)
}

/// A logger that drops everything.
pub fn discard() -> Arc<dyn Log> {
    Arc::new(Discard)
}

pub(crate) fn emit(logger: &dyn Log, level: Level, args: fmt::Arguments<'_>) {
    logger.log(
        &Record::builder()
            .args(args)
            .level(level)
            .target(TARGET)
            .module_path_static(Some(module_path!()))
            .build(),
    );
}
