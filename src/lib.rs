// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

//! Start and stop profiling sessions with one call.
//!
//! ```no_run
//! use pprof_session::{mem_profile, no_shutdown_hook, Profile};
//!
//! let _profile = Profile::new()
//!     .with(mem_profile)
//!     .with(no_shutdown_hook)
//!     .start();
//! // profiles are written when `_profile` goes out of scope
//! ```
//!
//! Sessions with no methods profile the cpu. Methods can be toggled from the
//! command line through [`Profile::register_flags`] or from an environment
//! variable through [`config_env_var`].

mod config;
mod error;
mod logger;
pub mod method;
mod profile;
mod runner;
pub mod runtime;
mod shutdown;

#[cfg(feature = "criterion")]
pub mod criterion;

pub use config::config_args;
pub use error::{Error, Result};
pub use logger::{discard, global};
pub use method::Method;
pub use profile::*;
pub use runner::Runner;
pub use runtime::heap::AllocRecorder;

#[cfg(test)]
static TEST_LOCK: parking_lot::Mutex<()> = parking_lot::const_mutex(());

/// Serializes tests that touch process-wide samplers.
#[cfg(test)]
pub(crate) fn test_lock() -> parking_lot::MutexGuard<'static, ()> {
    TEST_LOCK.lock()
}
