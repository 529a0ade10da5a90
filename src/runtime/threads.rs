// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

use std::collections::HashMap;
use std::io;
use std::thread::{self, JoinHandle};

use once_cell::sync::Lazy;
use pprof::protos;
use spin::Mutex;

use super::proto::ProfileBuilder;
use super::{capture_stack, tracer, Stack};

static CREATED: Lazy<Mutex<HashMap<Stack, i64>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Spawns a named thread, recording the creating stack in the
/// `threadcreate` profile.
pub fn spawn<F, T>(name: &str, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let stack = capture_stack();
    let handle = thread::Builder::new().name(name.to_owned()).spawn(f)?;

    *CREATED.lock().entry(stack).or_insert(0) += 1;
    tracer::event("thread-create", format_args!("{}", name));

    Ok(handle)
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        fn live_threads() -> Vec<String> {
            let entries = match std::fs::read_dir("/proc/self/task") {
                Ok(entries) => entries,
                Err(err) => {
                    log::warn!("cannot list threads: {}", err);
                    return vec![current_thread_name()];
                }
            };

            entries
                .filter_map(|entry| entry.ok())
                .map(|entry| {
                    std::fs::read_to_string(entry.path().join("comm"))
                        .map(|comm| comm.trim_end().to_owned())
                        .unwrap_or_else(|_| "unknown".to_owned())
                })
                .collect()
        }
    } else {
        fn live_threads() -> Vec<String> {
            vec![current_thread_name()]
        }
    }
}

fn current_thread_name() -> String {
    thread::current().name().unwrap_or("unnamed").to_owned()
}

/// Snapshot of live threads, grouped by name.
pub fn goroutine_profile() -> protos::Profile {
    let mut counts: HashMap<String, i64> = HashMap::new();
    for name in live_threads() {
        *counts.entry(name).or_insert(0) += 1;
    }

    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort();

    let mut builder = ProfileBuilder::new(&[("goroutine", "count")]).period(("goroutine", "count"), 1);
    for (name, count) in counts {
        builder.add_named_sample(&[name.as_str()], vec![count]);
    }
    builder.build()
}

/// Creation stacks of every thread started through [`spawn`].
pub fn threadcreate_profile() -> protos::Profile {
    let created: Vec<(Stack, i64)> = CREATED
        .lock()
        .iter()
        .map(|(stack, count)| (stack.clone(), *count))
        .collect();

    let mut builder =
        ProfileBuilder::new(&[("threadcreate", "count")]).period(("threadcreate", "count"), 1);
    for (stack, count) in created {
        builder.add_sample(&stack, vec![count]);
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn total(profile: &protos::Profile) -> i64 {
        profile.sample.iter().map(|sample| sample.value[0]).sum()
    }

    #[test]
    fn spawn_is_recorded() {
        let _lock = crate::test_lock();
        let before = total(&threadcreate_profile());

        let handle = spawn("pprof-session-test", || 7).unwrap();
        assert_eq!(handle.join().unwrap(), 7);

        assert!(total(&threadcreate_profile()) > before);
    }

    #[test]
    fn snapshot_sees_the_current_thread() {
        let profile = goroutine_profile();
        assert!(total(&profile) >= 1);
        assert!(!profile.location.is_empty());
    }
}
