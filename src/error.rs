// Copyright 2019 TiKV Project Authors. Licensed under Apache-2.0.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    PProf(#[from] pprof::Error),

    #[error("{0}")]
    Signal(#[from] nix::Error),

    #[error("unknown profile {0:?}")]
    UnknownProfile(String),

    #[error("{0} is already active")]
    Active(&'static str),

    #[error("{0} profile is not running")]
    NotRunning(&'static str),

    /// A configuration string that could not be parsed. `usage` lists every
    /// accepted key.
    #[error("{reason}\n{usage}")]
    Config { reason: String, usage: String },

    /// Help was requested explicitly.
    #[error("{0}")]
    Help(String),
}

pub type Result<T> = std::result::Result<T, Error>;
