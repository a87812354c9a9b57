//! Errors raised while turning user input into scan jobs.
//!
//! Probe results are deliberately not errors; see
//! [`ProbeOutcome`](crate::scanner::probe::ProbeOutcome).
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything that can stop a run before the first probe is sent, plus a
/// run whose workers died before finishing their jobs.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A port literal, range or alias could not be understood.
    #[error("invalid port specification '{spec}': {reason}")]
    InvalidPortSpec { spec: String, reason: String },

    /// A CIDR block or octet pattern is malformed.
    #[error("invalid target '{target}': {reason}")]
    InvalidTargetSpec { target: String, reason: String },

    /// Neither the system nor the fallback resolver knows the name.
    #[error("could not resolve host '{0}'")]
    UnresolvableHost(String),

    /// A target list or config file could not be read.
    #[error("could not read {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Some jobs were never completed because workers stopped early.
    #[error("scan stopped early: {done} of {total} tasks finished")]
    Incomplete { done: u64, total: u64 },
}

impl ScanError {
    pub(crate) fn port_spec(spec: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPortSpec {
            spec: spec.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn target_spec(target: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTargetSpec {
            target: target.to_owned(),
            reason: reason.into(),
        }
    }
}
