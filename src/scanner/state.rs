//! State shared by all workers of one run.
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use super::host_filter::{HostFilter, Transition};
use super::probe::ProbeOutcome;
use super::progress::RunStats;

#[derive(Debug)]
struct Inner {
    filter: HostFilter,
    stats: RunStats,
}

/// Host filter and run statistics behind a single lock.
///
/// The lock is only taken for constant-time transitions, never across a
/// probe.
#[derive(Debug)]
pub struct ScanState {
    inner: Mutex<Inner>,
    started: Instant,
}

/// What finishing one job changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub outcome: Option<ProbeOutcome>,
    pub transition: Transition,
}

impl ScanState {
    pub fn new(total: u64, filter: HostFilter) -> Self {
        Self {
            inner: Mutex::new(Inner {
                filter,
                stats: RunStats {
                    total,
                    ..RunStats::default()
                },
            }),
            started: Instant::now(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a job for `host` should be probed.
    pub fn admit(&self, host: IpAddr) -> bool {
        self.lock().filter.admits(host)
    }

    /// Records a finished job. `outcome` is `None` when the job was skipped.
    pub fn complete(&self, socket: SocketAddr, outcome: Option<ProbeOutcome>) -> Completion {
        let mut inner = self.lock();
        inner.stats.done += 1;

        let transition = match outcome {
            Some(outcome) => inner.filter.record(socket.ip(), outcome),
            None => Transition::Unchanged,
        };
        if outcome == Some(ProbeOutcome::Open) {
            inner.stats.open += 1;
        }
        match transition {
            Transition::ConfirmedAlive => inner.stats.up += 1,
            Transition::Discarded => inner.stats.discarded += 1,
            Transition::Unchanged => {}
        }

        Completion {
            outcome,
            transition,
        }
    }

    pub fn snapshot(&self) -> RunStats {
        self.lock().stats
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
