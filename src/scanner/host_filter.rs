//! Per-host bookkeeping that decides whether a host is still worth probing.
//!
//! Each host carries a counter of consecutive filtered results:
//!
//! - below the discard threshold the host is *active* and probed normally,
//! - at or above it the host is *discarded* and its remaining jobs skipped,
//! - once any probe returns open or closed the counter is pinned to
//!   [`ALIVE_SENTINEL`] and the host is never discarded again.
//!
//! No-route, permission-denied, host-down and unresolvable outcomes skip
//! the counting and put the host one past the threshold straight away.
use std::collections::HashMap;
use std::net::IpAddr;

use super::probe::ProbeOutcome;

/// Counter value marking a confirmed-alive host.
pub const ALIVE_SENTINEL: u32 = 65_536;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    Active,
    Discarded,
    Alive,
}

/// The status change caused by recording one outcome, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Discarded,
    ConfirmedAlive,
}

#[derive(Debug)]
pub struct HostFilter {
    counters: HashMap<IpAddr, u32>,
    discard_threshold: u32,
    force: bool,
}

impl HostFilter {
    /// `force` disables discarding: every host is probed on every port.
    pub fn new(discard_threshold: u32, force: bool) -> Self {
        Self {
            counters: HashMap::new(),
            discard_threshold: discard_threshold.clamp(1, ALIVE_SENTINEL - 2),
            force,
        }
    }

    pub fn status(&self, host: IpAddr) -> HostStatus {
        let counter = self.counters.get(&host).copied().unwrap_or_default();
        if counter >= ALIVE_SENTINEL {
            HostStatus::Alive
        } else if counter >= self.discard_threshold {
            HostStatus::Discarded
        } else {
            HostStatus::Active
        }
    }

    /// Whether the next job for `host` should reach the prober.
    pub fn admits(&self, host: IpAddr) -> bool {
        self.force || self.status(host) != HostStatus::Discarded
    }

    /// Updates the state of `host` after a probe returned `outcome`.
    pub fn record(&mut self, host: IpAddr, outcome: ProbeOutcome) -> Transition {
        let status = self.status(host);
        if status == HostStatus::Alive {
            return Transition::Unchanged;
        }

        if outcome.proves_alive() {
            self.counters.insert(host, ALIVE_SENTINEL);
            return Transition::ConfirmedAlive;
        }

        if self.force || status == HostStatus::Discarded {
            return Transition::Unchanged;
        }

        if outcome == ProbeOutcome::Filtered {
            let counter = self.counters.entry(host).or_default();
            *counter += 1;
            if *counter == self.discard_threshold {
                return Transition::Discarded;
            }
        } else if outcome.discards_host() {
            self.counters.insert(host, self.discard_threshold + 1);
            return Transition::Discarded;
        }

        Transition::Unchanged
    }

    /// Number of hosts confirmed alive so far.
    pub fn alive_count(&self) -> usize {
        self.counters
            .values()
            .filter(|&&counter| counter >= ALIVE_SENTINEL)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::{HostFilter, HostStatus, Transition};
    use crate::scanner::probe::ProbeOutcome;
    use std::net::{IpAddr, Ipv4Addr};

    const HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const OTHER: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[test]
    fn unknown_hosts_are_active() {
        let filter = HostFilter::new(3, false);
        assert_eq!(filter.status(HOST), HostStatus::Active);
        assert!(filter.admits(HOST));
    }

    #[test]
    fn filtered_streak_discards_exactly_once() {
        let mut filter = HostFilter::new(3, false);
        assert_eq!(filter.record(HOST, ProbeOutcome::Filtered), Transition::Unchanged);
        assert_eq!(filter.record(HOST, ProbeOutcome::Filtered), Transition::Unchanged);
        assert!(filter.admits(HOST));
        assert_eq!(filter.record(HOST, ProbeOutcome::Filtered), Transition::Discarded);
        assert!(!filter.admits(HOST));

        // jobs already in flight when the host was discarded
        assert_eq!(filter.record(HOST, ProbeOutcome::Filtered), Transition::Unchanged);
        assert_eq!(filter.status(HOST), HostStatus::Discarded);
        assert!(filter.admits(OTHER));
    }

    #[test]
    fn open_pins_host_alive() {
        let mut filter = HostFilter::new(2, false);
        filter.record(HOST, ProbeOutcome::Filtered);
        assert_eq!(filter.record(HOST, ProbeOutcome::Open), Transition::ConfirmedAlive);
        for _ in 0..10 {
            assert_eq!(filter.record(HOST, ProbeOutcome::Filtered), Transition::Unchanged);
            assert_eq!(filter.record(HOST, ProbeOutcome::HostDown), Transition::Unchanged);
        }
        assert_eq!(filter.status(HOST), HostStatus::Alive);
        assert!(filter.admits(HOST));
        assert_eq!(filter.alive_count(), 1);
    }

    #[test]
    fn closed_also_confirms() {
        let mut filter = HostFilter::new(2, false);
        assert_eq!(filter.record(HOST, ProbeOutcome::Closed), Transition::ConfirmedAlive);
        assert_eq!(filter.record(HOST, ProbeOutcome::Open), Transition::Unchanged);
    }

    #[test]
    fn late_answer_revives_discarded_host() {
        let mut filter = HostFilter::new(1, false);
        assert_eq!(filter.record(HOST, ProbeOutcome::Filtered), Transition::Discarded);
        assert_eq!(filter.record(HOST, ProbeOutcome::Open), Transition::ConfirmedAlive);
        assert!(filter.admits(HOST));
    }

    #[test]
    fn unreachable_outcomes_discard_immediately() {
        for outcome in [
            ProbeOutcome::NoRoute,
            ProbeOutcome::PermissionDenied,
            ProbeOutcome::HostDown,
            ProbeOutcome::UnresolvableHost,
        ] {
            let mut filter = HostFilter::new(1014, false);
            assert_eq!(filter.record(HOST, outcome), Transition::Discarded);
            assert_eq!(filter.status(HOST), HostStatus::Discarded);
            assert_eq!(filter.record(HOST, outcome), Transition::Unchanged);
        }
    }

    #[test]
    fn neutral_outcomes_leave_state_alone() {
        let mut filter = HostFilter::new(1, false);
        for outcome in [ProbeOutcome::Unknown, ProbeOutcome::Sent, ProbeOutcome::SendFailed] {
            assert_eq!(filter.record(HOST, outcome), Transition::Unchanged);
        }
        assert_eq!(filter.status(HOST), HostStatus::Active);
    }

    #[test]
    fn force_mode_never_discards() {
        let mut filter = HostFilter::new(1, true);
        assert_eq!(filter.record(HOST, ProbeOutcome::Filtered), Transition::Unchanged);
        assert_eq!(filter.record(HOST, ProbeOutcome::NoRoute), Transition::Unchanged);
        assert!(filter.admits(HOST));
        assert_eq!(filter.record(HOST, ProbeOutcome::Open), Transition::ConfirmedAlive);
    }
}
