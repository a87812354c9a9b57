//! Run statistics and the lines reporting them.
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use super::state::ScanState;
use crate::detail;

/// Counters shared by every worker for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Jobs planned at the start of the run.
    pub total: u64,
    /// Jobs finished, probed or skipped.
    pub done: u64,
    pub open: u64,
    /// Hosts confirmed alive.
    pub up: u64,
    pub discarded: u64,
}

impl RunStats {
    /// Completed share of the run in percent.
    pub fn completion_percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.done as f64 * 100.0 / self.total as f64
    }

    /// Jobs per second over `elapsed`.
    pub fn pps(&self, elapsed: Duration) -> f64 {
        let seconds = elapsed.as_secs_f64();
        if seconds > 0.0 {
            self.done as f64 / seconds
        } else {
            0.0
        }
    }

    /// Remaining time assuming the rate so far holds. `None` before the
    /// first job finishes.
    pub fn eta(&self, elapsed: Duration) -> Option<Duration> {
        let rate = self.completion_percent();
        if rate <= 0.0 {
            return None;
        }
        Some(elapsed.mul_f64(100.0 / rate - 1.0))
    }

    pub fn progress_line(&self, elapsed: Duration) -> String {
        let eta = self
            .eta(elapsed)
            .map_or_else(|| "unknown".to_owned(), format_duration);
        format!(
            "Progress ({}/{}) open: {}, pps: {:.0}, rate: {:.0}%, remaining: {eta}",
            self.done,
            self.total,
            self.open,
            self.pps(elapsed),
            self.completion_percent(),
        )
    }

    /// The final summary; `hosts` is the number of distinct hosts planned.
    pub fn summary_line(&self, hosts: usize, elapsed: Duration) -> String {
        let alive_rate = if hosts == 0 {
            0
        } else {
            self.up * 100 / hosts as u64
        };
        format!(
            "Finished {} tasks. alive: {alive_rate}% ({}/{hosts}), open: {}, discarded: {}, pps: {:.0}, time: {}",
            self.total,
            self.up,
            self.open,
            self.discarded,
            self.pps(elapsed),
            format_duration(elapsed),
        )
    }
}

/// Formats a duration using the largest unit that applies, e.g.
/// `1d 2h 3m 4s`, `5m 0s` or `42s`.
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Prints a progress line every `every` until the returned task is aborted.
pub fn spawn_reporter(
    state: Arc<ScanState>,
    every: Duration,
    greppable: bool,
    accessible: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = time::interval(every);
        // the first tick completes immediately
        ticks.tick().await;
        loop {
            ticks.tick().await;
            let line = state.snapshot().progress_line(state.elapsed());
            detail!(line, greppable, accessible);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::{format_duration, RunStats};
    use std::time::Duration;

    fn stats(total: u64, done: u64) -> RunStats {
        RunStats {
            total,
            done,
            ..RunStats::default()
        }
    }

    #[test]
    fn rates() {
        let halfway = stats(200, 100);
        assert!((halfway.completion_percent() - 50.0).abs() < f64::EPSILON);
        assert!((halfway.pps(Duration::from_secs(10)) - 10.0).abs() < f64::EPSILON);
        assert_eq!(halfway.eta(Duration::from_secs(10)), Some(Duration::from_secs(10)));
    }

    #[test]
    fn eta_edge_cases() {
        assert_eq!(stats(100, 0).eta(Duration::from_secs(3)), None);
        assert_eq!(stats(100, 100).eta(Duration::from_secs(3)), Some(Duration::ZERO));
        assert_eq!(stats(100, 25).eta(Duration::from_secs(3)), Some(Duration::from_secs(9)));
    }

    #[test]
    fn empty_run_is_complete() {
        let empty = stats(0, 0);
        assert!((empty.completion_percent() - 100.0).abs() < f64::EPSILON);
        assert!(empty.pps(Duration::ZERO).abs() < f64::EPSILON);
    }

    #[test]
    fn durations_use_largest_unit() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(300)), "5m 0s");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "1h 2m 5s");
        assert_eq!(format_duration(Duration::from_secs(93_784)), "1d 2h 3m 4s");
        assert_eq!(format_duration(Duration::from_millis(999)), "0s");
    }

    #[test]
    fn lines() {
        let run = RunStats {
            total: 400,
            done: 100,
            open: 3,
            up: 1,
            discarded: 2,
        };
        assert_eq!(
            run.progress_line(Duration::from_secs(10)),
            "Progress (100/400) open: 3, pps: 10, rate: 25%, remaining: 30s"
        );
        assert_eq!(
            run.summary_line(4, Duration::from_secs(10)),
            "Finished 400 tasks. alive: 25% (1/4), open: 3, discarded: 2, pps: 10, time: 10s"
        );
    }
}
