//! Core functionality for actual scanning behaviour.
//!
//! A [`Scanner`] owns the [`JobTable`] and feeds its jobs through a bounded
//! queue to a fixed pool of workers. Each worker asks the shared
//! [`ScanState`] whether the host is still worth probing, runs the
//! [`Prober`], and records the outcome.
pub mod host_filter;
pub mod job_table;
pub mod probe;
pub mod progress;
pub mod state;

use host_filter::{HostFilter, Transition};
use job_table::JobTable;
use probe::{ProbeOutcome, Prober};
use progress::RunStats;
use state::{Completion, ScanState};

use crate::alias;
use crate::error::ScanError;
use colored::Colorize;
use log::{debug, warn};

use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinSet,
};

/// How result lines are printed.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputStyle {
    /// Bare `host:port` lines, no decoration.
    pub greppable: bool,
    pub accessible: bool,
    /// Print each confirmed-alive host once instead of open ports.
    pub alive_only: bool,
    /// Append service names from the alias table to open ports.
    pub annotate: bool,
}

impl OutputStyle {
    /// The line printed for `socket` after `completion`, if any.
    pub fn line(&self, socket: SocketAddr, completion: Completion) -> Option<String> {
        if self.alive_only {
            if completion.transition != Transition::ConfirmedAlive {
                return None;
            }
            let host = socket.ip();
            return Some(if self.greppable {
                host.to_string()
            } else if self.accessible {
                format!("Alive {host}")
            } else {
                format!("Alive {}", host.to_string().purple())
            });
        }

        if completion.outcome != Some(ProbeOutcome::Open) {
            return None;
        }
        if self.greppable {
            return Some(socket.to_string());
        }

        let services = alias::service_names(socket.port());
        let annotation = if self.annotate && !services.is_empty() {
            format!(" ({})", services.join(", "))
        } else {
            String::new()
        };
        Some(if self.accessible {
            format!("Open {socket}{annotation}")
        } else {
            format!("Open {}{annotation}", socket.to_string().purple())
        })
    }
}

/// What a finished run found.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub open: Vec<SocketAddr>,
    pub alive: Vec<IpAddr>,
    pub stats: RunStats,
    /// Distinct hosts that were planned.
    pub hosts: usize,
    pub elapsed: Duration,
}

impl ScanReport {
    pub fn summary_line(&self) -> String {
        self.stats.summary_line(self.hosts, self.elapsed)
    }
}

#[derive(Debug, Default)]
struct Findings {
    open: Vec<SocketAddr>,
    alive: Vec<IpAddr>,
}

/// The class for the scanner.
///
/// `workers` is how many probes may be in flight at once, `queue_capacity`
/// bounds how far the producer may run ahead of them. Ports listed in
/// `priority_ports` are probed on every host before anything else.
#[derive(Debug)]
pub struct Scanner<P> {
    table: JobTable,
    prober: Arc<P>,
    filter: HostFilter,
    workers: usize,
    queue_capacity: usize,
    priority_ports: Vec<u16>,
    progress_delay: Option<Duration>,
    style: OutputStyle,
}

// Allowing too many arguments for clippy.
#[allow(clippy::too_many_arguments)]
impl<P: Prober> Scanner<P> {
    pub fn new(
        table: JobTable,
        prober: P,
        filter: HostFilter,
        workers: usize,
        queue_capacity: usize,
        priority_ports: Vec<u16>,
        progress_delay: Option<Duration>,
        style: OutputStyle,
    ) -> Self {
        Self {
            table,
            prober: Arc::new(prober),
            filter,
            workers: workers.max(1),
            queue_capacity: queue_capacity.max(1),
            priority_ports,
            progress_delay: progress_delay.filter(|delay| !delay.is_zero()),
            style,
        }
    }

    /// Runs every job in the table and returns once all of them have
    /// finished, probed or skipped.
    ///
    /// # Errors
    ///
    /// [`ScanError::Incomplete`] if a worker died and left jobs unfinished.
    pub async fn run(self) -> Result<ScanReport, ScanError> {
        let Self {
            mut table,
            prober,
            filter,
            workers,
            queue_capacity,
            priority_ports,
            progress_delay,
            style,
        } = self;

        let total = table.len();
        let hosts = table.host_count();
        let state = Arc::new(ScanState::new(total, filter));
        debug!(
            "Start scanning sockets.\nWorkers {workers}\nQueue capacity {queue_capacity}\nNumber of hosts {hosts}\nJobs all together {total}"
        );

        let (sender, receiver) = mpsc::channel(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let worker_count = usize::try_from(total).map_or(workers, |total| workers.min(total.max(1)));

        let mut pool = JoinSet::new();
        for _ in 0..worker_count {
            pool.spawn(work(
                Arc::clone(&receiver),
                Arc::clone(&prober),
                Arc::clone(&state),
                style,
            ));
        }
        // the queue closes if every worker dies
        drop(receiver);

        let reporter = progress_delay.map(|every| {
            progress::spawn_reporter(Arc::clone(&state), every, style.greppable, style.accessible)
        });

        'produce: {
            for &port in &priority_ports {
                let Some(requesters) = table.take_port(port) else {
                    debug!("Priority port {port} is not requested by any target");
                    continue;
                };
                if !submit(&sender, table.jobs_on(port, &requesters)).await {
                    break 'produce;
                }
            }
            submit(&sender, table.jobs()).await;
        }
        // workers exit once the queue is drained
        drop(sender);

        let mut report = ScanReport {
            hosts,
            ..ScanReport::default()
        };
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(findings) => {
                    report.open.extend(findings.open);
                    report.alive.extend(findings.alive);
                }
                Err(e) => warn!("Worker failed: {e}"),
            }
        }
        if let Some(reporter) = reporter {
            reporter.abort();
        }

        report.stats = state.snapshot();
        report.elapsed = state.elapsed();
        debug!("Open Sockets found: {:?}", &report.open);
        if report.stats.done != report.stats.total {
            return Err(ScanError::Incomplete {
                done: report.stats.done,
                total: report.stats.total,
            });
        }
        Ok(report)
    }
}

/// Queues every job, waiting whenever the queue is full. Returns false if
/// no worker is left to receive.
async fn submit(sender: &mpsc::Sender<SocketAddr>, jobs: impl Iterator<Item = SocketAddr>) -> bool {
    for socket in jobs {
        if sender.send(socket).await.is_err() {
            warn!("No worker left to probe {socket}");
            return false;
        }
    }
    true
}

/// One worker: takes jobs until the queue is closed and empty.
async fn work<P: Prober>(
    jobs: Arc<Mutex<mpsc::Receiver<SocketAddr>>>,
    prober: Arc<P>,
    state: Arc<ScanState>,
    style: OutputStyle,
) -> Findings {
    let mut findings = Findings::default();
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(socket) = next else {
            break;
        };

        let outcome = if state.admit(socket.ip()) {
            Some(prober.probe(socket).await)
        } else {
            debug!("Skipping {socket}, host discarded");
            None
        };
        let completion = state.complete(socket, outcome);

        match outcome {
            Some(ProbeOutcome::Open) => findings.open.push(socket),
            Some(other) => debug!("{socket} {other:?}"),
            None => {}
        }
        match completion.transition {
            Transition::ConfirmedAlive => findings.alive.push(socket.ip()),
            Transition::Discarded => debug!("Discarding host {}", socket.ip()),
            Transition::Unchanged => {}
        }
        if let Some(line) = style.line(socket, completion) {
            println!("{line}");
        }
    }
    findings
}
