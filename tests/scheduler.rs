use sprayscan::error::ScanError;
use sprayscan::scanner::host_filter::HostFilter;
use sprayscan::scanner::job_table::JobTable;
use sprayscan::scanner::probe::{ProbeOutcome, Prober, SocketProber};
use sprayscan::scanner::{OutputStyle, Scanner};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

const HOST_A: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
const HOST_B: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

/// Answers from a fixed script and remembers every socket it was asked about.
struct ScriptedProber {
    probed: Arc<Mutex<Vec<SocketAddr>>>,
    script: fn(SocketAddr) -> ProbeOutcome,
}

impl ScriptedProber {
    fn new(script: fn(SocketAddr) -> ProbeOutcome) -> (Self, Arc<Mutex<Vec<SocketAddr>>>) {
        let probed = Arc::new(Mutex::new(Vec::new()));
        let prober = Self {
            probed: Arc::clone(&probed),
            script,
        };
        (prober, probed)
    }
}

impl Prober for ScriptedProber {
    async fn probe(&self, socket: SocketAddr) -> ProbeOutcome {
        self.probed.lock().unwrap().push(socket);
        (self.script)(socket)
    }
}

fn quiet() -> OutputStyle {
    OutputStyle {
        greppable: true,
        ..OutputStyle::default()
    }
}

fn single_worker<P: Prober>(
    table: JobTable,
    prober: P,
    filter: HostFilter,
    priority_ports: Vec<u16>,
) -> Scanner<P> {
    Scanner::new(table, prober, filter, 1, 4, priority_ports, None, quiet())
}

#[tokio::test]
async fn priority_ports_go_first_across_hosts() {
    let mut table = JobTable::new();
    table.insert("10.0.0.1-2".to_owned(), vec![HOST_A, HOST_B], &[443, 22, 8080, 80]);

    let (prober, probed) = ScriptedProber::new(|_| ProbeOutcome::Closed);
    let report = single_worker(table, prober, HostFilter::new(3, false), vec![22, 80])
        .run()
        .await
        .unwrap();

    let probed = probed.lock().unwrap().clone();
    assert_eq!(probed.len(), 8);
    assert_eq!(
        probed[..4],
        [
            SocketAddr::new(HOST_A, 22),
            SocketAddr::new(HOST_B, 22),
            SocketAddr::new(HOST_A, 80),
            SocketAddr::new(HOST_B, 80),
        ]
    );
    assert!(probed[4..].iter().all(|socket| ![22, 80].contains(&socket.port())));
    assert_eq!(report.stats.done, 8);
    assert_eq!(report.stats.up, 2);
}

#[tokio::test]
async fn priority_port_only_reaches_targets_that_asked_for_it() {
    let mut table = JobTable::new();
    table.insert("10.0.0.1".to_owned(), vec![HOST_A], &[80, 22]);
    table.insert("10.0.0.2:80".to_owned(), vec![HOST_B], &[80]);

    let (prober, probed) = ScriptedProber::new(|_| ProbeOutcome::Closed);
    let report = single_worker(table, prober, HostFilter::new(3, false), vec![22, 9999])
        .run()
        .await
        .unwrap();

    let probed = probed.lock().unwrap().clone();
    assert_eq!(probed[0], SocketAddr::new(HOST_A, 22));
    assert_eq!(probed.len(), 3);
    assert_eq!(report.stats.total, 3);
}

#[tokio::test]
async fn filtered_host_is_discarded_after_threshold() {
    let mut table = JobTable::new();
    let ports = (1..=10).collect::<Vec<u16>>();
    table.insert("10.0.0.1".to_owned(), vec![HOST_A], &ports);

    let (prober, probed) = ScriptedProber::new(|_| ProbeOutcome::Filtered);
    let report = single_worker(table, prober, HostFilter::new(3, false), vec![])
        .run()
        .await
        .unwrap();

    assert_eq!(probed.lock().unwrap().len(), 3);
    assert_eq!(report.stats.discarded, 1);
    assert_eq!(report.stats.done, 10);
    assert_eq!(report.stats.total, 10);
    assert!(report.alive.is_empty());
}

#[tokio::test]
async fn unreachable_host_is_dropped_after_one_probe() {
    let mut table = JobTable::new();
    table.insert("10.0.0.1".to_owned(), vec![HOST_A], &[1, 2, 3, 4]);

    let (prober, probed) = ScriptedProber::new(|_| ProbeOutcome::NoRoute);
    let report = single_worker(table, prober, HostFilter::new(1014, false), vec![])
        .run()
        .await
        .unwrap();

    assert_eq!(probed.lock().unwrap().len(), 1);
    assert_eq!(report.stats.discarded, 1);
    assert_eq!(report.stats.done, 4);
}

#[tokio::test]
async fn alive_host_keeps_every_port() {
    let mut table = JobTable::new();
    table.insert(
        "10.0.0.1-2".to_owned(),
        vec![HOST_A, HOST_B],
        &[22, 1, 2, 3, 4, 5],
    );

    let (prober, probed) = ScriptedProber::new(|socket| {
        if socket == SocketAddr::new(HOST_A, 22) {
            ProbeOutcome::Open
        } else {
            ProbeOutcome::Filtered
        }
    });
    let report = single_worker(table, prober, HostFilter::new(1, false), vec![])
        .run()
        .await
        .unwrap();

    let probed = probed.lock().unwrap().clone();
    assert_eq!(probed.iter().filter(|socket| socket.ip() == HOST_A).count(), 6);
    assert_eq!(probed.iter().filter(|socket| socket.ip() == HOST_B).count(), 1);
    assert_eq!(report.open, [SocketAddr::new(HOST_A, 22)]);
    assert_eq!(report.alive, [HOST_A]);
    assert_eq!(report.stats.discarded, 1);
    assert_eq!(report.stats.done, 12);
}

#[tokio::test]
async fn force_mode_probes_everything() {
    let mut table = JobTable::new();
    table.insert("10.0.0.1".to_owned(), vec![HOST_A], &[1, 2, 3, 4, 5]);

    let (prober, probed) = ScriptedProber::new(|_| ProbeOutcome::Filtered);
    let report = single_worker(table, prober, HostFilter::new(1, true), vec![])
        .run()
        .await
        .unwrap();

    assert_eq!(probed.lock().unwrap().len(), 5);
    assert_eq!(report.stats.discarded, 0);
}

#[tokio::test]
async fn many_workers_finish_every_job() {
    let mut table = JobTable::new();
    let hosts = (1..=50)
        .map(|last| IpAddr::V4(Ipv4Addr::new(10, 0, 1, last)))
        .collect();
    let ports = (1..=40).collect::<Vec<u16>>();
    table.insert("10.0.1.1-50".to_owned(), hosts, &ports);

    let (prober, probed) = ScriptedProber::new(|socket| {
        if socket.port() == 7 {
            ProbeOutcome::Open
        } else {
            ProbeOutcome::Closed
        }
    });
    let scanner = Scanner::new(
        table,
        prober,
        HostFilter::new(3, false),
        32,
        8,
        vec![7],
        Some(Duration::from_millis(10)),
        quiet(),
    );
    let report = scanner.run().await.unwrap();

    assert_eq!(probed.lock().unwrap().len(), 2_000);
    assert_eq!(report.stats.done, 2_000);
    assert_eq!(report.stats.open, 50);
    assert_eq!(report.stats.up, 50);
    assert_eq!(report.alive.len(), 50);
}

#[tokio::test]
async fn loopback_scan_finds_listener() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap();
    let closed = {
        let spare = TcpListener::bind("127.0.0.1:0").await.unwrap();
        spare.local_addr().unwrap()
    };

    let mut table = JobTable::new();
    table.insert(
        "127.0.0.1".to_owned(),
        vec![open.ip()],
        &[open.port(), closed.port()],
    );
    let scanner = Scanner::new(
        table,
        SocketProber::new(false, false, Duration::from_secs(2), ""),
        HostFilter::new(1014, false),
        4,
        16,
        vec![],
        None,
        quiet(),
    );
    let report = scanner.run().await.unwrap();

    assert_eq!(report.open, [open]);
    assert_eq!(report.alive, [open.ip()]);
    assert_eq!(report.stats.done, 2);
    assert_eq!(report.stats.up, 1);
    drop(listener);
}

/// Panics on the given port, closed everywhere else.
struct FailsOnPort(u16);

impl Prober for FailsOnPort {
    async fn probe(&self, socket: SocketAddr) -> ProbeOutcome {
        assert_ne!(socket.port(), self.0, "worker blew up on {socket}");
        ProbeOutcome::Closed
    }
}

#[tokio::test]
async fn dead_worker_makes_the_run_incomplete() {
    let mut table = JobTable::new();
    let ports = (1..=20).collect::<Vec<u16>>();
    table.insert("10.0.0.1".to_owned(), vec![HOST_A], &ports);

    let scanner = Scanner::new(
        table,
        FailsOnPort(3),
        HostFilter::new(1014, false),
        2,
        4,
        vec![],
        None,
        quiet(),
    );
    let err = scanner.run().await.unwrap_err();

    assert!(matches!(err, ScanError::Incomplete { done: 19, total: 20 }));
    assert!(err.to_string().contains("19 of 20 tasks finished"));
}

#[tokio::test]
async fn run_ends_when_every_worker_is_gone() {
    let mut table = JobTable::new();
    let ports = (1..=50).collect::<Vec<u16>>();
    table.insert("10.0.0.1-2".to_owned(), vec![HOST_A, HOST_B], &ports);

    let err = single_worker(table, FailsOnPort(1), HostFilter::new(1014, false), vec![])
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, ScanError::Incomplete { done: 0, total: 100 }));
}
