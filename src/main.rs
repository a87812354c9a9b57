use sprayscan::address::{
    get_resolver, parse_targets, read_targets_from_file, BoundaryPolicy, TargetOptions,
};
use sprayscan::input::{Config, Opts};
use sprayscan::port_strategy::{parse_ports, PortStrategy};
use sprayscan::scanner::host_filter::HostFilter;
use sprayscan::scanner::job_table::JobTable;
use sprayscan::scanner::probe::SocketProber;
use sprayscan::scanner::{OutputStyle, Scanner};
use sprayscan::{detail, fatal, warning};

use chrono::Local;
use clap::CommandFactory;
use log::debug;
use std::time::Duration;

/// File descriptors kept free for stdio, the resolver and the runtime.
const RESERVED_FILES: u64 = 100;

#[tokio::main]
async fn main() {
    let opts = Opts::read();

    let default_filter = if opts.verbose { "warn,sprayscan=debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = run(opts).await {
        fatal!(format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(mut opts: Opts) -> anyhow::Result<()> {
    if !opts.no_config {
        let config = Config::read(opts.config_path.clone())?;
        opts.merge(&config);
    }
    debug!("Main() `opts` arguments are {opts:?}");

    let mut raw_targets = opts.targets.clone();
    if let Some(path) = &opts.input_file {
        raw_targets.extend(read_targets_from_file(path).await?);
    }
    if raw_targets.is_empty() {
        Opts::command().print_help()?;
        return Ok(());
    }

    let default_ports =
        PortStrategy::pick(parse_ports(&opts.port_spec(), opts.fuzz)?, opts.scan_order).order();
    let priority_ports = optional_ports(opts.priority_spec())?;
    let exclude_ports = optional_ports(opts.exclude_ports.as_deref())?;

    opts.scan_order.arrange(&mut raw_targets);
    let resolver = get_resolver(opts.resolver.as_deref()).await;
    let target_options = TargetOptions {
        policy: if opts.usable_hosts {
            BoundaryPolicy::UsableHosts
        } else {
            BoundaryPolicy::AllAddresses
        },
        lenient: opts.lenient,
        fuzz: opts.fuzz,
        order: opts.scan_order,
        greppable: opts.greppable,
        accessible: opts.accessible,
    };
    let targets = parse_targets(&raw_targets, &target_options, &resolver).await?;

    let mut table = JobTable::from_targets(targets, &default_ports);
    for port in exclude_ports {
        if table.exclude_port(port) {
            debug!("Excluded port {port}");
        }
    }
    if table.is_empty() {
        warning!("No jobs left to run.", opts.greppable, opts.accessible);
        return Ok(());
    }

    #[cfg(unix)]
    let workers = workers_for_limit(&opts, adjust_ulimit_size(&opts));
    #[cfg(not(unix))]
    let workers = opts.threads;

    print_opening(&opts, &table);

    let scanner = Scanner::new(
        table,
        SocketProber::new(
            opts.udp,
            opts.echo,
            Duration::from_millis(opts.timeout),
            opts.data.clone(),
        ),
        HostFilter::new(opts.auto_discard, opts.force),
        workers,
        usize::try_from(opts.timeout).unwrap_or(usize::MAX),
        priority_ports,
        Some(Duration::from_secs(opts.progress_delay)),
        OutputStyle {
            greppable: opts.greppable,
            accessible: opts.accessible,
            alive_only: opts.alive,
            annotate: !opts.greppable,
        },
    );
    let report = scanner.run().await?;

    let finished = format!(
        "{} at {}",
        report.summary_line(),
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if opts.greppable {
        eprintln!("{finished}");
    } else {
        detail!(finished, opts.greppable, opts.accessible);
    }

    Ok(())
}

/// Parses an optional port list without fuzzing, keeping the given order.
fn optional_ports(spec: Option<&str>) -> anyhow::Result<Vec<u16>> {
    Ok(spec
        .map(|spec| parse_ports(spec, false))
        .transpose()?
        .unwrap_or_default())
}

/// Prints the opening line.
fn print_opening(opts: &Opts, table: &JobTable) {
    debug!("Printing opening");
    let mode = if opts.udp {
        " (UDP spray)"
    } else if opts.echo {
        " (TCP Echo)"
    } else {
        ""
    };
    let opening = format!(
        "Started at {}: {} hosts, {} ports, {} tasks{mode}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        table.host_count(),
        table.ports().len(),
        table.len(),
    );
    detail!(opening, opts.greppable, opts.accessible);
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable,
                opts.accessible
            );
        } else {
            warning!(
                "ERROR. Failed to set ulimit value.",
                opts.greppable,
                opts.accessible
            );
        }
    } else {
        let wanted = u64::try_from(opts.threads)
            .unwrap_or(u64::MAX)
            .saturating_add(RESERVED_FILES);
        if let Err(e) = rlimit::increase_nofile_limit(wanted) {
            debug!("Could not raise the file limit to {wanted}: {e}");
        }
    }

    Resource::NOFILE.get().map_or(u64::MAX, |(soft, _)| soft)
}

/// Lowers the worker count when the open file limit cannot hold one
/// socket per worker.
#[cfg(unix)]
fn workers_for_limit(opts: &Opts, ulimit: u64) -> usize {
    let threads = u64::try_from(opts.threads).unwrap_or(u64::MAX);
    if threads.saturating_add(RESERVED_FILES) <= ulimit {
        return opts.threads;
    }

    let reduced = ulimit.saturating_sub(RESERVED_FILES).max(1);
    warning!(
        format!(
            "File limit {ulimit} is lower than {} workers need, using {reduced} workers. Raise it with --ulimit.",
            opts.threads
        ),
        opts.greppable,
        opts.accessible
    );
    usize::try_from(reduced).unwrap_or(opts.threads)
}
