//! Provides functions to expand raw targets into concrete host addresses.
//!
//! A raw target is `TARGET[:PORTS]` where `TARGET` is one of
//!
//! - a CIDR block: `192.168.1.0/24`
//! - an octet pattern, each of the four fields being `*`, `lo-hi` or a
//!   number: `192.168.1-12.*`
//! - a literal address or host name: `10.0.0.1`, `[::1]`, `example.com`
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

use cidr_utils::cidr::{IpCidr, IpInet};
use futures::{stream, StreamExt};
use hickory_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use itertools::Itertools;
use log::debug;
use tokio::{fs, io};

use crate::error::ScanError;
use crate::input::ScanOrder;
use crate::port_strategy::{parse_ports, PortStrategy};
use crate::warning;

/// Smallest IPv4 prefix accepted. A /8 already holds 16M addresses.
const MIN_IPV4_PREFIX: u8 = 8;
/// Smallest IPv6 prefix accepted.
const MIN_IPV6_PREFIX: u8 = 104;
/// Upper bound on the number of addresses one octet pattern may produce.
const MAX_PATTERN_HOSTS: usize = 1 << 24;

/// Which addresses of a CIDR block are scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Every address in the block, network and broadcast included.
    AllAddresses,
    /// Skip the network and broadcast address of IPv4 blocks up to /30.
    UsableHosts,
}

/// A raw target together with its expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub raw: String,
    pub hosts: Vec<IpAddr>,
    /// Ports requested through the `:PORTS` suffix, overriding the defaults.
    pub ports: Option<Vec<u16>>,
}

/// Run-level switches that shape target expansion.
#[derive(Debug, Clone, Copy)]
pub struct TargetOptions {
    pub policy: BoundaryPolicy,
    pub lenient: bool,
    pub fuzz: bool,
    pub order: ScanOrder,
    pub greppable: bool,
    pub accessible: bool,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            policy: BoundaryPolicy::AllAddresses,
            lenient: false,
            fuzz: false,
            order: ScanOrder::Serial,
            greppable: true,
            accessible: false,
        }
    }
}

/// Expands every raw target, keeping their order.
///
/// In lenient mode targets that fail are reported and skipped; otherwise
/// the first failure is returned.
pub async fn parse_targets(
    raw_targets: &[String],
    options: &TargetOptions,
    resolver: &TokioAsyncResolver,
) -> Result<Vec<Target>, ScanError> {
    let results = stream::iter(raw_targets)
        .map(|raw| async move { parse_target(raw, options, resolver).await })
        .buffered(10)
        .collect::<Vec<_>>()
        .await;

    let mut targets = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(target) => targets.push(target),
            Err(e) if options.lenient => {
                warning!(
                    format!("Skipping target: {e}"),
                    options.greppable,
                    options.accessible
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(targets)
}

/// Parses one `TARGET[:PORTS]` string.
///
/// ```rust
/// # use sprayscan::address::{parse_target, get_resolver, TargetOptions};
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let resolver = get_resolver(None).await;
/// let target = parse_target("10.0.0.0/30:22", &TargetOptions::default(), &resolver)
///     .await
///     .unwrap();
/// assert_eq!(target.hosts.len(), 4);
/// assert_eq!(target.ports, Some(vec![22]));
/// # });
/// ```
pub async fn parse_target(
    raw: &str,
    options: &TargetOptions,
    resolver: &TokioAsyncResolver,
) -> Result<Target, ScanError> {
    let (host_part, port_part) = split_target(raw.trim());

    let ports = port_part
        .map(|spec| parse_ports(spec, options.fuzz))
        .transpose()?
        .map(|ports| PortStrategy::pick(ports, options.order).order());

    let hosts = expand_host(host_part, options.policy, resolver).await?;
    debug!("{raw} expanded to {} hosts", hosts.len());

    Ok(Target {
        raw: raw.to_owned(),
        hosts,
        ports,
    })
}

/// Splits the optional `:PORTS` suffix off a raw target.
///
/// A bare IPv6 address or block (more than one `:`) is never split; use
/// `[addr]:PORTS` or `[block]:PORTS` to give it ports.
pub fn split_target(raw: &str) -> (&str, Option<&str>) {
    if let Some(rest) = raw.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            return (host, tail.strip_prefix(':'));
        }
    }

    if raw.matches(':').count() > 1 {
        return (raw, None);
    }

    match raw.split_once(':') {
        Some((host, ports)) => (host, Some(ports)),
        None => (raw, None),
    }
}

/// Expands the host part of a target by syntax: CIDR, octet pattern, or
/// a literal address or name.
pub async fn expand_host(
    spec: &str,
    policy: BoundaryPolicy,
    resolver: &TokioAsyncResolver,
) -> Result<Vec<IpAddr>, ScanError> {
    if spec.contains('/') {
        expand_cidr(spec, policy)
    } else if is_octet_pattern(spec) {
        expand_octet_pattern(spec)
    } else if let Ok(ip) = IpAddr::from_str(spec) {
        Ok(vec![ip])
    } else if spec.is_empty() {
        Err(ScanError::target_spec(spec, "empty target"))
    } else {
        let ips = resolve_ips_from_host(spec, resolver).await;
        if ips.is_empty() {
            Err(ScanError::UnresolvableHost(spec.to_owned()))
        } else {
            Ok(ips)
        }
    }
}

/// Every address of the block `spec` belongs to, in ascending order.
///
/// Host bits are masked off, so `10.0.0.7/30` covers `10.0.0.4-7`.
pub fn expand_cidr(spec: &str, policy: BoundaryPolicy) -> Result<Vec<IpAddr>, ScanError> {
    let address = spec.split_once('/').map_or(spec, |(address, _)| address);
    if IpAddr::from_str(address.trim()).is_err() {
        return Err(ScanError::target_spec(
            spec,
            format!("'{address}' is not a full address, expected a.b.c.d/n"),
        ));
    }

    let inet = IpInet::from_str(spec).map_err(|e| ScanError::target_spec(spec, e.to_string()))?;
    let network = inet.network();
    let prefix = network.network_length();

    let (min_prefix, family) = match network {
        IpCidr::V4(_) => (MIN_IPV4_PREFIX, "IPv4"),
        IpCidr::V6(_) => (MIN_IPV6_PREFIX, "IPv6"),
    };
    if prefix < min_prefix {
        return Err(ScanError::target_spec(
            spec,
            format!("/{prefix} is too large for {family} (minimum prefix: /{min_prefix})"),
        ));
    }

    let skip_edges =
        policy == BoundaryPolicy::UsableHosts && matches!(network, IpCidr::V4(_)) && prefix < 31;
    let first = network.first_address();
    let last = network.last_address();

    Ok(network
        .iter()
        .map(|inet| inet.address())
        .filter(|ip| !skip_edges || (*ip != first && *ip != last))
        .collect())
}

/// Whether `spec` is a dotted quad with at least one `*` or `lo-hi` field.
pub fn is_octet_pattern(spec: &str) -> bool {
    spec.matches('.').count() == 3
        && !spec.chars().any(|c| c.is_ascii_alphabetic())
        && spec.contains(['*', '-'])
}

/// Expands an octet pattern into the cartesian product of its fields.
///
/// The first field varies slowest: `10.0.0-1.*` yields `10.0.0.0`,
/// `10.0.0.1`, ... `10.0.0.255`, `10.0.1.0`, ... `10.0.1.255`.
pub fn expand_octet_pattern(spec: &str) -> Result<Vec<IpAddr>, ScanError> {
    let fields = spec
        .split('.')
        .map(|field| expand_octet(spec, field.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    if fields.len() != 4 {
        return Err(ScanError::target_spec(spec, "expected four octets"));
    }

    let size = fields.iter().map(Vec::len).product::<usize>();
    if size > MAX_PATTERN_HOSTS {
        return Err(ScanError::target_spec(
            spec,
            format!("pattern covers {size} addresses (maximum: {MAX_PATTERN_HOSTS})"),
        ));
    }

    Ok(fields
        .into_iter()
        .multi_cartesian_product()
        .map(|octets| IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])))
        .collect())
}

fn expand_octet(spec: &str, field: &str) -> Result<Vec<u8>, ScanError> {
    let parse = |value: &str| {
        value
            .trim()
            .parse::<u8>()
            .map_err(|_| ScanError::target_spec(spec, format!("invalid octet '{value}'")))
    };

    if field == "*" {
        return Ok((0..=u8::MAX).collect());
    }

    if let Some((lo, hi)) = field.split_once('-') {
        let (lo, hi) = (parse(lo)?, parse(hi)?);
        if lo >= hi {
            return Err(ScanError::target_spec(
                spec,
                format!("octet range '{field}' must be ascending"),
            ));
        }
        return Ok((lo..=hi).collect());
    }

    Ok(vec![parse(field)?])
}

/// Uses DNS to get the IPs associated with host, system resolver first.
async fn resolve_ips_from_host(source: &str, backup_resolver: &TokioAsyncResolver) -> Vec<IpAddr> {
    if let Ok(addrs) = tokio::net::lookup_host((source, 80)).await {
        addrs.map(|addr| addr.ip()).unique().collect()
    } else if let Ok(addrs) = backup_resolver.lookup_ip(source).await {
        addrs.iter().unique().collect()
    } else {
        debug!("{source} did not resolve");
        Vec::new()
    }
}

/// Derive a DNS resolver.
///
/// 1. if the `resolver` parameter has been set:
///     1. assume the parameter is a path and attempt to read IPs.
///     2. parse the input as a comma-separated list of IPs.
/// 2. if `resolver` is not set:
///    1. attempt to derive a resolver from the system config. (e.g.
///       `/etc/resolv.conf` on *nix).
///    2. finally, build a CloudFlare-based resolver (default
///       behaviour).
pub async fn get_resolver(resolver: Option<&str>) -> TokioAsyncResolver {
    match resolver {
        Some(r) => {
            let mut config = ResolverConfig::new();
            let resolver_ips = match read_resolver_from_file(r).await {
                Ok(ips) => ips,
                Err(_) => r
                    .split(',')
                    .filter_map(|r| IpAddr::from_str(r.trim()).ok())
                    .collect::<Vec<_>>(),
            };
            for ip in resolver_ips {
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(ip, 53),
                    Protocol::Udp,
                ));
            }
            TokioAsyncResolver::tokio(config, ResolverOpts::default())
        }
        None => TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|_| {
            TokioAsyncResolver::tokio(ResolverConfig::cloudflare_tls(), ResolverOpts::default())
        }),
    }
}

/// Parses an input file of IPs for use in DNS resolution.
async fn read_resolver_from_file(path: &str) -> io::Result<Vec<IpAddr>> {
    let ips = fs::read_to_string(path)
        .await?
        .lines()
        .filter_map(|line| IpAddr::from_str(line.trim()).ok())
        .collect();

    Ok(ips)
}

/// Reads raw targets from a file: one per line, blank lines and lines
/// starting with `#` skipped.
pub async fn read_targets_from_file(path: &Path) -> Result<Vec<String>, ScanError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ScanError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(target_lines(&content).collect())
}

fn target_lines(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
}
