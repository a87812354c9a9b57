//! Turns port specifications into ordered port lists.
//!
//! A specification is a comma separated list of tokens. Each token is an
//! alias name from [`crate::alias`], an inclusive range `lo-hi` (either
//! bound may be left out), or a single port.
mod fuzz;

pub use fuzz::{fuzz_port, fuzz_ports};

use crate::alias;
use crate::error::ScanError;
use crate::input::ScanOrder;
use itertools::Itertools;

pub const LOWEST_PORT_NUMBER: u16 = 1;
pub const TOP_PORT_NUMBER: u16 = 65535;

/// Expands `spec` into distinct ports, keeping first-seen order.
///
/// When `fuzz` is set, [`fuzz_ports`] variants are appended after the
/// requested ports.
///
/// ```rust
/// # use sprayscan::port_strategy::parse_ports;
/// assert_eq!(parse_ports("80-82,80", false).unwrap(), vec![80, 81, 82]);
/// assert!(parse_ports("100-90", false).is_err());
/// ```
pub fn parse_ports(spec: &str, fuzz: bool) -> Result<Vec<u16>, ScanError> {
    let mut ports = Vec::new();

    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        if let Some(alias_ports) = alias::lookup(token) {
            ports.extend_from_slice(alias_ports);
        } else if token.contains('-') {
            ports.extend(parse_port_range(spec, token)?);
        } else {
            ports.push(parse_single_port(spec, token)?);
        }
    }

    if ports.is_empty() {
        return Err(ScanError::port_spec(spec, "no ports or ranges given"));
    }

    let ports = ports.into_iter().unique().collect::<Vec<_>>();
    if fuzz {
        Ok(fuzz_ports(&ports))
    } else {
        Ok(ports)
    }
}

fn parse_port_range(spec: &str, range_str: &str) -> Result<impl Iterator<Item = u16>, ScanError> {
    let Some((start, end)) = range_str.split_once('-') else {
        return Err(ScanError::port_spec(spec, format!("'{range_str}' is not a range")));
    };
    if end.contains('-') {
        return Err(ScanError::port_spec(
            spec,
            format!("invalid range format '{range_str}', expected 'start-end'"),
        ));
    }

    let start = match start.trim() {
        "" => LOWEST_PORT_NUMBER,
        bound => parse_single_port(spec, bound)?,
    };
    let end = match end.trim() {
        "" => TOP_PORT_NUMBER,
        bound => parse_single_port(spec, bound)?,
    };

    if start > end {
        return Err(ScanError::port_spec(
            spec,
            format!("start port {start} is greater than end port {end} in range '{range_str}'"),
        ));
    }

    Ok(start..=end)
}

fn parse_single_port(spec: &str, port_str: &str) -> Result<u16, ScanError> {
    let port: u32 = port_str
        .parse()
        .map_err(|_| ScanError::port_spec(spec, format!("invalid port number '{port_str}'")))?;

    if port < u32::from(LOWEST_PORT_NUMBER) || port > u32::from(TOP_PORT_NUMBER) {
        return Err(ScanError::port_spec(
            spec,
            format!("port {port} must be between {LOWEST_PORT_NUMBER} and {TOP_PORT_NUMBER}"),
        ));
    }

    Ok(port as u16)
}

/// Represents the order in which a port list is handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortStrategy {
    Serial(Vec<u16>),
    Random(Vec<u16>),
}

impl PortStrategy {
    pub fn pick(ports: Vec<u16>, order: ScanOrder) -> Self {
        match order {
            ScanOrder::Serial => Self::Serial(ports),
            ScanOrder::Random => Self::Random(ports),
        }
    }

    /// Yields the ports, shuffled for [`PortStrategy::Random`].
    pub fn order(&self) -> Vec<u16> {
        match self {
            Self::Serial(ports) => ports.clone(),
            Self::Random(ports) => {
                let mut ports = ports.clone();
                ScanOrder::Random.arrange(&mut ports);
                ports
            }
        }
    }
}
