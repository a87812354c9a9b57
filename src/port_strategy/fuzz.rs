//! Speculative neighbours of requested ports.
//!
//! Services are often moved to a port that "looks like" the usual one:
//! `80` becomes `8080`, `8080` becomes `18080` or `8081`. These helpers
//! derive such variants so they can be probed alongside the requested port.
use itertools::Itertools;

use super::{LOWEST_PORT_NUMBER, TOP_PORT_NUMBER};

/// Variants derived from a single port. The port itself is not included.
///
/// - two digits: the port written twice (`80` -> `8080`)
/// - four digits: `+10000` steps and an extra trailing digit
/// - the numeric neighbours `port - 1` and `port + 1`
/// - up to four digits: the first digit prefixed and the last digit suffixed
///
/// Candidates above 65535 are dropped.
pub fn fuzz_port(port: u16) -> Vec<u16> {
    let digits = port.to_string();
    let base = u32::from(port);
    let mut candidates: Vec<u32> = Vec::new();

    match digits.len() {
        2 => candidates.extend(format!("{digits}{digits}").parse::<u32>().ok()),
        4 => {
            candidates.extend((1..).map(|step| base + step * 10_000).take_while(|&p| p <= 65_535));
            candidates.extend((0..=9).map(|digit| base * 10 + digit));
        }
        _ => {}
    }

    if port > LOWEST_PORT_NUMBER {
        candidates.push(base - 1);
    }
    if port < TOP_PORT_NUMBER {
        candidates.push(base + 1);
    }

    if digits.len() <= 4 {
        let first = &digits[..1];
        let last = &digits[digits.len() - 1..];
        candidates.extend(format!("{first}{digits}").parse::<u32>().ok());
        candidates.extend(format!("{digits}{last}").parse::<u32>().ok());
    }

    candidates
        .into_iter()
        .filter(|&candidate| candidate <= u32::from(TOP_PORT_NUMBER) && candidate != base)
        .map(|candidate| candidate as u16)
        .unique()
        .collect()
}

/// The requested ports followed by every fuzz variant, without duplicates.
pub fn fuzz_ports(ports: &[u16]) -> Vec<u16> {
    ports
        .iter()
        .copied()
        .chain(ports.iter().flat_map(|&port| fuzz_port(port)))
        .unique()
        .collect()
}
