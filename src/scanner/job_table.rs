//! Registry of which raw target wants which port.
//!
//! Jobs are never stored: the table keeps `port -> targets` and
//! `target -> hosts`, and the host by port product is walked lazily one
//! port at a time.
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};

use crate::address::Target;

#[derive(Debug, Default)]
pub struct JobTable {
    /// Expanded hosts of each raw target, in submission order.
    targets: Vec<(String, Vec<IpAddr>)>,
    /// Ports in first-requested order.
    ports: Vec<u16>,
    /// Indices into `targets` requesting each port, in submission order.
    requested_by: HashMap<u16, Vec<usize>>,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from parsed targets. Targets without their own
    /// port list use `default_ports`.
    pub fn from_targets(targets: Vec<Target>, default_ports: &[u16]) -> Self {
        let mut table = Self::new();
        for target in targets {
            let ports = target.ports.as_deref().unwrap_or(default_ports);
            table.insert(target.raw.clone(), target.hosts, ports);
        }
        table
    }

    pub fn insert(&mut self, raw: String, hosts: Vec<IpAddr>, ports: &[u16]) {
        let index = self.targets.len();
        self.targets.push((raw, hosts));

        for &port in ports {
            let requesters = self.requested_by.entry(port).or_insert_with(|| {
                self.ports.push(port);
                Vec::new()
            });
            if requesters.last() != Some(&index) {
                requesters.push(index);
            }
        }
    }

    /// Drops `port` for every target. Returns whether any target had it.
    pub fn exclude_port(&mut self, port: u16) -> bool {
        self.take_port(port).is_some()
    }

    /// Removes `port` from the table, returning the targets that asked for it.
    pub fn take_port(&mut self, port: u16) -> Option<Vec<usize>> {
        let requesters = self.requested_by.remove(&port)?;
        self.ports.retain(|&p| p != port);
        Some(requesters)
    }

    /// Jobs for `port` across the given targets, hosts in target order.
    pub fn jobs_on<'a>(
        &'a self,
        port: u16,
        requesters: &'a [usize],
    ) -> impl Iterator<Item = SocketAddr> + 'a {
        requesters
            .iter()
            .flat_map(move |&index| self.targets[index].1.iter())
            .map(move |&host| SocketAddr::new(host, port))
    }

    /// Every remaining job, one port at a time.
    pub fn jobs(&self) -> impl Iterator<Item = SocketAddr> + '_ {
        self.ports.iter().flat_map(move |port| {
            let requesters = self.requested_by.get(port).map_or(&[][..], Vec::as_slice);
            self.jobs_on(*port, requesters)
        })
    }

    /// Remaining ports in table order.
    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Number of jobs the table would produce.
    pub fn len(&self) -> u64 {
        self.requested_by
            .values()
            .flatten()
            .map(|&index| self.targets[index].1.len() as u64)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct hosts over all targets.
    pub fn host_count(&self) -> usize {
        self.targets
            .iter()
            .flat_map(|(_, hosts)| hosts)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Raw target strings in submission order.
    pub fn raw_targets(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(|(raw, _)| raw.as_str())
    }
}
