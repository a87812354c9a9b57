//! This crate exposes the internal functionality of the sprayscan port
//! scanner.
//!
//! sprayscan probes many `host:port` pairs with plain TCP connects (or
//! UDP sends) and gives up on hosts that keep timing out, so wide ranges
//! of mostly dead addresses finish quickly.
//!
//! ## Architecture Overview
//!
//! The scanning process follows this flow:
//!
//! 1. **Input Processing**: targets are expanded by [`address`] (CIDR blocks,
//!    octet patterns such as `10.0.1-2.*`, hostnames) and port specs by
//!    [`port_strategy`] (ranges, [`alias`] names, optional fuzz ports)
//! 2. **Job Table**: [`scanner::job_table::JobTable`] records which target
//!    asked for which port, without building the full product
//! 3. **Scheduling**: [`scanner::Scanner`] feeds a bounded queue drained by
//!    a fixed pool of workers, priority ports first
//! 4. **Probing**: [`scanner::probe`] connects and classifies the failure
//!    text into a [`scanner::probe::ProbeOutcome`]
//! 5. **Host filtering**: [`scanner::host_filter`] stops probing hosts
//!    after enough consecutive timeouts
//!
//! ## Basic Usage Example
//!
//! ```rust
//! use std::{net::IpAddr, time::Duration};
//!
//! use sprayscan::scanner::host_filter::HostFilter;
//! use sprayscan::scanner::job_table::JobTable;
//! use sprayscan::scanner::probe::SocketProber;
//! use sprayscan::scanner::{OutputStyle, Scanner};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut table = JobTable::new();
//!     let hosts = vec!["127.0.0.1".parse::<IpAddr>().unwrap()];
//!     table.insert("127.0.0.1".to_owned(), hosts, &[22, 80, 443]);
//!
//!     let scanner = Scanner::new(
//!         table,
//!         SocketProber::new(false, false, Duration::from_millis(200), ""),
//!         HostFilter::new(1014, false),
//!         64,                         // Workers
//!         1014,                       // Queue capacity
//!         vec![],                     // Priority ports
//!         None,                       // No progress lines
//!         OutputStyle::default(),
//!     );
//!
//!     let report = scanner.run().await.unwrap();
//!     assert_eq!(report.stats.done, 3);
//! }
//! ```
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod error;

pub mod alias;

pub mod input;

pub mod scanner;

pub mod port_strategy;

pub mod address;
