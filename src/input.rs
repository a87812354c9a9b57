//! Provides a means to read, parse and hold configuration options for scans.
use crate::error::ScanError;
use clap::{Parser, ValueEnum};
use rand::seq::SliceRandom;
use serde_derive::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Represents the order in which default ports and raw targets are fed
/// to the scheduler.
///   - Serial keeps the order they were given in.
///   - Random shuffles them, which spreads load across hosts and ports.
#[derive(Deserialize, Debug, ValueEnum, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    Serial,
    Random,
}

impl ScanOrder {
    /// Reorders `items` in place according to the strategy.
    pub fn arrange<T>(self, items: &mut [T]) {
        if self == Self::Random {
            items.shuffle(&mut rand::rng());
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sprayscan",
    version = env!("CARGO_PKG_VERSION"),
    max_term_width = 120,
    help_template = "{bin} {version}\n{about}\n\nUSAGE:\n    {usage}\n\nOPTIONS:\n{options}",
    after_help = "TARGETS:\n    192.168.1.0/24\n    192.168.1.*\n    192.168.1-12.1\n    192.168.*.1:22,80-90,8080\n    github.com:22,443,web1",
)]
#[allow(clippy::struct_excessive_bools)]
/// Adaptive connect port scanner.
/// Hosts that keep timing out are dropped automatically so wide ranges
/// finish in reasonable time.
pub struct Opts {
    /// Targets to scan: hosts, CIDRs or octet patterns, each optionally
    /// followed by `:PORTS` to override the default ports for that target.
    /// IPv6 targets take ports only inside brackets: `[fe80::/120]:22`.
    pub targets: Vec<String>,

    /// Read targets from a file, one per line. Lines starting with '#' are ignored.
    #[arg(short, long, value_parser)]
    pub input_file: Option<PathBuf>,

    /// Default ports: comma separated ports, ranges (1-1000, -1024, 8000-) or alias names.
    #[arg(short, long, default_value = "common")]
    pub ports: String,

    /// Ports appended to the default ports.
    #[arg(long)]
    pub add_ports: Option<String>,

    /// Ports scanned first across every host before the rest. Example: 22,80,445
    #[arg(long, default_value = "common")]
    pub priority_ports: String,

    /// Skip the priority pass and scan ports in table order only.
    #[arg(long)]
    pub no_priority: bool,

    /// Ports removed from every target.
    #[arg(short, long)]
    pub exclude_ports: Option<String>,

    /// Number of concurrent workers.
    #[arg(short = 't', long, default_value = "256")]
    pub threads: usize,

    /// The timeout in milliseconds before a port is assumed to be filtered.
    #[arg(short = 'T', long, default_value = "1014")]
    pub timeout: u64,

    /// Discard a host after this many consecutive filtered ports.
    #[arg(short = 'a', long, default_value = "1014", value_parser = clap::value_parser!(u32).range(1..))]
    pub auto_discard: u32,

    /// Never discard hosts; probe every port.
    #[arg(short = 'A', long)]
    pub force: bool,

    /// UDP spray mode: send the payload to every port without waiting for replies.
    #[arg(short, long)]
    pub udp: bool,

    /// Send the payload after every successful TCP connect.
    #[arg(short = 'E', long)]
    pub echo: bool,

    /// Payload for echo and UDP mode. `%port%` is replaced with the port.
    #[arg(short, long, default_value = "%port%\n")]
    pub data: String,

    /// Seconds between progress lines.
    #[arg(short = 'D', long, default_value = "5")]
    pub progress_delay: u64,

    /// Also probe ports derived from the requested ones (8080 -> 8081, 18080, ...).
    #[arg(long)]
    pub fuzz: bool,

    /// Only print hosts that answered, not individual ports.
    #[arg(long)]
    pub alive: bool,

    /// Skip targets that fail to parse or resolve instead of aborting.
    #[arg(long)]
    pub lenient: bool,

    /// Leave out the network and broadcast addresses of CIDR blocks.
    #[arg(long)]
    pub usable_hosts: bool,

    /// The order of scanning to be performed. "serial" keeps the given
    /// order of ports and targets, "random" shuffles them.
    #[arg(long, value_enum, ignore_case = true, default_value = "random")]
    pub scan_order: ScanOrder,

    /// A comma-delimited list or file of DNS resolvers.
    #[arg(long)]
    pub resolver: Option<String>,

    /// Automatically ups the ULIMIT with the value you provided.
    #[arg(long)]
    pub ulimit: Option<u64>,

    /// Greppable mode. Only output results, no banner or decoration.
    #[arg(short, long)]
    pub greppable: bool,

    /// Accessible mode. Turns off features which negatively affect screen readers.
    #[arg(long)]
    pub accessible: bool,

    /// Show closed and filtered ports as they happen.
    #[arg(short, long)]
    pub verbose: bool,

    /// Whether to ignore the configuration file or not.
    #[arg(short, long)]
    pub no_config: bool,

    /// Custom path to config file
    #[arg(short, long, value_parser)]
    pub config_path: Option<PathBuf>,
}

impl Opts {
    pub fn read() -> Self {
        Self::parse()
    }

    /// Merge values found within the user configuration file into the
    /// command line options.
    pub fn merge(&mut self, config: &Config) {
        if !self.no_config {
            self.merge_required(config);
            self.merge_optional(config);
        }
    }

    fn merge_required(&mut self, config: &Config) {
        macro_rules! merge_required {
            ($($field: ident),+) => {
                $(
                    if let Some(e) = &config.$field {
                        self.$field = e.clone();
                    }
                )+
            }
        }

        merge_required!(
            ports,
            priority_ports,
            no_priority,
            threads,
            timeout,
            auto_discard,
            force,
            udp,
            echo,
            data,
            progress_delay,
            fuzz,
            alive,
            lenient,
            usable_hosts,
            scan_order,
            greppable,
            accessible
        );
    }

    fn merge_optional(&mut self, config: &Config) {
        macro_rules! merge_optional {
            ($($field: ident),+) => {
                $(
                    if config.$field.is_some() {
                        self.$field = config.$field.clone();
                    }
                )+
            }
        }

        merge_optional!(add_ports, exclude_ports, resolver, ulimit);
    }

    /// The default port specification with `--add-ports` appended.
    pub fn port_spec(&self) -> String {
        match &self.add_ports {
            Some(extra) => format!("{},{extra}", self.ports),
            None => self.ports.clone(),
        }
    }

    /// The priority port specification, or `None` with `--no-priority`.
    pub fn priority_spec(&self) -> Option<&str> {
        (!self.no_priority).then_some(self.priority_ports.as_str())
    }
}

impl Default for Opts {
    fn default() -> Self {
        Self {
            targets: vec![],
            input_file: None,
            ports: "common".to_owned(),
            add_ports: None,
            priority_ports: "common".to_owned(),
            no_priority: false,
            exclude_ports: None,
            threads: 256,
            timeout: 1014,
            auto_discard: 1014,
            force: false,
            udp: false,
            echo: false,
            data: "%port%\n".to_owned(),
            progress_delay: 5,
            fuzz: false,
            alive: false,
            lenient: false,
            usable_hosts: false,
            scan_order: ScanOrder::Serial,
            resolver: None,
            ulimit: None,
            greppable: true,
            accessible: false,
            verbose: false,
            no_config: true,
            config_path: None,
        }
    }
}

/// Struct used to deserialize the options specified within our config file.
/// These will be further merged with our command line arguments in order to
/// generate the final Opts struct.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    ports: Option<String>,
    add_ports: Option<String>,
    priority_ports: Option<String>,
    no_priority: Option<bool>,
    exclude_ports: Option<String>,
    threads: Option<usize>,
    timeout: Option<u64>,
    auto_discard: Option<u32>,
    force: Option<bool>,
    udp: Option<bool>,
    echo: Option<bool>,
    data: Option<String>,
    progress_delay: Option<u64>,
    fuzz: Option<bool>,
    alive: Option<bool>,
    lenient: Option<bool>,
    usable_hosts: Option<bool>,
    scan_order: Option<ScanOrder>,
    resolver: Option<String>,
    ulimit: Option<u64>,
    greppable: Option<bool>,
    accessible: Option<bool>,
}

impl Config {
    /// Reads the configuration file with TOML format and parses it into a
    /// Config struct. A missing file yields the empty configuration.
    ///
    /// # Format
    ///
    /// ports = "common,8000-8100"
    /// priority_ports = "22,80,445"
    /// no_priority = false
    /// threads = 512
    /// scan_order = "Serial"
    /// auto_discard = 200
    ///
    pub fn read(custom_config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let config_path = custom_config_path.unwrap_or_else(default_config_path);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(|source| ScanError::ConfigIo {
            path: config_path.clone(),
            source,
        })?;

        Self::from_toml(&content).map_err(|e| {
            anyhow::anyhow!("found {e} in configuration file {}", config_path.display())
        })
    }

    fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Constructs default path to config toml
pub fn default_config_path() -> PathBuf {
    let mut config_path = dirs::home_dir().unwrap_or_default();
    config_path.push(".sprayscan.toml");
    config_path
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use parameterized::parameterized;

    use super::{Config, Opts, ScanOrder};
    use crate::alias::COMMON_PORTS;
    use crate::port_strategy::parse_ports;

    fn sample_config() -> Config {
        Config {
            ports: Some("web1".to_owned()),
            threads: Some(1_000),
            timeout: Some(300),
            auto_discard: Some(50),
            scan_order: Some(ScanOrder::Random),
            accessible: Some(true),
            priority_ports: Some("22".to_owned()),
            resolver: Some("1.1.1.1".to_owned()),
            ..Config::default()
        }
    }

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
    }

    #[parameterized(input = {
        vec!["sprayscan", "10.0.0.1"],
        vec!["sprayscan", "10.0.0.1", "10.0.1.0/24:22,80"],
        vec!["sprayscan", "-p", "1-1000", "10.0.0.*"],
    }, targets = {
        vec!["10.0.0.1"],
        vec!["10.0.0.1", "10.0.1.0/24:22,80"],
        vec!["10.0.0.*"],
    })]
    fn parse_positional_targets(input: Vec<&str>, targets: Vec<&str>) {
        let opts = Opts::parse_from(input);
        assert_eq!(opts.targets, targets);
    }

    #[test]
    fn cli_defaults() {
        let opts = Opts::parse_from(["sprayscan", "127.0.0.1"]);
        assert_eq!(opts.ports, "common");
        assert_eq!(opts.threads, 256);
        assert_eq!(opts.timeout, 1014);
        assert_eq!(opts.auto_discard, 1014);
        assert_eq!(opts.data, "%port%\n");
        assert_eq!(opts.scan_order, ScanOrder::Random);
        assert!(!opts.force && !opts.udp && !opts.fuzz);
        assert_eq!(opts.priority_spec(), Some("common"));
    }

    #[test]
    fn priority_pass_defaults_to_common_ports() {
        let opts = Opts::parse_from(["sprayscan", "127.0.0.1"]);
        let priority = parse_ports(opts.priority_spec().unwrap(), false).unwrap();
        assert_eq!(priority, COMMON_PORTS);
        assert_eq!(Opts::default().priority_spec(), Some("common"));
    }

    #[test]
    fn no_priority_turns_the_pass_off() {
        let opts = Opts::parse_from(["sprayscan", "--no-priority", "127.0.0.1"]);
        assert_eq!(opts.priority_spec(), None);

        let mut opts = Opts::default();
        opts.merge_required(&Config::from_toml("no_priority = true
").unwrap());
        assert_eq!(opts.priority_spec(), None);
    }

    #[test]
    fn zero_discard_threshold_is_rejected() {
        assert!(Opts::try_parse_from(["sprayscan", "-a", "0", "127.0.0.1"]).is_err());
    }

    #[test]
    fn add_ports_are_appended() {
        let opts = Opts::parse_from(["sprayscan", "-p", "web1", "--add-ports", "9000-9010"]);
        assert_eq!(opts.port_spec(), "web1,9000-9010");
    }

    #[test]
    fn opts_no_merge_when_config_is_ignored() {
        let mut opts = Opts::default();
        opts.merge(&sample_config());

        assert_eq!(opts.ports, "common");
        assert_eq!(opts.threads, 256);
        assert!(!opts.accessible);
        assert_eq!(opts.scan_order, ScanOrder::Serial);
        assert_eq!(opts.priority_ports, "common");
    }

    #[test]
    fn opts_merge_required_arguments() {
        let mut opts = Opts::default();
        let config = sample_config();

        opts.merge_required(&config);

        assert_eq!(opts.ports, "web1");
        assert_eq!(opts.threads, 1_000);
        assert_eq!(opts.timeout, 300);
        assert_eq!(opts.auto_discard, 50);
        assert_eq!(opts.scan_order, ScanOrder::Random);
        assert_eq!(opts.priority_ports, "22");
        assert!(opts.accessible);
        assert!(!opts.force);
        assert!(!opts.no_priority);
    }

    #[test]
    fn opts_merge_optional_arguments() {
        let mut opts = Opts::default();
        let config = sample_config();

        opts.merge_optional(&config);

        assert_eq!(opts.priority_ports, "common");
        assert_eq!(opts.resolver.as_deref(), Some("1.1.1.1"));
        assert_eq!(opts.exclude_ports, None);
    }

    #[test]
    fn config_reads_toml() {
        let config = Config::from_toml(
            "ports = \"22,80\"\nthreads = 64\nscan_order = \"Serial\"\nforce = true\n",
        )
        .unwrap();
        assert_eq!(config.ports.as_deref(), Some("22,80"));
        assert_eq!(config.threads, Some(64));
        assert_eq!(config.scan_order, Some(ScanOrder::Serial));
        assert_eq!(config.force, Some(true));
    }

    #[test]
    fn config_rejects_wrong_types() {
        assert!(Config::from_toml("threads = \"many\"").is_err());
    }

    #[test]
    fn serial_order_keeps_items() {
        let mut items = vec![3, 1, 2];
        ScanOrder::Serial.arrange(&mut items);
        assert_eq!(items, vec![3, 1, 2]);
    }
}
