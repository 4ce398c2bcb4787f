use std::io;

use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use crate::config_error;
use crate::registry::{Registries, Registry};

/// Test modes known to the dispatcher, in their command-line spellings.
pub const TESTS: &[&str] = &[
    "cli", "build", "pingall", "pingpair", "iperf", "iperfudp", "all", "none",
];

/// Verbosity names, highest to lowest volume.
pub const VERBOSITY: &[&str] = &["debug", "info", "output", "warning", "error", "critical"];

/// Option defaults that are not registry default keys. Override files may
/// replace any of these before the command line is declared.
#[derive(Debug, Clone)]
pub struct Defaults {
    pub test: String,
    pub verbosity: String,
    pub ip: String,
    pub port: u16,
    pub listen_port: u16,
    pub prefix_len: u8,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            test: "cli".to_string(),
            verbosity: "info".to_string(),
            ip: "127.0.0.1".to_string(),
            port: 6633,
            listen_port: 6634,
            prefix_len: 8,
        }
    }
}

/// Finds `--custom <path>` (or `--custom=<path>`) in the raw argument list,
/// ahead of formal parsing, so the override file can add choice values the
/// parser must accept.
pub fn find_custom_file(argv: &[String]) -> io::Result<Option<String>> {
    let mut iter = argv.iter();
    while let Some(token) = iter.next() {
        if token == "--custom" {
            return match iter.next() {
                Some(path) => Ok(Some(path.clone())),
                None => Err(config_error("missing custom file argument for --custom")),
            };
        }
        if let Some(path) = token.strip_prefix("--custom=") {
            return Ok(Some(path.to_string()));
        }
    }
    Ok(None)
}

fn registry_arg<T>(name: &'static str, help: &'static str, reg: &Registry<T>) -> Arg {
    Arg::new(name)
        .long(name)
        .help(help)
        .value_parser(PossibleValuesParser::new(reg.choices()))
        .default_value(reg.default_key().to_string())
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).help(help).action(ArgAction::SetTrue)
}

/// Declares the command line. Choice options sourced from a registry expose
/// the registry's full key set and default key, so override merges done
/// beforehand are immediately legal values.
pub fn build_command(regs: &Registries, defaults: &Defaults) -> Command {
    Command::new("mnet")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Launch a network emulation session")
        .arg(registry_arg("switch", "Switch type", &regs.switches))
        .arg(registry_arg("host", "Host type", &regs.hosts))
        .arg(registry_arg("controller", "Controller type", &regs.controllers))
        .arg(
            Arg::new("topo")
                .long("topo")
                .help("Topology descriptor: name[,arg...][,key=value...]")
                .default_value(regs.topos.default_key().to_string()),
        )
        .arg(flag("clean", "Clean up the environment and exit").short('c'))
        .arg(
            Arg::new("custom")
                .long("custom")
                .help("Path to an override file, loaded before option parsing"),
        )
        .arg(
            Arg::new("test")
                .long("test")
                .help("Test to run once the session is up")
                .value_parser(PossibleValuesParser::new(TESTS))
                .default_value(defaults.test.clone()),
        )
        .arg(flag("xterms", "Spawn a terminal per node").short('x'))
        .arg(flag("mac", "Set MAC addresses equal to node IDs"))
        .arg(flag("arp", "Preconfigure all-pairs ARP entries"))
        .arg(
            Arg::new("verbosity")
                .long("verbosity")
                .short('v')
                .help("Log verbosity")
                .value_parser(PossibleValuesParser::new(VERBOSITY))
                .default_value(defaults.verbosity.clone()),
        )
        .arg(
            Arg::new("ip")
                .long("ip")
                .help("Remote controller address(es), comma-separated host[:port]")
                .default_value(defaults.ip.clone()),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .help("Default remote controller port")
                .value_parser(value_parser!(u16))
                .default_value(defaults.port.to_string()),
        )
        .arg(flag("innamespace", "Run switches and controller in a namespace"))
        .arg(
            Arg::new("listenport")
                .long("listenport")
                .help("Base port for passive switch listening")
                .value_parser(value_parser!(u16))
                .default_value(defaults.listen_port.to_string()),
        )
        .arg(flag("nolistenport", "Disable the passive listen port"))
        .arg(
            Arg::new("pre")
                .long("pre")
                .help("Interactive script to run before the test"),
        )
        .arg(
            Arg::new("post")
                .long("post")
                .help("Interactive script to run after the test"),
        )
        .arg(
            Arg::new("prefixlen")
                .long("prefixlen")
                .help("Prefix length for automatic network addresses")
                .value_parser(value_parser!(u8))
                .default_value(defaults.prefix_len.to_string()),
        )
        .arg(flag("defVendor", "Use the default vendor id"))
}

/// Parsed command-line options.
#[derive(Debug, Clone)]
pub struct Options {
    pub switch: String,
    pub host: String,
    pub controller: String,
    pub topo: String,
    pub clean: bool,
    pub custom: Option<String>,
    pub test: String,
    pub xterms: bool,
    pub mac: bool,
    pub arp: bool,
    pub verbosity: String,
    pub ip: String,
    pub port: u16,
    pub in_namespace: bool,
    pub listen_port: u16,
    pub no_listen_port: bool,
    pub pre: Option<String>,
    pub post: Option<String>,
    pub prefix_len: u8,
    pub def_vendor: bool,
}

impl Options {
    fn from_matches(matches: &ArgMatches, defaults: &Defaults) -> Self {
        let string = |name: &str| {
            matches
                .get_one::<String>(name)
                .cloned()
                .unwrap_or_default()
        };
        Self {
            switch: string("switch"),
            host: string("host"),
            controller: string("controller"),
            topo: string("topo"),
            clean: matches.get_flag("clean"),
            custom: matches.get_one::<String>("custom").cloned(),
            test: string("test"),
            xterms: matches.get_flag("xterms"),
            mac: matches.get_flag("mac"),
            arp: matches.get_flag("arp"),
            verbosity: string("verbosity"),
            ip: string("ip"),
            port: matches.get_one::<u16>("port").copied().unwrap_or(defaults.port),
            in_namespace: matches.get_flag("innamespace"),
            listen_port: matches
                .get_one::<u16>("listenport")
                .copied()
                .unwrap_or(defaults.listen_port),
            no_listen_port: matches.get_flag("nolistenport"),
            pre: matches.get_one::<String>("pre").cloned(),
            post: matches.get_one::<String>("post").cloned(),
            prefix_len: matches
                .get_one::<u8>("prefixlen")
                .copied()
                .unwrap_or(defaults.prefix_len),
            def_vendor: matches.get_flag("defVendor"),
        }
    }

    /// Option value as text, for declarative validation rules.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "switch" => Some(self.switch.clone()),
            "host" => Some(self.host.clone()),
            "controller" => Some(self.controller.clone()),
            "topo" => Some(self.topo.clone()),
            "test" => Some(self.test.clone()),
            "verbosity" => Some(self.verbosity.clone()),
            "ip" => Some(self.ip.clone()),
            "port" => Some(self.port.to_string()),
            _ => None,
        }
    }
}

pub fn try_parse_from(
    regs: &Registries,
    defaults: &Defaults,
    argv: &[String],
) -> Result<Options, clap::Error> {
    let matches = build_command(regs, defaults).try_get_matches_from(argv)?;
    Ok(Options::from_matches(&matches, defaults))
}

/// Like `try_parse_from`, but lets clap print its own diagnostics and exit
/// (also handles --help and --version).
pub fn parse_from(regs: &Registries, defaults: &Defaults, argv: &[String]) -> Options {
    try_parse_from(regs, defaults, argv).unwrap_or_else(|e| e.exit())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(tail: &[&str]) -> Vec<String> {
        std::iter::once("mnet")
            .chain(tail.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_find_custom_file() {
        assert_eq!(find_custom_file(&argv(&[])).unwrap(), None);
        assert_eq!(
            find_custom_file(&argv(&["--topo", "single", "--custom", "x.json"])).unwrap(),
            Some("x.json".to_string())
        );
        assert_eq!(
            find_custom_file(&argv(&["--custom=x.json"])).unwrap(),
            Some("x.json".to_string())
        );
        assert!(find_custom_file(&argv(&["--custom"])).is_err());
    }

    #[test]
    fn test_documented_defaults() {
        let regs = Registries::builtin().unwrap();
        let opts = try_parse_from(&regs, &Defaults::default(), &argv(&[])).unwrap();
        assert_eq!(opts.switch, "ovsk");
        assert_eq!(opts.host, "process");
        assert_eq!(opts.controller, "ref");
        assert_eq!(opts.topo, "minimal");
        assert_eq!(opts.test, "cli");
        assert_eq!(opts.verbosity, "info");
        assert_eq!(opts.ip, "127.0.0.1");
        assert_eq!(opts.port, 6633);
        assert_eq!(opts.listen_port, 6634);
        assert_eq!(opts.prefix_len, 8);
        assert!(!opts.clean && !opts.xterms && !opts.mac && !opts.arp);
        assert!(!opts.in_namespace && !opts.no_listen_port && !opts.def_vendor);
    }

    #[test]
    fn test_registry_keys_are_the_choice_set() {
        let regs = Registries::builtin().unwrap();
        assert!(try_parse_from(&regs, &Defaults::default(), &argv(&["--switch", "lxbr"])).is_ok());
        assert!(
            try_parse_from(&regs, &Defaults::default(), &argv(&["--switch", "nosuch"])).is_err()
        );
        assert!(
            try_parse_from(&regs, &Defaults::default(), &argv(&["--test", "nosuch"])).is_err()
        );
    }

    #[test]
    fn test_flags_and_values_parse() {
        let regs = Registries::builtin().unwrap();
        let opts = try_parse_from(
            &regs,
            &Defaults::default(),
            &argv(&[
                "-c",
                "-x",
                "--mac",
                "--arp",
                "--ip",
                "10.0.0.1:7000",
                "--port",
                "6653",
                "--nolistenport",
                "--prefixlen",
                "16",
                "--defVendor",
                "-v",
                "debug",
            ]),
        )
        .unwrap();
        assert!(opts.clean && opts.xterms && opts.mac && opts.arp);
        assert_eq!(opts.ip, "10.0.0.1:7000");
        assert_eq!(opts.port, 6653);
        assert!(opts.no_listen_port);
        assert_eq!(opts.prefix_len, 16);
        assert!(opts.def_vendor);
        assert_eq!(opts.verbosity, "debug");
    }
}
