use std::io;

use derive_builder::Builder;
use serde::Serialize;

use crate::components::{ControllerConfig, HostConfig, SwitchConfig};
use crate::config_error;
use crate::topo::Topo;

/// The documented call surface of the external emulation session. Everything
/// behind these calls (namespaces, switches, links) belongs to the engine.
pub trait Session {
    fn start(&mut self) -> io::Result<()>;
    fn stop(&mut self) -> io::Result<()>;
    /// All-pairs connectivity check.
    fn ping_all(&mut self) -> io::Result<()>;
    /// Connectivity between the first and last host.
    fn ping_pair(&mut self) -> io::Result<()>;
    fn iperf(&mut self) -> io::Result<()>;
    fn iperf_udp(&mut self) -> io::Result<()>;
    /// Interactive shell on the session.
    fn interact(&mut self) -> io::Result<()>;
    /// Run an interactive script (the --pre/--post files).
    fn run_script(&mut self, path: &str) -> io::Result<()>;
}

/// Everything the engine needs to assemble a session.
#[derive(Debug, Clone, Serialize, Builder)]
pub struct SessionConfig {
    pub topo: Topo,
    pub switch: SwitchConfig,
    pub host: HostConfig,
    #[builder(default)]
    pub controllers: Vec<ControllerConfig>,
    #[builder(default = false)]
    pub xterms: bool,
    #[builder(default = false)]
    pub auto_set_macs: bool,
    #[builder(default = false)]
    pub auto_static_arp: bool,
    #[builder(default = false)]
    pub in_namespace: bool,
    /// None disables passive switch listening entirely
    #[builder(default)]
    pub listen_port: Option<u16>,
    #[builder(default = 8)]
    pub prefix_len: u8,
    #[builder(default = false)]
    pub use_default_vendor: bool,
}

/// Alternate spellings accepted by --test, mapped to canonical operation
/// names. Lookup is case-insensitive.
const ALT_SPELLINGS: &[(&str, &str)] = &[
    ("pingall", "ping_all"),
    ("pingpair", "ping_pair"),
    ("iperfudp", "iperf_udp"),
];

pub fn normalize_test(name: &str) -> String {
    let lowered = name.to_ascii_lowercase();
    for (alt, canonical) in ALT_SPELLINGS {
        if lowered == *alt {
            return canonical.to_string();
        }
    }
    lowered
}

/// Dispatches a test by name against a running session. Unknown names fail
/// like a missing-operation lookup; nothing is partially run.
pub fn run_test(session: &mut dyn Session, name: &str) -> io::Result<()> {
    match normalize_test(name).as_str() {
        // 'build' constructs only; by the time dispatch runs there is
        // nothing left to do for it either
        "none" | "build" => Ok(()),
        "cli" => session.interact(),
        "all" => {
            session.ping_all()?;
            session.iperf()
        }
        "ping_all" => session.ping_all(),
        "ping_pair" => session.ping_pair(),
        "iperf" => session.iperf(),
        "iperf_udp" => session.iperf_udp(),
        other => Err(config_error(format!(
            "session has no test named '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::RecordingSession;

    #[test]
    fn test_alternate_spellings_normalize() {
        assert_eq!(normalize_test("pingall"), "ping_all");
        assert_eq!(normalize_test("pingAll"), "ping_all");
        assert_eq!(normalize_test("iperfUdp"), "iperf_udp");
        assert_eq!(normalize_test("iperf"), "iperf");
        assert_eq!(normalize_test("CLI"), "cli");
    }

    #[test]
    fn test_pingall_runs_ping_all_exactly_once() {
        let mut session = RecordingSession::default();
        run_test(&mut session, "pingall").unwrap();
        assert_eq!(session.calls(), vec!["ping_all"]);
    }

    #[test]
    fn test_all_runs_every_builtin_check() {
        let mut session = RecordingSession::default();
        run_test(&mut session, "all").unwrap();
        assert_eq!(session.calls(), vec!["ping_all", "iperf"]);
    }

    #[test]
    fn test_none_and_build_are_noops() {
        let mut session = RecordingSession::default();
        run_test(&mut session, "none").unwrap();
        run_test(&mut session, "build").unwrap();
        assert!(session.calls().is_empty());
    }

    #[test]
    fn test_unknown_test_is_a_lookup_error() {
        let mut session = RecordingSession::default();
        let err = run_test(&mut session, "warp").unwrap_err();
        assert!(err.to_string().contains("warp"));
        assert!(session.calls().is_empty());
    }
}
