use std::env;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use log::debug;

use crate::session::{Session, SessionConfig};

/// The emulation engine as seen from the launcher: environment validation,
/// system-wide cleanup, and session construction. All emulation logic lives
/// on the other side of this trait.
pub trait Engine {
    fn validate_environment(&self) -> io::Result<()>;
    fn cleanup(&self) -> io::Result<()>;
    fn build(&self, config: SessionConfig) -> io::Result<Box<dyn Session>>;
}

/// Drives the engine executable. One-shot concerns go through subcommands
/// (`check`, `clean`); a session is a long-running `session` child spoken to
/// over a line protocol: one command per line in, `ok` or `err <msg>` back.
pub struct ExternalEngine {
    program: OsString,
}

impl ExternalEngine {
    /// Engine executable from MNET_ENGINE, falling back to `mnet-engine` on
    /// PATH.
    pub fn from_env() -> Self {
        Self {
            program: env::var_os("MNET_ENGINE").unwrap_or_else(|| OsString::from("mnet-engine")),
        }
    }

    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn spawn_error(&self, e: io::Error) -> io::Error {
        if e.kind() == io::ErrorKind::NotFound {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "emulation engine '{}' not found (set MNET_ENGINE)",
                    self.program.to_string_lossy()
                ),
            )
        } else {
            e
        }
    }

    fn run(&self, subcommand: &str) -> io::Result<()> {
        debug!("engine {} {subcommand}", self.program.to_string_lossy());
        let status = Command::new(&self.program)
            .arg(subcommand)
            .status()
            .map_err(|e| self.spawn_error(e))?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "engine '{}' {subcommand} failed ({status})",
                self.program.to_string_lossy()
            )))
        }
    }
}

impl Engine for ExternalEngine {
    fn validate_environment(&self) -> io::Result<()> {
        self.run("check")
    }

    fn cleanup(&self) -> io::Result<()> {
        self.run("clean")
    }

    fn build(&self, config: SessionConfig) -> io::Result<Box<dyn Session>> {
        let mut child = Command::new(&self.program)
            .arg("session")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("engine stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("engine stdout unavailable"))?;
        let mut session = EngineSession {
            child,
            stdin,
            reader: BufReader::new(stdout),
        };
        // First line is the session config; the engine replies once built
        let payload = serde_json::to_string(&config).map_err(io::Error::other)?;
        session.send(&payload)?;
        Ok(Box::new(session))
    }
}

fn parse_reply(reply: &str) -> io::Result<()> {
    let reply = reply.trim_end();
    if reply == "ok" {
        Ok(())
    } else if let Some(msg) = reply.strip_prefix("err ") {
        Err(io::Error::other(msg.to_string()))
    } else {
        Err(io::Error::other(format!(
            "unexpected engine reply: '{reply}'"
        )))
    }
}

struct EngineSession {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
}

impl EngineSession {
    fn send(&mut self, line: &str) -> io::Result<()> {
        debug!("-> engine: {line}");
        writeln!(self.stdin, "{line}")?;
        self.stdin.flush()?;
        let mut reply = String::new();
        if self.reader.read_line(&mut reply)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "engine exited unexpectedly",
            ));
        }
        parse_reply(&reply)
    }
}

impl Session for EngineSession {
    fn start(&mut self) -> io::Result<()> {
        self.send("start")
    }

    fn stop(&mut self) -> io::Result<()> {
        self.send("stop")?;
        let _ = writeln!(self.stdin, "exit");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
        Ok(())
    }

    fn ping_all(&mut self) -> io::Result<()> {
        self.send("ping_all")
    }

    fn ping_pair(&mut self) -> io::Result<()> {
        self.send("ping_pair")
    }

    fn iperf(&mut self) -> io::Result<()> {
        self.send("iperf")
    }

    fn iperf_udp(&mut self) -> io::Result<()> {
        self.send("iperf_udp")
    }

    fn interact(&mut self) -> io::Result<()> {
        self.send("cli")
    }

    fn run_script(&mut self, path: &str) -> io::Result<()> {
        self.send(&format!("source {path}"))
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        // Best effort; the exit-cleanup watchdog sweeps anything left over
        let _ = writeln!(self.stdin, "exit");
        let _ = self.stdin.flush();
        let _ = self.child.try_wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply() {
        assert!(parse_reply("ok\n").is_ok());
        let err = parse_reply("err no such host\n").unwrap_err();
        assert_eq!(err.to_string(), "no such host");
        assert!(parse_reply("???").is_err());
    }

    #[test]
    fn test_run_reports_exit_status() {
        assert!(ExternalEngine::new("true").run("check").is_ok());
        assert!(ExternalEngine::new("false").run("check").is_err());
    }

    #[test]
    fn test_missing_engine_names_the_program() {
        let err = ExternalEngine::new("mnet-engine-that-does-not-exist")
            .run("check")
            .unwrap_err();
        assert!(err.to_string().contains("mnet-engine-that-does-not-exist"));
        assert!(err.to_string().contains("MNET_ENGINE"));
    }
}
