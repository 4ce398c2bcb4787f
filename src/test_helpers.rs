use std::cell::RefCell;
use std::io;
use std::rc::Rc;

use crate::engine::Engine;
use crate::session::{Session, SessionConfig};

/// Session double that records operation calls in order and always succeeds.
#[derive(Clone, Default)]
pub struct RecordingSession {
    log: Rc<RefCell<Vec<String>>>,
}

impl RecordingSession {
    pub fn with_log(log: Rc<RefCell<Vec<String>>>) -> Self {
        Self { log }
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    fn record(&self, call: &str) -> io::Result<()> {
        self.log.borrow_mut().push(call.to_string());
        Ok(())
    }
}

impl Session for RecordingSession {
    fn start(&mut self) -> io::Result<()> {
        self.record("start")
    }

    fn stop(&mut self) -> io::Result<()> {
        self.record("stop")
    }

    fn ping_all(&mut self) -> io::Result<()> {
        self.record("ping_all")
    }

    fn ping_pair(&mut self) -> io::Result<()> {
        self.record("ping_pair")
    }

    fn iperf(&mut self) -> io::Result<()> {
        self.record("iperf")
    }

    fn iperf_udp(&mut self) -> io::Result<()> {
        self.record("iperf_udp")
    }

    fn interact(&mut self) -> io::Result<()> {
        self.record("cli")
    }

    fn run_script(&mut self, path: &str) -> io::Result<()> {
        self.record(&format!("source {path}"))
    }
}

/// Engine double: every session it builds shares the engine's call log, so a
/// whole launcher run can be asserted as one ordered trace.
#[derive(Default)]
pub struct RecordingEngine {
    log: Rc<RefCell<Vec<String>>>,
    configs: Rc<RefCell<Vec<SessionConfig>>>,
}

impl RecordingEngine {
    pub fn calls(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn configs(&self) -> Vec<SessionConfig> {
        self.configs.borrow().clone()
    }
}

impl Engine for RecordingEngine {
    fn validate_environment(&self) -> io::Result<()> {
        self.log.borrow_mut().push("check".to_string());
        Ok(())
    }

    fn cleanup(&self) -> io::Result<()> {
        self.log.borrow_mut().push("clean".to_string());
        Ok(())
    }

    fn build(&self, config: SessionConfig) -> io::Result<Box<dyn Session>> {
        self.log.borrow_mut().push("build".to_string());
        self.configs.borrow_mut().push(config);
        Ok(Box::new(RecordingSession::with_log(self.log.clone())))
    }
}
