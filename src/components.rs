use std::collections::BTreeMap;
use std::env;
use std::io;

use serde::Serialize;

use crate::config_error;
use crate::topo::Value;

/// Resolved switch selection handed to the engine. Params are opaque
/// engine-side knobs; override files may preset them on an alias.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchConfig {
    pub kind: SwitchKind,
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchKind {
    /// Userspace reference switch
    User,
    /// Kernel datapath
    Kernel,
    /// Open vSwitch, kernel datapath
    OvsKernel,
    /// Open vSwitch, userspace datapath
    OvsUser,
    /// Plain Linux bridge, no OpenFlow
    LinuxBridge,
}

pub type SwitchFactory = Box<dyn Fn() -> SwitchConfig>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostConfig {
    pub kind: HostKind,
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKind {
    /// Host as a process in its own network namespace
    Process,
}

pub type HostFactory = Box<dyn Fn() -> HostConfig>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerConfig {
    pub name: String,
    pub kind: ControllerKind,
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    /// Reference OpenFlow controller
    Ref,
    /// NOX with the given applications
    Nox { apps: Vec<String>, core_dir: String },
    /// Controller running outside the emulation's control
    Remote { host: String, port: u16 },
}

/// Controller factories take the base instance name and may produce nothing
/// at all (the 'none' entry runs the session controller-less).
pub type ControllerFactory = Box<dyn Fn(&str) -> io::Result<Option<ControllerConfig>>>;

fn switch(kind: SwitchKind) -> (String, SwitchFactory) {
    let name = match kind {
        SwitchKind::User => "user",
        SwitchKind::Kernel => "kernel",
        SwitchKind::OvsKernel => "ovsk",
        SwitchKind::OvsUser => "ovsu",
        SwitchKind::LinuxBridge => "lxbr",
    };
    (
        name.to_string(),
        Box::new(move || SwitchConfig {
            kind,
            params: BTreeMap::new(),
        }),
    )
}

pub fn builtin_switches() -> BTreeMap<String, SwitchFactory> {
    BTreeMap::from([
        switch(SwitchKind::User),
        switch(SwitchKind::Kernel),
        switch(SwitchKind::OvsKernel),
        switch(SwitchKind::OvsUser),
        switch(SwitchKind::LinuxBridge),
    ])
}

pub fn builtin_hosts() -> BTreeMap<String, HostFactory> {
    BTreeMap::from([(
        "process".to_string(),
        Box::new(|| HostConfig {
            kind: HostKind::Process,
            params: BTreeMap::new(),
        }) as HostFactory,
    )])
}

pub fn builtin_controllers() -> BTreeMap<String, ControllerFactory> {
    BTreeMap::from([
        (
            "ref".to_string(),
            Box::new(|name: &str| {
                Ok(Some(ControllerConfig {
                    name: name.to_string(),
                    kind: ControllerKind::Ref,
                    params: BTreeMap::new(),
                }))
            }) as ControllerFactory,
        ),
        (
            "nox".to_string(),
            Box::new(|name: &str| {
                let core_dir = env::var("NOX_CORE_DIR")
                    .map_err(|_| config_error("please set missing NOX_CORE_DIR env var"))?;
                Ok(Some(ControllerConfig {
                    name: name.to_string(),
                    kind: ControllerKind::Nox {
                        apps: vec!["packetdump".to_string()],
                        core_dir,
                    },
                    params: BTreeMap::new(),
                }))
            }) as ControllerFactory,
        ),
        (
            "remote".to_string(),
            Box::new(|name: &str| {
                Ok(Some(ControllerConfig {
                    name: name.to_string(),
                    kind: ControllerKind::Remote {
                        host: "127.0.0.1".to_string(),
                        port: 6633,
                    },
                    params: BTreeMap::new(),
                }))
            }) as ControllerFactory,
        ),
        (
            "none".to_string(),
            Box::new(|_: &str| Ok(None)) as ControllerFactory,
        ),
    ])
}
