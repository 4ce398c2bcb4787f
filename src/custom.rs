use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use schemars::{JsonSchema, schema_for};
use serde::Deserialize;

use crate::args::{Defaults, Options, TESTS, VERBOSITY};
use crate::components::{ControllerConfig, ControllerFactory, HostFactory, SwitchFactory};
use crate::config_error;
use crate::registry::Registries;
use crate::topo::{TopoDescriptor, TopoEntry, Value};

/// User-supplied override file, loaded before option parsing so merged names
/// are legal choice values. Section names are the dispatch rule: the four
/// plural registry sections merge additively, `validate` installs the
/// validation hook, `defaults` replaces process-wide option defaults.
/// Anything else is rejected.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct CustomOverrides {
    /// New topology names, each a preset descriptor over a builtin topo
    pub topos: BTreeMap<String, String>,
    pub switches: BTreeMap<String, ComponentOverride>,
    pub hosts: BTreeMap<String, ComponentOverride>,
    pub controllers: BTreeMap<String, ComponentOverride>,
    pub defaults: DefaultOverrides,
    pub validate: Option<ValidateSpec>,
}

/// Alias of a registered component with preset engine params.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ComponentOverride {
    pub base: String,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct DefaultOverrides {
    pub topo: Option<String>,
    pub switch: Option<String>,
    pub host: Option<String>,
    pub controller: Option<String>,
    pub test: Option<String>,
    pub verbosity: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub listenport: Option<u16>,
    pub prefixlen: Option<u8>,
}

/// Declarative validation hook, checked once against the parsed options
/// before the session is constructed.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct ValidateSpec {
    /// Option name to the values it must be among
    pub allow: BTreeMap<String, Vec<String>>,
    /// Option name to values it must not take
    pub deny: BTreeMap<String, Vec<String>>,
}

impl ValidateSpec {
    pub fn check(&self, opts: &Options) -> io::Result<()> {
        for (name, allowed) in &self.allow {
            let value = self.lookup(opts, name)?;
            if !allowed.contains(&value) {
                return Err(config_error(format!(
                    "validation failed: --{name} '{value}' must be one of: {}",
                    allowed.join(", ")
                )));
            }
        }
        for (name, denied) in &self.deny {
            let value = self.lookup(opts, name)?;
            if denied.contains(&value) {
                return Err(config_error(format!(
                    "validation failed: --{name} must not be '{value}'"
                )));
            }
        }
        Ok(())
    }

    fn lookup(&self, opts: &Options, name: &str) -> io::Result<String> {
        opts.field(name).ok_or_else(|| {
            config_error(format!("validation rule references unknown option '{name}'"))
        })
    }
}

/// JSON schema of the override file, printed alongside parse failures.
pub fn override_schema() -> String {
    serde_json::to_string_pretty(&schema_for!(CustomOverrides)).unwrap_or_default()
}

/// Reads and parses an override file. A missing file is an explicit error;
/// nothing is merged until the whole file parses.
pub fn load(path: &str) -> io::Result<CustomOverrides> {
    if !Path::new(path).exists() {
        return Err(config_error(format!("could not find custom file: {path}")));
    }
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        log::debug!("override schema:\n{}", override_schema());
        config_error(format!("invalid custom file '{path}': {e}"))
    })
}

impl CustomOverrides {
    /// Routes every declared name into the registries and defaults, and
    /// returns the validation hook if one was declared.
    pub fn apply(
        self,
        regs: &mut Registries,
        defaults: &mut Defaults,
    ) -> io::Result<Option<ValidateSpec>> {
        for (name, spec) in self.topos {
            let preset = TopoDescriptor::parse(&spec)?;
            match regs.topos.resolve(&preset.name)? {
                TopoEntry::Builtin(_) => {}
                TopoEntry::Derived { .. } => {
                    return Err(config_error(format!(
                        "custom topo '{name}' may only derive from a builtin topo"
                    )));
                }
            }
            regs.topos.merge([(name, TopoEntry::Derived { preset })]);
        }

        for (name, ov) in self.switches {
            let config = {
                let mut config = (regs.switches.resolve(&ov.base)?)();
                config.params.extend(ov.params);
                config
            };
            regs.switches
                .merge([(name, Box::new(move || config.clone()) as SwitchFactory)]);
        }

        for (name, ov) in self.hosts {
            let config = {
                let mut config = (regs.hosts.resolve(&ov.base)?)();
                config.params.extend(ov.params);
                config
            };
            regs.hosts
                .merge([(name, Box::new(move || config.clone()) as HostFactory)]);
        }

        for (name, ov) in self.controllers {
            // Instantiating once here surfaces base-side errors (e.g. a
            // missing NOX_CORE_DIR) at load time
            let kind = (regs.controllers.resolve(&ov.base)?)(&name)?.map(|c| c.kind);
            let params = ov.params;
            regs.controllers.merge([(
                name,
                Box::new(move |instance: &str| {
                    Ok(kind.clone().map(|kind| ControllerConfig {
                        name: instance.to_string(),
                        kind,
                        params: params.clone(),
                    }))
                }) as ControllerFactory,
            )]);
        }

        let d = self.defaults;
        if let Some(name) = d.topo {
            regs.topos.set_default(&name)?;
        }
        if let Some(name) = d.switch {
            regs.switches.set_default(&name)?;
        }
        if let Some(name) = d.host {
            regs.hosts.set_default(&name)?;
        }
        if let Some(name) = d.controller {
            regs.controllers.set_default(&name)?;
        }
        if let Some(test) = d.test {
            if !TESTS.contains(&test.as_str()) {
                return Err(config_error(format!("unknown default test '{test}'")));
            }
            defaults.test = test;
        }
        if let Some(verbosity) = d.verbosity {
            if !VERBOSITY.contains(&verbosity.as_str()) {
                return Err(config_error(format!(
                    "unknown default verbosity '{verbosity}'"
                )));
            }
            defaults.verbosity = verbosity;
        }
        if let Some(ip) = d.ip {
            defaults.ip = ip;
        }
        if let Some(port) = d.port {
            defaults.port = port;
        }
        if let Some(port) = d.listenport {
            defaults.listen_port = port;
        }
        if let Some(len) = d.prefixlen {
            defaults.prefix_len = len;
        }

        Ok(self.validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;
    use crate::components::SwitchKind;
    use crate::topo;
    use std::env;
    use std::path::PathBuf;

    fn write_temp(name: &str, text: &str) -> PathBuf {
        let path = env::temp_dir().join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_missing_file_is_explicit_error() {
        let err = load("/nonexistent/overrides.json").unwrap_err();
        assert!(err.to_string().contains("could not find custom file"));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let path = write_temp("mnet_bad_section.json", r#"{ "gadgets": {} }"#);
        assert!(load(path.to_str().unwrap()).is_err());
    }

    #[test]
    fn test_topo_override_becomes_valid_choice() {
        let path = write_temp(
            "mnet_topo_override.json",
            r#"{ "topos": { "fat": "tree,depth=2,fanout=3" }, "defaults": { "topo": "fat" } }"#,
        );
        let mut regs = Registries::builtin().unwrap();
        let mut defaults = Defaults::default();
        let hook = load(path.to_str().unwrap())
            .unwrap()
            .apply(&mut regs, &mut defaults)
            .unwrap();
        assert!(hook.is_none());
        assert!(regs.topos.contains("fat"));
        assert_eq!(regs.topos.default_key(), "fat");

        let built = topo::build(&TopoDescriptor::parse("fat").unwrap(), &regs.topos).unwrap();
        assert_eq!(built.hosts.len(), 9);

        // And the CLI now accepts it
        let argv: Vec<String> = ["mnet", "--topo", "fat"].map(String::from).to_vec();
        assert!(args::try_parse_from(&regs, &defaults, &argv).is_ok());
    }

    #[test]
    fn test_component_alias_presets_params() {
        let text = r#"{
            "switches": { "fast": { "base": "ovsk", "params": { "queues": 8 } } },
            "controllers": { "backup": { "base": "remote" } }
        }"#;
        let path = write_temp("mnet_alias.json", text);
        let mut regs = Registries::builtin().unwrap();
        let mut defaults = Defaults::default();
        load(path.to_str().unwrap())
            .unwrap()
            .apply(&mut regs, &mut defaults)
            .unwrap();

        let config = (regs.switches.resolve("fast").unwrap())();
        assert_eq!(config.kind, SwitchKind::OvsKernel);
        assert_eq!(config.params.get("queues"), Some(&Value::Int(8)));

        let c = (regs.controllers.resolve("backup").unwrap())("c0")
            .unwrap()
            .unwrap();
        assert_eq!(c.name, "c0");
    }

    #[test]
    fn test_default_override_must_name_registered_entry() {
        let path = write_temp(
            "mnet_bad_default.json",
            r#"{ "defaults": { "switch": "nosuch" } }"#,
        );
        let mut regs = Registries::builtin().unwrap();
        let mut defaults = Defaults::default();
        let err = load(path.to_str().unwrap())
            .unwrap()
            .apply(&mut regs, &mut defaults)
            .unwrap_err();
        assert!(err.to_string().contains("nosuch"));
        assert_eq!(regs.switches.default_key(), "ovsk");
    }

    #[test]
    fn test_validate_hook_allow_and_deny() {
        let mut regs = Registries::builtin().unwrap();
        let defaults = Defaults::default();
        let argv: Vec<String> = ["mnet", "--controller", "remote"].map(String::from).to_vec();
        let opts = args::try_parse_from(&mut regs, &defaults, &argv).unwrap();

        let mut hook = ValidateSpec::default();
        hook.allow
            .insert("controller".to_string(), vec!["remote".to_string()]);
        assert!(hook.check(&opts).is_ok());

        hook.deny
            .insert("topo".to_string(), vec!["minimal".to_string()]);
        assert!(hook.check(&opts).is_err());

        let mut bad = ValidateSpec::default();
        bad.allow.insert("nosuch".to_string(), vec![]);
        assert!(bad.check(&opts).is_err());
    }

    #[test]
    fn test_defaults_section_overrides_globals() {
        let path = write_temp(
            "mnet_defaults.json",
            r#"{ "defaults": { "port": 6653, "prefixlen": 16, "test": "build" } }"#,
        );
        let mut regs = Registries::builtin().unwrap();
        let mut defaults = Defaults::default();
        load(path.to_str().unwrap())
            .unwrap()
            .apply(&mut regs, &mut defaults)
            .unwrap();
        assert_eq!(defaults.port, 6653);
        assert_eq!(defaults.prefix_len, 16);
        assert_eq!(defaults.test, "build");
    }
}
