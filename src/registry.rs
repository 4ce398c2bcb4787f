use std::collections::BTreeMap;
use std::io;

use crate::components::{ControllerFactory, HostFactory, SwitchFactory, builtin_controllers, builtin_hosts, builtin_switches};
use crate::config_error;
use crate::topo::{TopoEntry, builtin_topos};

/// Mapping from short component names to factories, plus the name used when
/// the matching command-line option is omitted. The default key must be a
/// member of the mapping at all times; `new` and `set_default` enforce it so
/// a broken default fails before option parsing instead of at instantiation
/// time.
#[derive(Debug)]
pub struct Registry<T> {
    label: &'static str,
    entries: BTreeMap<String, T>,
    default: String,
}

impl<T> Registry<T> {
    pub fn new(
        label: &'static str,
        entries: BTreeMap<String, T>,
        default: &str,
    ) -> io::Result<Self> {
        if !entries.contains_key(default) {
            return Err(config_error(format!(
                "{label} registry: default '{default}' is not a registered {label} name"
            )));
        }
        Ok(Self {
            label,
            entries,
            default: default.to_string(),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Full key set, sorted, for use as a CLI choice list.
    pub fn choices(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn default_key(&self) -> &str {
        &self.default
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Looks up a factory, failing with an error naming the unknown name.
    /// Never falls back to the default.
    pub fn resolve(&self, name: &str) -> io::Result<&T> {
        self.entries.get(name).ok_or_else(|| {
            config_error(format!(
                "invalid {} name: '{}' (valid: {})",
                self.label,
                name,
                self.choices().join(", ")
            ))
        })
    }

    /// Additive update: keys absent from `entries` are preserved, keys
    /// present in both are overwritten by `entries`.
    pub fn merge(&mut self, entries: impl IntoIterator<Item = (String, T)>) {
        self.entries.extend(entries);
    }

    pub fn set_default(&mut self, name: &str) -> io::Result<()> {
        if !self.entries.contains_key(name) {
            return Err(config_error(format!(
                "{} registry: default '{}' is not a registered {} name",
                self.label, name, self.label
            )));
        }
        self.default = name.to_string();
        Ok(())
    }
}

/// The four component registries, passed explicitly through the launcher so
/// override merges stay local to one run.
pub struct Registries {
    pub topos: Registry<TopoEntry>,
    pub switches: Registry<SwitchFactory>,
    pub hosts: Registry<HostFactory>,
    pub controllers: Registry<ControllerFactory>,
}

impl Registries {
    pub fn builtin() -> io::Result<Self> {
        Ok(Self {
            topos: Registry::new("topo", builtin_topos(), "minimal")?,
            switches: Registry::new("switch", builtin_switches(), "ovsk")?,
            hosts: Registry::new("host", builtin_hosts(), "process")?,
            controllers: Registry::new("controller", builtin_controllers(), "ref")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BTreeMap<String, u32> {
        BTreeMap::from([("a".to_string(), 1), ("b".to_string(), 2)])
    }

    #[test]
    fn test_default_must_be_registered() {
        let err = Registry::new("widget", sample(), "missing").unwrap_err();
        assert!(err.to_string().contains("widget"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_resolve_unknown_names_the_name() {
        let reg = Registry::new("widget", sample(), "a").unwrap();
        let err = reg.resolve("zzz").unwrap_err();
        assert!(err.to_string().contains("zzz"));
        assert!(reg.resolve("b").is_ok());
    }

    #[test]
    fn test_merge_is_additive() {
        let mut reg = Registry::new("widget", sample(), "a").unwrap();
        reg.merge([("b".to_string(), 20), ("c".to_string(), 3)]);
        assert_eq!(*reg.resolve("a").unwrap(), 1);
        assert_eq!(*reg.resolve("b").unwrap(), 20);
        assert_eq!(*reg.resolve("c").unwrap(), 3);
        assert_eq!(reg.choices(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_set_default_revalidates() {
        let mut reg = Registry::new("widget", sample(), "a").unwrap();
        assert!(reg.set_default("nope").is_err());
        assert_eq!(reg.default_key(), "a");
        reg.set_default("b").unwrap();
        assert_eq!(reg.default_key(), "b");
    }

    #[test]
    fn test_builtin_registries_expose_documented_defaults() {
        let regs = Registries::builtin().unwrap();
        assert_eq!(regs.topos.default_key(), "minimal");
        assert_eq!(regs.switches.default_key(), "ovsk");
        assert_eq!(regs.hosts.default_key(), "process");
        assert_eq!(regs.controllers.default_key(), "ref");
        assert!(regs.topos.contains("tree"));
    }
}
