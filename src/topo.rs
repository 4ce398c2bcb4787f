use std::collections::BTreeMap;
use std::fmt;
use std::io;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config_error;
use crate::registry::Registry;

/// A topology argument as it arrives from the command line or an override
/// file. Descriptor tokens are coerced int-first, then float, then kept as
/// the original string; coercion is total and never fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn coerce(token: &str) -> Value {
        if let Ok(i) = token.parse::<i64>() {
            Value::Int(i)
        } else if let Ok(f) = token.parse::<f64>() {
            Value::Float(f)
        } else {
            Value::Str(token.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Positional and keyword arguments for a topology factory. Keyword order is
/// preserved; duplicate keys resolve to the latest occurrence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopoArgs {
    pub positional: Vec<Value>,
    pub keyword: Vec<(String, Value)>,
}

impl TopoArgs {
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.keyword.is_empty()
    }

    pub fn kwarg(&self, key: &str) -> Option<&Value> {
        self.keyword.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// A size-like argument given either positionally or as `key=n`.
    pub fn count(&self, index: usize, key: &str, default: usize) -> io::Result<usize> {
        match self.positional.get(index).or_else(|| self.kwarg(key)) {
            None => Ok(default),
            Some(Value::Int(n)) if *n >= 0 => Ok(*n as usize),
            Some(v) => Err(config_error(format!(
                "topo argument '{key}' must be a non-negative integer, got '{v}'"
            ))),
        }
    }
}

/// Parsed form of a `--topo` descriptor: `name[,arg...][,key=value...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TopoDescriptor {
    pub name: String,
    pub args: TopoArgs,
}

impl TopoDescriptor {
    /// Splits a descriptor on commas. The first token is the factory name;
    /// remaining tokens with at least one `=` become keyword arguments
    /// (split once, on the first `=`, so later `=` stay in the value),
    /// everything else is positional in order.
    pub fn parse(spec: &str) -> io::Result<Self> {
        let mut tokens = spec.split(',');
        let name = tokens.next().unwrap_or_default();
        if name.is_empty() {
            return Err(config_error("empty topology descriptor"));
        }
        let mut args = TopoArgs::default();
        for token in tokens {
            match token.split_once('=') {
                Some((key, value)) => args.keyword.push((key.to_string(), Value::coerce(value))),
                None => args.positional.push(Value::coerce(token)),
            }
        }
        Ok(Self {
            name: name.to_string(),
            args,
        })
    }

    /// Applies command-line arguments on top of a preset descriptor:
    /// positionals from the command line replace the preset's when given at
    /// all, keyword arguments are appended so they win lookups.
    pub fn overlaid_with(&self, cli: &TopoArgs) -> TopoDescriptor {
        let positional = if cli.positional.is_empty() {
            self.args.positional.clone()
        } else {
            cli.positional.clone()
        };
        let mut keyword = self.args.keyword.clone();
        keyword.extend(cli.keyword.iter().cloned());
        TopoDescriptor {
            name: self.name.clone(),
            args: TopoArgs { positional, keyword },
        }
    }
}

/// The emulated network graph handed to the engine: node names plus the link
/// list, in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Topo {
    pub hosts: Vec<String>,
    pub switches: Vec<String>,
    pub links: Vec<(String, String)>,
}

impl Topo {
    pub fn add_host(&mut self, name: &str) {
        self.hosts.push(name.to_string());
    }

    pub fn add_switch(&mut self, name: &str) {
        self.switches.push(name.to_string());
    }

    pub fn add_link(&mut self, a: &str, b: &str) {
        self.links.push((a.to_string(), b.to_string()));
    }
}

pub type TopoFactory = Box<dyn Fn(&TopoArgs) -> io::Result<Topo>>;

/// Registry entry for a topology. Custom overrides register presets that
/// derive from a builtin generator; one level of derivation only.
pub enum TopoEntry {
    Builtin(TopoFactory),
    Derived { preset: TopoDescriptor },
}

/// Resolves a descriptor against the topo registry and invokes the factory.
/// An unknown name fails naming the name; no factory runs in that case.
pub fn build(desc: &TopoDescriptor, topos: &Registry<TopoEntry>) -> io::Result<Topo> {
    match topos.resolve(&desc.name)? {
        TopoEntry::Builtin(factory) => factory(&desc.args),
        TopoEntry::Derived { preset } => {
            let merged = preset.overlaid_with(&desc.args);
            match topos.resolve(&merged.name)? {
                TopoEntry::Builtin(factory) => factory(&merged.args),
                TopoEntry::Derived { .. } => Err(config_error(format!(
                    "custom topo '{}' may only derive from a builtin topo",
                    desc.name
                ))),
            }
        }
    }
}

fn entry(factory: impl Fn(&TopoArgs) -> io::Result<Topo> + 'static) -> TopoEntry {
    TopoEntry::Builtin(Box::new(factory))
}

pub fn builtin_topos() -> BTreeMap<String, TopoEntry> {
    BTreeMap::from([
        (
            "minimal".to_string(),
            entry(|args| {
                if args.is_empty() {
                    Ok(single_switch(2, false))
                } else {
                    Err(config_error("topo 'minimal' takes no arguments"))
                }
            }),
        ),
        (
            "single".to_string(),
            entry(|args| Ok(single_switch(args.count(0, "k", 2)?, false))),
        ),
        (
            "reversed".to_string(),
            entry(|args| Ok(single_switch(args.count(0, "k", 2)?, true))),
        ),
        (
            "linear".to_string(),
            entry(|args| Ok(linear(args.count(0, "k", 2)?))),
        ),
        (
            "tree".to_string(),
            entry(|args| Ok(tree(args.count(0, "depth", 1)?, args.count(1, "fanout", 2)?))),
        ),
        (
            "torus".to_string(),
            entry(|args| torus(args.count(0, "x", 3)?, args.count(1, "y", 3)?)),
        ),
    ])
}

/// One switch, k hosts. Reversed connects hosts in descending order so the
/// switch port numbering ends up mirrored.
fn single_switch(k: usize, reversed: bool) -> Topo {
    let mut topo = Topo::default();
    topo.add_switch("s1");
    let hosts: Vec<String> = (1..=k).map(|i| format!("h{i}")).collect();
    for host in &hosts {
        topo.add_host(host);
    }
    if reversed {
        for host in hosts.iter().rev() {
            topo.add_link("s1", host);
        }
    } else {
        for host in &hosts {
            topo.add_link("s1", host);
        }
    }
    topo
}

/// k switches in a chain, one host per switch.
fn linear(k: usize) -> Topo {
    let mut topo = Topo::default();
    for i in 1..=k {
        let switch = format!("s{i}");
        let host = format!("h{i}");
        topo.add_switch(&switch);
        topo.add_host(&host);
        topo.add_link(&host, &switch);
        if i > 1 {
            topo.add_link(&format!("s{}", i - 1), &switch);
        }
    }
    topo
}

fn tree(depth: usize, fanout: usize) -> Topo {
    let mut topo = Topo::default();
    let mut hosts = 0usize;
    let mut switches = 0usize;
    tree_grow(&mut topo, depth, fanout, &mut hosts, &mut switches);
    topo
}

fn tree_grow(
    topo: &mut Topo,
    depth: usize,
    fanout: usize,
    hosts: &mut usize,
    switches: &mut usize,
) -> String {
    if depth == 0 {
        *hosts += 1;
        let name = format!("h{hosts}");
        topo.add_host(&name);
        name
    } else {
        *switches += 1;
        let name = format!("s{switches}");
        topo.add_switch(&name);
        for _ in 0..fanout {
            let child = tree_grow(topo, depth - 1, fanout, hosts, switches);
            topo.add_link(&name, &child);
        }
        name
    }
}

/// x by y grid of switches with wraparound links, one host per switch.
fn torus(x: usize, y: usize) -> io::Result<Topo> {
    if x < 3 || y < 3 {
        return Err(config_error("torus topology needs x >= 3 and y >= 3"));
    }
    let mut topo = Topo::default();
    for i in 1..=x {
        for j in 1..=y {
            let switch = format!("s{i}x{j}");
            let host = format!("h{i}x{j}");
            topo.add_switch(&switch);
            topo.add_host(&host);
            topo.add_link(&switch, &host);
        }
    }
    for i in 1..=x {
        for j in 1..=y {
            let switch = format!("s{i}x{j}");
            topo.add_link(&switch, &format!("s{}x{}", i % x + 1, j));
            topo.add_link(&switch, &format!("s{}x{}", i, j % y + 1));
        }
    }
    Ok(topo)
}
