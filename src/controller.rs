use std::collections::BTreeMap;
use std::io;

use crate::components::{ControllerConfig, ControllerFactory, ControllerKind};
use crate::config_error;

/// One `host[:port]` entry from the `--ip` list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr {
    pub host: String,
    pub port: u16,
}

/// Splits a comma-separated `host[:port]` list; entries without a port get
/// `default_port`.
pub fn parse_remote_specs(spec: &str, default_port: u16) -> io::Result<Vec<RemoteAddr>> {
    let mut addrs = Vec::new();
    for entry in spec.split(',') {
        if entry.is_empty() {
            return Err(config_error(format!(
                "empty controller address in '{spec}'"
            )));
        }
        let (host, port) = match entry.split_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| {
                    config_error(format!("invalid controller port in '{entry}'"))
                })?;
                (host, port)
            }
            None => (entry, default_port),
        };
        addrs.push(RemoteAddr {
            host: host.to_string(),
            port,
        });
    }
    Ok(addrs)
}

/// Deferred constructors for remote controllers. Each takes the base name and
/// tags its instance `<name>-<index>` so multiple remotes stay distinct;
/// actual construction happens only after the validation hook has run.
pub fn remote_factories(addrs: Vec<RemoteAddr>) -> Vec<ControllerFactory> {
    addrs
        .into_iter()
        .enumerate()
        .map(|(index, addr)| {
            Box::new(move |name: &str| {
                Ok(Some(ControllerConfig {
                    name: format!("{name}-{index}"),
                    kind: ControllerKind::Remote {
                        host: addr.host.clone(),
                        port: addr.port,
                    },
                    params: BTreeMap::new(),
                }))
            }) as ControllerFactory
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_defaults_when_omitted() {
        let addrs = parse_remote_specs("10.0.0.1,10.0.0.2:7000", 6633).unwrap();
        assert_eq!(
            addrs,
            vec![
                RemoteAddr {
                    host: "10.0.0.1".to_string(),
                    port: 6633
                },
                RemoteAddr {
                    host: "10.0.0.2".to_string(),
                    port: 7000
                },
            ]
        );
    }

    #[test]
    fn test_bad_port_is_fatal() {
        assert!(parse_remote_specs("10.0.0.1:notaport", 6633).is_err());
        assert!(parse_remote_specs("10.0.0.1,,10.0.0.2", 6633).is_err());
    }

    #[test]
    fn test_factories_tag_name_with_index() {
        let addrs = parse_remote_specs("10.0.0.1,10.0.0.2:7000", 6633).unwrap();
        let factories = remote_factories(addrs);
        assert_eq!(factories.len(), 2);
        let c0 = factories[0]("c0").unwrap().unwrap();
        let c1 = factories[1]("c0").unwrap().unwrap();
        assert_eq!(c0.name, "c0-0");
        assert_eq!(c1.name, "c0-1");
        assert_eq!(
            c1.kind,
            ControllerKind::Remote {
                host: "10.0.0.2".to_string(),
                port: 7000
            }
        );
    }
}
