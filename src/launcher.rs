use std::io;
use std::time::Instant;

use log::{LevelFilter, info};

use crate::args::{self, Defaults, Options};
use crate::config_error;
use crate::controller;
use crate::custom;
use crate::engine::Engine;
use crate::registry::Registries;
use crate::session::{self, SessionConfigBuilder};
use crate::topo::{self, TopoDescriptor};

/// One launcher run: load overrides, parse options, set up logging, then
/// either clean up or bring a session up, run the selected test, and tear it
/// down again.
pub fn run(argv: &[String], engine: &dyn Engine) -> io::Result<()> {
    let mut regs = Registries::builtin()?;
    let mut defaults = Defaults::default();

    // Overrides load before option declaration so merged names are already
    // legal choice values when clap sees them
    let mut hook = None;
    if let Some(path) = args::find_custom_file(argv)? {
        hook = custom::load(&path)?.apply(&mut regs, &mut defaults)?;
    }
    let opts = args::parse_from(&regs, &defaults, argv);

    init_logging(&opts.verbosity);
    if opts.test == "cli" && suppresses_cli_output(&opts.verbosity) {
        eprintln!(
            "warning: '-v {}' will suppress interactive CLI output",
            opts.verbosity
        );
    }
    engine.validate_environment()?;

    if opts.clean {
        info!("cleaning up emulation state");
        return engine.cleanup();
    }

    let started = Instant::now();
    begin(&opts, &regs, hook.as_ref(), engine)?;
    println!("completed in {:.3} seconds", started.elapsed().as_secs_f64());
    Ok(())
}

fn begin(
    opts: &Options,
    regs: &Registries,
    hook: Option<&custom::ValidateSpec>,
    engine: &dyn Engine,
) -> io::Result<()> {
    let desc = TopoDescriptor::parse(&opts.topo)?;
    let topo = topo::build(&desc, &regs.topos)?;
    let switch = (regs.switches.resolve(&opts.switch)?)();
    let host = (regs.hosts.resolve(&opts.host)?)();

    // Remote controllers defer construction until after the hook runs; the
    // addresses themselves are parsed up front so bad input fails early
    let remote = if opts.controller == "remote" {
        let addrs = controller::parse_remote_specs(&opts.ip, opts.port)?;
        Some(controller::remote_factories(addrs))
    } else {
        None
    };

    if let Some(hook) = hook {
        hook.check(opts)?;
    }

    let mut controllers = Vec::new();
    match &remote {
        Some(factories) => {
            for factory in factories {
                if let Some(c) = factory("c0")? {
                    controllers.push(c);
                }
            }
        }
        None => {
            if let Some(c) = (regs.controllers.resolve(&opts.controller)?)("c0")? {
                controllers.push(c);
            }
        }
    }

    let listen_port = if opts.no_listen_port {
        None
    } else {
        Some(opts.listen_port)
    };
    let config = SessionConfigBuilder::default()
        .topo(topo)
        .switch(switch)
        .host(host)
        .controllers(controllers)
        .xterms(opts.xterms)
        .auto_set_macs(opts.mac)
        .auto_static_arp(opts.arp)
        .in_namespace(opts.in_namespace)
        .listen_port(listen_port)
        .prefix_len(opts.prefix_len)
        .use_default_vendor(opts.def_vendor)
        .build()
        .map_err(|e| config_error(format!("session config: {e}")))?;

    info!(
        "building session: {} hosts, {} switches, {} controller(s)",
        config.topo.hosts.len(),
        config.topo.switches.len(),
        config.controllers.len()
    );
    let mut session = engine.build(config)?;
    if opts.test != "build" {
        if let Some(pre) = &opts.pre {
            session.run_script(pre)?;
        }
        session.start()?;
        session::run_test(session.as_mut(), &opts.test)?;
        if let Some(post) = &opts.post {
            session.run_script(post)?;
        }
        session.stop()?;
    }
    Ok(())
}

fn init_logging(verbosity: &str) {
    let level = match verbosity {
        "debug" => LevelFilter::Debug,
        "info" | "output" => LevelFilter::Info,
        "warning" => LevelFilter::Warn,
        "error" | "critical" => LevelFilter::Error,
        _ => LevelFilter::Info,
    };
    // Repeated init is fine; later runs in the same process keep the first
    // logger
    let _ = env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .try_init();
}

fn suppresses_cli_output(verbosity: &str) -> bool {
    matches!(verbosity, "warning" | "error" | "critical")
}
