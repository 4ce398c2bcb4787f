use std::env;
use std::process;

use mnet::cleanup;
use mnet::engine::ExternalEngine;
use mnet::launcher;

fn main() {
    // Registered before anything can spawn, so an exit on any path sweeps
    // the whole process group
    cleanup::install();

    let argv: Vec<String> = env::args().collect();
    if let Err(e) = launcher::run(&argv, &ExternalEngine::from_env()) {
        eprintln!("{e}");
        process::exit(1);
    }
}
