pub mod args;
pub mod cleanup;
pub mod components;
pub mod controller;
pub mod custom;
pub mod engine;
pub mod launcher;
pub mod registry;
pub mod session;
pub mod test_helpers;
pub mod topo;

use std::io;

/// Fatal configuration error: bad argument, bad override file, bad registry
/// state. Always raised before any emulation state exists.
pub(crate) fn config_error(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.into())
}
