//! Tether core - platform-independent master-process controller
//!
//! This crate contains the controller state machine and the narrow traits it
//! consumes: a [`ProcessLauncher`] that spawns the companion OS process and a
//! [`RemoteChannel`] through which the child calls back to register. Platform
//! launchers and a concrete channel live in the sibling crates.

mod config;
mod controller;
mod error;
mod events;
mod process;
mod remote;

pub mod testing;

pub use config::{ControllerConfig, ControllerConfigBuilder};
pub use controller::{MasterController, Phase};
pub use error::ControllerError;
pub use events::{ControllerEvents, NoopEvents};
pub use process::{ChildExit, ProcessHandle, ProcessLauncher, forward_lines};
pub use remote::{PublishedLocator, RegistrationSink, RemoteChannel, RemoteHandle};
