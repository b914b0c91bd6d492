//! Hierarchical command dispatch: an alias-aware registry, nested
//! dispatchers that share flags with their subcommands, and external
//! executables on `PATH` adopted as plugins.

pub mod command;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod flags;
pub mod logger;
pub mod plugins;
pub mod registry;
pub mod testing;

pub use command::{Command, CommandRef, Info, check_empty, run_main};
pub use context::Context;
pub use dispatch::{DeprecationCheck, SuperCommand, SuperCommandParams};
pub use errors::{CmdError, RegistryError};
pub use registry::{Action, Registry};
