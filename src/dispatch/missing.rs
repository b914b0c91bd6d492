use std::rc::Rc;

use anyhow::Result;

use crate::command::{Command, Info};
use crate::context::Context;
use crate::errors::{CmdError, is_unrecognized_command};

/// Called by a dispatcher, at run time, with the subcommand name it could
/// not resolve and the arguments that followed it.
pub type MissingCallback = Rc<dyn Fn(&mut Context, &str, &[String]) -> Result<()>>;

/// Stands in for a subcommand the registry does not know. Resolution
/// succeeds; the callback decides what happens once the command runs.
pub struct MissingCommand {
    callback: MissingCallback,
    super_name: String,
    name: String,
    args: Vec<String>,
}

impl MissingCommand {
    pub fn new(callback: MissingCallback, super_name: &str, name: &str, args: &[String]) -> Self {
        Self {
            callback,
            super_name: super_name.to_string(),
            name: name.to_string(),
            args: args.to_vec(),
        }
    }
}

impl Command for MissingCommand {
    fn info(&self) -> Info {
        Info::new(&self.name, "", "")
    }

    // Never initialised: the arguments were captured at resolution.
    fn init(&mut self, _args: &[String]) -> Result<()> {
        Ok(())
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        match (self.callback)(ctx, &self.name, &self.args) {
            Err(err) if is_unrecognized_command(&err) => Err(CmdError::UnrecognizedCommand(
                format!("{} {}", self.super_name, self.name),
            )
            .into()),
            other => other,
        }
    }
}
