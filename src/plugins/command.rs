use std::ffi::OsString;
use std::io::{self, Write};
use std::mem;
use std::path::PathBuf;
use std::process::{self, Stdio};
use std::thread;

use anyhow::{Context as _, Result, bail};
use log::debug;

use crate::command::{Command, Info};
use crate::context::{Context, Input, Output};
use crate::errors::CmdError;
use crate::flags::FlagSet;

/// Runs an external `<prefix><name>` executable as if it were a
/// subcommand.
pub struct PluginCommand {
    name: String,
    args: Vec<String>,
    env: Vec<String>,
    ignored_flags: Vec<String>,
    search_path: Option<OsString>,
}

impl PluginCommand {
    /// `name` is the executable name, prefix included.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Vec::new(),
            env: Vec::new(),
            ignored_flags: Vec::new(),
            search_path: None,
        }
    }

    /// Extra `KEY=VALUE` entries laid over the inherited environment.
    pub fn with_env(mut self, env: &[String]) -> Self {
        self.env = env.to_vec();
        self
    }

    /// Flags the dispatcher consumes on the plugin's behalf.
    pub fn with_ignored_flags(mut self, flags: &[String]) -> Self {
        self.ignored_flags = flags.to_vec();
        self
    }

    /// Directories searched for the executable, in `PATH` syntax.
    /// Defaults to `$PATH`.
    pub fn with_search_path(mut self, path: Option<OsString>) -> Self {
        self.search_path = path;
        self
    }

    fn resolve(&self, ctx: &Context) -> which::Result<PathBuf> {
        let path = self
            .search_path
            .clone()
            .or_else(|| std::env::var_os("PATH"));
        which::which_in(&self.name, path, &ctx.dir)
    }

    fn not_found(&self) -> anyhow::Error {
        CmdError::UnrecognizedCommand(self.name.clone()).into()
    }
}

fn child_stdio(output: &Output) -> Stdio {
    match output {
        Output::Stdout => io::stdout().into(),
        Output::Stderr => io::stderr().into(),
        Output::Writer(_) => Stdio::piped(),
    }
}

impl Command for PluginCommand {
    fn info(&self) -> Info {
        Info::new(&self.name, "", "")
    }

    fn set_flags(&self, f: &mut FlagSet) {
        for flag in &self.ignored_flags {
            f.string(flag.trim_start_matches('-'), None, "");
        }
    }

    fn init(&mut self, args: &[String]) -> Result<()> {
        self.args = args.to_vec();
        Ok(())
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        // 1. Find the executable
        let program = match self.resolve(ctx) {
            Ok(program) => program,
            Err(err) => {
                debug!("plugin {} not found: {}", self.name, err);
                return Err(self.not_found());
            }
        };

        ctx.verbosef(format!("running plugin {}", program.display()));

        // 2. Build the child: arguments, directory, extra environment
        let mut cmd = process::Command::new(&program);
        cmd.args(&self.args).current_dir(&ctx.dir);
        for entry in &self.env {
            match entry.split_once('=') {
                Some((key, value)) => {
                    cmd.env(key, value);
                }
                None => debug!("ignoring plugin env entry without '=': {:?}", entry),
            }
        }
        cmd.stdin(match ctx.stdin {
            Input::Inherit => Stdio::inherit(),
            Input::Reader(_) => Stdio::piped(),
        });
        cmd.stdout(child_stdio(&ctx.stdout));
        cmd.stderr(child_stdio(&ctx.stderr));

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) => {
                debug!("cannot start plugin {}: {}", program.display(), err);
                return Err(self.not_found());
            }
        };

        // 3. Wire the streams. The child owns the input from here on;
        // nothing waits for the copy.
        if let Some(mut child_in) = child.stdin.take() {
            let mut source = mem::replace(&mut ctx.stdin, Input::Reader(Box::new(io::empty())));
            thread::spawn(move || {
                io::copy(&mut source, &mut child_in).ok();
            });
        }

        let child_out = child.stdout.take();
        let child_err = child.stderr.take();
        let (stdout, stderr) = (&mut ctx.stdout, &mut ctx.stderr);
        let status = thread::scope(|s| {
            if let Some(mut pipe) = child_out {
                s.spawn(move || io::copy(&mut pipe, stdout).ok());
            }
            if let Some(mut pipe) = child_err {
                s.spawn(move || io::copy(&mut pipe, stderr).ok());
            }
            child.wait()
        })
        .with_context(|| format!("waiting for plugin {}", self.name))?;
        ctx.stdout.flush().ok();

        // 4. Hand the exit status back
        if status.success() {
            return Ok(());
        }
        match status.code() {
            Some(code) => Err(CmdError::RcPassthrough(code).into()),
            None => bail!("plugin {} {}", self.name, status),
        }
    }
}
