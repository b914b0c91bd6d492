//! External executables that extend a dispatcher's command space.
//!
//! A plugin is any executable named `<prefix><name>` on the search path.
//! Running `<prefix><name> --description` must print one line describing
//! it; any other invocation receives the user's arguments and its exit
//! status becomes the tool's.

mod command;


use std::collections::BTreeMap;
use std::env;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{self, Stdio};
use std::rc::Rc;
use std::thread;

use anyhow::{Context as _, Result, bail};
use crossbeam_channel::bounded;
use log::{debug, error};
use rayon::prelude::*;

pub use command::PluginCommand;

use crate::command::Command;
use crate::context::Context;
use crate::dispatch::MissingCallback;
use crate::errors::{CmdError, is_unrecognized_command};
use crate::flags::FlagSet;

/// The argument every plugin answers with its one-line description.
pub const DESCRIPTION_FLAG: &str = "--description";

const TOPIC_TEXT: &str = "Plugins are implemented as stand-alone executable files somewhere
in the user's PATH. The executable command must be of the format";

/// Outcome of one `--description` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescription {
    /// Executable name, prefix included.
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct Plugins {
    /// Executable name prefix, e.g. `tool-`.
    pub prefix: String,
    /// Title of the plugins help topic.
    pub title: String,
    /// Flags taking a value that the dispatcher accepts on behalf of
    /// every plugin, e.g. `-e`.
    pub ignored_flags: Vec<String>,
    /// Extra `KEY=VALUE` entries for the plugin environment.
    pub env: Vec<String>,
    /// Directories to search instead of `$PATH`.
    pub search_path: Option<Vec<PathBuf>>,
}

impl Plugins {
    pub fn new(prefix: &str, title: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            title: title.to_string(),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_ignored_flags(mut self, flags: &[&str]) -> Self {
        self.ignored_flags = flags.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_search_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_path = Some(dirs);
        self
    }

    fn search_dirs(&self) -> Vec<PathBuf> {
        match &self.search_path {
            Some(dirs) => dirs.clone(),
            None => env::var_os("PATH")
                .map(|path| env::split_paths(&path).collect())
                .unwrap_or_default(),
        }
    }

    /// The search directories in `PATH` syntax, for executable lookup.
    fn search_list(&self) -> Option<OsString> {
        match &self.search_path {
            Some(dirs) => env::join_paths(dirs).ok(),
            None => env::var_os("PATH"),
        }
    }

    /// Lists the executables whose names start with the prefix, sorted.
    /// Without `paths`, the configured search path or `$PATH` is used.
    ///
    /// Matches are not de-duplicated: a name present in two directories
    /// is reported twice.
    pub fn find_all(&self, paths: Option<&[PathBuf]>) -> Vec<String> {
        let dirs = match paths {
            Some(dirs) => dirs.to_vec(),
            None => self.search_dirs(),
        };
        let mut plugins: Vec<String> = dirs
            .par_iter()
            .flat_map_iter(|dir| scan_dir(dir, &self.prefix))
            .collect();
        plugins.sort();
        plugins
    }

    /// Runs every plugin with `--description`, all at once, and maps
    /// names (prefix stripped) to the first line each printed.
    ///
    /// A failing plugin is described by a placeholder and logged. There is
    /// no timeout: a plugin that never exits blocks the call.
    pub fn descriptions(&self) -> BTreeMap<String, String> {
        let plugins = self.find_all(None);
        if plugins.is_empty() {
            return BTreeMap::new();
        }

        let (tx, rx) = bounded(plugins.len());
        let search = self.search_list();
        for plugin in &plugins {
            let tx = tx.clone();
            let plugin = plugin.clone();
            let search = search.clone();
            thread::spawn(move || {
                let result = probe(&plugin, search.as_deref());
                tx.send(result).ok();
            });
        }
        drop(tx);

        let mut results = BTreeMap::new();
        for result in rx.iter() {
            let name = result
                .name
                .strip_prefix(&self.prefix)
                .unwrap_or(&result.name)
                .to_string();
            results.insert(name, result.description);
        }
        results
    }

    /// Text of the plugins help topic.
    pub fn help_topic(&self) -> String {
        let mut out = format!(
            "{}\n\n{}\n\"{}<plugin name>\".\n\n",
            self.title, TOPIC_TEXT, self.prefix
        );
        let found = self.descriptions();
        if found.is_empty() {
            out.push_str("No plugins found.\n");
            return out;
        }
        let longest = found.keys().map(String::len).max().unwrap_or(0);
        for (name, description) in &found {
            out.push_str(&format!("{:<w$}  {}\n", name, description, w = longest));
        }
        out
    }

    /// Picks the ignored flags, each with the token after it, out of a
    /// plugin's arguments. Everything else is dropped.
    pub fn extract_ignored_args(&self, args: &[String]) -> Vec<String> {
        let mut ignored = Vec::new();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            if !self.ignored_flags.iter().any(|f| f == arg) {
                continue;
            }
            ignored.push(arg.clone());
            if let Some(value) = iter.next() {
                ignored.push(value.clone());
            }
        }
        ignored
    }

    fn command(&self, subcommand: &str) -> PluginCommand {
        PluginCommand::new(&format!("{}{}", self.prefix, subcommand))
            .with_env(&self.env)
            .with_ignored_flags(&self.ignored_flags)
            .with_search_path(self.search_list())
    }

    /// Runs `<prefix><subcommand>` with `args`. A plugin that does not
    /// exist is reported as an unrecognized `subcommand`.
    pub fn run_plugin(&self, ctx: &mut Context, subcommand: &str, args: &[String]) -> Result<()> {
        let mut plugin = self.command(subcommand);

        let mut flags = FlagSet::new(plugin.info().name);
        plugin.set_flags(&mut flags);
        let values = flags.parse(false, &self.extract_ignored_args(args))?;
        plugin.apply_flags(&values)?;

        plugin.init(args)?;
        match plugin.run(ctx) {
            Err(err) if is_unrecognized_command(&err) => {
                Err(CmdError::UnrecognizedCommand(subcommand.to_string()).into())
            }
            other => other,
        }
    }

    /// A dispatcher fallback that runs unknown subcommands as plugins.
    pub fn missing_callback(&self) -> MissingCallback {
        let plugins = self.clone();
        Rc::new(
            move |ctx: &mut Context, subcommand: &str, args: &[String]| -> Result<()> {
                plugins.run_plugin(ctx, subcommand, args)
            },
        )
    }
}

fn scan_dir(dir: &Path, prefix: &str) -> Vec<String> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("skipping {}: {}", dir.display(), err);
            return Vec::new();
        }
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if !name.starts_with(prefix) {
                return None;
            }
            let meta = entry.metadata().ok()?;
            is_executable(&meta).then_some(name)
        })
        .collect()
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(meta: &fs::Metadata) -> bool {
    meta.is_file()
}

fn probe(plugin: &str, search: Option<&OsStr>) -> PluginDescription {
    let description = match describe(plugin, search) {
        Ok(description) => description,
        Err(err) => {
            error!("'{} {}': {:#}", plugin, DESCRIPTION_FLAG, err);
            format!("error occurred running '{} {}'", plugin, DESCRIPTION_FLAG)
        }
    };
    PluginDescription {
        name: plugin.to_string(),
        description,
    }
}

fn describe(plugin: &str, search: Option<&OsStr>) -> Result<String> {
    let cwd = env::current_dir().context("cannot read current directory")?;
    let program = which::which_in(plugin, search, cwd)?;

    // stdout and stderr share one pipe so the output stays interleaved.
    let (mut reader, writer) = os_pipe::pipe().context("cannot create output pipe")?;
    let writer_err = writer.try_clone().context("cannot clone output pipe")?;
    let mut cmd = process::Command::new(&program);
    cmd.arg(DESCRIPTION_FLAG)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(writer_err);
    let mut child = cmd
        .spawn()
        .with_context(|| format!("cannot start {}", program.display()))?;
    // Our copies of the write end must go, or the read never ends.
    drop(cmd);

    let mut output = Vec::new();
    reader.read_to_end(&mut output)?;
    let status = child.wait()?;
    if !status.success() {
        bail!("{}", status);
    }
    let output = String::from_utf8_lossy(&output);
    Ok(output.split('\n').next().unwrap_or_default().to_string())
}
