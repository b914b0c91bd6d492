use std::cell::RefCell;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

use anyhow::Result;

use crate::context::Context;
use crate::dispatch::SuperCommand;
use crate::errors::{CmdError, is_silent, passthrough_code};
use crate::flags::{FlagSet, FlagValues};
use crate::registry::Registry;

/// Describes a command for help output and registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Info {
    /// Name under which the command is registered.
    pub name: String,
    /// Positional argument summary, e.g. `<model> [<key>...]`.
    pub args: String,
    /// One-line summary.
    pub purpose: String,
    /// Longer free-form description.
    pub doc: String,
    /// Other names the command is reachable by.
    pub aliases: Vec<String>,
}

impl Info {
    pub fn new(name: &str, args: &str, purpose: &str) -> Self {
        Self {
            name: name.to_string(),
            args: args.to_string(),
            purpose: purpose.to_string(),
            ..Default::default()
        }
    }

    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    /// Renders the full help text for a command declaring `flags`.
    pub fn help(&self, flags: &FlagSet) -> String {
        let has_options = !flags.is_empty();
        let mut out = format!("Usage: {}", self.name);
        if has_options {
            out.push_str(" [options]");
        }
        if !self.args.is_empty() {
            out.push(' ');
            out.push_str(&self.args);
        }
        out.push('\n');
        if !self.purpose.is_empty() {
            out.push_str(&format!("\nSummary:\n{}\n", self.purpose));
        }
        if has_options {
            out.push_str("\nOptions:\n");
            out.push_str(&flags.usage());
        }
        let doc = self.doc.trim();
        if !doc.is_empty() {
            out.push_str(&format!("\nDetails:\n{}\n", doc));
        }
        if !self.aliases.is_empty() {
            out.push_str(&format!("\nAliases: {}\n", self.aliases.join(", ")));
        }
        out
    }
}

/// A runnable command.
///
/// The dispatcher drives a command in a fixed order: `set_flags` to
/// declare flags, a parse, `apply_flags` with the parsed values, `init`
/// with the remaining positionals, and finally `run`.
pub trait Command {
    fn info(&self) -> Info;

    fn set_flags(&self, _flags: &mut FlagSet) {}

    fn apply_flags(&mut self, _values: &FlagValues) -> Result<()> {
        Ok(())
    }

    /// Whether flags may follow positional arguments.
    fn allow_interspersed_flags(&self) -> bool {
        true
    }

    fn init(&mut self, args: &[String]) -> Result<()>;

    fn run(&mut self, ctx: &mut Context) -> Result<()>;
}

/// Fails when a command received positionals it does not take.
pub fn check_empty(args: &[String]) -> Result<()> {
    if !args.is_empty() {
        return Err(CmdError::UnrecognizedArgs(args.to_vec()).into());
    }
    Ok(())
}

/// The command wrapped by an action: a plain leaf, or a nested
/// dispatcher whose registry lookups can descend into.
#[derive(Clone)]
pub enum CommandRef {
    Leaf(Rc<RefCell<dyn Command>>),
    Super {
        command: Rc<RefCell<SuperCommand>>,
        registry: Rc<RefCell<Registry>>,
    },
}

impl CommandRef {
    pub fn leaf(command: impl Command + 'static) -> Self {
        CommandRef::Leaf(Rc::new(RefCell::new(command)))
    }

    pub fn super_command(command: SuperCommand) -> Self {
        let registry = command.registry();
        CommandRef::Super {
            command: Rc::new(RefCell::new(command)),
            registry,
        }
    }

    pub fn is_super_command(&self) -> bool {
        matches!(self, CommandRef::Super { .. })
    }

    /// Registry of a nested dispatcher.
    pub fn nested_registry(&self) -> Option<Rc<RefCell<Registry>>> {
        match self {
            CommandRef::Leaf(_) => None,
            CommandRef::Super { registry, .. } => Some(registry.clone()),
        }
    }

    /// True when both refer to the very same command value.
    pub fn same_command(&self, other: &CommandRef) -> bool {
        match (self, other) {
            (CommandRef::Leaf(a), CommandRef::Leaf(b)) => Rc::ptr_eq(a, b),
            (CommandRef::Super { command: a, .. }, CommandRef::Super { command: b, .. }) => {
                Rc::ptr_eq(a, b)
            }
            _ => false,
        }
    }

    pub fn info(&self) -> Info {
        match self {
            CommandRef::Leaf(c) => c.borrow().info(),
            CommandRef::Super { command, .. } => command.borrow().info(),
        }
    }

    /// Like `info`, but `None` while the command itself is running.
    pub fn try_info(&self) -> Option<Info> {
        match self {
            CommandRef::Leaf(c) => c.try_borrow().ok().map(|c| c.info()),
            CommandRef::Super { command, .. } => command.try_borrow().ok().map(|c| c.info()),
        }
    }

    pub fn set_flags(&self, flags: &mut FlagSet) {
        match self {
            CommandRef::Leaf(c) => c.borrow().set_flags(flags),
            CommandRef::Super { command, .. } => command.borrow().set_flags(flags),
        }
    }

    pub fn apply_flags(&self, values: &FlagValues) -> Result<()> {
        match self {
            CommandRef::Leaf(c) => c.borrow_mut().apply_flags(values),
            CommandRef::Super { command, .. } => command.borrow_mut().apply_flags(values),
        }
    }

    pub fn allow_interspersed_flags(&self) -> bool {
        match self {
            CommandRef::Leaf(c) => c.borrow().allow_interspersed_flags(),
            CommandRef::Super { command, .. } => command.borrow().allow_interspersed_flags(),
        }
    }

    pub fn init(&self, args: &[String]) -> Result<()> {
        match self {
            CommandRef::Leaf(c) => c.borrow_mut().init(args),
            CommandRef::Super { command, .. } => command.borrow_mut().init(args),
        }
    }

    pub fn run(&self, ctx: &mut Context) -> Result<()> {
        match self {
            CommandRef::Leaf(c) => c.borrow_mut().run(ctx),
            CommandRef::Super { command, .. } => command.borrow_mut().run(ctx),
        }
    }
}

impl fmt::Debug for CommandRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandRef::Leaf(_) => f.write_str("CommandRef::Leaf"),
            CommandRef::Super { .. } => f.write_str("CommandRef::Super"),
        }
    }
}

/// Parses `args`, initialises and runs `command`, and returns the process
/// exit code.
///
/// Flag and init failures print `error: ...` and return 2. A pass-through
/// error returns the child's code untouched, a silent error returns 1, and
/// anything else prints `ERROR ...` and returns 1.
pub fn run_main(command: &mut dyn Command, ctx: &mut Context, args: &[String]) -> i32 {
    let mut flags = FlagSet::new(command.info().name);
    command.set_flags(&mut flags);

    let prepared = flags
        .parse(command.allow_interspersed_flags(), args)
        .and_then(|values| {
            command.apply_flags(&values)?;
            command.init(values.args())
        });
    if let Err(err) = prepared {
        let _ = writeln!(ctx.stderr, "error: {:#}", err);
        return 2;
    }

    match command.run(ctx) {
        Ok(()) => 0,
        Err(err) => {
            if let Some(code) = passthrough_code(&err) {
                return code;
            }
            if !is_silent(&err) {
                let _ = writeln!(ctx.stderr, "ERROR {:#}", err);
            }
            1
        }
    }
}
