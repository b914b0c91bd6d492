//! The recursive dispatcher: a command that owns a registry of
//! subcommands, resolves one path element and runs whatever it selects.

pub mod help;
pub mod missing;


use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use anyhow::Result;
use log::{error, info};

use crate::command::{Command, CommandRef, Info, check_empty};
use crate::context::Context;
use crate::errors::{CmdError, RegistryError, is_silent, passthrough_code};
use crate::flags::{FlagSet, FlagValues};
use crate::logger::Log;
use crate::registry::{Action, Registry};

pub use help::{HELP_PURPOSE, HelpCommand, Topic, Topics, VersionCommand, describe_commands};
pub use missing::{MissingCallback, MissingCommand};

use help::Overview;

/// Decides whether a command registered through
/// [`SuperCommand::register_deprecated`] is deprecated or obsolete.
pub trait DeprecationCheck {
    /// The replacement to recommend, when the command is deprecated.
    fn deprecated(&self) -> Option<String>;

    /// Obsolete commands are not registered at all.
    fn obsolete(&self) -> bool;
}

#[derive(Default)]
pub struct SuperCommandParams {
    /// Set when the dispatcher is itself a subcommand; prefixes the name
    /// passed to `notify_run` unless identical to it.
    pub usage_prefix: String,
    /// Called with the qualified name right before a subcommand runs.
    pub notify_run: Option<Box<dyn Fn(&str)>>,
    pub name: String,
    pub purpose: String,
    pub doc: String,
    pub log: Option<Log>,
    pub missing_callback: Option<MissingCallback>,
    pub aliases: Vec<String>,
    /// Adds a `version` command and a `--version` flag when not empty.
    pub version: String,
}

/// A command that selects a subcommand and assumes its behaviour.
///
/// Its own flags must precede the subcommand name. Everything from the
/// name onward belongs to the subcommand, which also sees the common
/// flags (logging, `-h/--help`, `--description`) unless it is a
/// dispatcher itself.
pub struct SuperCommand {
    pub name: String,
    pub purpose: String,
    pub doc: String,
    pub log: Option<Log>,
    pub aliases: Vec<String>,
    version: String,
    usage_prefix: String,
    notify_run: Option<Box<dyn Fn(&str)>>,
    missing_callback: Option<MissingCallback>,
    registry: Rc<RefCell<Registry>>,
    topics: Rc<RefCell<Topics>>,
    action: Option<Action>,
    show_help: bool,
    show_description: bool,
    show_version: bool,
}

impl SuperCommand {
    pub fn new(params: SuperCommandParams) -> Self {
        let command = SuperCommand {
            name: params.name,
            purpose: params.purpose,
            doc: params.doc,
            log: params.log,
            aliases: params.aliases,
            version: params.version,
            usage_prefix: params.usage_prefix,
            notify_run: params.notify_run,
            missing_callback: params.missing_callback,
            registry: Rc::new(RefCell::new(Registry::default())),
            topics: Rc::new(RefCell::new(Topics::default())),
            action: None,
            show_help: false,
            show_description: false,
            show_version: false,
        };

        let overview = command.overview();
        *command.topics.borrow_mut() =
            help::default_topics(&overview, Rc::downgrade(&command.registry));
        let help = HelpCommand::new(
            overview,
            Rc::downgrade(&command.registry),
            command.topics.clone(),
        );

        let mut builtin = vec![Action::named("help", CommandRef::leaf(help))];
        if !command.version.is_empty() {
            builtin.push(Action::named(
                "version",
                CommandRef::leaf(VersionCommand::new(&command.version)),
            ));
        }
        *command.registry.borrow_mut() = Registry::seeded(builtin);
        command
    }

    /// The registry shared with nested lookups and the help command.
    pub fn registry(&self) -> Rc<RefCell<Registry>> {
        self.registry.clone()
    }

    fn qualified_name(&self) -> String {
        if self.usage_prefix.is_empty() || self.usage_prefix == self.name {
            self.name.clone()
        } else {
            format!("{} {}", self.usage_prefix, self.name)
        }
    }

    fn overview(&self) -> Overview {
        let mut common = FlagSet::new(self.name.clone());
        self.set_common_flags(&mut common);
        let mut flags = FlagSet::new(self.name.clone());
        self.set_flags(&mut flags);
        Overview {
            name: self.qualified_name(),
            purpose: self.purpose.clone(),
            doc: self.doc.clone(),
            aliases: self.aliases.clone(),
            flags,
            common,
        }
    }

    /// Makes `command` available under its own name and its aliases.
    pub fn register(&mut self, command: CommandRef) -> Result<(), RegistryError> {
        self.registry
            .borrow_mut()
            .add_with_aliases(Action::new(command))
    }

    /// Registers `command` unless `check` reports it obsolete. A
    /// deprecated command warns, naming its replacement, whenever it runs.
    pub fn register_deprecated(
        &mut self,
        command: CommandRef,
        check: Option<&dyn DeprecationCheck>,
    ) -> Result<(), RegistryError> {
        let mut action = Action::new(command);
        if let Some(check) = check {
            if check.obsolete() {
                info!("{:?} command not registered as it is obsolete", action.name);
                return Ok(());
            }
            if let Some(replacement) = check.deprecated() {
                action.replacement = replacement;
            }
        }
        self.registry.borrow_mut().add_with_aliases(action)
    }

    /// Makes the registered command `for_name` available as `name`.
    pub fn register_alias(
        &mut self,
        name: &str,
        for_name: &str,
        check: Option<&dyn DeprecationCheck>,
    ) -> Result<(), RegistryError> {
        if check.is_some_and(|c| c.obsolete()) {
            info!("{:?} alias not registered as it is obsolete", name);
            return Ok(());
        }
        self.registry.borrow_mut().add_alias(for_name, name)
    }

    /// Makes `for_name`, a subcommand of the registered dispatcher
    /// `super_name`, available directly as `name`.
    pub fn register_super_alias(
        &mut self,
        name: &str,
        super_name: &str,
        for_name: &str,
        check: Option<&dyn DeprecationCheck>,
    ) -> Result<(), RegistryError> {
        if check.is_some_and(|c| c.obsolete()) {
            info!("{:?} alias not registered as it is obsolete", name);
            return Ok(());
        }

        let aliased = format!("{} {}", super_name, for_name);
        let walked = self.registry.borrow().walk(&[super_name, for_name]);
        let action = match walked {
            (Some(action), 2) => action,
            (Some(action), _) if !action.command.is_super_command() => {
                return Err(RegistryError::NotASuperCommand(super_name.to_string()));
            }
            _ => return Err(RegistryError::NotFound(aliased)),
        };

        let mut alias = action.new_alias(name);
        alias.aliased_name = aliased;
        self.registry.borrow_mut().add(alias)
    }

    /// Adds a topic shown by `help <name>`.
    pub fn add_help_topic(
        &mut self,
        name: &str,
        short: &str,
        long: &str,
        aliases: &[&str],
    ) -> Result<(), RegistryError> {
        self.topics
            .borrow_mut()
            .add_with_aliases(Topic::text(name, short, long).with_aliases(aliases))
    }

    /// Adds a topic whose text is produced when it is shown.
    pub fn add_help_topic_callback(
        &mut self,
        name: &str,
        short: &str,
        long: impl Fn() -> String + 'static,
    ) -> Result<(), RegistryError> {
        self.topics
            .borrow_mut()
            .add_with_aliases(Topic::new(name, short, move |_| long()))
    }

    /// The flags every leaf subcommand shares with this dispatcher.
    pub fn set_common_flags(&self, f: &mut FlagSet) {
        if let Some(log) = &self.log {
            log.add_flags(f);
        }
        f.bool("help", Some('h'), HELP_PURPOSE);
        // Plugins must answer --description with their purpose.
        f.bool("description", None, "show short description for plugin help");
    }

    fn apply_common_flags(&mut self, values: &FlagValues) {
        if let Some(log) = &mut self.log {
            log.apply_flags(values);
        }
        if values.flag("help") {
            self.show_help = true;
        }
        if values.flag("description") {
            self.show_description = true;
        }
    }

    fn prepare(&mut self, name: &str, rest: &[String]) -> Result<()> {
        // 1. Resolve the name, falling back to the missing callback
        let found = self.registry.borrow().lookup(&[name]);
        let Some(mut action) = found else {
            let Some(callback) = &self.missing_callback else {
                return Err(
                    CmdError::UnrecognizedCommand(format!("{} {}", self.name, name)).into(),
                );
            };
            let missing = MissingCommand::new(callback.clone(), &self.name, name, rest);
            self.action = Some(Action::named(name, CommandRef::leaf(missing)));
            return Ok(());
        };

        // 2. Parse the rest. Nested dispatchers keep their own flags.
        let nested = action.command.is_super_command();
        let mut flags = FlagSet::new(format!("{} {}", self.name, action.name));
        if !nested {
            self.set_common_flags(&mut flags);
        }
        action.command.set_flags(&mut flags);
        let values = flags.parse(action.command.allow_interspersed_flags(), rest)?;
        if !nested {
            self.apply_common_flags(&values);
        }
        action.command.apply_flags(&values)?;

        // 3. `-h` turns the selection into `help <name>`
        let mut args = values.into_args();
        if self.show_help {
            let help = self.registry.borrow().lookup(&["help"]);
            if let Some(help) = help {
                args = vec![action.name.clone()];
                action = help;
            }
        }
        action.init(&args)?;
        self.action = Some(action);
        Ok(())
    }

    fn pre_run(&self, action: &Action, ctx: &mut Context) -> Result<()> {
        if let Some(log) = &self.log {
            log.start(ctx)?;
        }
        if let Some(notify) = &self.notify_run {
            notify(&self.qualified_name());
        }
        action.pre_run(ctx)
    }

    fn report(&self, ctx: &mut Context, err: &anyhow::Error) {
        error!("{:#}", err);
        if !self.log.as_ref().is_some_and(Log::writes_to_stderr) {
            let _ = writeln!(ctx.stderr, "ERROR {:#}", err);
        }
    }
}

impl Command for SuperCommand {
    fn info(&self) -> Info {
        if let Some(action) = &self.action {
            if action.validate().is_ok() {
                if let Some(mut info) = action.command.try_info() {
                    info.name = format!("{} {}", self.name, info.name);
                    return info;
                }
            }
        }
        // The usage prefix only shows in help; parents register the bare name.
        let mut info = self.overview().info(&self.registry.borrow());
        info.name = self.name.clone();
        info
    }

    fn set_flags(&self, f: &mut FlagSet) {
        self.set_common_flags(f);
        if !self.version.is_empty() {
            f.bool("version", None, "show the command's version and exit");
        }
    }

    fn apply_flags(&mut self, values: &FlagValues) -> Result<()> {
        self.apply_common_flags(values);
        if values.flag("version") {
            self.show_version = true;
        }
        Ok(())
    }

    fn allow_interspersed_flags(&self) -> bool {
        false
    }

    fn init(&mut self, args: &[String]) -> Result<()> {
        if self.show_description {
            return check_empty(args);
        }
        if self.show_version {
            let version = self.registry.borrow().lookup(&["version"]);
            if let Some(action) = version {
                action.init(args)?;
                self.action = Some(action);
                return Ok(());
            }
        }
        let Some((name, rest)) = args.split_first() else {
            let default = self.registry.borrow().lookup::<&str>(&[]);
            if let Some(action) = &default {
                action.init(&[])?;
            }
            self.action = default;
            return Ok(());
        };
        self.prepare(name, rest)
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        if self.show_description {
            if self.purpose.is_empty() {
                writeln!(ctx.stdout, "{}: no description available", self.name)?;
            } else {
                writeln!(ctx.stdout, "{}", self.purpose)?;
            }
            return Ok(());
        }

        let action = match &self.action {
            Some(action) if action.validate().is_ok() => action.clone(),
            _ => panic!("run: missing subcommand; init failed or not called"),
        };
        self.pre_run(&action, ctx)?;

        match action.run(ctx) {
            Ok(()) => {
                info!("command finished");
                Ok(())
            }
            Err(err) if is_silent(&err) || passthrough_code(&err).is_some() => Err(err),
            Err(err) => {
                self.report(ctx, &err);
                Err(CmdError::Silent.into())
            }
        }
    }
}
