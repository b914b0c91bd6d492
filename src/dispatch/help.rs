use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::{Rc, Weak};

use anyhow::{Result, anyhow, bail};

use crate::command::{Command, Info, check_empty};
use crate::context::Context;
use crate::errors::RegistryError;
use crate::flags::FlagSet;
use crate::registry::Registry;

pub const HELP_PURPOSE: &str = "show help on a command or other topic";

const HELP_DOC: &str = "See also: topics";

const GLOBAL_OPTIONS_TEXT: &str = "Global Options

These options may be used with any command, and may appear in front of any
command.

";

type TopicText = Rc<dyn Fn(&Topics) -> String>;

/// A named piece of prose shown by `help <name>`.
#[derive(Clone)]
pub struct Topic {
    pub name: String,
    /// One-line summary for `help topics`.
    pub short: String,
    long: TopicText,
    /// Other names the topic can be looked up by. Not listed.
    pub aliases: Vec<String>,
}

impl Topic {
    pub fn new(name: &str, short: &str, long: impl Fn(&Topics) -> String + 'static) -> Self {
        Self {
            name: name.to_string(),
            short: short.to_string(),
            long: Rc::new(long),
            aliases: Vec::new(),
        }
    }

    pub fn text(name: &str, short: &str, long: &str) -> Self {
        let long = long.to_string();
        Self::new(name, short, move |_| long.clone())
    }

    pub fn with_aliases(mut self, aliases: &[&str]) -> Self {
        self.aliases = aliases.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn long(&self, topics: &Topics) -> String {
        (self.long)(topics)
    }
}

/// Ordered, alias-aware store of help topics.
#[derive(Default)]
pub struct Topics {
    order: Vec<String>,
    topics: HashMap<String, Topic>,
    aliases: HashMap<String, String>,
}

impl Topics {
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn names_without_aliases(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|n| !self.aliases.contains_key(n.as_str()))
            .cloned()
            .collect()
    }

    pub fn lookup(&self, name: &str) -> Option<&Topic> {
        if let Some(topic) = self.topics.get(name) {
            return Some(topic);
        }
        self.aliases.get(name).and_then(|t| self.topics.get(t))
    }

    pub fn add(&mut self, topic: Topic) -> Result<(), RegistryError> {
        if self.lookup(&topic.name).is_some() {
            return Err(RegistryError::TopicAlreadyAdded(topic.name));
        }
        self.order.push(topic.name.clone());
        self.topics.insert(topic.name.clone(), topic);
        Ok(())
    }

    /// Adds `topic` and its aliases, or nothing at all.
    pub fn add_with_aliases(&mut self, topic: Topic) -> Result<(), RegistryError> {
        let name = topic.name.clone();
        let aliases = topic.aliases.clone();
        self.add(topic)?;

        let mut added: Vec<&str> = Vec::new();
        for alias in &aliases {
            if let Err(err) = self.add_alias(&name, alias) {
                self.remove(&name);
                for alias in added {
                    self.remove(alias);
                }
                return Err(err);
            }
            added.push(alias);
        }
        Ok(())
    }

    pub fn add_alias(&mut self, name: &str, alias: &str) -> Result<(), RegistryError> {
        if !self.topics.contains_key(name) {
            return Err(RegistryError::TopicNotFound(name.to_string()));
        }
        if self.lookup(alias).is_some() {
            return Err(RegistryError::TopicAlreadyAdded(alias.to_string()));
        }
        self.aliases.insert(alias.to_string(), name.to_string());
        self.order.push(alias.to_string());
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<Topic> {
        let removed = match self.topics.remove(name) {
            Some(topic) => Some(topic),
            None => {
                self.aliases.remove(name)?;
                None
            }
        };
        self.order.retain(|n| n != name);
        removed
    }

    /// The `help topics` listing: sorted, aliases left out.
    pub fn list(&self) -> String {
        let mut names = self.names_without_aliases();
        names.sort();
        let longest = names.iter().map(String::len).max().unwrap_or(0);
        names
            .iter()
            .filter_map(|name| {
                let topic = self.topics.get(name)?;
                Some(format!("{:<w$}  {}", name, topic.short, w = longest))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Lists the registered commands, sorted by name and aligned on the
/// longest one. Deprecated entries are left out.
pub fn describe_commands(registry: &Registry, simple: bool) -> String {
    let mut names = registry.names();
    names.sort();
    let longest = names.iter().map(String::len).max().unwrap_or(0);

    let mut lines = Vec::new();
    for name in &names {
        let Some(action) = registry.lookup(&[name]) else {
            continue;
        };
        if !action.replacement.is_empty() {
            continue;
        }
        let purpose = if action.aliased_name.is_empty() {
            // Only the help command is borrowed while commands are listed.
            action
                .command
                .try_info()
                .map(|info| info.purpose)
                .unwrap_or_else(|| HELP_PURPOSE.to_string())
        } else {
            action.summary()
        };
        if simple {
            lines.push(format!("{:<w$}  {}", name, purpose, w = longest));
        } else {
            lines.push(format!("    {:<w$} - {}", name, purpose, w = longest));
        }
    }
    if simple {
        lines.join("\n")
    } else {
        format!("commands:\n{}", lines.join("\n"))
    }
}

/// What a dispatcher shows about itself when no subcommand is selected.
#[derive(Clone)]
pub(crate) struct Overview {
    pub name: String,
    pub purpose: String,
    pub doc: String,
    pub aliases: Vec<String>,
    /// The dispatcher's own flags, common flags included.
    pub flags: FlagSet,
    /// Flags every leaf subcommand accepts.
    pub common: FlagSet,
}

impl Overview {
    pub fn info(&self, registry: &Registry) -> Info {
        let mut doc = Vec::new();
        let own = self.doc.trim();
        if !own.is_empty() {
            doc.push(own.to_string());
        }
        doc.push(describe_commands(registry, false));
        Info {
            name: self.name.clone(),
            args: "<command> ...".to_string(),
            purpose: self.purpose.clone(),
            doc: doc.join("\n\n"),
            aliases: self.aliases.clone(),
        }
    }
}

/// Builds the topics every dispatcher starts with.
pub(crate) fn default_topics(overview: &Overview, registry: Weak<RefCell<Registry>>) -> Topics {
    let mut topics = Topics::default();
    let common = overview.common.usage();
    let builtin = [
        Topic::new("commands", "Basic help for all commands", move |_| {
            registry
                .upgrade()
                .map(|r| describe_commands(&r.borrow(), true))
                .unwrap_or_default()
        }),
        Topic::new(
            "global-options",
            "Options common to all commands",
            move |_| format!("{}{}", GLOBAL_OPTIONS_TEXT, common),
        ),
        Topic::new("topics", "Topic list", |topics| topics.list()),
    ];
    for topic in builtin {
        // The store is empty and the names are distinct.
        let _ = topics.add(topic);
    }
    topics
}

/// The `help` command every dispatcher registers as its default.
pub struct HelpCommand {
    overview: Overview,
    registry: Weak<RefCell<Registry>>,
    topics: Rc<RefCell<Topics>>,
    args: Vec<String>,
}

impl HelpCommand {
    pub(crate) fn new(
        overview: Overview,
        registry: Weak<RefCell<Registry>>,
        topics: Rc<RefCell<Topics>>,
    ) -> Self {
        Self {
            overview,
            registry,
            topics,
            args: Vec::new(),
        }
    }

    fn registry(&self) -> Result<Rc<RefCell<Registry>>> {
        self.registry
            .upgrade()
            .ok_or_else(|| anyhow!("help: the command registry is gone"))
    }

    fn command_help(&self, registry: &Rc<RefCell<Registry>>) -> Option<String> {
        let action = registry.borrow().lookup(&self.args)?;
        let (mut info, flags) = match action.command.try_info() {
            Some(info) => {
                let mut flags = FlagSet::new(info.name.clone());
                action.command.set_flags(&mut flags);
                (info, flags)
            }
            // `help help`: the target is this very command.
            None => (self.info(), FlagSet::new("help")),
        };
        info.name = format!("{} {}", self.overview.name, self.args.join(" "));
        Some(info.help(&flags))
    }
}

impl Command for HelpCommand {
    fn info(&self) -> Info {
        Info::new("help", "[topic]", HELP_PURPOSE).with_doc(HELP_DOC)
    }

    fn init(&mut self, args: &[String]) -> Result<()> {
        if args.len() > 1 {
            let registry = self.registry()?;
            if registry.borrow().lookup(args).is_none() {
                bail!("extra arguments to command help: {:?}", &args[1..]);
            }
        }
        self.args = args.to_vec();
        Ok(())
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let registry = self.registry()?;
        let Some(first) = self.args.first() else {
            let info = self.overview.info(&registry.borrow());
            write!(ctx.stdout, "{}", info.help(&self.overview.flags))?;
            return Ok(());
        };

        if let Some(text) = self.command_help(&registry) {
            write!(ctx.stdout, "{}", text)?;
            return Ok(());
        }

        let topics = self.topics.borrow();
        if self.args.len() == 1 {
            if let Some(topic) = topics.lookup(first) {
                writeln!(ctx.stdout, "{}", topic.long(&topics).trim())?;
                return Ok(());
            }
        }
        bail!("unknown command or topic for {}", first)
    }
}

/// Prints the version a dispatcher was configured with.
pub struct VersionCommand {
    version: String,
}

impl VersionCommand {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
        }
    }
}

impl Command for VersionCommand {
    fn info(&self) -> Info {
        Info::new("version", "", "print the current version")
    }

    fn init(&mut self, args: &[String]) -> Result<()> {
        check_empty(args)
    }

    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        writeln!(ctx.stdout, "{}", self.version)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str, aliases: &[&str]) -> Topic {
        Topic::text(name, &format!("{} short", name), &format!("{} long", name)).with_aliases(aliases)
    }

    #[test]
    fn test_topics_lookup_through_alias() {
        let mut topics = Topics::default();
        topics.add_with_aliases(topic("plugins", &["plugin"])).unwrap();
        let found = topics.lookup("plugin").unwrap();
        assert_eq!(found.name, "plugins");
        assert_eq!(found.long(&topics), "plugins long");
        assert_eq!(topics.names(), vec!["plugins", "plugin"]);
        assert_eq!(topics.names_without_aliases(), vec!["plugins"]);
    }

    #[test]
    fn test_topics_add_with_aliases_is_atomic() {
        let mut topics = Topics::default();
        topics.add(topic("taken", &[])).unwrap();
        let err = topics
            .add_with_aliases(topic("new", &["n", "taken"]))
            .unwrap_err();
        assert_eq!(err, RegistryError::TopicAlreadyAdded("taken".into()));
        assert_eq!(topics.names(), vec!["taken"]);
        assert!(topics.lookup("n").is_none());
        assert!(topics.lookup("new").is_none());
    }

    #[test]
    fn test_topics_alias_requires_topic() {
        let mut topics = Topics::default();
        assert_eq!(
            topics.add_alias("missing", "m").unwrap_err(),
            RegistryError::TopicNotFound("missing".into())
        );
    }

    #[test]
    fn test_topic_list_is_sorted_and_aligned() {
        let mut topics = Topics::default();
        topics.add_with_aliases(topic("zeta", &["z"])).unwrap();
        topics.add(topic("ab", &[])).unwrap();
        assert_eq!(topics.list(), "ab    ab short\nzeta  zeta short");
    }

    #[test]
    fn test_version_command() {
        let mut cmd = VersionCommand::new("1.2.3");
        assert!(cmd.init(&["extra".to_string()]).is_err());
        cmd.init(&[]).unwrap();
        let (mut ctx, captured) = crate::testing::context();
        cmd.run(&mut ctx).unwrap();
        assert_eq!(captured.stdout(), "1.2.3\n");
    }
}
