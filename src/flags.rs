use anyhow::{Result, anyhow};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command as ClapCommand};

// Id of the positional that collects whatever the flags did not consume.
const REST: &str = "__args";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagKind {
    Bool,
    Value { default: Option<String> },
}

/// A single declared flag. Names of one character are short flags
/// (`-e`), longer names are long flags (`--model`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub name: String,
    pub short: Option<char>,
    pub usage: String,
    pub kind: FlagKind,
}

impl Flag {
    fn spellings(&self) -> String {
        let mut parts = Vec::new();
        if let Some(c) = self.short {
            parts.push(format!("-{}", c));
        }
        if self.name.chars().count() == 1 {
            if self.short.is_none() {
                parts.push(format!("-{}", self.name));
            }
        } else {
            parts.push(format!("--{}", self.name));
        }
        parts.join(", ")
    }

    fn to_arg(&self) -> Arg {
        let mut arg = Arg::new(self.name.clone()).help(self.usage.clone());
        let mut chars = self.name.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => arg = arg.short(c),
            _ => arg = arg.long(self.name.clone()),
        }
        if let Some(c) = self.short {
            arg = arg.short(c);
        }
        match &self.kind {
            FlagKind::Bool => arg.action(ArgAction::SetTrue),
            FlagKind::Value { default } => {
                arg = arg.action(ArgAction::Set).num_args(1);
                if let Some(d) = default {
                    arg = arg.default_value(d.clone());
                }
                arg
            }
        }
    }
}

/// An ordered set of flag declarations. Parsing is delegated to clap;
/// this type only decides which flags exist and how positionals mix
/// with them.
#[derive(Debug, Clone, Default)]
pub struct FlagSet {
    name: String,
    flags: Vec<Flag>,
}

impl FlagSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: Vec::new(),
        }
    }

    /// Declares a flag. A name or short letter that is already taken is
    /// not declared twice; the first declaration wins.
    pub fn add(&mut self, mut flag: Flag) -> &mut Self {
        let mut letters = flag.name.chars();
        let single = match (letters.next(), letters.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        };
        let clashes = single.is_some_and(|c| self.flags.iter().any(|f| f.short == Some(c)));
        if clashes || self.lookup(&flag.name).is_some() {
            log::debug!("flag {:?} already declared on {}", flag.name, self.name);
            return self;
        }
        if let Some(c) = flag.short {
            let taken = self.flags.iter().any(|f| {
                f.short == Some(c) || (f.name.chars().count() == 1 && f.name.starts_with(c))
            });
            if taken {
                flag.short = None;
            }
        }
        self.flags.push(flag);
        self
    }

    pub fn bool(&mut self, name: &str, short: Option<char>, usage: &str) -> &mut Self {
        self.add(Flag {
            name: name.to_string(),
            short,
            usage: usage.to_string(),
            kind: FlagKind::Bool,
        })
    }

    pub fn string(&mut self, name: &str, default: Option<&str>, usage: &str) -> &mut Self {
        self.add(Flag {
            name: name.to_string(),
            short: None,
            usage: usage.to_string(),
            kind: FlagKind::Value {
                default: default.map(str::to_string),
            },
        })
    }

    pub fn lookup(&self, name: &str) -> Option<&Flag> {
        self.flags.iter().find(|f| f.name == name)
    }

    pub fn flags(&self) -> impl Iterator<Item = &Flag> {
        self.flags.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Renders the declared flags for help output, sorted by name.
    pub fn usage(&self) -> String {
        let mut flags: Vec<&Flag> = self.flags.iter().collect();
        flags.sort_by(|a, b| a.name.cmp(&b.name));
        let mut out = String::new();
        for flag in flags {
            out.push_str(&flag.spellings());
            if let FlagKind::Value { default } = &flag.kind {
                out.push_str(&format!(" (= {:?})", default.as_deref().unwrap_or("")));
            }
            out.push('\n');
            if !flag.usage.is_empty() {
                out.push_str("    ");
                out.push_str(&flag.usage);
                out.push('\n');
            }
        }
        out
    }

    /// Parses `args` against the declared flags.
    ///
    /// With `allow_interspersed` false, everything from the first
    /// positional onward is returned untouched, flags included.
    pub fn parse(&self, allow_interspersed: bool, args: &[String]) -> Result<FlagValues> {
        let mut cmd = ClapCommand::new(self.name.clone())
            .no_binary_name(true)
            .disable_help_flag(true)
            .disable_version_flag(true)
            .disable_help_subcommand(true)
            .color(ColorChoice::Never);
        for flag in &self.flags {
            cmd = cmd.arg(flag.to_arg());
        }
        let mut rest = Arg::new(REST).num_args(0..).action(ArgAction::Append);
        if !allow_interspersed {
            rest = rest.trailing_var_arg(true);
        }
        cmd = cmd.arg(rest);

        let matches = cmd.try_get_matches_from(args).map_err(|e| {
            let rendered = e.to_string();
            let first = rendered.lines().next().unwrap_or_default();
            anyhow!("{}", first.trim_start_matches("error: "))
        })?;
        let args = matches
            .get_many::<String>(REST)
            .map(|vals| vals.cloned().collect())
            .unwrap_or_default();
        Ok(FlagValues { matches, args })
    }
}

/// The outcome of a parse: flag values plus the remaining positionals.
#[derive(Debug, Clone, Default)]
pub struct FlagValues {
    matches: ArgMatches,
    args: Vec<String>,
}

impl FlagValues {
    /// Value of a bool flag; false when unset or not declared.
    pub fn flag(&self, name: &str) -> bool {
        self.matches
            .try_get_one::<bool>(name)
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false)
    }

    /// True when the flag was given on the command line rather than
    /// filled in from its default.
    pub fn is_set(&self, name: &str) -> bool {
        // value_source panics on ids clap never saw
        if !self.matches.ids().any(|id| id.as_str() == name) {
            return false;
        }
        self.matches.value_source(name) == Some(ValueSource::CommandLine)
    }

    /// Value of a value flag, including its default.
    pub fn value(&self, name: &str) -> Option<&str> {
        self.matches
            .try_get_one::<String>(name)
            .ok()
            .flatten()
            .map(String::as_str)
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}
