use std::collections::HashMap;

use anyhow::Result;

use crate::command::{CommandRef, Info};
use crate::context::Context;
use crate::errors::RegistryError;

/// What a dispatcher performs for a given subcommand name.
#[derive(Debug, Clone)]
pub struct Action {
    /// The registered name.
    pub name: String,
    /// The name this action aliases; empty unless this is an alias view.
    pub aliased_name: String,
    pub command: CommandRef,
    /// Alias names registered together with the action.
    pub aliases: Vec<String>,
    /// Name to use instead; non-empty marks the action deprecated.
    pub replacement: String,
}

impl Action {
    /// Builds an action named after the command's own info.
    pub fn new(command: CommandRef) -> Self {
        let info = command.info();
        Self {
            name: info.name,
            aliased_name: String::new(),
            command,
            aliases: info.aliases,
            replacement: String::new(),
        }
    }

    pub fn named(name: &str, command: CommandRef) -> Self {
        Self {
            name: name.to_string(),
            aliased_name: String::new(),
            command,
            aliases: Vec::new(),
            replacement: String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.is_empty() {
            return Err(RegistryError::MissingName);
        }
        Ok(())
    }

    /// Short description for command listings.
    pub fn summary(&self) -> String {
        if !self.aliased_name.is_empty() {
            return format!("alias for '{}'", self.aliased_name);
        }
        self.command
            .try_info()
            .map(|info| info.purpose)
            .unwrap_or_default()
    }

    /// A view of this action under another name. The command is shared,
    /// not copied.
    pub fn new_alias(&self, alias: &str) -> Action {
        Action {
            name: alias.to_string(),
            aliased_name: self.name.clone(),
            command: self.command.clone(),
            aliases: Vec::new(),
            replacement: String::new(),
        }
    }

    pub fn info(&self) -> Info {
        self.command.info()
    }

    pub fn init(&self, args: &[String]) -> Result<()> {
        self.command.init(args)
    }

    /// Warns about deprecation before the action runs.
    pub fn pre_run(&self, ctx: &mut Context) -> Result<()> {
        if !self.replacement.is_empty() {
            ctx.infof(format!(
                "WARNING: {:?} is deprecated, please use {:?}",
                self.name, self.replacement
            ));
        }
        Ok(())
    }

    pub fn run(&self, ctx: &mut Context) -> Result<()> {
        self.command.run(ctx)
    }
}

/// An insertion-ordered, alias-aware mapping of names to actions.
///
/// Aliases are name redirections to a canonical entry and never point at
/// another alias.
#[derive(Debug, Default)]
pub struct Registry {
    order: Vec<String>,
    actions: HashMap<String, Action>,
    aliases: HashMap<String, String>,
    default_name: Option<String>,
}

impl Registry {
    /// Creates a registry holding `initial`, aliases included.
    pub fn new(initial: impl IntoIterator<Item = Action>) -> Result<Self, RegistryError> {
        let mut reg = Registry::default();
        for action in initial {
            reg.add_with_aliases(action)?;
        }
        Ok(reg)
    }

    /// Creates a registry holding `default` and makes it the action an
    /// empty lookup path resolves to.
    pub fn with_default(default: Action) -> Result<Self, RegistryError> {
        let name = default.name.clone();
        let mut reg = Registry::new([default])?;
        reg.default_name = Some(name);
        Ok(reg)
    }

    /// Registry holding a dispatcher's built-in actions; the first one
    /// becomes the default. Names must be distinct and carry no aliases.
    pub(crate) fn seeded(actions: Vec<Action>) -> Self {
        let mut reg = Registry {
            default_name: actions.first().map(|a| a.name.clone()),
            ..Default::default()
        };
        for action in actions {
            reg.order.push(action.name.clone());
            reg.actions.insert(action.name.clone(), action);
        }
        reg
    }

    /// All registered names, aliases included, in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Finds the action at `path`.
    ///
    /// An empty path yields the default action. Each further element is
    /// resolved in the registry of the nested dispatcher found so far; the
    /// lookup only succeeds when every element resolves.
    pub fn lookup<S: AsRef<str>>(&self, path: &[S]) -> Option<Action> {
        if path.is_empty() {
            return self.default_name.as_deref().and_then(|n| self.lookup_one(n));
        }
        match self.walk(path) {
            (Some(action), consumed) if consumed == path.len() => Some(action),
            _ => None,
        }
    }

    /// Resolves as much of `path` as possible. Returns the last action
    /// found and how many elements were consumed.
    pub fn walk<S: AsRef<str>>(&self, path: &[S]) -> (Option<Action>, usize) {
        let Some((first, rest)) = path.split_first() else {
            return (None, 0);
        };
        let Some(action) = self.lookup_one(first.as_ref()) else {
            return (None, 0);
        };
        if rest.is_empty() {
            return (Some(action), 1);
        }
        let Some(nested) = action.command.nested_registry() else {
            return (Some(action), 1);
        };
        let (found, consumed) = nested.borrow().walk(rest);
        match found {
            Some(deeper) => (Some(deeper), consumed + 1),
            None => (Some(action), 1),
        }
    }

    fn lookup_one(&self, name: &str) -> Option<Action> {
        if let Some(action) = self.actions.get(name) {
            return Some(action.clone());
        }
        let canonical = self.aliases.get(name)?;
        self.actions.get(canonical).map(|a| a.new_alias(name))
    }

    /// Adds `action` under its name. Fails if the name already resolves.
    pub fn add(&mut self, action: Action) -> Result<(), RegistryError> {
        action.validate()?;
        if self.lookup_one(&action.name).is_some() {
            return Err(RegistryError::AlreadyRegistered(action.name));
        }
        self.order.push(action.name.clone());
        self.actions.insert(action.name.clone(), action);
        Ok(())
    }

    /// Adds `action` and then each of its aliases. If any alias fails,
    /// everything added by this call is removed again.
    pub fn add_with_aliases(&mut self, action: Action) -> Result<(), RegistryError> {
        let name = action.name.clone();
        let aliases = action.aliases.clone();
        self.add(action)?;

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

    /// Makes the canonical action `name` reachable as `alias`.
    pub fn add_alias(&mut self, name: &str, alias: &str) -> Result<(), RegistryError> {
        if !self.actions.contains_key(name) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        if self.lookup_one(alias).is_some() {
            return Err(RegistryError::AliasAlreadyAdded(alias.to_string()));
        }
        self.aliases.insert(alias.to_string(), name.to_string());
        self.order.push(alias.to_string());
        Ok(())
    }

    /// Drops one canonical or alias entry. Aliases of a removed canonical
    /// name stay behind.
    pub(crate) fn remove(&mut self, name: &str) -> Option<Action> {
        let removed = match self.actions.remove(name) {
            Some(action) => Some(action),
            None => {
                self.aliases.remove(name)?;
                None
            }
        };
        if let Some(pos) = self.order.iter().position(|n| n == name) {
            self.order.remove(pos);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::dispatch::{SuperCommand, SuperCommandParams};

    struct Stub {
        name: &'static str,
        purpose: &'static str,
        aliases: Vec<String>,
    }

    impl Command for Stub {
        fn info(&self) -> Info {
            Info {
                name: self.name.to_string(),
                purpose: self.purpose.to_string(),
                aliases: self.aliases.clone(),
                ..Default::default()
            }
        }

        fn init(&mut self, _args: &[String]) -> Result<()> {
            Ok(())
        }

        fn run(&mut self, _ctx: &mut Context) -> Result<()> {
            Ok(())
        }
    }

    fn stub(name: &'static str) -> Action {
        Action::new(CommandRef::leaf(Stub {
            name,
            purpose: "stub purpose",
            aliases: Vec::new(),
        }))
    }

    fn stub_with_aliases(name: &'static str, aliases: &[&str]) -> Action {
        Action::new(CommandRef::leaf(Stub {
            name,
            purpose: "stub purpose",
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn snapshot(reg: &Registry) -> Vec<(String, String, String)> {
        reg.names()
            .into_iter()
            .map(|n| {
                let action = reg.lookup(&[n.as_str()]).unwrap();
                (n, action.name, action.aliased_name)
            })
            .collect()
    }

    #[test]
    fn test_names_keep_insertion_order() {
        let mut reg = Registry::new([stub("zeta"), stub("alpha")]).unwrap();
        reg.add_with_aliases(stub_with_aliases("mid", &["m", "a"])).unwrap();
        reg.add_alias("zeta", "z").unwrap();
        assert_eq!(reg.names(), names(&["zeta", "alpha", "mid", "m", "a", "z"]));
    }

    #[test]
    fn test_names_is_a_copy() {
        let reg = Registry::new([stub("one")]).unwrap();
        let mut copied = reg.names();
        copied.push("two".to_string());
        assert_eq!(reg.names(), names(&["one"]));
    }

    #[test]
    fn test_new_fails_on_collision() {
        let err = Registry::new([stub("one"), stub("one")]).unwrap_err();
        assert_eq!(err, RegistryError::AlreadyRegistered("one".into()));
    }

    #[test]
    fn test_add_rejects_canonical_and_alias_collisions() {
        let mut reg = Registry::new([stub_with_aliases("status", &["st"])]).unwrap();
        let before = snapshot(&reg);

        assert_eq!(
            reg.add(stub("status")).unwrap_err(),
            RegistryError::AlreadyRegistered("status".into())
        );
        assert_eq!(
            reg.add(stub("st")).unwrap_err(),
            RegistryError::AlreadyRegistered("st".into())
        );
        assert_eq!(snapshot(&reg), before);
    }

    #[test]
    fn test_add_rejects_missing_name() {
        let mut reg = Registry::default();
        let err = reg.add(Action::named("", stub("x").command)).unwrap_err();
        assert_eq!(err, RegistryError::MissingName);
        assert!(reg.names().is_empty());
    }

    #[test]
    fn test_add_with_aliases_rolls_back_everything() {
        let mut reg = Registry::new([stub("taken")]).unwrap();
        let before = snapshot(&reg);

        let err = reg
            .add_with_aliases(stub_with_aliases("new", &["n1", "n2", "taken"]))
            .unwrap_err();
        assert_eq!(err, RegistryError::AliasAlreadyAdded("taken".into()));
        assert_eq!(reg.names(), names(&["taken"]));
        assert_eq!(snapshot(&reg), before);
        for name in ["new", "n1", "n2"] {
            assert!(reg.lookup(&[name]).is_none(), "{} survived rollback", name);
        }
    }

    #[test]
    fn test_add_with_aliases_rolls_back_duplicate_alias_in_same_call() {
        let mut reg = Registry::default();
        let err = reg
            .add_with_aliases(stub_with_aliases("new", &["dup", "dup"]))
            .unwrap_err();
        assert_eq!(err, RegistryError::AliasAlreadyAdded("dup".into()));
        assert!(reg.names().is_empty());
        assert!(reg.lookup(&["dup"]).is_none());
    }

    #[test]
    fn test_add_alias_requires_canonical_target() {
        let mut reg = Registry::new([stub_with_aliases("status", &["st"])]).unwrap();
        assert_eq!(
            reg.add_alias("missing", "x").unwrap_err(),
            RegistryError::NotFound("missing".into())
        );
        // Aliases of aliases are not allowed.
        assert_eq!(
            reg.add_alias("st", "s").unwrap_err(),
            RegistryError::NotFound("st".into())
        );
        assert_eq!(
            reg.add_alias("status", "status").unwrap_err(),
            RegistryError::AliasAlreadyAdded("status".into())
        );
    }

    #[test]
    fn test_alias_lookup_returns_view_sharing_command() {
        let reg = Registry::new([stub_with_aliases("status", &["st"])]).unwrap();
        let canonical = reg.lookup(&["status"]).unwrap();
        let alias = reg.lookup(&["st"]).unwrap();

        assert_eq!(alias.name, "st");
        assert_eq!(alias.aliased_name, "status");
        assert!(alias.command.same_command(&canonical.command));
        assert_eq!(alias.summary(), "alias for 'status'");
        assert_eq!(canonical.summary(), "stub purpose");
    }

    #[test]
    fn test_lookup_default_and_missing() {
        let reg = Registry::with_default(stub("help")).unwrap();
        assert_eq!(reg.lookup(&[] as &[&str]).unwrap().name, "help");
        assert!(reg.lookup(&["missing"]).is_none());

        let no_default = Registry::new([stub("help")]).unwrap();
        assert!(no_default.lookup(&[] as &[&str]).is_none());
    }

    #[test]
    fn test_remove_does_not_cascade() {
        let mut reg = Registry::new([stub_with_aliases("status", &["st"])]).unwrap();
        assert!(reg.remove("status").is_some());
        assert_eq!(reg.names(), names(&["st"]));
        // The dangling alias no longer resolves but still occupies its slot.
        assert!(reg.lookup(&["st"]).is_none());
        assert!(reg.remove("st").is_none());
        assert!(reg.names().is_empty());
        assert!(reg.remove("never").is_none());
    }

    fn nested() -> Registry {
        let mut sub = SuperCommand::new(SuperCommandParams {
            name: "s".into(),
            usage_prefix: "top".into(),
            ..Default::default()
        });
        sub.register(CommandRef::leaf(Stub {
            name: "l",
            purpose: "leaf",
            aliases: vec!["ll".into()],
        }))
        .unwrap();
        Registry::new([Action::new(CommandRef::super_command(sub)), stub("leafname")]).unwrap()
    }

    #[test]
    fn test_nested_lookup() {
        let reg = nested();
        let found = reg.lookup(&["s", "l"]).unwrap();
        assert_eq!(found.name, "l");
        assert_eq!(found.info().purpose, "leaf");

        let alias = reg.lookup(&["s", "ll"]).unwrap();
        assert_eq!(alias.aliased_name, "l");

        assert!(reg.lookup(&["s", "x"]).is_none());
        assert!(reg.lookup(&["leafname", "anything"]).is_none());
        assert!(reg.lookup(&["s", "l", "deeper"]).is_none());
        assert_eq!(reg.lookup(&["s"]).unwrap().name, "s");
    }

    #[test]
    fn test_prefixed_dispatcher_registers_bare_name() {
        let reg = nested();
        assert_eq!(reg.names(), names(&["s", "leafname"]));
        let action = reg.lookup(&["s"]).unwrap();
        assert!(action.command.is_super_command());
        assert_eq!(action.info().name, "s");
    }

    #[test]
    fn test_walk_reports_partial_resolution() {
        let reg = nested();
        let (action, consumed) = reg.walk(&["s", "x"]);
        assert_eq!(action.unwrap().name, "s");
        assert_eq!(consumed, 1);

        let (action, consumed) = reg.walk(&["leafname", "x"]);
        assert_eq!(action.unwrap().name, "leafname");
        assert_eq!(consumed, 1);

        let (action, consumed) = reg.walk(&["nope"]);
        assert!(action.is_none());
        assert_eq!(consumed, 0);
    }
}
