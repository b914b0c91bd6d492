use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::plugins::Plugins;

pub const CONFIG_FILE: &str = "supercmd.toml";
/// Overrides the configuration file location.
pub const CONFIG_ENV: &str = "SUPERCMD_CONFIG";
/// Selects `.env.<profile>` instead of `.env`.
pub const PROFILE_ENV: &str = "SUPERCMD_ENV";

const DEFAULT_NAME: &str = "supercmd";
const DEFAULT_PREFIX: &str = "supercmd-";
const DEFAULT_TITLE: &str = "Plugins";

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    pub command: CommandConfig,
    pub plugins: PluginConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CommandConfig {
    pub name: Option<String>,
    pub purpose: Option<String>,
    pub doc: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PluginConfig {
    pub prefix: Option<String>,
    pub title: Option<String>,
    pub ignored_flags: Vec<String>,
    /// Directories searched instead of `$PATH`.
    pub path: Option<Vec<String>>,
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub default_config: Option<String>,
}

impl DispatchConfig {
    pub fn name(&self) -> &str {
        self.command.name.as_deref().unwrap_or(DEFAULT_NAME)
    }

    pub fn plugins(&self) -> Plugins {
        let prefix = self
            .plugins
            .prefix
            .clone()
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string());
        let title = self.plugins.title.as_deref().unwrap_or(DEFAULT_TITLE);
        let mut plugins = Plugins::new(&prefix, title).with_env(
            self.plugins
                .env
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect(),
        );
        plugins.ignored_flags = self.plugins.ignored_flags.clone();
        if let Some(path) = &self.plugins.path {
            plugins = plugins.with_search_path(path.iter().map(PathBuf::from).collect());
        }
        plugins
    }
}

/// Where the configuration for `dir` lives.
pub fn config_path(dir: &Path) -> PathBuf {
    match env::var_os(CONFIG_ENV) {
        Some(path) => dir.join(path),
        None => dir.join(CONFIG_FILE),
    }
}

/// Loads the configuration for `dir`. A missing file yields the defaults.
pub fn load_config(dir: &Path) -> Result<DispatchConfig> {
    let config_path = config_path(dir);
    let base = config_path.parent().unwrap_or(dir).to_path_buf();

    // 1. The toml file (base layer)
    let mut config = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        toml::from_str::<DispatchConfig>(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?
    } else {
        debug!("no configuration at {}, using defaults", config_path.display());
        DispatchConfig::default()
    };

    // Plugin directories are relative to the configuration file.
    if let Some(paths) = &mut config.plugins.path {
        for p in paths.iter_mut() {
            if Path::new(p.as_str()).is_relative() {
                *p = base.join(&*p).to_string_lossy().into_owned();
            }
        }
    }

    // 2. .env or .env.<profile> (override layer), kept out of the process
    // environment and handed to plugins only.
    let env_filename = env::var(PROFILE_ENV)
        .map(|v| format!(".env.{}", v))
        .unwrap_or_else(|_| ".env".to_string());
    let env_path = base.join(&env_filename);
    if env_path.exists() {
        debug!("loading plugin environment from {}", env_path.display());
        for item in dotenvy::from_path_iter(&env_path)? {
            let (key, val) = item?;
            config.plugins.env.insert(key, val);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.name(), "supercmd");
        let plugins = config.plugins();
        assert_eq!(plugins.prefix, "supercmd-");
        assert_eq!(plugins.title, "Plugins");
        assert!(plugins.search_path.is_none());
        assert!(plugins.env.is_empty());
    }

    #[test]
    #[serial]
    fn test_toml_and_env_layers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[command]
name = "tool"
purpose = "does things"
version = "2.0.0"

[plugins]
prefix = "tool-"
title = "Tool Plugins"
ignored_flags = ["-e"]
path = ["bin", "/opt/tool"]

[plugins.env]
TOOL_HOME = "/srv"
TOOL_MODE = "toml"

[log]
default_config = "info"
"#,
        )
        .unwrap();
        fs::write(dir.path().join(".env"), "TOOL_MODE=dotenv\n").unwrap();

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.name(), "tool");
        assert_eq!(config.command.version.as_deref(), Some("2.0.0"));
        assert_eq!(config.log.default_config.as_deref(), Some("info"));

        let plugins = config.plugins();
        assert_eq!(plugins.prefix, "tool-");
        assert_eq!(plugins.ignored_flags, vec!["-e".to_string()]);
        assert_eq!(
            plugins.search_path,
            Some(vec![dir.path().join("bin"), PathBuf::from("/opt/tool")])
        );
        assert_eq!(
            plugins.env,
            vec!["TOOL_HOME=/srv".to_string(), "TOOL_MODE=dotenv".to_string()]
        );
    }

    #[test]
    #[serial]
    fn test_profile_selects_env_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env"), "A=base\n").unwrap();
        fs::write(dir.path().join(".env.prod"), "A=prod\n").unwrap();

        // SAFETY: serialised with every other test touching the environment.
        unsafe { env::set_var(PROFILE_ENV, "prod") };
        let config = load_config(dir.path());
        unsafe { env::remove_var(PROFILE_ENV) };

        assert_eq!(config.unwrap().plugins.env.get("A").map(String::as_str), Some("prod"));
    }

    #[test]
    #[serial]
    fn test_invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "[command\nname = 1").unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"), "{}", err);
    }
}
