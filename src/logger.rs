use anyhow::{Context as _, Result, bail};
use chrono::Local;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::env;
use std::fs::OpenOptions;
use std::io::Write;

use crate::context::Context;
use crate::flags::{FlagSet, FlagValues};

/// Environment variable holding the default `--logging-config`.
pub const LOGGING_CONFIG_ENV: &str = "SUPERCMD_LOGGING_CONFIG";

/// Logging target a dispatcher starts right before it runs a subcommand.
///
/// The flags it declares are shared with every leaf subcommand, so
/// `tool sub --debug` works the same as `tool --debug sub`.
#[derive(Debug, Clone, Default)]
pub struct Log {
    /// Filter used when neither the flag nor the environment sets one,
    /// in env_logger syntax (`warn,supercmd=debug`).
    pub default_config: String,
    pub path: Option<String>,
    pub verbose: bool,
    pub quiet: bool,
    pub debug: bool,
    pub show_log: bool,
    pub config: String,
}

impl Log {
    pub fn add_flags(&self, f: &mut FlagSet) {
        f.string("log-file", None, "path to write log to");
        f.bool("verbose", Some('v'), "show more verbose output");
        f.bool("quiet", Some('q'), "show no informational output");
        f.bool("debug", None, "equivalent to --show-log --logging-config=debug");
        f.string(
            "logging-config",
            Some(&self.fallback_config()),
            "specify log levels for modules",
        );
        f.bool("show-log", None, "if set, write the log file to stderr");
    }

    /// Copies the flags that were given; flags left unset keep their
    /// current value so outer and inner parses accumulate.
    pub fn apply_flags(&mut self, values: &FlagValues) {
        if let Some(path) = values.value("log-file") {
            self.path = Some(path.to_string());
        }
        self.verbose |= values.flag("verbose");
        self.quiet |= values.flag("quiet");
        self.debug |= values.flag("debug");
        self.show_log |= values.flag("show-log");
        // A default here would clobber a value given to an outer parse.
        if values.is_set("logging-config") {
            if let Some(config) = values.value("logging-config") {
                self.config = config.to_string();
            }
        }
    }

    fn fallback_config(&self) -> String {
        env::var(LOGGING_CONFIG_ENV).unwrap_or_else(|_| self.default_config.clone())
    }

    /// True when log records end up on stderr rather than in a file.
    pub fn writes_to_stderr(&self) -> bool {
        self.path.is_none()
    }

    /// Installs the logger and applies verbosity to `ctx`.
    pub fn start(&self, ctx: &mut Context) -> Result<()> {
        if self.verbose && self.quiet {
            bail!(r#""verbose" and "quiet" flags clash, please use one or the other, not both"#);
        }
        ctx.quiet = self.quiet;
        ctx.verbose = self.verbose;

        let show_log = self.show_log || self.debug;
        let level = if self.debug {
            LevelFilter::Debug
        } else if show_log {
            LevelFilter::Info
        } else {
            LevelFilter::Warn
        };

        let mut builder = Builder::new();
        builder.filter_level(level);
        let config = if self.config.is_empty() {
            self.fallback_config()
        } else {
            self.config.clone()
        };
        if !config.is_empty() {
            builder.parse_filters(&config);
        }

        let detailed = match &self.path {
            Some(path) => {
                let path = ctx.abs_path(path);
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&path)
                    .with_context(|| format!("cannot open log file {}", path.display()))?;
                builder.target(Target::Pipe(Box::new(file)));
                true
            }
            None => {
                builder.target(Target::Stderr);
                show_log
            }
        };

        builder.format(move |buf, record| {
            if detailed {
                writeln!(
                    buf,
                    "{} {} {} {}",
                    Local::now().format("%H:%M:%S"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            } else {
                writeln!(buf, "{} {}", record.level(), record.args())
            }
        });

        if let Err(err) = builder.try_init() {
            log::debug!("logger already installed: {}", err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    fn parse(args: &[&str]) -> FlagValues {
        let log = Log::default();
        let mut f = FlagSet::new("log");
        log.add_flags(&mut f);
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        f.parse(true, &args).unwrap()
    }

    #[test]
    fn test_apply_flags() {
        let mut log = Log::default();
        log.apply_flags(&parse(&["-v", "--log-file", "out.log", "--logging-config", "debug"]));
        assert!(log.verbose);
        assert!(!log.quiet);
        assert_eq!(log.path.as_deref(), Some("out.log"));
        assert_eq!(log.config, "debug");

        // A later parse without the flags keeps earlier values.
        log.apply_flags(&parse(&["--show-log"]));
        assert!(log.verbose);
        assert!(log.show_log);
        assert_eq!(log.path.as_deref(), Some("out.log"));
    }

    #[test]
    fn test_default_config_does_not_override_given_one() {
        let mut log = Log {
            default_config: "warn".into(),
            ..Default::default()
        };
        let mut f = FlagSet::new("log");
        log.add_flags(&mut f);
        log.apply_flags(&f.parse(true, &["--logging-config".into(), "debug".into()]).unwrap());
        log.apply_flags(&f.parse(true, &[]).unwrap());
        assert_eq!(log.config, "debug");
    }

    #[test]
    fn test_verbose_and_quiet_clash() {
        let log = Log {
            verbose: true,
            quiet: true,
            ..Default::default()
        };
        let (mut ctx, _) = testing::context();
        let err = log.start(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("clash"));
    }

    #[test]
    fn test_start_sets_context_verbosity() {
        let log = Log {
            quiet: true,
            ..Default::default()
        };
        let (mut ctx, captured) = testing::context();
        log.start(&mut ctx).unwrap();
        assert!(ctx.quiet);
        ctx.infof("hidden");
        assert_eq!(captured.stderr(), "");
    }

    #[test]
    fn test_start_creates_log_file_relative_to_context() {
        let dir = tempfile::tempdir().unwrap();
        let log = Log {
            path: Some("nested.log".into()),
            ..Default::default()
        };
        let (mut ctx, _) = testing::context_in(dir.path());
        log.start(&mut ctx).unwrap();
        assert!(dir.path().join("nested.log").exists());
    }
}
