use colored::*;
use std::env;
use std::process;

use supercmd::config::load_config;
use supercmd::logger::Log;
use supercmd::{Context, SuperCommand, SuperCommandParams, run_main};

fn main() {
    let mut ctx = Context::new();
    let config = match load_config(&ctx.dir) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {:#}", "ERROR".red().bold(), err);
            process::exit(2);
        }
    };

    let plugins = config.plugins();
    let log = Log {
        default_config: config.log.default_config.clone().unwrap_or_default(),
        ..Default::default()
    };
    let mut tool = SuperCommand::new(SuperCommandParams {
        name: config.name().to_string(),
        purpose: config.command.purpose.clone().unwrap_or_default(),
        doc: config.command.doc.clone().unwrap_or_default(),
        log: Some(log),
        missing_callback: Some(plugins.missing_callback()),
        version: config
            .command
            .version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        ..Default::default()
    });

    let short = format!("Show {} plugins", config.name());
    if let Err(err) = tool.add_help_topic_callback("plugins", &short, move || plugins.help_topic()) {
        eprintln!("{} {}", "ERROR".red().bold(), err);
        process::exit(2);
    }

    let args: Vec<String> = env::args().skip(1).collect();
    process::exit(run_main(&mut tool, &mut ctx, &args));
}
