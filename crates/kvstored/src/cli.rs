//! Manual command-line flag parsing, applied on top of a loaded
//! [`crate::config::ServerConfig`] as the highest-precedence layer.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::ServerConfig;

pub fn apply_cli_overrides(config: &mut ServerConfig, args: &[String]) -> Result<()> {
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                config.port = next_value(args, i, "--port")?.parse().context("--port must be a number")?;
            }
            "--bind" => {
                i += 1;
                config.bind = next_value(args, i, "--bind")?.to_string();
            }
            "--db-file" => {
                i += 1;
                config.db_file = PathBuf::from(next_value(args, i, "--db-file")?);
            }
            "--capacity" => {
                i += 1;
                config.capacity = next_value(args, i, "--capacity")?
                    .parse()
                    .context("--capacity must be a number")?;
            }
            "--workers" => {
                i += 1;
                config.workers = next_value(args, i, "--workers")?
                    .parse()
                    .context("--workers must be a number")?;
            }
            "--daemonize" => config.daemonize = true,
            "--log-file" => {
                i += 1;
                config.log_file = Some(PathBuf::from(next_value(args, i, "--log-file")?));
            }
            "--backlog" => {
                i += 1;
                config.backlog = next_value(args, i, "--backlog")?
                    .parse()
                    .context("--backlog must be a number")?;
            }
            "--no-auto-save" => config.auto_save = false,
            other => anyhow::bail!("unknown flag: {other}"),
        }
        i += 1;
    }
    Ok(())
}

fn next_value<'a>(args: &'a [String], i: usize, flag: &'static str) -> Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .with_context(|| format!("{flag} requires a value"))
}
