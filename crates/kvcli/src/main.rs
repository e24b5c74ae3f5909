//! kvcli — interactive command-line client for kvstored.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use kv_client::Client;
use kv_proto::Reply;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 6391;

fn print_usage() {
    println!("Usage: kvcli [--host <host>] [--port <port>]");
    println!();
    println!("Reads commands from stdin, one per line, and prints the decoded reply.");
    println!();
    println!("Commands:");
    for cmd in kv_proto::COMMANDS {
        println!("  {:<8} {}", cmd.name, cmd.description);
    }
}

fn parse_args(args: &[String]) -> Result<(String, u16)> {
    let mut host = DEFAULT_HOST.to_string();
    let mut port = DEFAULT_PORT;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                host = args.get(i).context("--host requires a value")?.clone();
            }
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown flag: {other}"),
        }
        i += 1;
    }
    Ok((host, port))
}

fn history_path() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(|home| PathBuf::from(home).join(".kvcli_history"))
}

fn print_reply(reply: &Reply) {
    match reply {
        Reply::Simple(s) => println!("{s}"),
        Reply::Error(e) => println!("(error) {e}"),
        Reply::Integer(n) => println!("(integer) {n}"),
        Reply::Bulk(None) => println!("(nil)"),
        Reply::Bulk(Some(bytes)) => println!("{}", String::from_utf8_lossy(bytes)),
        Reply::Array(items) => {
            if items.is_empty() {
                println!("(empty array)");
            }
            for (i, item) in items.iter().enumerate() {
                print!("{}) ", i + 1);
                print_reply(item);
            }
        }
    }
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (host, port) = parse_args(&args)?;

    let mut client = Client::connect((host.as_str(), port))
        .with_context(|| format!("failed to connect to {host}:{port}"))?;

    let history = history_path();
    let mut history_lines: Vec<String> = Vec::new();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line.context("failed to read from stdin")?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        history_lines.push(trimmed.to_string());

        match client.command(trimmed) {
            Ok(reply) => print_reply(&reply),
            Err(e) => println!("(error) {e}"),
        }
        stdout.flush().ok();

        if trimmed.eq_ignore_ascii_case("quit") {
            break;
        }
    }

    if let Some(path) = history {
        if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            for line in &history_lines {
                let _ = writeln!(file, "{line}");
            }
        }
    }

    Ok(())
}
