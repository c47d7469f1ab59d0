use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::{error, info};

use memoryvault::config::{Config, CONFIG_ENV};
use memoryvault::ipc::{self, Handler};
use memoryvault::logging::{self, LOG_ENV};

const USAGE: &str = "memoryvault [--config PATH]";

/// What the command line asked for.
#[derive(Debug, PartialEq, Eq)]
enum Invocation {
    Serve { config: Option<PathBuf> },
    Help,
    Version,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Invocation> {
    let mut args = args.into_iter();
    let mut config = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(Invocation::Help),
            "--version" | "-V" => return Ok(Invocation::Version),
            "--config" | "-c" => match args.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => bail!("{} requires a path", arg),
            },
            other => match other.strip_prefix("--config=") {
                Some(path) if !path.is_empty() => config = Some(PathBuf::from(path)),
                _ => bail!("unexpected argument '{}'", other),
            },
        }
    }

    Ok(Invocation::Serve { config })
}

fn print_help() {
    println!(
        "memoryvault {version}
Media catalog backend. Reads one JSON request per line on stdin and answers
each with one JSON line on stdout.

Usage: {USAGE}

Options:
  -c, --config PATH   Config file (default: {config})
  -V, --version       Print version
  -h, --help          Print this help

Environment:
  {CONFIG_ENV}  Config file, used when --config is absent
  {LOG_ENV}     Log filter, e.g. debug or memoryvault=trace",
        version = env!("CARGO_PKG_VERSION"),
        config = Config::config_dir().join("config.toml").display(),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = match parse_args(std::env::args().skip(1)) {
        Ok(Invocation::Serve { config }) => config,
        Ok(Invocation::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Invocation::Version) => {
            println!("memoryvault {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Err(e) => {
            eprintln!("error: {:#}\n\nUsage: {}", e, USAGE);
            std::process::exit(2);
        }
    };

    let config = match config_path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };

    match logging::init(config.log_dir()) {
        Ok(sink) => info!("memoryvault {} logging to {}", env!("CARGO_PKG_VERSION"), sink),
        Err(e) => eprintln!("Logging disabled: {:#}", e),
    }

    let handler = Handler::open(&config);
    let result = ipc::serve(&handler, tokio::io::stdin(), tokio::io::stdout()).await;

    if let Err(e) = handler.into_database().close() {
        error!("Failed to close database: {:#}", e);
    }

    result
}
