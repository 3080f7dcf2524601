//! # invcache CLI
//!
//! Static inventory cache manipulator and dynamic inventory script.
//!
//! As a dynamic inventory it answers `--list` and `--host HOSTNAME`. For
//! cache maintenance it adds, updates and deletes hosts, reading hostvars
//! from stdin.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use invcache_config::logging::{init_logging, LogLevel};
use invcache_config::{log_cli_debug, log_cli_error, resolve_location, Config};
use invcache_store::InvCache;

mod input;

use input::{parse_hostvars, InputFormat};

/// Printed in place of real output so the consuming inventory parser never
/// chokes on an empty stdout.
const EMPTY_INVENTORY: &str = "\n{}\n";

/// Static inventory cache manipulator, and dynamic inventory script
#[derive(Parser)]
#[command(name = "invcache")]
#[command(version, about, long_about = None)]
#[command(after_help = "Add/Update input may include a 'join_groups' list, which will be \
acted upon, but otherwise treated as meta-data (not an actual variable).")]
struct Cli {
    #[command(flatten)]
    action: Action,

    /// Format of hostvars read from stdin for --add or --update
    #[arg(short, long, value_enum, default_value_t = InputFormat::Json, value_name = "FORMAT")]
    format: InputFormat,

    /// Force use of back-end cache file at <FILEPATH>
    #[arg(short, long, value_name = "FILEPATH")]
    cache: Option<PathBuf>,

    /// With --delete, keep the cache file even if no hosts remain
    #[arg(long)]
    keep_empty: bool,

    /// Print debugging messages to stderr
    #[arg(long)]
    debug: bool,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct Action {
    /// Get variables for entire inventory
    #[arg(long)]
    list: bool,

    /// Get variables for the host identified by <HOSTNAME>
    #[arg(long, value_name = "HOSTNAME")]
    host: Option<String>,

    /// Add <HOSTNAME> to inventory, reading variables from stdin
    #[arg(short, long, value_name = "HOSTNAME")]
    add: Option<String>,

    /// Update or add <HOSTNAME> in inventory, reading variables from stdin
    #[arg(short, long, value_name = "HOSTNAME")]
    update: Option<String>,

    /// Delete <HOSTNAME> from inventory
    #[arg(short, long, value_name = "HOSTNAME")]
    delete: Option<String>,

    /// Reset cache, removing persistent cache file
    #[arg(short, long)]
    reset: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(path) = &cli.cache {
        config.location.cache_file = Some(path.clone());
    }

    let level = if cli.debug {
        LogLevel::Debug
    } else {
        LogLevel::parse(&config.log.level)
    };
    init_logging(level);

    let program = std::env::current_exe()
        .ok()
        .or_else(|| std::env::args_os().next().map(PathBuf::from))
        .unwrap_or_default();
    let location = resolve_location(&config.location, &program)
        .context("Failed to resolve cache file location")?;
    let mut cache = InvCache::open(&location)
        .with_context(|| format!("Failed to open cache {}", location.path().display()))?;
    log_cli_debug!("Using cache file", path = cache.path().display().to_string());

    let stdout = io::stdout();
    run(&cli, &mut cache, &mut stdout.lock())
}

fn run(cli: &Cli, cache: &mut InvCache, out: &mut dyn Write) -> Result<()> {
    let action = &cli.action;

    if let Some(hostname) = &action.host {
        log_cli_debug!("Listing hostvars", hostname = hostname.as_str());
        match cache.gethost(hostname)? {
            Some(entry) => write_pretty(out, &entry.hostvars)?,
            None => {
                log_cli_debug!("Host does not exist in cache", hostname = hostname.as_str());
                out.write_all(EMPTY_INVENTORY.as_bytes())?;
            }
        }
    } else if action.list {
        log_cli_debug!("Listing entire inventory");
        match cache.list() {
            Ok(document) => write_pretty(out, &document)?,
            Err(e) => {
                log_cli_error!("Failed to list inventory", error = e.to_string());
                out.write_all(EMPTY_INVENTORY.as_bytes())?;
            }
        }
    } else if let Some(hostname) = &action.add {
        let hostvars = read_hostvars(cli.format)?;
        log_cli_debug!("Adding host", hostname = hostname.as_str());
        let entry = cache.addhost(hostname, Some(hostvars), None)?;
        log_cli_debug!("Changed", groups = format!("{:?}", entry.groups));
    } else if let Some(hostname) = &action.update {
        let hostvars = read_hostvars(cli.format)?;
        log_cli_debug!("Updating host", hostname = hostname.as_str());
        let entry = cache.updatehost(hostname, Some(hostvars), None)?;
        log_cli_debug!("Changed", groups = format!("{:?}", entry.groups));
    } else if let Some(hostname) = &action.delete {
        log_cli_debug!("Deleting host", hostname = hostname.as_str(), keep_empty = cli.keep_empty);
        if let Some(removed) = cache.delhost(hostname, cli.keep_empty)? {
            log_cli_debug!("Changed", groups = format!("{:?}", removed.groups));
        }
    } else if action.reset {
        log_cli_debug!("Clobbering cache, removing file", path = cache.path().display().to_string());
        cache.reset();
    }

    out.flush()?;
    Ok(())
}

/// Read all of stdin before any lock is taken
fn read_hostvars(format: InputFormat) -> Result<invcache_store::HostVars> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        eprintln!(
            "Reading {} from standard input, ctrl-d when finished.",
            format.name()
        );
    }
    let mut text = String::new();
    stdin
        .read_to_string(&mut text)
        .context("Failed to read hostvars from stdin")?;
    parse_hostvars(format, &text)
}

/// JSON with 4-space indentation and a trailing newline
fn write_pretty<T: Serialize>(out: &mut dyn Write, value: &T) -> Result<()> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value.serialize(&mut ser)?;
    buf.push(b'\n');
    out.write_all(&buf)?;
    Ok(())
}
