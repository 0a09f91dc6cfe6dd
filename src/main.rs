mod clipboard;
mod config;
mod entry;
mod error;
mod prompt;
mod store;
mod totp;

use crate::clipboard::copy_to_clipboard;
use crate::config::Config;
use crate::entry::normalize_input;
use crate::prompt::{confirm, prompt_secret};
use crate::store::Registry;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing_subscriber::EnvFilter;

/// Shown in place of a code when a stored entry cannot produce one.
const INVALID_SECRET: &str = "Invalid Secret";

#[derive(Parser, Debug)]
#[command(
    name = "auth-manager",
    version,
    about = "Keep your 2FA (TOTP) services and show their current codes"
)]
struct Cli {
    /// Registry file to use (default: config `store`, then the data dir)
    #[arg(long, global = true, env = "AUTH_MANAGER_STORE")]
    store: Option<PathBuf>,

    /// Log what the registry does to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List services
    ///
    /// Examples:
    ///   auth-manager ls
    ///   auth-manager ls --codes
    Ls {
        /// Also show the current code and seconds left
        #[arg(long)]
        codes: bool,
        /// Show issuer, algorithm, digits and period
        #[arg(long)]
        long: bool,
    },

    /// Print the current code of a service
    Code {
        name: String,
        /// Unix time to compute the code for instead of now
        #[arg(long)]
        at: Option<u64>,
    },

    /// Add a service, replacing one with the same name
    ///
    /// Examples:
    ///   auth-manager add Email 'otpauth://totp/Email?secret=JBSWY3DPEHPK3PXP'
    ///   auth-manager add GitHub        (prompts for the secret)
    Add {
        name: String,
        /// otpauth:// URL or bare base32 secret; prompted for when omitted
        uri: Option<String>,
    },

    /// Rename a service and/or change its URI
    Edit {
        old_name: String,
        new_name: String,
        /// New otpauth:// URL or base32 secret; keeps the current one when omitted
        uri: Option<String>,
    },

    /// Delete a service
    Rm {
        name: String,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Copy the current code of a service to the clipboard
    Clip { name: String },

    /// Show all codes, refreshed every second until interrupted
    Watch,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store_path = Config::load().store_path(cli.store)?;
    let mut registry = Registry::open(&store_path);
    tracing::debug!(
        path = %registry.path().display(),
        services = registry.len(),
        "using registry"
    );

    match cli.command {
        Commands::Ls { codes, long } => cmd_ls(&registry, codes, long)?,
        Commands::Code { name, at } => cmd_code(&registry, &name, at)?,
        Commands::Add { name, uri } => cmd_add(&mut registry, &name, uri)?,
        Commands::Edit {
            old_name,
            new_name,
            uri,
        } => cmd_edit(&mut registry, &old_name, &new_name, uri)?,
        Commands::Rm { name, yes } => cmd_rm(&mut registry, &name, yes)?,
        Commands::Clip { name } => cmd_clip(&registry, &name)?,
        Commands::Watch => cmd_watch(&store_path)?,
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_env("AUTH_MANAGER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Code for display: failures render as a marker instead of aborting.
fn display_code(registry: &Registry, name: &str, now: u64) -> (String, Option<u64>) {
    match registry.enrollment(name) {
        Ok(e) => match e.code_at(now) {
            Ok(code) => (code, Some(totp::seconds_remaining(e.period, now))),
            Err(_) => (INVALID_SECRET.to_string(), None),
        },
        Err(_) => (INVALID_SECRET.to_string(), None),
    }
}

fn render_services(registry: &Registry, codes: bool, long: bool) -> Vec<String> {
    let now = totp::now_unix();
    let names = registry.list_names();
    let width = names.iter().map(|n| n.chars().count()).max().unwrap_or(0);

    let mut lines = Vec::with_capacity(names.len());
    for name in &names {
        let mut line = format!("{name:<width$}");

        if codes {
            let (code, left) = display_code(registry, name, now);
            line.push_str(&format!("  {code:>10}"));
            if let Some(left) = left {
                line.push_str(&format!("  {left:>2}s"));
            }
        }

        if long {
            match registry.enrollment(name) {
                Ok(e) => line.push_str(&format!(
                    "  {}  {}  {} {}d {}s",
                    e.issuer.as_deref().unwrap_or("-"),
                    e.label,
                    e.algorithm,
                    e.digits,
                    e.period
                )),
                Err(err) => line.push_str(&format!("  ({err})")),
            }
        }

        lines.push(line.trim_end().to_string());
    }
    lines
}

fn cmd_ls(registry: &Registry, codes: bool, long: bool) -> anyhow::Result<()> {
    for line in render_services(registry, codes, long) {
        println!("{line}");
    }
    Ok(())
}

fn cmd_code(registry: &Registry, name: &str, at: Option<u64>) -> anyhow::Result<()> {
    let code = match at {
        Some(t) => registry.get_code_at(name, t)?,
        None => registry.get_code(name)?,
    };
    println!("{code}");
    Ok(())
}

fn read_uri(name: &str, given: Option<String>) -> anyhow::Result<String> {
    let raw = match given {
        Some(u) => u,
        None => prompt_secret("OTP secret (base32) OR otpauth:// URL: ")?,
    };
    Ok(normalize_input(name, &raw)?)
}

fn cmd_add(registry: &mut Registry, name: &str, uri: Option<String>) -> anyhow::Result<()> {
    let name = name.trim();
    let uri = read_uri(name, uri)?;
    registry.add(name, &uri)?;
    println!("Saved service {name}");
    Ok(())
}

fn cmd_edit(
    registry: &mut Registry,
    old_name: &str,
    new_name: &str,
    uri: Option<String>,
) -> anyhow::Result<()> {
    let old_name = old_name.trim();
    let new_name = new_name.trim();
    let uri = match (uri, registry.uri(old_name)) {
        (Some(u), _) => normalize_input(new_name, &u)?,
        (None, Some(current)) => current.to_string(),
        (None, None) => read_uri(new_name, None)?,
    };

    registry.edit(old_name, new_name, &uri)?;
    if old_name == new_name {
        println!("Updated service {new_name}");
    } else {
        println!("Renamed {old_name} -> {new_name}");
    }
    Ok(())
}

fn cmd_rm(registry: &mut Registry, name: &str, yes: bool) -> anyhow::Result<()> {
    if registry.uri(name).is_none() {
        return Ok(());
    }

    if !yes && !confirm(&format!("Delete {name}?"))? {
        println!("Aborted.");
        return Ok(());
    }

    registry.delete(name)?;
    println!("Deleted {name}");
    Ok(())
}

fn cmd_clip(registry: &Registry, name: &str) -> anyhow::Result<()> {
    let code = registry.get_code(name)?;
    copy_to_clipboard(&code)?;
    println!("Code for {name} copied to clipboard.");
    Ok(())
}

/// Redraw every second. The registry is reopened on each tick so edits made
/// from another shell show up.
fn cmd_watch(store_path: &std::path::Path) -> anyhow::Result<()> {
    let clock = format_description!("[hour]:[minute]:[second]");

    loop {
        let registry = Registry::open(store_path);
        let now = OffsetDateTime::now_utc().format(clock)?;

        let mut screen = format!("\x1b[2J\x1b[H{now} UTC  (Ctrl-C to quit)\n\n");
        if registry.is_empty() {
            screen.push_str("No services yet. Add one with `auth-manager add <name> <uri>`.\n");
        }
        for line in render_services(&registry, true, false) {
            screen.push_str(&line);
            screen.push('\n');
        }
        print!("{screen}");
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(Duration::from_secs(1));
    }
}
