//! Harbor extension host CLI
//!
//! Discovers extensions, manages installs and the enabled list, and fires
//! activation events against a live sandbox host.
//!
//! Usage:
//!   harbor list
//!   harbor install ./my-extension
//!   harbor fire onStartup

mod welcome;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use harbor_capabilities::{CapabilitySurface, UiEvent};
use harbor_extensions::{ExtensionManager, HarborConfig};
use harbor_sandbox::{SandboxHost, ThreadSpawner};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "harbor")]
#[command(about = "Harbor extension host")]
struct Args {
    /// Path to harbor.toml (defaults to ~/.harbor/harbor.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured builtin extension directory
    #[arg(long)]
    builtin_dir: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List discovered extensions
    List,
    /// Install an extension from a local directory
    Install { source: PathBuf },
    /// Remove a user-installed extension
    Uninstall { id: String },
    /// Enable and activate an extension
    Enable { id: String },
    /// Deactivate and disable an extension
    Disable { id: String },
    /// Fire an activation event, e.g. `onCommand:foo.bar`
    Fire { event: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let mut config = match &args.config {
        Some(path) => HarborConfig::load_from(path),
        None => HarborConfig::load(),
    };
    if let Some(dir) = args.builtin_dir.clone() {
        config.directories.builtin = dir;
    }

    let (surface, deliveries) = CapabilitySurface::new(config.surface_config());
    let surface = Arc::new(surface);
    let ui = surface.subscribe_ui();
    let spawner = Arc::new(ThreadSpawner::new(Arc::new(welcome::modules())));
    let host = SandboxHost::new(config.host_config(), spawner, Arc::clone(&surface));
    host.spawn_delivery_pump(deliveries);

    let manager = Arc::new(ExtensionManager::from_config(host, &config));
    manager.watch_host_events();
    let count = manager.discover();
    info!(count, "Harbor ready");

    let outcome = run(&manager, args.command).await;
    manager.shutdown().await;
    print_ui_events(ui);
    outcome
}

async fn run(manager: &ExtensionManager, command: Command) -> Result<()> {
    match command {
        Command::List => {
            let records = manager.list();
            if records.is_empty() {
                println!("No extensions found.");
            }
            for record in records {
                let origin = if record.is_builtin { "builtin" } else { "user" };
                let disabled = if manager.is_disabled(&record.id) { " (disabled)" } else { "" };
                println!(
                    "{:<24} {:<10} {:<8} {:<12}{}",
                    record.id,
                    record.manifest.version,
                    origin,
                    record.state.as_str(),
                    disabled
                );
            }
        }
        Command::Install { source } => {
            let id = manager
                .install(&source)
                .await
                .with_context(|| format!("installing from {}", source.display()))?;
            println!("Installed {id}");
        }
        Command::Uninstall { id } => {
            manager.uninstall(&id).await?;
            println!("Uninstalled {id}");
        }
        Command::Enable { id } => {
            manager.toggle_enabled(&id, true).await?;
            println!("Enabled {id}");
        }
        Command::Disable { id } => {
            manager.toggle_enabled(&id, false).await?;
            println!("Disabled {id}");
        }
        Command::Fire { event } => {
            let report = manager.activate_by_event(&event).await;
            for id in &report.activated {
                println!("activated {id}");
            }
            for (id, error) in &report.failed {
                warn!(extension_id = %id, "Activation failed: {}", error);
                println!("failed    {id}: {error}");
            }
            if report.activated.is_empty() && report.failed.is_empty() {
                println!("No extension listens for {event}");
            }
            if !report.failed.is_empty() {
                bail!("{} extension(s) failed to activate", report.failed.len());
            }
        }
    }
    Ok(())
}

/// Prints what the presentation layer would have been shown.
fn print_ui_events(mut ui: broadcast::Receiver<UiEvent>) {
    loop {
        let event = match ui.try_recv() {
            Ok(event) => event,
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        };
        match event {
            UiEvent::Notification { extension_id, message, .. } => println!("[{extension_id}] {message}"),
            UiEvent::CommandRegistered(command) => println!("command   {} ({})", command.id, command.title),
            other => {
                if let Ok(json) = serde_json::to_string(&other) {
                    tracing::debug!("ui: {}", json);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let args = Args::try_parse_from(["harbor", "-v", "fire", "onCommand:foo.bar"]).unwrap();
        assert!(args.verbose);
        assert!(matches!(args.command, Command::Fire { event } if event == "onCommand:foo.bar"));

        let args = Args::try_parse_from(["harbor", "--builtin-dir", "/opt/b", "install", "./ext"]).unwrap();
        assert_eq!(args.builtin_dir, Some(PathBuf::from("/opt/b")));
        assert!(matches!(args.command, Command::Install { source } if source == PathBuf::from("./ext")));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Args::try_parse_from(["harbor"]).is_err());
    }
}
