//! # bbtool
//!
//! Command-line access to BlackBoard arenas.
//!
//! # Usage
//!
//! ```bash
//! # Run a master arena until Ctrl-C
//! bbtool serve --config /etc/bb/bbtool.toml
//!
//! # List interfaces of a running arena
//! bbtool list --region robot --type 'Motor*'
//!
//! # Print all fields of one interface
//! bbtool show --region robot SkillerInterface Skiller --json
//!
//! # Regions on this machine, removing those of dead masters
//! bbtool regions --cleanup
//! ```

mod config;

use bb_common::config::{ConfigLoader, LogLevel};
use blackboard::discovery::list_regions;
use blackboard::lifecycle::cleanup_orphaned_regions;
use blackboard::relay::snapshot;
use blackboard::{
    BbError, BlackBoard, BlackBoardConfig, FieldAccess, InterfaceObserver, ObserverFlags,
};
use clap::{Parser, Subcommand};
use config::ToolConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{Level, debug, error, info};
use tracing_subscriber::EnvFilter;

/// BlackBoard command-line tool
#[derive(Parser, Debug)]
#[command(name = "bbtool")]
#[command(author = "RTS007")]
#[command(version)]
#[command(about = "Serve, inspect and clean up BlackBoard arenas")]
#[command(long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a master arena and keep it alive until interrupted
    Serve {
        /// Path to the TOML configuration
        #[arg(short, long, default_value = "/etc/bb/bbtool.toml")]
        config: PathBuf,
    },
    /// List interfaces of a running arena
    List {
        /// Region name
        #[arg(short, long)]
        region: String,
        /// Type glob
        #[arg(short = 't', long = "type", default_value = "*")]
        type_pattern: String,
        /// Identifier glob
        #[arg(short, long = "id", default_value = "*")]
        id_pattern: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Print every field of one interface
    Show {
        /// Region name
        #[arg(short, long)]
        region: String,
        /// Interface type
        type_name: String,
        /// Interface identifier
        id: String,
        /// Print a JSON snapshot
        #[arg(long)]
        json: bool,
    },
    /// Regions present on this machine
    Regions {
        /// Remove regions whose master is gone
        #[arg(long)]
        cleanup: bool,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Logs interface creation and destruction while serving
struct LifecycleLogger;

impl InterfaceObserver for LifecycleLogger {
    fn interface_created(&self, type_name: &str, id: &str) {
        info!(type_name, id, "Interface created");
    }

    fn interface_destroyed(&self, type_name: &str, id: &str) {
        info!(type_name, id, "Interface destroyed");
    }
}

fn main() {
    if let Err(e) = run() {
        error!("bbtool failed: {}", e);
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Command::Serve { ref config } => {
            let config = ToolConfig::load(config)?;
            config.validate()?;
            let level = if args.verbose {
                Level::DEBUG
            } else {
                level_of(config.shared.log_level)
            };
            setup_tracing(level, args.json_logs || config.shared.log_json);
            serve(config)
        }
        Command::List {
            ref region,
            ref type_pattern,
            ref id_pattern,
            json,
        } => {
            setup_tracing(quiet_level(&args), args.json_logs);
            list(region, type_pattern, id_pattern, json)
        }
        Command::Show {
            ref region,
            ref type_name,
            ref id,
            json,
        } => {
            setup_tracing(quiet_level(&args), args.json_logs);
            show(region, type_name, id, json)
        }
        Command::Regions { cleanup, json } => {
            setup_tracing(quiet_level(&args), args.json_logs);
            regions(cleanup, json)
        }
    }
}

fn serve(config: ToolConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "{} (bbtool v{}) starting",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    if config.serve.cleanup_orphans {
        let removed = cleanup_orphaned_regions()?;
        if !removed.is_empty() {
            info!(?removed, "Removed orphaned regions");
        }
    }

    let bb = BlackBoard::new(config.blackboard.clone())?;
    bb.register_observer(Arc::new(LifecycleLogger), "*", "*", ObserverFlags::ALL);

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    let interval = Duration::from_secs(config.serve.stats_interval_s);
    let mut last_stats = Instant::now();
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
        if !interval.is_zero() && last_stats.elapsed() >= interval {
            last_stats = Instant::now();
            let stats = bb.stats()?;
            info!(
                interfaces = stats.interfaces,
                used_bytes = stats.arena.used_bytes,
                free_bytes = stats.arena.free_bytes,
                largest_free = stats.arena.largest_free,
                "Arena statistics"
            );
        }
    }

    let remaining = bb.list_all()?;
    if !remaining.is_empty() {
        debug!(count = remaining.len(), "Interfaces still open at shutdown");
    }
    drop(bb);
    info!("bbtool serve shutdown complete");
    Ok(())
}

fn list(
    region: &str,
    type_pattern: &str,
    id_pattern: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let bb = BlackBoard::new(BlackBoardConfig::slave(region))?;
    let infos = bb.list(type_pattern, id_pattern)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&infos)?);
        return Ok(());
    }
    println!(
        "{:<32} {:<32} {:>7} {:>6} {:>9}",
        "TYPE", "ID", "READERS", "WRITER", "REVISION"
    );
    for info in &infos {
        let writer = if info.has_writer {
            info.writer_pid.to_string()
        } else {
            "-".to_string()
        };
        println!(
            "{:<32} {:<32} {:>7} {:>6} {:>9}",
            info.type_name, info.id, info.reader_count, writer, info.revision
        );
    }
    Ok(())
}

fn show(
    region: &str,
    type_name: &str,
    id: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let bb = BlackBoard::new(BlackBoardConfig::slave(region))?;
    let interface = match bb.open_existing_dynamic_for_reading(type_name, id) {
        Ok(interface) => interface,
        Err(BbError::NotFound { .. }) => {
            return Err(format!("no interface {type_name}::{id} in region {region}").into());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot(&interface))?);
    } else {
        println!("{} (revision {})", interface.uid(), interface.revision());
        for (name, value) in interface.field_values() {
            println!("  {name:<28} {}", serde_json::to_string(&value)?);
        }
    }
    bb.close_dynamic(interface)?;
    Ok(())
}

fn regions(cleanup: bool, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if cleanup {
        for name in cleanup_orphaned_regions()? {
            println!("removed {name}");
        }
    }

    let regions = list_regions()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&regions)?);
        return Ok(());
    }
    println!("{:<24} {:>10} {:>8} {:>6}", "NAME", "SIZE", "MASTER", "ALIVE");
    for region in &regions {
        println!(
            "{:<24} {:>10} {:>8} {:>6}",
            region.name,
            region.size,
            region.master_pid,
            if region.valid && region.published && region.master_alive {
                "yes"
            } else {
                "no"
            }
        );
    }
    Ok(())
}

fn level_of(level: LogLevel) -> Level {
    match level {
        LogLevel::Trace => Level::TRACE,
        LogLevel::Debug => Level::DEBUG,
        LogLevel::Info => Level::INFO,
        LogLevel::Warn => Level::WARN,
        LogLevel::Error => Level::ERROR,
    }
}

/// Inspection commands keep stdout for their output
fn quiet_level(args: &Args) -> Level {
    if args.verbose { Level::DEBUG } else { Level::WARN }
}

/// Setup tracing subscriber; logs go to stderr
fn setup_tracing(level: Level, json: bool) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}
