//! Outbound mail queue dispatcher
//!
//! - `outpost process` drains a maildir queue once (or on an interval with
//!   `--daemon`), as a drop-in for a local queue-processor
//! - `outpost watch` drains it whenever new mail arrives
//! - `outpost verp` encodes and decodes signed bounce addresses

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use outpost::{Outpost, ProcessMode, controller};
use outpost_common::logging;

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

/// Outbound mail queue dispatcher
#[derive(Parser, Debug)]
#[command(name = "outpost")]
#[command(about = "Deliver queued mail through an HTTP relay", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (overrides `OUTPOST_CONFIG` and the default locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send everything in the queue
    Process {
        /// Maildir queue to drain
        queue: PathBuf,

        /// Keep running, draining the queue every interval
        #[arg(short, long)]
        daemon: bool,

        /// Seconds between passes in daemon mode
        #[arg(short, long)]
        interval: Option<u64>,

        /// Delivery region
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Send queued mail as soon as it arrives
    Watch {
        /// Maildir queue to watch
        queue: PathBuf,

        /// Delivery region
        #[arg(short, long)]
        region: Option<String>,
    },
    /// Signed VERP addresses
    Verp {
        #[command(subcommand)]
        action: VerpAction,
    },
}

#[derive(Subcommand, Debug)]
enum VerpAction {
    /// Print the identities embedded in a bounce address, one per line
    Decode {
        address: String,

        /// Site whose secret signed the address
        #[arg(short, long)]
        site: String,
    },
    /// Rewrite a sender address for a recipient
    Encode {
        from: String,

        /// Site whose secret signs the address
        #[arg(short, long)]
        site: String,

        /// Recipient identity; give more than one and none is embedded
        #[arg(long = "identity")]
        identities: Vec<String>,

        /// Label to append to the local part
        #[arg(short, long = "label")]
        labels: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init();

    let config = Outpost::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Process {
            queue,
            daemon,
            interval,
            region,
        } => {
            let mode = if daemon {
                ProcessMode::Daemon
            } else {
                ProcessMode::Once
            };
            config
                .process(&queue, mode, interval, region.as_deref())
                .await?;
        }
        Commands::Watch { queue, region } => {
            config.watch(&queue, region.as_deref()).await?;
        }
        Commands::Verp { action } => match action {
            VerpAction::Decode { address, site } => {
                for identity in controller::decode(&config, &site, &address) {
                    println!("{identity}");
                }
            }
            VerpAction::Encode {
                from,
                site,
                identities,
                labels,
            } => {
                println!(
                    "{}",
                    controller::encode(&config, &site, &from, &identities, &labels)?
                );
            }
        },
    }

    Ok(())
}
