use std::{path::Path, sync::Arc};

use outpost_common::{Signal, internal, tracing};
use outpost_delivery::{Dispatcher, HttpTransportFactory};
use outpost_spool::{Maildir, SpoolWatcher};
use tokio::sync::broadcast;

use crate::config::Outpost;

/// Capacity of the channel between the spool watcher and the dispatcher
const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// How the `process` command runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    /// Drain the queue once and exit
    Once,
    /// Keep draining on the poll interval until shut down
    Daemon,
}

impl Outpost {
    fn dispatcher(&self, queue: &Path, region: Option<&str>) -> anyhow::Result<Dispatcher> {
        let spool = Maildir::open(queue, true)?.with_config(self.spool.clone());

        let mut factory = HttpTransportFactory::new(self.transport.clone());
        if let Some(region) = region {
            factory = factory.with_region(region);
        }

        internal!(
            "Delivering from {} via {} ({})",
            spool.path().display(),
            factory.config().endpoint,
            factory.config().region
        );

        Ok(Dispatcher::new(spool, Arc::new(factory), self.dispatcher))
    }

    /// Console mode: process the queue once, or keep polling it
    ///
    /// # Errors
    /// If the queue cannot be opened, or a single pass fails.
    pub async fn process(
        mut self,
        queue: &Path,
        mode: ProcessMode,
        interval: Option<u64>,
        region: Option<&str>,
    ) -> anyhow::Result<()> {
        if let Some(interval) = interval {
            self.dispatcher.poll_interval_secs = interval;
        }

        let dispatcher = self.dispatcher(queue, region)?;

        match mode {
            ProcessMode::Once => {
                let report = dispatcher.process_cycle().await?;
                internal!(
                    level = INFO,
                    delivered = report.delivered,
                    rejected = report.rejected,
                    deferred = report.deferred,
                    skipped = report.skipped,
                    "Queue processed"
                );
                Ok(())
            }
            ProcessMode::Daemon => {
                let (shutdown_tx, shutdown_rx) = broadcast::channel(8);
                tokio::select! {
                    () = dispatcher.run_polling(shutdown_rx) => Ok(()),
                    r = shutdown(&shutdown_tx) => r,
                }
            }
        }
    }

    /// Watch mode: run the change-driven dispatcher until shut down
    ///
    /// # Errors
    /// If the queue cannot be opened or watched.
    pub async fn watch(self, queue: &Path, region: Option<&str>) -> anyhow::Result<()> {
        let dispatcher = self.dispatcher(queue, region)?;
        let (_watcher, changes) =
            SpoolWatcher::watch(dispatcher.spool().incoming_dir(), CHANGE_CHANNEL_CAPACITY)?;

        let (shutdown_tx, shutdown_rx) = broadcast::channel(8);
        let ret = tokio::select! {
            () = dispatcher.run_watching(changes, shutdown_rx) => Ok(()),
            r = shutdown(&shutdown_tx) => r,
        };

        internal!("Shutting down...");

        ret
    }
}

/// Wait for SIGINT or SIGTERM, then tell the dispatcher to stop
///
/// The dispatcher finishes the cycle it is in before acting on the signal,
/// so this only returns early if the signal cannot be delivered or a second
/// interrupt forces the issue.
async fn shutdown(sender: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
        }
    };

    sender
        .send(Signal::Shutdown)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Interrupted, e.to_string()))?;

    tokio::signal::ctrl_c().await?;
    tracing::warn!("Forced shutdown");

    Ok(())
}

/// Identities recovered from a bounce address for `site`
pub fn decode(config: &Outpost, site: &str, address: &str) -> Vec<String> {
    let codec = config.codec(site);
    if codec.context().is_none() {
        tracing::warn!(site, "No signing secret configured for site");
    }
    codec.decode(address)
}

/// Rewrite a sender address for the given recipient identities and labels
///
/// # Errors
/// If a label is invalid or `from` is not a single mailbox.
pub fn encode(
    config: &Outpost,
    site: &str,
    from: &str,
    identities: &[String],
    labels: &[String],
) -> anyhow::Result<String> {
    let labels = labels
        .iter()
        .map(outpost_verp::Label::new)
        .collect::<Result<Vec<_>, _>>()?;
    // No mailbox is known here, so the identity doubles as the label in logs
    let recipients: Vec<_> = identities
        .iter()
        .map(|identity| outpost_verp::Recipient::with_principal(identity.clone(), identity.clone()))
        .collect();

    Ok(config.codec(site).encode(from, &recipients, &labels)?)
}
