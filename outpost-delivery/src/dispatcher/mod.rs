//! Queue dispatcher
//!
//! Drains a maildir through a freshly created transport, either on a fixed
//! cadence ([`Dispatcher::run_polling`]) or whenever the spool's incoming
//! directory changes ([`Dispatcher::run_watching`]). Cycles never overlap:
//! both policies run them inline on the caller's task.

mod state;

use std::{sync::Arc, time::Duration};

use outpost_common::{Signal, TransportFactory, internal};
use outpost_spool::{ChangeEvent, DrainReport, Maildir};
use tokio::{
    sync::{broadcast, mpsc},
    time::Instant,
};
use tracing::{debug, error, info, warn};

pub use self::state::{ChangeAction, DispatchState};
use crate::{config::DispatcherConfig, error::DispatchError};

/// Moves queued mail from a [`Maildir`] to a transport
pub struct Dispatcher {
    spool: Maildir,
    factory: Arc<dyn TransportFactory>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(
        spool: Maildir,
        factory: Arc<dyn TransportFactory>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            spool,
            factory,
            config,
        }
    }

    pub const fn spool(&self) -> &Maildir {
        &self.spool
    }

    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Run one processing cycle
    ///
    /// A new transport is created and connected; if it cannot be reached the
    /// spool is left untouched. Otherwise the spool is drained through it.
    /// The transport is closed on every path out of this function.
    ///
    /// # Errors
    /// - [`DispatchError::Factory`] if no transport could be created
    /// - [`DispatchError::TransportUnreachable`] if the transport could not be
    ///   reached, before or part way through the drain
    /// - [`DispatchError::Spool`] if the spool could not be read
    pub async fn process_cycle(&self) -> Result<DrainReport, DispatchError> {
        let mut transport = self.factory.create().map_err(DispatchError::Factory)?;

        if let Err(e) = transport.connect().await {
            transport.close().await;
            return Err(DispatchError::TransportUnreachable(e));
        }

        let result = self.spool.drain(transport.as_mut()).await;
        transport.close().await;

        Ok(result?)
    }

    /// Run a cycle, logging rather than returning its failure
    async fn run_cycle(&self, state: &mut DispatchState) {
        state.last_cycle = Some(Instant::now());

        match self.process_cycle().await {
            Ok(report) => debug!(
                delivered = report.delivered,
                rejected = report.rejected,
                deferred = report.deferred,
                skipped = report.skipped,
                "Dispatch cycle complete"
            ),
            Err(e @ DispatchError::TransportUnreachable(_)) => {
                warn!(error = %e, "Transport unreachable, leaving spool for the next cycle");
            }
            Err(e) => error!(error = %e, "Dispatch cycle failed"),
        }
    }

    /// Polling policy: run a cycle, sleep for the poll interval, repeat
    ///
    /// Returns once a shutdown signal arrives. A cycle already running is
    /// allowed to finish first.
    pub async fn run_polling(&self, mut shutdown: broadcast::Receiver<Signal>) {
        let interval = Duration::from_secs(self.config.poll_interval_secs);
        let mut state = DispatchState::default();

        internal!(
            "Polling {} every {}s",
            self.spool.path().display(),
            interval.as_secs()
        );

        loop {
            self.run_cycle(&mut state).await;

            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                sig = shutdown.recv() => {
                    log_shutdown(sig);
                    break;
                }
            }
        }
    }

    /// Change-driven policy
    ///
    /// Runs one cycle straight away to clear any backlog, then a cycle per
    /// change notification, debounced by the cooldown window: changes that
    /// arrive during a window are coalesced into a single cycle when it
    /// expires. Notifications whose mtime matches the last one seen are
    /// ignored.
    ///
    /// A cycle that delivers or sets aside mail changes the incoming
    /// directory itself, and those notifications are not told apart from new
    /// arrivals. They land inside the cycle's own cooldown window, so a
    /// productive cycle is followed by at most one extra cycle when the window
    /// expires; a cycle that finds nothing to do changes nothing and the loop
    /// goes quiet.
    ///
    /// Returns once a shutdown signal arrives or the change channel closes.
    pub async fn run_watching(
        &self,
        mut changes: mpsc::Receiver<ChangeEvent>,
        mut shutdown: broadcast::Receiver<Signal>,
    ) {
        let cooldown = Duration::from_secs(self.config.cooldown_secs);
        let incoming = self.spool.incoming_dir();
        let mut state = DispatchState::observing(ChangeEvent::observe(&incoming).modified);
        let mut cooldown_until: Option<Instant> = None;

        internal!(
            "Watching {} with a {}s cooldown",
            incoming.display(),
            cooldown.as_secs()
        );

        self.run_cycle(&mut state).await;

        loop {
            let deadline = cooldown_until.unwrap_or_else(Instant::now);

            tokio::select! {
                change = changes.recv() => {
                    let Some(change) = change else {
                        internal!(level = WARN, "Change notifications stopped, no longer watching");
                        break;
                    };

                    match state.on_change(change.modified) {
                        ChangeAction::Ignore => debug!("Ignoring change with unchanged mtime"),
                        ChangeAction::Defer => debug!(
                            pending = state.pending_change_count,
                            "Change during cooldown, deferring"
                        ),
                        ChangeAction::Process => {
                            cooldown_until = Some(Instant::now() + cooldown);
                            self.run_cycle(&mut state).await;
                        }
                    }
                }
                () = tokio::time::sleep_until(deadline), if cooldown_until.is_some() => {
                    if state.on_cooldown_expired() {
                        info!("Processing changes seen during cooldown");
                        cooldown_until = Some(Instant::now() + cooldown);
                        self.run_cycle(&mut state).await;
                    } else {
                        cooldown_until = None;
                    }
                }
                sig = shutdown.recv() => {
                    log_shutdown(sig);
                    break;
                }
            }
        }
    }
}

fn log_shutdown(sig: Result<Signal, broadcast::error::RecvError>) {
    match sig {
        Ok(Signal::Shutdown | Signal::Finalised) => {
            internal!("Dispatcher received shutdown signal");
        }
        Err(e) => error!("Dispatcher shutdown channel error: {e}"),
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("spool", &self.spool)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
