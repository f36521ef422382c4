//! Update coordinator: a single actor that serialises record writes and
//! debounces publish requests.
//!
//! Producers hold a cloneable [`CoordinatorHandle`] and never wait on a
//! publish. The actor loop owns all debounce state; it wakes on whichever
//! comes first: a new message, the debounce deadline, or shutdown.
//!
//! Every `RequestUpdate` restarts the window, so a burst of requests closer
//! together than the delay produces exactly one publish cycle.

use std::sync::Arc;
use std::time::Duration;

use changelog_shared::{ChangelogError, ChangelogResult};
use changelog_storage::RecordStore;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::publish::Publisher;

/// Messages accepted by the coordinator, processed in send order.
#[derive(Debug)]
pub enum QueueMessage {
    /// Persist a parsed changelog.
    WriteRecord(ChangelogResult),
    /// Schedule a publish after the debounce window.
    RequestUpdate,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Producer side of the coordinator queue.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<QueueMessage>,
}

impl CoordinatorHandle {
    pub(crate) fn from_sender(tx: mpsc::UnboundedSender<QueueMessage>) -> Self {
        Self { tx }
    }

    /// Hand off an accepted changelog: write it, then request an update.
    pub fn submit(&self, result: ChangelogResult) {
        self.send(QueueMessage::WriteRecord(result));
        self.send(QueueMessage::RequestUpdate);
    }

    /// Request a publish without a new record.
    pub fn request_update(&self) {
        self.send(QueueMessage::RequestUpdate);
    }

    fn send(&self, msg: QueueMessage) {
        if self.tx.send(msg).is_err() {
            warn!("coordinator has stopped, message dropped");
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

/// Debounce state; only the actor loop touches it.
#[derive(Debug, Default)]
struct CoordinatorState {
    /// `None` while idle.
    deadline: Option<Instant>,
    update_queued: bool,
}

/// The actor. Construct with [`spawn`].
pub struct UpdateCoordinator {
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn Publisher>,
    delay: Duration,
    rx: mpsc::UnboundedReceiver<QueueMessage>,
    shutdown: watch::Receiver<bool>,
    state: CoordinatorState,
}

/// Start the coordinator on the current runtime.
///
/// Sending `true` on the shutdown channel (or dropping its sender) stops the
/// loop and aborts an in-flight publish. Dropping every handle lets the loop
/// finish a pending window, publish once, and exit.
pub fn spawn(
    store: Arc<dyn RecordStore>,
    publisher: Arc<dyn Publisher>,
    delay: Duration,
    shutdown: watch::Receiver<bool>,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let coordinator = UpdateCoordinator {
        store,
        publisher,
        delay,
        rx,
        shutdown,
        state: CoordinatorState::default(),
    };
    let task = tokio::spawn(coordinator.run());
    (CoordinatorHandle::from_sender(tx), task)
}

impl UpdateCoordinator {
    async fn run(mut self) {
        info!(delay_secs = self.delay.as_secs(), "changelog coordinator started");
        let mut inbox_open = true;

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            if !inbox_open && self.state.deadline.is_none() {
                debug!("all producers gone and nothing pending");
                break;
            }

            let deadline = self.state.deadline;
            tokio::select! {
                biased;

                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                msg = self.rx.recv(), if inbox_open => match msg {
                    Some(msg) => {
                        self.handle(msg);
                        while let Ok(msg) = self.rx.try_recv() {
                            self.handle(msg);
                        }
                    }
                    None => inbox_open = false,
                },
                () = wait_until(deadline) => {}
            }

            if self.update_due() && !self.run_publish().await {
                break;
            }
        }

        info!("changelog coordinator stopped");
    }

    fn handle(&mut self, msg: QueueMessage) {
        match msg {
            QueueMessage::WriteRecord(result) => self.write_record(&result),
            QueueMessage::RequestUpdate => {
                self.state.update_queued = true;
                self.state.deadline = Some(Instant::now() + self.delay);
                debug!(delay_secs = self.delay.as_secs(), "update queued");
            }
        }
    }

    /// Persistence is best-effort: a failed write is logged and the record lost.
    fn write_record(&self, result: &ChangelogResult) {
        match self.store.write(result) {
            Ok(records) => debug!(pr = result.number, records, "changelog record stored"),
            Err(e) => error!(pr = result.number, error = %e, "failed to write changelog record"),
        }
    }

    fn update_due(&self) -> bool {
        self.state.update_queued
            && self
                .state
                .deadline
                .is_some_and(|deadline| deadline <= Instant::now())
    }

    /// Run one publish cycle. Returns `false` if shutdown interrupted it.
    async fn run_publish(&mut self) -> bool {
        let publisher = Arc::clone(&self.publisher);

        let finished = tokio::select! {
            biased;

            () = shutdown_requested(&mut self.shutdown) => Err(ChangelogError::Cancelled),
            result = publisher.publish() => result,
        };

        self.state = CoordinatorState::default();

        match finished {
            Ok(outcome) => {
                info!(?outcome, "changelog update finished");
                true
            }
            Err(ChangelogError::Cancelled) => {
                warn!("shutdown requested, changelog update aborted");
                false
            }
            Err(e) => {
                error!(error = %e, "exception while running changelog update");
                true
            }
        }
    }
}

/// Resolves once `true` is sent or the sender is dropped.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
