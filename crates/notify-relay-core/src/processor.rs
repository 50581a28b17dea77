//! # Queue Processor
//!
//! Long-running consumer that drains a queue and broadcasts every message.
//!
//! ## Lifecycle
//!
//! ```text
//! Created -> Starting -> Running(phase) -> Stopping -> Stopped
//! ```
//!
//! While running, the phase cycles `Polling -> Dispatching -> Polling` after a
//! non-empty batch and `Polling -> Idle -> Polling` after an empty batch or a
//! failed receive. The current state is published on a `watch` channel.
//!
//! ## Delivery
//!
//! Each message is handled independently with a strict `broadcast -> delete`
//! sequence. A failed broadcast leaves the message on the queue until
//! [`RetryPolicy::should_drop`](crate::retry::RetryPolicy::should_drop) says it
//! is a poison message, at which point it is deleted without being delivered.
//! Delivery is therefore at least once: a crash between broadcast and delete
//! delivers the message again once its lease expires.
//!
//! ## Cancellation
//!
//! Receive and every sleep race the cancellation token. A batch that was
//! already received is dispatched to completion; the broadcaster sees the
//! token and may abort early, but deletes are never cancelled.

use crate::broadcaster::NotificationBroadcaster;
use crate::config::ProcessorConfig;
use crate::error::ProcessorError;
use crate::retry::FailureStreak;
use futures::StreamExt;
use notify_queue::{QueueClient, QueueConnector, QueueMessage};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "processor_tests.rs"]
mod tests;

// ============================================================================
// State
// ============================================================================

/// What a running processor is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Polling,
    Dispatching,
    Idle,
}

/// Lifecycle state of a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    Created,
    Starting,
    Running(RunPhase),
    Stopping,
    Stopped,
}

impl ProcessorState {
    /// Check if the processing loop is active
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running(_))
    }
}

impl fmt::Display for ProcessorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Starting => write!(f, "Starting"),
            Self::Running(phase) => write!(f, "Running({:?})", phase),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Default)]
struct ProcessorStats {
    receives: AtomicU64,
    receive_failures: AtomicU64,
    empty_polls: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
    deferred: AtomicU64,
    delete_failures: AtomicU64,
}

impl ProcessorStats {
    fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            receives: self.receives.load(Ordering::Relaxed),
            receive_failures: self.receive_failures.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            delete_failures: self.delete_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the processor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Successful receive calls, empty or not
    pub receives: u64,
    /// Receive calls that failed
    pub receive_failures: u64,
    /// Receive calls that returned no messages
    pub empty_polls: u64,
    /// Messages broadcast successfully
    pub delivered: u64,
    /// Poison messages deleted without delivery
    pub dropped: u64,
    /// Failed messages left on the queue for redelivery
    pub deferred: u64,
    /// Deletes that failed for a reason other than a missing message
    pub delete_failures: u64,
}

// ============================================================================
// Queue Processor
// ============================================================================

/// Drains a queue and hands every message to a broadcaster
pub struct QueueProcessor {
    config: ProcessorConfig,
    connector: Arc<dyn QueueConnector>,
    broadcaster: Arc<dyn NotificationBroadcaster>,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ProcessorState>>,
    stats: Arc<ProcessorStats>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl QueueProcessor {
    /// Create a processor in the `Created` state
    ///
    /// # Errors
    ///
    /// Returns [`ProcessorError::Configuration`] if the configuration is invalid.
    pub fn new(
        config: ProcessorConfig,
        connector: impl QueueConnector + 'static,
        broadcaster: Arc<dyn NotificationBroadcaster>,
    ) -> Result<Self, ProcessorError> {
        config.validate()?;

        let (state, _) = watch::channel(ProcessorState::Created);

        Ok(Self {
            config,
            connector: Arc::new(connector),
            broadcaster,
            cancel: CancellationToken::new(),
            state: Arc::new(state),
            stats: Arc::new(ProcessorStats::default()),
            task: Mutex::new(None),
        })
    }

    /// Link the processor to a host shutdown signal
    ///
    /// Cancelling `signal` stops the processor; stopping the processor does not
    /// cancel `signal`.
    pub fn with_shutdown_signal(mut self, signal: &CancellationToken) -> Self {
        self.cancel = signal.child_token();
        self
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessorState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessorState> {
        self.state.subscribe()
    }

    /// Snapshot of the processing counters
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Start processing
    ///
    /// Acquires the queue client and spawns the processing loop. Returns once
    /// the loop is running. If the shutdown signal has already fired the loop
    /// is not spawned and the processor goes straight to `Stopped`.
    ///
    /// # Errors
    ///
    /// - [`ProcessorError::InvalidState`] unless the processor is `Created`
    /// - [`ProcessorError::StartupFailed`] if the queue client cannot be
    ///   acquired; the processor returns to `Created`
    pub async fn start(&self) -> Result<(), ProcessorError> {
        let mut task = self.task.lock().await;

        let mut observed = ProcessorState::Created;
        let claimed = self.state.send_if_modified(|state| {
            observed = *state;
            if *state == ProcessorState::Created {
                *state = ProcessorState::Starting;
                true
            } else {
                false
            }
        });
        if !claimed {
            return Err(ProcessorError::InvalidState {
                operation: "start",
                state: observed,
            });
        }

        if self.cancel.is_cancelled() {
            info!("Shutdown already requested; queue processor will not run");
            self.state.send_replace(ProcessorState::Stopped);
            return Ok(());
        }

        info!(
            batch_size = self.config.polling.batch_size,
            lease_seconds = self.config.polling.lease_duration.as_secs_f64(),
            max_delivery_attempts = self.config.retry.max_delivery_attempts,
            "Starting queue processor"
        );

        let client = match self.connector.connect().await {
            Ok(client) => client,
            Err(source) => {
                error!(error = %source, "Failed to acquire queue client");
                self.state.send_replace(ProcessorState::Created);
                return Err(ProcessorError::StartupFailed { source });
            }
        };

        let worker = Worker {
            client,
            broadcaster: self.broadcaster.clone(),
            config: self.config.clone(),
            cancel: self.cancel.clone(),
            state: self.state.clone(),
            stats: self.stats.clone(),
        };

        self.state
            .send_replace(ProcessorState::Running(RunPhase::Polling));
        *task = Some(tokio::spawn(worker.run()));

        Ok(())
    }

    /// Stop processing, waiting up to `timeout` for the loop to finish
    ///
    /// A no-op before `start` and once `Stopped`.
    ///
    /// # Errors
    ///
    /// - [`ProcessorError::ShutdownTimeout`] if the loop is still running after
    ///   `timeout`; the processor stays `Stopping` and `stop` may be retried
    /// - [`ProcessorError::TaskFailed`] if the loop panicked
    pub async fn stop(&self, timeout: Duration) -> Result<(), ProcessorError> {
        match self.state() {
            ProcessorState::Created | ProcessorState::Stopped => return Ok(()),
            _ => {}
        }

        warn!(timeout_ms = timeout.as_millis() as u64, "Stopping service.");
        self.cancel.cancel();

        let deadline = Instant::now() + timeout;
        let mut task = match tokio::time::timeout_at(deadline, self.task.lock()).await {
            Ok(task) => task,
            Err(_) => return Err(ProcessorError::ShutdownTimeout { timeout }),
        };

        self.state.send_if_modified(|state| match state {
            ProcessorState::Starting | ProcessorState::Running(_) => {
                *state = ProcessorState::Stopping;
                true
            }
            _ => false,
        });

        let Some(handle) = task.as_mut() else {
            // Start failed or never spawned the loop.
            return Ok(());
        };

        let outcome = tokio::time::timeout_at(deadline, handle).await;
        match outcome {
            Ok(Ok(())) => {
                task.take();
                self.state.send_replace(ProcessorState::Stopped);
                info!("Queue processor stopped");
                Ok(())
            }
            Ok(Err(join_error)) => {
                task.take();
                self.state.send_replace(ProcessorState::Stopped);
                error!(error = %join_error, "Queue processor task failed");
                Err(ProcessorError::TaskFailed {
                    message: join_error.to_string(),
                })
            }
            Err(_) => {
                error!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Queue processor did not stop in time"
                );
                Err(ProcessorError::ShutdownTimeout { timeout })
            }
        }
    }
}

impl Drop for QueueProcessor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Processing Loop
// ============================================================================

/// State owned by the spawned processing loop
struct Worker {
    client: Arc<dyn QueueClient>,
    broadcaster: Arc<dyn NotificationBroadcaster>,
    config: ProcessorConfig,
    cancel: CancellationToken,
    state: Arc<watch::Sender<ProcessorState>>,
    stats: Arc<ProcessorStats>,
}

impl Worker {
    async fn run(self) {
        info!(
            provider = %self.client.provider_type(),
            "Queue processor running"
        );

        let polling = &self.config.polling;
        let mut failures = FailureStreak::new();

        while !self.cancel.is_cancelled() {
            self.set_phase(RunPhase::Polling);

            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                received = self.client.receive(polling.batch_size, polling.lease_duration) => received,
            };

            match received {
                Err(error) => {
                    ProcessorStats::increment(&self.stats.receive_failures);
                    let transient = error.is_transient();
                    failures.record_failure();
                    let delay = failures.delay(&self.config.receive_backoff, transient);

                    error!(
                        error = %error,
                        transient,
                        consecutive_failures = failures.consecutive_failures(),
                        retry_in_ms = delay.as_millis() as u64,
                        "Failed to receive messages from queue"
                    );

                    if !delay.is_zero() {
                        self.set_phase(RunPhase::Idle);
                        if !self.sleep(delay).await {
                            break;
                        }
                    }
                }

                Ok(batch) if batch.is_empty() => {
                    failures.reset();
                    ProcessorStats::increment(&self.stats.receives);
                    ProcessorStats::increment(&self.stats.empty_polls);

                    self.set_phase(RunPhase::Idle);
                    debug!(
                        idle_ms = polling.idle_backoff.as_millis() as u64,
                        "Queue empty; waiting before next poll"
                    );
                    if !self.sleep(polling.idle_backoff).await {
                        break;
                    }
                }

                Ok(batch) => {
                    failures.reset();
                    ProcessorStats::increment(&self.stats.receives);

                    self.set_phase(RunPhase::Dispatching);
                    debug!(count = batch.len(), "Dispatching received batch");

                    let worker = &self;
                    futures::stream::iter(batch)
                        .for_each_concurrent(polling.dispatch_concurrency, move |message| {
                            worker.dispatch(message)
                        })
                        .await;
                }
            }
        }

        self.state.send_replace(ProcessorState::Stopped);

        let stats = self.stats.snapshot();
        info!(
            receives = stats.receives,
            receive_failures = stats.receive_failures,
            delivered = stats.delivered,
            dropped = stats.dropped,
            deferred = stats.deferred,
            delete_failures = stats.delete_failures,
            "Done processing."
        );
    }

    /// Broadcast one message and settle it on the queue
    async fn dispatch(&self, message: QueueMessage) {
        let attempt = message.delivery_attempt_count;

        if self.config.retry.is_exhausted(attempt) {
            ProcessorStats::increment(&self.stats.dropped);
            error!(
                message_id = %message.id,
                attempt,
                max_delivery_attempts = self.config.retry.max_delivery_attempts,
                "Dropping exhausted poison message without broadcasting"
            );
            self.delete(&message).await;
            return;
        }

        match self.broadcaster.broadcast(&message.body, &self.cancel).await {
            Ok(()) => {
                ProcessorStats::increment(&self.stats.delivered);
                debug!(message_id = %message.id, attempt, "Notification broadcast");
                self.delete(&message).await;
            }

            Err(error) if self.config.retry.should_drop(attempt) => {
                ProcessorStats::increment(&self.stats.dropped);
                error!(
                    message_id = %message.id,
                    attempt,
                    max_delivery_attempts = self.config.retry.max_delivery_attempts,
                    error = %error,
                    "Dropping poison message after repeated broadcast failures"
                );
                self.delete(&message).await;
            }

            Err(error) => {
                ProcessorStats::increment(&self.stats.deferred);
                warn!(
                    message_id = %message.id,
                    attempt,
                    error = %error,
                    "Broadcast failed; message left for redelivery"
                );
            }
        }
    }

    async fn delete(&self, message: &QueueMessage) {
        match self.client.delete(message).await {
            Ok(()) => {}
            Err(error) if error.is_not_found() => {
                debug!(
                    message_id = %message.id,
                    "Message already gone or lease expired before delete"
                );
            }
            Err(error) => {
                ProcessorStats::increment(&self.stats.delete_failures);
                warn!(
                    message_id = %message.id,
                    error = %error,
                    "Failed to delete message; it will be redelivered"
                );
            }
        }
    }

    /// Sleep unless cancelled first; returns false on cancellation
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    fn set_phase(&self, phase: RunPhase) {
        self.state.send_if_modified(|state| match state {
            ProcessorState::Running(current) if *current != phase => {
                *state = ProcessorState::Running(phase);
                true
            }
            _ => false,
        });
    }
}
