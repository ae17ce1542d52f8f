//! Per-device subscription lifecycle.
//!
//! A session owns one device's stream: it subscribes with exponential
//! backoff, routes received batches into the device tree, and replaces the
//! tree wholesale when the stream is lost. The stop signal is observed
//! before every backoff sleep and raced against every pending receive, so
//! cancellation takes effect as soon as the in-flight call returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::{PathConfig, TargetConfig};
use crate::telemetry::{Batch, TelemetryValue};
use crate::transport::{TelemetryStream, Transport};
use crate::tree::Tree;

/// Keys with this marker are reserved for in-band signalling.
const RESERVED_KEY_MARKER: &str = "__";

/// Reserved key carrying the path prefix for the rest of the batch.
const PREFIX_KEY: &str = "__prefix__";

/// Keys with this suffix carry an interface description, not a sample.
const DESCRIPTION_SUFFIX: &str = "state/description";

const BACKOFF_INIT: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(16);

/// Why a streaming phase ended.
enum StreamOutcome {
    /// External stop signal.
    Stopped,
    /// Receive error or peer closed the stream; device state is stale.
    Interrupted,
    /// The configured message cap was reached.
    Capped,
}

/// One device's subscription loop.
pub struct StreamSession<T> {
    device: String,
    transport: T,
    paths: Vec<PathConfig>,
    tree: Arc<Tree>,
    reconnect: bool,
    max_messages: usize,
}

impl<T: Transport> StreamSession<T> {
    pub fn new(target: &TargetConfig, transport: T, tree: Arc<Tree>) -> Self {
        Self {
            device: target.hostname.clone(),
            transport,
            paths: target.paths.clone(),
            tree,
            reconnect: target.reconnect,
            max_messages: target.max_messages,
        }
    }

    /// Drive the session until stopped, capped, or (with reconnect
    /// disabled) the stream is lost.
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        loop {
            let Some(stream) = self.subscribe(&mut stop).await else {
                info!(device = %self.device, "session stopped");
                return;
            };

            info!(device = %self.device, "subscription established");

            match self.process(stream, &mut stop).await {
                StreamOutcome::Stopped => {
                    info!(device = %self.device, "session stopped");
                    return;
                }
                StreamOutcome::Capped => {
                    info!(
                        device = %self.device,
                        max_messages = self.max_messages,
                        "message cap reached, ending session"
                    );
                    return;
                }
                StreamOutcome::Interrupted => {
                    // Stale and fresh state never merge.
                    self.tree.reset();
                    if !self.reconnect {
                        return;
                    }
                }
            }
        }
    }

    /// Subscribe with exponential backoff. Returns `None` when stopped.
    /// The first attempt is immediate; a success resets the delay to zero
    /// for the next reconnect.
    async fn subscribe(&mut self, stop: &mut watch::Receiver<bool>) -> Option<T::Stream> {
        let mut backoff = Duration::ZERO;

        loop {
            if *stop.borrow() {
                return None;
            }

            if !backoff.is_zero() {
                debug!(device = %self.device, delay = ?backoff, "backing off before resubscribing");
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = stop.changed() => {
                        if *stop.borrow() {
                            return None;
                        }
                    }
                }
            }

            match self.transport.subscribe(&self.paths).await {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    error!(device = %self.device, error = %e, "subscription failed");
                    backoff = next_backoff(backoff);
                }
            }
        }
    }

    async fn process(
        &mut self,
        mut stream: T::Stream,
        stop: &mut watch::Receiver<bool>,
    ) -> StreamOutcome {
        let mut received = 0usize;

        loop {
            if *stop.borrow() {
                return StreamOutcome::Stopped;
            }

            let next = tokio::select! {
                result = stream.next_batch() => result,
                _ = stop.changed() => {
                    if *stop.borrow() {
                        return StreamOutcome::Stopped;
                    }
                    continue;
                }
            };

            match next {
                Ok(Some(batch)) => {
                    self.process_batch(batch);

                    received += 1;
                    if self.max_messages > 0 && received >= self.max_messages {
                        return StreamOutcome::Capped;
                    }
                }
                Ok(None) => {
                    warn!(device = %self.device, "stream closed by peer");
                    return StreamOutcome::Interrupted;
                }
                Err(e) => {
                    error!(device = %self.device, error = %e, "failed to receive from stream");
                    return StreamOutcome::Interrupted;
                }
            }
        }
    }

    /// Route one batch into the tree. The `__prefix__` key qualifies every
    /// later key in the same batch; description entries update the node
    /// description instead of inserting a leaf.
    fn process_batch(&self, batch: Batch) {
        let mut prefix = String::new();

        for entry in batch.entries {
            if entry.key == PREFIX_KEY {
                match entry.value {
                    Some(TelemetryValue::String(s)) => prefix = s,
                    _ => {
                        warn!(
                            device = %self.device,
                            "prefix key with missing or non-string value"
                        );
                        prefix.clear();
                    }
                }
                continue;
            }

            if entry.key.starts_with(RESERVED_KEY_MARKER) {
                continue;
            }

            let path = format!("{}{}", prefix, entry.key);

            if let Some(base) = path.strip_suffix(DESCRIPTION_SUFFIX) {
                if let Some(TelemetryValue::String(text)) = entry.value {
                    self.tree.set_description(base, &text);
                }
                continue;
            }

            self.tree.insert(&path, entry.value);
        }
    }
}

fn next_backoff(current: Duration) -> Duration {
    if current.is_zero() {
        BACKOFF_INIT
    } else {
        (current * 2).min(BACKOFF_MAX)
    }
}
