// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Background delivery loop.
//!
//! The worker owns a current-thread tokio runtime on its own OS thread. Each
//! cycle it decides between keepalive, flush and idle:
//!
//! ```text
//!   queue empty && idle > keepalive_interval          -> push keepalive
//!   queue non-empty && (closing || idle > batch_delay) -> flush
//!   otherwise                                          -> wait(batch_delay)
//! ```
//!
//! A failed batch is put back in front of the queue, truncated if it grew
//! past `max_backlog_save` bytes. The loop exits once the sender is closing
//! and the queue is drained, or when the final flush fails.

use crate::config::SenderConfig;
use crate::encoder::Encoder;
use crate::error::SenderError;
use crate::flusher::{build_body, Flusher};
use crate::metadata::timestamp_nanos;
use crate::queue::OutboundQueue;
use crate::{EventRecord, FAILED_FLUSH_BACKOFF_MS, WORKER_THREAD_NAME};
use serde_json::Value;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const KEEPALIVE_KEY: &str = "keepalive";

pub struct DeliveryWorker {
    queue: Arc<OutboundQueue>,
    flusher: Flusher,
    encoder: Arc<Encoder>,
    keepalive_interval: Duration,
    batch_send_delay: Duration,
    max_backlog_save: usize,
    log_sends: bool,
}

impl DeliveryWorker {
    #[must_use]
    pub fn new(
        queue: Arc<OutboundQueue>,
        flusher: Flusher,
        encoder: Arc<Encoder>,
        config: &SenderConfig,
    ) -> Self {
        DeliveryWorker {
            queue,
            flusher,
            encoder,
            keepalive_interval: config.keepalive_interval,
            batch_send_delay: config.batch_send_delay,
            max_backlog_save: config.max_backlog_save,
            log_sends: config.log_sends,
        }
    }

    /// Start the loop on a dedicated thread.
    pub fn spawn(self) -> Result<JoinHandle<()>, SenderError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SenderError::Runtime(format!("failed to build worker runtime: {e}")))?;

        std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(self.run()))
            .map_err(|e| SenderError::Runtime(format!("failed to spawn worker thread: {e}")))
    }

    pub async fn run(self) {
        debug!("Delivery worker started for {}", self.flusher.url());
        while self.maybe_send_one().await {
            let draining = {
                let state = self.queue.lock();
                !state.is_running() && !state.records.is_empty()
            };
            if !draining {
                self.queue.wait(self.batch_send_delay).await;
            }
        }
        debug!("Delivery worker stopped");
    }

    /// Run one keepalive/flush decision. Returns `false` once the worker
    /// should exit, after marking the sender closed.
    async fn maybe_send_one(&self) -> bool {
        let batch = {
            let mut state = self.queue.lock();
            let elapsed = state.last_send.elapsed();
            if state.records.is_empty() && elapsed > self.keepalive_interval {
                state.records.push_back(keepalive_record());
            }
            let due = !state.records.is_empty()
                && (!state.is_running() || elapsed > self.batch_send_delay);
            due.then(|| state.take_batch())
        };

        if let Some(batch) = batch {
            let failed = self.flush(batch).await;
            let mut state = self.queue.lock();
            match failed {
                None => state.last_send = Instant::now(),
                Some(failed) if !state.is_running() => {
                    let dropped = failed.len() + state.records.len();
                    state.records.clear();
                    self.queue.close_locked(&mut state);
                    warn!("Final flush failed while closing, discarding {dropped} records");
                    return false;
                }
                Some(failed) => state.requeue_front(failed),
            }
        }

        let mut state = self.queue.lock();
        if state.is_running() || !state.records.is_empty() {
            return true;
        }
        self.queue.close_locked(&mut state);
        false
    }

    /// Send one batch with the lock released.
    ///
    /// Returns `None` on success, or the batch to retry (possibly truncated)
    /// after the failure backoff.
    async fn flush(&self, batch: Vec<EventRecord>) -> Option<Vec<EventRecord>> {
        let lines: Vec<String> = batch.iter().map(|r| self.encoder.encode(r)).collect();
        let body = build_body(&lines);

        if self.log_sends {
            info!(
                "Sending count={} observations with size={} bytes",
                batch.len(),
                body.len()
            );
        } else {
            debug!("Flushing {} records ({} bytes)", batch.len(), body.len());
        }

        match self.flusher.send(body).await {
            Ok(()) => None,
            Err(e) => {
                error!("Failed to flush {} records: {}", batch.len(), e);
                tokio::time::sleep(Duration::from_millis(FAILED_FLUSH_BACKOFF_MS)).await;

                let sizes: Vec<usize> = lines.iter().map(|line| line.len() + 1).collect();
                let (kept, dropped) = truncate_backlog(batch, &sizes, self.max_backlog_save);
                if dropped > 0 {
                    warn!(
                        "Backlog exceeds {} bytes, discarding {} oldest records",
                        self.max_backlog_save, dropped
                    );
                }
                Some(kept)
            }
        }
    }
}

fn keepalive_record() -> EventRecord {
    let mut record = EventRecord::new();
    record.insert(KEEPALIVE_KEY.to_string(), Value::String(timestamp_nanos()));
    record
}

/// Drop the oldest `n/2 + 1` records until the batch fits in `cap` bytes.
///
/// `sizes[i]` is the encoded size of `batch[i]`. Returns the retained records
/// and how many were dropped.
pub(crate) fn truncate_backlog(
    mut batch: Vec<EventRecord>,
    sizes: &[usize],
    cap: usize,
) -> (Vec<EventRecord>, usize) {
    let mut total: usize = sizes.iter().sum();
    let mut start = 0;
    while total > cap && start < batch.len() {
        let remaining = batch.len() - start;
        let drop = remaining / 2 + 1;
        total -= sizes[start..start + drop].iter().sum::<usize>();
        start += drop;
    }
    batch.drain(..start);
    (batch, start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(n: usize) -> EventRecord {
        match json!({ "n": n }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn numbers(records: &[EventRecord]) -> Vec<u64> {
        records
            .iter()
            .map(|r| r["n"].as_u64().expect("n"))
            .collect()
    }

    #[test]
    fn test_truncate_under_cap_keeps_everything() {
        let batch: Vec<_> = (0..4).map(record).collect();
        let (kept, dropped) = truncate_backlog(batch, &[10; 4], 40);
        assert_eq!(dropped, 0);
        assert_eq!(numbers(&kept), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_truncate_drops_oldest_half_plus_one() {
        let batch: Vec<_> = (0..10).map(record).collect();
        let (kept, dropped) = truncate_backlog(batch, &[10; 10], 60);
        assert_eq!(dropped, 6);
        assert_eq!(numbers(&kept), vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_truncate_repeats_until_within_cap() {
        let batch: Vec<_> = (0..10).map(record).collect();
        // 10 -> 4 records (40 bytes) -> 1 record (10 bytes).
        let (kept, dropped) = truncate_backlog(batch, &[10; 10], 15);
        assert_eq!(dropped, 9);
        assert_eq!(numbers(&kept), vec![9]);
    }

    #[test]
    fn test_truncate_zero_cap_drops_all() {
        let batch: Vec<_> = (0..3).map(record).collect();
        let (kept, dropped) = truncate_backlog(batch, &[5; 3], 0);
        assert!(kept.is_empty());
        assert_eq!(dropped, 3);
    }

    #[test]
    fn test_keepalive_record() {
        let record = keepalive_record();
        assert_eq!(record.len(), 1);
        let ts = record[KEEPALIVE_KEY].as_str().expect("string timestamp");
        assert!(ts.parse::<u128>().is_ok());
    }

    proptest! {
        #[test]
        fn prop_truncate_respects_cap_and_order(
            sizes in prop::collection::vec(1usize..500, 0..64),
            cap in 0usize..4096,
        ) {
            let batch: Vec<_> = (0..sizes.len()).map(record).collect();
            let (kept, dropped) = truncate_backlog(batch, &sizes, cap);

            prop_assert_eq!(kept.len() + dropped, sizes.len());
            let retained: usize = sizes[dropped..].iter().sum();
            prop_assert!(retained <= cap);
            let expected: Vec<u64> = (dropped as u64..sizes.len() as u64).collect();
            prop_assert_eq!(numbers(&kept), expected);
            if sizes.iter().sum::<usize>() <= cap {
                prop_assert_eq!(dropped, 0);
            }
        }
    }
}
