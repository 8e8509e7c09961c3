// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public sender façade.
//!
//! A [`Sender`] owns the outbound queue and the delivery worker thread.
//! `enqueue` only takes the queue lock for the time needed to append a record,
//! so producers never wait on the network. `close` blocks until the worker
//! has tried to deliver everything that was enqueued.

use crate::config::SenderConfig;
use crate::encoder::Encoder;
use crate::error::SenderError;
use crate::flusher::Flusher;
use crate::metadata::{timestamp_nanos, Metadata};
use crate::queue::{OutboundQueue, SenderState};
use crate::worker::DeliveryWorker;
use crate::EventRecord;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, error};

struct Inner {
    queue: Arc<OutboundQueue>,
    metadata: Metadata,
    metadata_key: Option<String>,
    record_kind: bool,
    /// Enqueue after close is silently dropped instead of failing.
    accept_no_config: bool,
    encoder: Arc<Encoder>,
    url: String,
}

pub struct Sender {
    /// `None` for a no-op sender.
    inner: Option<Inner>,
}

impl Sender {
    /// Validate `config`, gather metadata and start the delivery worker.
    ///
    /// With incomplete configuration this returns [`SenderError::Config`]
    /// naming every missing setting, unless `accept_no_config` is set, in
    /// which case the sender silently drops everything.
    pub fn new(config: SenderConfig) -> Result<Self, SenderError> {
        match config.validate() {
            Ok(()) => {}
            Err(e) if config.accept_no_config => {
                debug!("{e}, discarding all records");
                return Ok(Self::noop());
            }
            Err(e) => return Err(e),
        }
        let Some(url) = config.derive_url() else {
            return Err(SenderError::InvalidConfig(
                "unable to derive collector URL".to_string(),
            ));
        };

        let queue = Arc::new(OutboundQueue::new());
        let encoder = Arc::new(Encoder::new());
        let flusher = Flusher::new(url.clone(), &config)?;
        let worker = DeliveryWorker::new(Arc::clone(&queue), flusher, Arc::clone(&encoder), &config);
        queue.set_worker(worker.spawn()?);
        debug!("Sender started for {}", url);

        Ok(Sender {
            inner: Some(Inner {
                queue,
                metadata: Metadata::gather(),
                metadata_key: config.metadata_key,
                record_kind: config.record_kind,
                accept_no_config: config.accept_no_config,
                encoder,
                url,
            }),
        })
    }

    /// A sender that accepts and discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Sender { inner: None }
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.inner.is_none()
    }

    /// Collector URL, `None` for a no-op sender.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.inner.as_ref().map(|inner| inner.url.as_str())
    }

    /// Current lifecycle state. A no-op sender reports [`SenderState::Closed`].
    #[must_use]
    pub fn state(&self) -> SenderState {
        self.inner
            .as_ref()
            .map_or(SenderState::Closed, |inner| inner.queue.status())
    }

    /// Records waiting in the queue, not counting a batch in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.as_ref().map_or(0, |inner| inner.queue.len())
    }

    /// Stamp, enrich and queue one record for delivery.
    ///
    /// Fails with [`SenderError::Closed`] once `close` has started, unless
    /// `accept_no_config` was set, in which case the record is dropped.
    pub fn enqueue(&self, kind: &str, data: EventRecord) -> Result<(), SenderError> {
        let Some(inner) = &self.inner else {
            return Ok(());
        };

        let mut state = inner.queue.lock();
        if !state.is_running() {
            if inner.accept_no_config {
                return Ok(());
            }
            return Err(SenderError::Closed);
        }
        let record = inner.metadata.enrich(
            data,
            inner.record_kind.then_some(kind),
            &timestamp_nanos(),
            inner.metadata_key.as_deref(),
        );
        state.records.push_back(record);
        drop(state);

        inner.queue.signal();
        Ok(())
    }

    /// Like [`Sender::enqueue`] for any serializable value.
    ///
    /// Values that are not JSON objects are wrapped under `value`; values that
    /// fail to serialize are sent as an `_unsupported` placeholder.
    pub fn enqueue_serialize<T>(&self, kind: &str, data: &T) -> Result<(), SenderError>
    where
        T: Serialize + Debug + ?Sized,
    {
        let Some(inner) = &self.inner else {
            return Ok(());
        };
        self.enqueue(kind, inner.encoder.to_record(data))
    }

    /// Stop accepting records and wait for the worker to drain the queue.
    ///
    /// Safe to call more than once and from several threads; every call
    /// returns only after the worker has exited.
    pub fn close(&self) {
        let Some(inner) = &self.inner else {
            return;
        };

        let Some(worker) = inner.queue.begin_close() else {
            inner.queue.wait_closed();
            return;
        };
        inner.queue.signal();

        if worker.join().is_err() {
            error!("Delivery worker panicked, pending records are lost");
            inner.queue.mark_closed();
        }
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn unreachable_config() -> SenderConfig {
        // Port 9 (discard) is not listening; every send fails fast.
        SenderConfig::default()
            .with_host("http://127.0.0.1:9")
            .with_customer_id("101")
            .with_auth_token("tok")
    }

    fn record(value: serde_json::Value) -> EventRecord {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_missing_config_is_an_error() {
        let err = Sender::new(SenderConfig::default().with_host("observe-eng.com"))
            .err()
            .expect("config error");
        assert_eq!(
            err.to_string(),
            "Sender is missing configuration: OBSERVE_CUSTOMERID, OBSERVE_AUTHTOKEN"
        );
    }

    #[test]
    fn test_accept_no_config_is_noop() {
        let sender =
            Sender::new(SenderConfig::default().with_accept_no_config(true)).expect("noop sender");
        assert!(sender.is_noop());
        assert!(sender.url().is_none());
        assert!(sender.enqueue("test", record(json!({"a": 1}))).is_ok());
        assert_eq!(sender.pending(), 0);
        sender.close();
        assert!(sender.enqueue("test", record(json!({"a": 1}))).is_ok());
        assert_eq!(sender.state(), SenderState::Closed);
    }

    #[test]
    fn test_complete_config_with_accept_no_config() {
        let sender = Sender::new(unreachable_config().with_accept_no_config(true)).expect("sender");
        assert!(!sender.is_noop());
        assert_eq!(sender.url(), Some("http://127.0.0.1:9/v1/http/observe-sender"));
        sender
            .enqueue("test", record(json!({"a": 1})))
            .expect("enqueue while running");
        sender.close();

        assert_eq!(sender.state(), SenderState::Closed);
        assert!(sender.enqueue("test", record(json!({"a": 2}))).is_ok());
        assert!(sender.enqueue_serialize("test", &42).is_ok());
        assert_eq!(sender.pending(), 0);
    }

    #[test]
    fn test_enqueue_after_close_fails() {
        let sender = Sender::new(unreachable_config()).expect("sender");
        assert_eq!(sender.state(), SenderState::Running);
        sender.close();
        assert_eq!(sender.state(), SenderState::Closed);
        assert!(matches!(
            sender.enqueue("test", record(json!({"a": 1}))),
            Err(SenderError::Closed)
        ));
        assert!(matches!(
            sender.enqueue_serialize("test", &42),
            Err(SenderError::Closed)
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let sender = Sender::new(unreachable_config()).expect("sender");
        sender.close();
        sender.close();
        assert_eq!(sender.state(), SenderState::Closed);
    }

    #[test]
    fn test_close_drops_undeliverable_records() {
        let sender = Sender::new(unreachable_config()).expect("sender");
        for n in 0..5 {
            sender
                .enqueue("test", record(json!({ "n": n })))
                .expect("enqueue");
        }
        sender.close();
        assert_eq!(sender.state(), SenderState::Closed);
        assert_eq!(sender.pending(), 0);
    }

    /// The worker never flushes before `close` with these timings.
    fn idle_config() -> SenderConfig {
        SenderConfig {
            keepalive_interval: Duration::from_secs(300),
            batch_send_delay: Duration::from_secs(300),
            ..unreachable_config()
        }
    }

    fn queued(sender: &Sender) -> Vec<EventRecord> {
        let inner = sender.inner.as_ref().expect("configured");
        let state = inner.queue.lock();
        state.records.iter().cloned().collect()
    }

    #[test]
    fn test_enqueue_is_visible_in_queue() {
        let sender = Sender::new(idle_config().with_metadata_key("meta")).expect("sender");
        sender
            .enqueue("test", record(json!({"a": 1})))
            .expect("enqueue");

        let records = queued(&sender);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["a"], 1);
        assert!(records[0]["meta"]["timestamp"].is_string());
        assert!(!records[0].contains_key("hostname"));
        assert!(!records[0].contains_key("kind"));
        sender.close();
    }

    #[test]
    fn test_record_kind_is_opt_in() {
        let sender = Sender::new(idle_config().with_metadata_key("").with_record_kind(true))
            .expect("sender");
        sender
            .enqueue("run_create", record(json!({"a": 1})))
            .expect("enqueue");
        sender.enqueue("", record(json!({"a": 2}))).expect("enqueue");

        let records = queued(&sender);
        assert_eq!(
            serde_json::Value::Object(records[0].clone()),
            json!({"a": 1, "kind": "run_create"})
        );
        assert_eq!(
            serde_json::Value::Object(records[1].clone()),
            json!({"a": 2})
        );
        sender.close();
    }

    #[test]
    fn test_drop_closes_worker() {
        let sender = Sender::new(unreachable_config()).expect("sender");
        sender
            .enqueue("test", record(json!({"a": 1})))
            .expect("enqueue");
        drop(sender);
    }
}
