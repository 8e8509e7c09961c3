// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Observe Sender
//!
//! A client-side event forwarder for Observe HTTP collectors.
//!
//! Application code enqueues structured event records (JSON objects). A
//! dedicated background worker batches them, enriches them with per-instance
//! metadata and ships them as newline-delimited JSON over HTTP. Delivery is
//! best effort: failed batches are put back at the head of the queue and
//! retried, and the backlog is truncated when it grows past a byte cap.
//!
//! ## Architecture
//!
//! ```text
//!   producer threads
//!         │ enqueue(kind, record)
//!         v
//!   ┌──────────────┐   notify    ┌─────────────────┐
//!   │ OutboundQueue│ ──────────> │ DeliveryWorker  │
//!   └──────────────┘ <────────── │ (own thread)    │
//!         ^          requeue     └────────┬────────┘
//!         │                               │ NDJSON POST
//!   Metadata + Encoder                    v
//!                                  Observe collector
//! ```
//!
//! - [`sender`]: public façade, lifecycle (`new` / `enqueue` / `close`)
//! - [`queue`]: shared queue, sender state and wake signal
//! - [`worker`]: keepalive / flush / backlog policy
//! - [`flusher`]: HTTP transport for one batch
//! - [`encoder`]: best-effort JSON encoding
//! - [`metadata`]: host, process and instance identity
//! - [`config`]: configuration from arguments and environment
//!
//! ## Example
//!
//! ```no_run
//! use observe_sender::{config::SenderConfig, sender::Sender};
//! use serde_json::json;
//!
//! let config = SenderConfig::from_env()
//!     .with_host("eu1.observeinc.com")
//!     .with_customer_id("1234567890")
//!     .with_auth_token("ds1ASDLKJSALDKSJA.ASLDKJSALDKJSLAKJDLKSJADSLAKJD");
//! let sender = Sender::new(config).expect("sender config");
//!
//! let record = json!({"answer": 42});
//! if let serde_json::Value::Object(record) = record {
//!     sender.enqueue("example", record).expect("sender open");
//! }
//! sender.close();
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]

/// Sender configuration from explicit arguments and `OBSERVE_*` environment variables
pub mod config;

/// Best-effort JSON encoding of event records
pub mod encoder;

/// Errors surfaced to producers and delivery errors kept inside the worker
pub mod error;

/// HTTP transport for a single NDJSON batch
pub mod flusher;

/// HTTP client construction
pub mod http;

/// Logging setup and log line formatter
pub mod logger;

/// Per-instance identity fields merged into every record
pub mod metadata;

/// Shared outbound queue and sender state
pub mod queue;

/// Public sender façade
pub mod sender;

/// Background delivery loop
pub mod worker;

/// An event record: a JSON object with caller-defined keys.
///
/// Keys are kept in sorted order, which makes the encoded form deterministic.
pub type EventRecord = serde_json::Map<String, serde_json::Value>;

/// Pause after a failed flush so a dead collector does not spin the worker.
pub(crate) const FAILED_FLUSH_BACKOFF_MS: u64 = 250;

/// Name of the background delivery thread.
pub(crate) const WORKER_THREAD_NAME: &str = "observe-sender";
