// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-instance identity fields.
//!
//! [`Metadata`] is gathered once when a sender is created and merged into
//! every record it enqueues. Caller-supplied keys always win over metadata.

use crate::EventRecord;
use serde_json::Value;
use std::env;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;
use uuid::Uuid;

pub const TIMESTAMP_KEY: &str = "timestamp";
pub const HOSTNAME_KEY: &str = "hostname";
pub const USER_KEY: &str = "user";
pub const PID_KEY: &str = "pid";
pub const UUID_KEY: &str = "uuid";
pub const KIND_KEY: &str = "kind";

/// Host, process and instance identity of one sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub hostname: String,
    pub user: Option<String>,
    pub pid: u32,
    /// Random id distinguishing sender instances within one process.
    pub instance_id: String,
}

impl Metadata {
    #[must_use]
    pub fn gather() -> Self {
        Self {
            hostname: get_hostname(),
            user: get_user(),
            pid: std::process::id(),
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Metadata fields plus `timestamp`, as a record.
    fn to_record(&self, timestamp: &str) -> EventRecord {
        let mut fields = EventRecord::new();
        fields.insert(HOSTNAME_KEY.to_string(), Value::from(self.hostname.as_str()));
        if let Some(user) = &self.user {
            fields.insert(USER_KEY.to_string(), Value::from(user.as_str()));
        }
        fields.insert(PID_KEY.to_string(), Value::from(self.pid));
        fields.insert(UUID_KEY.to_string(), Value::from(self.instance_id.as_str()));
        fields.insert(TIMESTAMP_KEY.to_string(), Value::from(timestamp));
        fields
    }

    /// Enrich `record` for the queue.
    ///
    /// - `metadata_key == None`: metadata and timestamp are merged at the top level
    /// - `metadata_key == Some("")`: no metadata or timestamp is added
    /// - `metadata_key == Some(key)`: metadata and timestamp are nested under `key`
    ///
    /// `kind` is recorded at the top level only when given and non-empty. In
    /// every case existing keys of `record` are left untouched.
    #[must_use]
    pub fn enrich(
        &self,
        mut record: EventRecord,
        kind: Option<&str>,
        timestamp: &str,
        metadata_key: Option<&str>,
    ) -> EventRecord {
        if let Some(kind) = kind.filter(|kind| !kind.is_empty()) {
            merge_missing(&mut record, [(KIND_KEY.to_string(), Value::from(kind))]);
        }
        match metadata_key {
            None => merge_missing(&mut record, self.to_record(timestamp)),
            Some("") => {}
            Some(key) => merge_missing(
                &mut record,
                [(key.to_string(), Value::Object(self.to_record(timestamp)))],
            ),
        }
        record
    }
}

/// Insert every field whose key is not already present in `dst`.
pub fn merge_missing(dst: &mut EventRecord, src: impl IntoIterator<Item = (String, Value)>) {
    for (key, value) in src {
        dst.entry(key).or_insert(value);
    }
}

/// Wall-clock time in nanoseconds since the Unix epoch, as a decimal string.
#[must_use]
pub fn timestamp_nanos() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
        .to_string()
}

/// Hostname from `HOSTNAME`, then the system, then `"unknown"`.
#[must_use]
pub fn get_hostname() -> String {
    if let Ok(hostname) = env::var("HOSTNAME") {
        if !hostname.is_empty() {
            return hostname;
        }
    }

    #[cfg(unix)]
    {
        match nix::unistd::gethostname() {
            Ok(hostname_osstr) => {
                if let Some(hostname) = hostname_osstr.to_str() {
                    if !hostname.is_empty() {
                        return hostname.to_string();
                    }
                }
            }
            Err(e) => {
                warn!("Failed to get system hostname: {}", e);
            }
        }
    }

    #[cfg(windows)]
    {
        if let Ok(hostname) = env::var("COMPUTERNAME") {
            if !hostname.is_empty() {
                return hostname;
            }
        }
    }

    warn!("Could not determine hostname, using 'unknown'");
    "unknown".to_string()
}

fn get_user() -> Option<String> {
    env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .ok()
        .filter(|user| !user.is_empty())
}
