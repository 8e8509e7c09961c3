// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Best-effort JSON encoding.
//!
//! Encoding never fails. A value that cannot be serialized is replaced by a
//! fallback document carrying its debug representation and the error:
//!
//! ```text
//! {"_unsupported":"<value as {:?}>","error":"<serialization error>"}
//! ```
//!
//! Each distinct error message is warned about once per [`Encoder`].

use crate::EventRecord;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Mutex;
use tracing::warn;

pub const UNSUPPORTED_KEY: &str = "_unsupported";
pub const ERROR_KEY: &str = "error";

/// Key used when a serializable value is not a JSON object.
pub const VALUE_KEY: &str = "value";

#[derive(Debug, Default)]
pub struct Encoder {
    warned: Mutex<HashSet<String>>,
}

impl Encoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `value` as a single line of JSON with sorted object keys.
    ///
    /// The value goes through [`Value`] first, so struct fields are sorted
    /// like map keys instead of keeping declaration order.
    pub fn encode<T>(&self, value: &T) -> String
    where
        T: Serialize + Debug + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(value) => value.to_string(),
            Err(e) => Value::Object(self.fallback(value, &e)).to_string(),
        }
    }

    /// Turn `value` into an event record.
    ///
    /// Objects are used as-is, any other JSON value is wrapped under
    /// [`VALUE_KEY`], and unserializable values become the fallback document.
    pub fn to_record<T>(&self, value: &T) -> EventRecord
    where
        T: Serialize + Debug + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(Value::Object(record)) => record,
            Ok(other) => {
                let mut record = EventRecord::new();
                record.insert(VALUE_KEY.to_string(), other);
                record
            }
            Err(e) => self.fallback(value, &e),
        }
    }

    fn fallback<T>(&self, value: &T, error: &serde_json::Error) -> EventRecord
    where
        T: Debug + ?Sized,
    {
        let message = error.to_string();
        self.warn_once(&message);

        let mut record = EventRecord::new();
        record.insert(
            UNSUPPORTED_KEY.to_string(),
            Value::String(format!("{value:?}")),
        );
        record.insert(ERROR_KEY.to_string(), Value::String(message));
        record
    }

    fn warn_once(&self, message: &str) {
        #[allow(clippy::expect_used)]
        let mut warned = self.warned.lock().expect("lock poisoned");
        if warned.insert(message.to_string()) {
            warn!("Sending {UNSUPPORTED_KEY} because {message}");
        }
    }
}
