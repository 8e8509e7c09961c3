// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport for one NDJSON batch.
//!
//! ```text
//!   POST {url}
//!   Content-Type: application/x-ndjson
//!   Content-Length: {body length}
//!   Authorization: Bearer {auth token}
//!
//!   {"a":1,...}\n
//!   {"b":2,...}\n
//! ```
//!
//! Any 2xx response is a success. Transport errors, timeouts and every other
//! status are returned as [`DeliveryError`] for the worker to handle.

use crate::config::SenderConfig;
use crate::error::{DeliveryError, SenderError};
use crate::http::get_client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Instant;
use tracing::debug;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Clone)]
pub struct Flusher {
    client: reqwest::Client,
    url: String,
    /// Built once; the URL and token never change for a sender.
    headers: HeaderMap,
}

impl Flusher {
    pub fn new(url: String, config: &SenderConfig) -> Result<Self, SenderError> {
        let auth_token = config.auth_token.as_deref().unwrap_or_default();
        let mut auth = HeaderValue::from_str(&format!("Bearer {auth_token}")).map_err(|_| {
            SenderError::InvalidConfig("auth token is not a valid header value".to_string())
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(NDJSON_CONTENT_TYPE));
        headers.insert(AUTHORIZATION, auth);

        Ok(Flusher {
            client: get_client(config),
            url,
            headers,
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one body. `Content-Length` is set from the body by the client.
    pub async fn send(&self, body: Vec<u8>) -> Result<(), DeliveryError> {
        let time = Instant::now();
        let size = body.len();

        let resp = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            debug!(
                "Posted {} bytes in {} ms: {}",
                size,
                time.elapsed().as_millis(),
                status
            );
            return Ok(());
        }

        Err(DeliveryError::Status {
            status,
            body: resp.text().await.unwrap_or_default(),
        })
    }
}

/// Join encoded lines into a request body, one line per record.
#[must_use]
pub fn build_body(lines: &[String]) -> Vec<u8> {
    let capacity = lines.iter().map(|line| line.len() + 1).sum();
    let mut body = Vec::with_capacity(capacity);
    for line in lines {
        body.extend_from_slice(line.as_bytes());
        body.push(b'\n');
    }
    body
}
