// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client construction for the delivery worker.
//!
//! The client carries the per-request timeout from [`SenderConfig`], so a
//! collector that hangs is reported as a failed flush instead of stalling the
//! worker forever.

use crate::config::SenderConfig;
use core::time::Duration;
use tracing::error;

/// Creates a configured HTTP client with optional HTTPS proxy.
///
/// If the proxy configuration is invalid, logs an error and falls back to a
/// client without the proxy, then to reqwest defaults.
#[must_use]
pub fn get_client(config: &SenderConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &SenderConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut client = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            client = client.proxy(reqwest::Proxy::https(https_uri.as_str())?);
        }
    }

    client.build()
}
