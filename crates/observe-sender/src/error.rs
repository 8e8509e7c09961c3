// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::StatusCode;

/// Errors returned to code that creates a sender or enqueues records.
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    /// Required connection settings are absent and no-op mode was not requested.
    #[error("Sender is missing configuration: {missing}")]
    Config { missing: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Enqueue after `close()` started.
    #[error("Attempt to enqueue observations when already closed")]
    Closed,

    /// The delivery worker could not be started.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// A failed flush attempt. Never leaves the delivery worker.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Error sending batch: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{status}: Failed to push to collector: {body:?}")]
    Status { status: StatusCode, body: String },
}
