// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::io::{self, BufRead};
use std::process::ExitCode;

use serde_json::Value;
use tracing::{debug, error, info};

use observe_sender::{config::SenderConfig, logger, sender::Sender, EventRecord};

const KIND: &str = "stdin";
const MESSAGE_KEY: &str = "message";

pub fn main() -> ExitCode {
    let config = SenderConfig::from_env();

    if let Err(e) = config.validate_log_level() {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = logger::init(&config.log_level) {
        eprintln!("Failed to set up logging: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    let sender = match Sender::new(config) {
        Ok(sender) => sender,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut forwarded = 0usize;
    let mut stdin = io::stdin().lock();
    let mut line = Vec::new();
    loop {
        line.clear();
        match stdin.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                error!("Failed to read stdin: {e}");
                break;
            }
        }
        let Some(record) = line_to_record(&line) else {
            continue;
        };
        if let Err(e) = sender.enqueue(KIND, record) {
            error!("{e}");
            break;
        }
        forwarded += 1;
    }

    sender.close();
    info!("Forwarded {forwarded} records");
    ExitCode::SUCCESS
}

/// JSON objects are forwarded as-is; anything else is wrapped as a message.
/// Invalid UTF-8 is replaced rather than rejected. Blank lines are skipped.
fn line_to_record(raw: &[u8]) -> Option<EventRecord> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches(['\n', '\r']);
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(record)) => Some(record),
        _ => {
            let mut record = EventRecord::new();
            record.insert(MESSAGE_KEY.to_string(), Value::from(line));
            Some(record)
        }
    }
}
