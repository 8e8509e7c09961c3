// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line formatter and subscriber setup.
//!
//! Every line is prefixed with `OBSERVE_SENDER` so sender diagnostics can be
//! told apart from the host application's own logs:
//!
//! ```text
//! OBSERVE_SENDER | INFO | Sending count=3 observations with size=212 bytes
//! OBSERVE_SENDER | ERROR | Failed to flush 3 records: Error sending batch: ...
//! ```
//!
//! Libraries embedding the sender usually install their own subscriber;
//! [`init`] is for binaries that want the sender's format.

use std::error::Error;
use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields, MakeWriter,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const LOG_PREFIX: &str = "OBSERVE_SENDER";

#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        write!(&mut writer, "{LOG_PREFIX} | {} | ", metadata.level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

fn env_filter(log_level: &str) -> Result<EnvFilter, tracing_subscriber::filter::ParseError> {
    EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,{log_level}"))
}

fn build_subscriber<W>(
    log_level: &str,
    make_writer: W,
) -> Result<impl Subscriber + Send + Sync + 'static, tracing_subscriber::filter::ParseError>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    Ok(tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level)?)
        .with_writer(make_writer)
        .with_ansi(false)
        .event_format(Formatter)
        .finish())
}

/// Install the sender's formatter as the global subscriber, writing to stderr.
pub fn init(log_level: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let subscriber = build_subscriber(log_level, std::io::stderr)?;
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{debug, info, info_span, warn};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().expect("lock").clone()).expect("utf8")
        }
    }

    fn capture(log_level: &str, f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber =
            build_subscriber(log_level, move || writer.clone()).expect("valid filter");
        tracing::subscriber::with_default(subscriber, f);
        captured.contents()
    }

    #[test]
    fn test_prefix_and_level() {
        let output = capture("info", || info!("hello"));
        assert_eq!(output, "OBSERVE_SENDER | INFO | hello\n");
    }

    #[test]
    fn test_span_context_and_fields() {
        let output = capture("info", || {
            let span = info_span!("flush", attempt = 2);
            let _guard = span.enter();
            warn!(count = 3, "retrying");
        });
        assert_eq!(
            output,
            "OBSERVE_SENDER | WARN | flush{attempt=2}: retrying count=3\n"
        );
    }

    #[test]
    fn test_level_filter() {
        let output = capture("warn", || {
            debug!("hidden");
            info!("hidden too");
            warn!("shown");
        });
        assert_eq!(output, "OBSERVE_SENDER | WARN | shown\n");
    }

    #[test]
    fn test_invalid_level_is_rejected() {
        assert!(env_filter("observe_sender=verbose").is_err());
    }
}
