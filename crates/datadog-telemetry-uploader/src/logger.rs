// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log formatting for the telemetry pipeline.
//!
//! Every line is prefixed with `DD_TELEMETRY` so pipeline diagnostics stand
//! out from the host application's own output:
//!
//! ```text
//! DD_TELEMETRY | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```

use std::fmt;

use tracing::debug;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::error::ConfigError;

/// Event formatter writing `DD_TELEMETRY | LEVEL | ...` lines.
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
        write!(&mut writer, "DD_TELEMETRY | {} | ", event.metadata().level())?;

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

/// Installs the global subscriber.
///
/// `level` accepts anything [`EnvFilter`] understands. Calling this when a
/// global subscriber is already installed leaves the existing one in place.
pub fn init_logging(level: &str) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,{level}"))
        .map_err(|e| ConfigError::InvalidConfig(format!("invalid log level '{level}': {e}")))?;

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(false)
        .event_format(Formatter)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        debug!("LOGGER | Global subscriber already installed, keeping it");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing::{info, info_span, warn};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn capture(body: impl FnOnce()) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .event_format(Formatter)
            .finish();
        tracing::subscriber::with_default(subscriber, body);
        captured.contents()
    }

    #[test]
    fn test_formats_prefix_and_level() {
        let output = capture(|| info!(count = 3, "flushed batch"));
        assert_eq!(output, "DD_TELEMETRY | INFO | flushed batch count=3\n");
    }

    #[test]
    fn test_formats_span_context() {
        let output = capture(|| {
            let span = info_span!("upload", id = "abc");
            let _guard = span.enter();
            warn!("send failed");
        });
        assert_eq!(
            output,
            "DD_TELEMETRY | WARN | upload{id=\"abc\"}: send failed\n"
        );
    }
}
