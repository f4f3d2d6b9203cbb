// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

use std::env;
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::{EnvFilter, Layer, Registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV: &str = "JOBSD_LOG";
const LOG_FORMAT_ENV: &str = "JOBSD_LOG_FORMAT";
const LOG_SPAN_EVENTS_ENV: &str = "JOBSD_LOG_SPAN_EVENTS";
const LOG_FILE_ENV: &str = "JOBSD_LOG_FILE";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    Json,
    Pretty,
    Compact,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn fmt_layer(format: LogFormat, span_events: FmtSpan, writer: Option<NonBlocking>) -> BoxedLayer {
    let ansi = writer.is_none();
    let base = tracing_subscriber::fmt::layer()
        .with_ansi(ansi)
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(span_events);
    match (format, writer) {
        (LogFormat::Json, Some(w)) => base.json().with_writer(w).boxed(),
        (LogFormat::Json, None) => base.json().boxed(),
        (LogFormat::Pretty, Some(w)) => base.pretty().with_writer(w).boxed(),
        (LogFormat::Pretty, None) => base.pretty().boxed(),
        (LogFormat::Compact, Some(w)) => base.compact().with_writer(w).boxed(),
        (LogFormat::Compact, None) => base.compact().boxed(),
    }
}

pub fn init(verbose: bool) {
    let span_events = parse_span_events(env_value(LOG_SPAN_EVENTS_ENV).as_deref());
    let format = parse_format(env_value(LOG_FORMAT_ENV).as_deref());

    let mut layers: Vec<BoxedLayer> = vec![fmt_layer(format, span_events.clone(), None)];
    if let Some((writer, guard)) = build_file_writer() {
        layers.push(fmt_layer(format, span_events, Some(writer)));
        let _ = FILE_GUARD.set(guard);
    }

    Registry::default()
        .with(layers)
        .with(build_filter(verbose))
        .with(tracing_error::ErrorLayer::default())
        .init();
}

fn env_value(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn build_filter(verbose: bool) -> EnvFilter {
    match env_value(LOG_ENV) {
        Some(value) => EnvFilter::new(value),
        None if verbose => EnvFilter::new("debug"),
        None => EnvFilter::new("info"),
    }
}

fn parse_format(value: Option<&str>) -> LogFormat {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("json") => LogFormat::Json,
        Some("pretty") => LogFormat::Pretty,
        _ => LogFormat::Compact,
    }
}

fn parse_span_events(value: Option<&str>) -> FmtSpan {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("new") => FmtSpan::NEW,
        Some("enter") => FmtSpan::ENTER,
        Some("exit") => FmtSpan::EXIT,
        Some("close") => FmtSpan::CLOSE,
        Some("full") => FmtSpan::FULL,
        _ => FmtSpan::NONE,
    }
}

fn build_file_writer() -> Option<(NonBlocking, WorkerGuard)> {
    let file_path = env_value(LOG_FILE_ENV)?;
    let path = Path::new(&file_path);
    let file_name = path.file_name()?.to_string_lossy().to_string();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_are_case_insensitive_with_compact_fallback() {
        assert_eq!(parse_format(Some("JSON")), LogFormat::Json);
        assert_eq!(parse_format(Some("pretty")), LogFormat::Pretty);
        assert_eq!(parse_format(Some("yaml")), LogFormat::Compact);
        assert_eq!(parse_format(None), LogFormat::Compact);
    }

    #[test]
    fn span_events_default_to_none() {
        assert_eq!(parse_span_events(Some("Close")), FmtSpan::CLOSE);
        assert_eq!(parse_span_events(Some("full")), FmtSpan::FULL);
        assert_eq!(parse_span_events(None), FmtSpan::NONE);
    }
}
