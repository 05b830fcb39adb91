//! Integration tests for the global logging setup.
//!
//! A process can install only one global subscriber, so everything that
//! needs `init_logging` lives in a single test.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::log::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, strip_path, LogFormat, LoggingConfig};
use core_runtime::Error;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CollectingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CollectingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

#[test]
fn test_global_logging_forwards_filtered_events_to_sink() {
    let sink = Arc::new(CollectingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Json)
        .with_filter("core_sync=debug,sqlx=warn")
        .with_logger_sink(sink.clone());
    init_logging(config).unwrap();

    let path = "/home/alice/Music/Joni Mitchell/Blue.mp3";
    tracing::error!(
        target: "core_sync",
        change_id = 5,
        file = strip_path(path),
        api_token = "secret-value",
        "Change not pushed"
    );
    tracing::info!(target: "sqlx", "filtered out below warn");
    tracing::debug!(target: "core_sync", "below the sink's info threshold");

    {
        let entries = sink.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.level, LogLevel::Error);
        assert_eq!(entry.message, "Change not pushed");
        assert_eq!(entry.fields.get("change_id"), Some(&"5".to_string()));
        assert_eq!(entry.fields.get("file"), Some(&"Blue.mp3".to_string()));
        assert_eq!(entry.fields.get("api_token"), Some(&"[REDACTED]".to_string()));
    }

    let second = init_logging(LoggingConfig::default());
    assert!(matches!(second, Err(Error::Config(_))));
}

#[test]
fn test_log_format_from_cli_strings() {
    assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
    assert_eq!("Compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
    assert!("xml".parse::<LogFormat>().is_err());
}
