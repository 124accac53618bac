use std::env;

use crate::exporters::stdout::{LogExporterKind, parse_log_exporter_kind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_span_events: bool,
    pub log_exporter: LogExporterKind,
    pub trace_enabled: bool,
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_level = lookup("OTTER_LOG_LEVEL")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "info".to_string());
        let log_span_events = truthy(lookup("OTTER_LOG_SPAN_EVENTS"), false);
        let log_exporter =
            parse_log_exporter_kind(&lookup("OTTER_LOG_EXPORTER").unwrap_or_default());
        let trace_enabled = truthy(lookup("OTTER_TRACE_ENABLED"), false);

        Self { log_level, log_span_events, log_exporter, trace_enabled }
    }

    /// Directive used when `RUST_LOG` is not set.
    pub fn fallback_filter(&self) -> String {
        format!(
            "warn,otter_app={level},otter_core={level},otter_clients_openai={level}",
            level = self.log_level
        )
    }
}

fn truthy(value: Option<String>, default: bool) -> bool {
    value
        .map(|value| {
            let v = value.trim().to_ascii_lowercase();
            matches!(v.as_str(), "1" | "true" | "yes" | "on")
        })
        .unwrap_or(default)
}
