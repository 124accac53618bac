use tracing_subscriber::fmt::format::FmtSpan;

/// Where formatted log lines go. Stdout is kept for program output, so the
/// console exporter writes to stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogExporterKind {
    Console,
    None,
}

pub fn parse_log_exporter_kind(raw: &str) -> LogExporterKind {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "off" => LogExporterKind::None,
        _ => LogExporterKind::Console,
    }
}

pub fn span_events_mask(log_span_events: bool) -> FmtSpan {
    if log_span_events { FmtSpan::NEW | FmtSpan::CLOSE } else { FmtSpan::NONE }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_exporter_kind_defaults_to_console() {
        assert_eq!(parse_log_exporter_kind(""), LogExporterKind::Console);
        assert_eq!(parse_log_exporter_kind("stderr"), LogExporterKind::Console);
    }

    #[test]
    fn parse_log_exporter_kind_accepts_none() {
        assert_eq!(parse_log_exporter_kind("none"), LogExporterKind::None);
        assert_eq!(parse_log_exporter_kind(" OFF "), LogExporterKind::None);
    }

    #[test]
    fn span_events_follow_flag() {
        assert_eq!(span_events_mask(false), FmtSpan::NONE);
        assert_eq!(span_events_mask(true), FmtSpan::NEW | FmtSpan::CLOSE);
    }
}
