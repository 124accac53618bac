use opentelemetry::trace::TracerProvider;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod exporters;

pub use config::ObservabilityConfig;
use exporters::stdout::{LogExporterKind, span_events_mask};

pub fn init_observability(service_name: &str, config: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.fallback_filter()))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = match config.log_exporter {
        LogExporterKind::Console => Some(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_span_events(span_events_mask(config.log_span_events)),
        ),
        LogExporterKind::None => None,
    };
    let telemetry_layer = if config.trace_enabled {
        Some(tracing_opentelemetry::layer().with_tracer(
            opentelemetry::trace::noop::NoopTracerProvider::new().tracer(service_name.to_string()),
        ))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(telemetry_layer)
        .try_init()
        .ok();
}

pub fn init_tracing(service_name: &str) {
    init_observability(service_name, &ObservabilityConfig::from_env());
}
