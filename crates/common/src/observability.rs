use std::borrow::Cow;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{EnvFilter, Layer};

/// Flushes the global tracer provider on drop. The `tracing-opentelemetry`
/// wiring is process-global, so shutdown goes through the global provider too.
pub struct OtelGuard {
    _private: (),
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Counts ERROR-level events so alerting does not depend on log scraping.
struct ErrorCounterLayer;

impl<S> Layer<S> for ErrorCounterLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::ERROR {
            metrics::counter!("tracing_error_events").increment(1);
        }
    }
}

/// Builds the `tracing` dispatcher: JSON logs to stdout, `RUST_LOG` honored
/// with `default_level` as fallback, an ERROR-event counter, and OTLP span
/// export when `OTEL_EXPORTER_OTLP_ENDPOINT` is set. Span export is opt-in so
/// local runs and tests stay quiet and deterministic.
pub fn build_dispatch(
    service_name: impl Into<Cow<'static, str>>,
    default_level: &str,
) -> (tracing::Dispatch, Option<OtelGuard>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .json();

    let base = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .with(ErrorCounterLayer);

    let Some(endpoint) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok() else {
        return (tracing::Dispatch::new(base), None);
    };

    match build_otlp_tracer(service_name.into(), &endpoint) {
        Some(tracer) => {
            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
            (
                tracing::Dispatch::new(base.with(otel_layer)),
                Some(OtelGuard { _private: () }),
            )
        }
        // Exporter construction is best-effort; logs and metrics still work.
        None => (tracing::Dispatch::new(base), None),
    }
}

fn build_otlp_tracer(
    service_name: Cow<'static, str>,
    endpoint: &str,
) -> Option<opentelemetry_sdk::trace::Tracer> {
    use opentelemetry_otlp::WithExportConfig;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .ok()?;

    let resource = Resource::new(vec![KeyValue::new(
        "service.name",
        service_name.to_string(),
    )]);

    // Batch export needs a Tokio runtime; the aggregator binary is #[tokio::main].
    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("balance-insights");
    let _ = opentelemetry::global::set_tracer_provider(provider);
    Some(tracer)
}
