//! JSON logging bootstrap.
//!
//! Emits one JSON object per line on stdout with `level`, `message`, and any
//! structured fields attached at the call site. When the OTLP span pipeline
//! is enabled an [`tracing_opentelemetry`] layer is stacked under the same
//! subscriber so `tracing` spans become OpenTelemetry spans.

use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the JSON subscriber. Safe to call more than once; subsequent
/// calls are no-ops (tests share one process-global subscriber).
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(json_fmt_layer())
        .try_init();
}

/// Install the JSON subscriber plus an OpenTelemetry span layer backed by
/// `provider`. Used when `TRACING_ENABLED` resolves to true.
pub fn init_tracing_with_otel(provider: &SdkTracerProvider) {
    use opentelemetry::trace::TracerProvider as _;

    let tracer = provider.tracer("mnemo");
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(json_fmt_layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .try_init();
}

fn json_fmt_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
}
