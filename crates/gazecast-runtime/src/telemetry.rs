//! Tracing subscriber setup for gazecast processes.
//!
//! Library code only emits `tracing` events.  A host binary calls
//! [`init_tracing`] once at startup and keeps the returned guard alive.
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Event filter, `info` when unset or invalid. |
//! | `GAZECAST_LOG_FORMAT` | `compact` (default), `pretty` or `json`. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | Collector base URL; spans are exported over OTLP/HTTP when set. |
//!
//! # Example
//!
//! ```rust,no_run
//! let _telemetry = gazecast_runtime::telemetry::init_tracing("gazecast");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FORMAT_VAR: &str = "GAZECAST_LOG_FORMAT";
const OTLP_ENDPOINT_VAR: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";

/// Console formatting of log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    /// Newline-delimited JSON.
    Json,
}

impl LogFormat {
    /// Case-insensitive; unknown names fall back to [`LogFormat::Compact`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Compact,
        }
    }

    fn from_env() -> Self {
        std::env::var(LOG_FORMAT_VAR)
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }
}

/// Install the global subscriber for `service_name`.
///
/// A second call keeps the subscriber already installed and only reports
/// it on stderr.
pub fn init_tracing(service_name: &str) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let provider = otlp_provider(service_name);
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("gazecast")));
    let registry = tracing_subscriber::registry().with(filter).with(otel);

    let result = match LogFormat::from_env() {
        LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
    };
    if let Err(e) = result {
        eprintln!("[gazecast] tracing already initialised: {e}");
    }

    TelemetryGuard { provider }
}

/// Flushes and shuts down span export when dropped.
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
    pub fn is_exporting(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[gazecast] span export shutdown failed: {e}");
        }
    }
}

fn otlp_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var(OTLP_ENDPOINT_VAR).ok()?;
    let exporter = match opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
    {
        Ok(exporter) => exporter,
        Err(e) => {
            eprintln!("[gazecast] OTLP exporter unavailable: {e}");
            return None;
        }
    };

    // Ticks run on the host's frame thread without an async runtime, so
    // spans go out through the synchronous exporter.
    Some(
        SdkTracerProvider::builder()
            .with_resource(
                Resource::builder()
                    .with_service_name(service_name.to_string())
                    .build(),
            )
            .with_simple_exporter(exporter)
            .build(),
    )
}
