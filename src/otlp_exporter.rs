//! OpenTelemetry OTLP exporter
//!
//! Owns the tracer provider that test spans are reported through.
//!
//! # Architecture
//!
//! - One `go tests` root span per invocation
//! - Package, test and subtest spans nest below it
//! - Spans are batched and exported to an OTLP endpoint (Jaeger, Tempo, etc.)
//!
//! # Example
//!
//! ```bash
//! gotest-otel --otlp-endpoint http://localhost:4317 --otlp-service-name my-app ./...
//! ```

use anyhow::Result;
use clap::ValueEnum;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::{
    trace::{SdkTracer, SdkTracerProvider},
    Resource,
};

/// Instrumentation scope name of every exported span
pub const TRACER_NAME: &str = "go test";

/// Wire protocol used to reach the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OtlpProtocol {
    /// OTLP over gRPC (default port 4317)
    #[default]
    Grpc,
    /// OTLP over HTTP with protobuf payloads (default port 4318)
    Http,
}

/// Configuration for OTLP exporter
#[derive(Debug, Clone)]
pub struct OtlpConfig {
    /// OTLP endpoint URL (e.g., "http://localhost:4317")
    pub endpoint: String,
    /// Service name for traces
    pub service_name: String,
    pub protocol: OtlpProtocol,
}

fn resource(service_name: &str) -> Resource {
    Resource::builder()
        .with_service_name(service_name.to_string())
        .build()
}

/// OTLP exporter for test traces
pub struct OtlpExporter {
    #[cfg(feature = "otlp")]
    _runtime: Option<tokio::runtime::Runtime>, // Tokio runtime for the network client
    provider: SdkTracerProvider,
    tracer: SdkTracer,
}

impl OtlpExporter {
    /// Create an exporter that sends spans to `config.endpoint`
    #[cfg(feature = "otlp")]
    pub fn new(config: OtlpConfig) -> Result<Self> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::trace::BatchSpanProcessor;

        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| anyhow::anyhow!("Failed to create Tokio runtime: {}", e))?;

        // Build OTLP exporter within the runtime context
        let provider = runtime.block_on(async {
            let exporter = match config.protocol {
                OtlpProtocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
                    .with_tonic()
                    .with_endpoint(&config.endpoint)
                    .build()?,
                OtlpProtocol::Http => opentelemetry_otlp::SpanExporter::builder()
                    .with_http()
                    .with_endpoint(&config.endpoint)
                    .build()?,
            };

            let span_processor = BatchSpanProcessor::builder(exporter).build();

            let provider = SdkTracerProvider::builder()
                .with_span_processor(span_processor)
                .with_resource(resource(&config.service_name))
                .build();

            Ok::<_, anyhow::Error>(provider)
        })?;

        tracing::debug!(
            endpoint = %config.endpoint,
            protocol = ?config.protocol,
            "OTLP exporter ready"
        );

        let tracer = provider.tracer(TRACER_NAME);
        Ok(OtlpExporter {
            _runtime: Some(runtime),
            provider,
            tracer,
        })
    }

    #[cfg(not(feature = "otlp"))]
    pub fn new(_config: OtlpConfig) -> Result<Self> {
        anyhow::bail!("OTLP support not compiled in. Enable the 'otlp' feature.");
    }

    /// Exporter that builds real spans but sends them nowhere
    pub fn offline(service_name: &str) -> Self {
        let provider = SdkTracerProvider::builder()
            .with_resource(resource(service_name))
            .build();
        let tracer = provider.tracer(TRACER_NAME);

        OtlpExporter {
            #[cfg(feature = "otlp")]
            _runtime: None,
            provider,
            tracer,
        }
    }

    pub fn tracer(&self) -> &SdkTracer {
        &self.tracer
    }

    /// Export every finished span; blocks until acknowledged or timed out
    pub fn flush(&self) -> Result<()> {
        self.provider
            .force_flush()
            .map_err(|e| anyhow::anyhow!("Failed to flush spans: {}", e))
    }

    /// Flush and release the exporter
    pub fn shutdown(self) -> Result<()> {
        self.provider
            .shutdown()
            .map_err(|e| anyhow::anyhow!("Failed to shut down exporter: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Span, Tracer};

    #[test]
    fn test_otlp_config_creation() {
        let config = OtlpConfig {
            endpoint: "http://localhost:4317".to_string(),
            service_name: "test-service".to_string(),
            protocol: OtlpProtocol::default(),
        };

        assert_eq!(config.endpoint, "http://localhost:4317");
        assert_eq!(config.service_name, "test-service");
        assert_eq!(config.protocol, OtlpProtocol::Grpc);
    }

    #[test]
    fn test_offline_exporter_flushes() {
        let exporter = OtlpExporter::offline("test-service");
        let mut span = exporter.tracer().start("offline-span");
        assert!(span.span_context().is_valid());
        span.end();

        exporter.flush().unwrap();
        exporter.shutdown().unwrap();
    }

    #[test]
    #[cfg(not(feature = "otlp"))]
    fn test_otlp_disabled_returns_error() {
        let config = OtlpConfig {
            endpoint: "http://localhost:4317".to_string(),
            service_name: "test".to_string(),
            protocol: OtlpProtocol::Grpc,
        };

        let result = OtlpExporter::new(config);
        assert!(result.is_err());
    }
}
