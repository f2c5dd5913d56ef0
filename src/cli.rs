//! CLI argument parsing for gotest-otel

use crate::otlp_exporter::{OtlpConfig, OtlpProtocol};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gotest-otel")]
#[command(version)]
#[command(about = "Run go test and export the results as an OpenTelemetry trace", long_about = None)]
pub struct Cli {
    /// Package pattern handed to go test
    #[arg(value_name = "PACKAGES", default_value = "./...")]
    pub packages: String,

    /// Directory go test runs in
    #[arg(long = "wd", value_name = "DIR", default_value = ".")]
    pub wd: PathBuf,

    /// Read go test -json output from a file ("-" for stdin) instead of running go test
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// go binary used to run the tests
    #[arg(long = "go", value_name = "PATH", default_value = "go")]
    pub go: String,

    /// OTLP endpoint URL
    #[arg(
        long = "otlp-endpoint",
        value_name = "URL",
        env = "OTEL_EXPORTER_OTLP_ENDPOINT",
        default_value = "http://localhost:4317"
    )]
    pub otlp_endpoint: String,

    /// OTLP transport
    #[arg(long = "otlp-protocol", value_enum, default_value = "grpc")]
    pub otlp_protocol: OtlpProtocol,

    /// Service name attached to every exported span
    #[arg(
        long = "otlp-service-name",
        value_name = "NAME",
        env = "OTEL_SERVICE_NAME",
        default_value = "go-test-runner"
    )]
    pub otlp_service_name: String,

    /// W3C traceparent of a span to attach the trace to
    #[arg(long = "trace-parent", value_name = "TRACEPARENT", env = "TRACEPARENT")]
    pub trace_parent: Option<String>,

    /// Build the trace without exporting it
    #[arg(long = "no-export")]
    pub no_export: bool,

    /// Write the pass/fail summary to a file instead of stdout
    #[arg(long = "summary-file", value_name = "FILE")]
    pub summary_file: Option<PathBuf>,

    /// Do not echo test output while streaming
    #[arg(short, long)]
    pub quiet: bool,

    /// Enable debug logging to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    pub fn otlp_config(&self) -> OtlpConfig {
        OtlpConfig {
            endpoint: self.otlp_endpoint.clone(),
            service_name: self.otlp_service_name.clone(),
            protocol: self.otlp_protocol,
        }
    }
}
