//! gotest-otel - export `go test` runs as OpenTelemetry traces
//!
//! This library turns the flat `go test -json` event stream into a tree of
//! spans: package path groupings, packages, tests and subtests, each with
//! its pass/fail/skip status and captured output.
//!
//! Data flow:
//!
//! ```text
//! EventStream → EventGroups → SpanNode per package → PrefixNode hierarchy → TreeReporter
//! ```

pub mod cli;
pub mod collector;
pub mod event;
pub mod hierarchy;
pub mod otlp_exporter;
pub mod pipeline;
pub mod reporter;
pub mod runner;
pub mod span_node;
pub mod summary;
pub mod trace_context; // W3C Trace Context propagation
