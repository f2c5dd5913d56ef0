//! One test run → one trace

use crate::collector::EventGroups;
use crate::hierarchy::HierarchyInsertionMismatch;
use crate::reporter::TreeReporter;
use crate::span_node::ReportStats;
use opentelemetry::{
    trace::{SpanKind, TraceContextExt, TraceId, Tracer},
    Context, KeyValue,
};
use std::time::SystemTime;

/// Name of the span wrapping a whole run
pub const ROOT_SPAN_NAME: &str = "go tests";

/// Result of reporting one run
#[derive(Debug, Clone)]
pub struct TraceOutcome {
    pub trace_id: TraceId,
    pub stats: ReportStats,
}

/// Report every package of `groups` under a `go tests` root span
///
/// The root span starts at `started` and ends when reporting completes,
/// widened to cover every reported package.
/// `parent` is usually empty, or carries a remote span context to continue.
pub fn export_groups<T>(
    groups: &EventGroups,
    tracer: &T,
    parent: &Context,
    started: SystemTime,
) -> Result<TraceOutcome, HierarchyInsertionMismatch>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let nodes = groups.fold();
    let reporter = TreeReporter::new(&nodes)?;
    let bounds = reporter.bounds();
    let start = bounds.map_or(started, |b| started.min(SystemTime::from(b.start)));

    let root = tracer
        .span_builder(ROOT_SPAN_NAME)
        .with_kind(SpanKind::Internal)
        .with_start_time(start)
        .with_attributes(vec![
            KeyValue::new("test.packages", groups.len() as i64),
            KeyValue::new("test.events", groups.event_count() as i64),
        ])
        .start_with_context(tracer, parent);
    let cx = parent.with_span(root);

    let stats = reporter.report(&cx, tracer);
    tracing::debug!(
        spans = stats.spans,
        incomplete = stats.incomplete.len(),
        "reported test tree"
    );

    let trace_id = cx.span().span_context().trace_id();
    let end = bounds.map_or_else(SystemTime::now, |b| SystemTime::now().max(SystemTime::from(b.end)));
    cx.span().end_with_timestamp(end);

    Ok(TraceOutcome { trace_id, stats })
}
