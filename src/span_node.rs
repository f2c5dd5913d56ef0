//! Test span accumulation
//!
//! A [`SpanNode`] folds every event of one package into a tree that mirrors
//! the package → test → subtest nesting:
//!
//! ```text
//! example.com/pkg            (package node, test = "")
//! ├─ TestA
//! │  ├─ TestA/Sub
//! │  └─ TestA/Other
//! └─ TestB
//! ```
//!
//! Every timestamped event widens the interval of each node it passes
//! through on the way to the node it addresses, so ancestors always cover
//! their descendants' output. Status (fail/skip) is only recorded on the
//! addressed node.

use crate::event::{Action, TestEvent, PATH_SEPARATOR};
use chrono::{DateTime, TimeDelta, Utc};
use opentelemetry::{
    trace::{Span, Status, TraceContextExt, Tracer},
    Context, KeyValue,
};
use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;
use thiserror::Error;

pub type Timestamp = DateTime<Utc>;

/// Attribute carrying the package import path
pub const PACKAGE_ATTRIBUTE: &str = "package";
/// Attribute carrying the test path
pub const TEST_ATTRIBUTE: &str = "test";
/// Attribute carrying one line of captured output
pub const OUTPUT_ATTRIBUTE: &str = "output";
/// Name of the span event created for each output line
pub const OUTPUT_EVENT_NAME: &str = "log message";

/// A node that never observed both a start and an end
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("either start or end is unknown for {package} {test:?}, span skipped")]
pub struct IncompleteInterval {
    pub package: String,
    pub test: String,
}

/// Closed time range covered by a span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Interval {
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Interval { start, end }
    }

    pub fn union(self, other: Interval) -> Interval {
        Interval {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn contains(&self, other: &Interval) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Union of two optional intervals
    pub fn merge(a: Option<Interval>, b: Option<Interval>) -> Option<Interval> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.union(b)),
            (a, b) => a.or(b),
        }
    }
}

/// One captured output line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub timestamp: Option<Timestamp>,
    pub text: String,
}

/// Counters collected while reporting a tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportStats {
    /// Spans handed to the tracer
    pub spans: usize,
    /// Nodes skipped because their interval never resolved
    pub incomplete: Vec<IncompleteInterval>,
}

/// Accumulator for one package, test or subtest
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpanNode {
    package: String,
    test: String,
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    run_seen: bool,
    failed: bool,
    skipped: bool,
    output: Vec<OutputLine>,
    children: BTreeMap<String, SpanNode>,
}

impl SpanNode {
    pub fn new(package: impl Into<String>, test: impl Into<String>) -> Self {
        SpanNode {
            package: package.into(),
            test: test.into(),
            ..Default::default()
        }
    }

    /// Package-level root node with every event of `events` folded in
    pub fn from_events<'a, I>(package: impl Into<String>, events: I) -> Self
    where
        I: IntoIterator<Item = &'a TestEvent>,
    {
        let mut node = SpanNode::new(package, "");
        for event in events {
            node.add(0, event);
        }
        node
    }

    /// Grouping node that only carries a time range
    pub fn placeholder(name: impl Into<String>, interval: Interval) -> Self {
        SpanNode {
            package: name.into(),
            start: Some(interval.start),
            end: Some(interval.end),
            ..Default::default()
        }
    }

    /// Fold one event into the tree rooted here
    ///
    /// `depth` is the number of test path segments already consumed to
    /// reach this node (0 for a package node).
    pub fn add(&mut self, depth: usize, event: &TestEvent) {
        if let Some(ts) = event.timestamp {
            self.widen(ts);
        }

        let segments = event.path_segments();
        if segments.len() > depth {
            let child_name = segments[..=depth].join("/");
            self.children
                .entry(child_name)
                .or_insert_with_key(|name| SpanNode::new(event.package.clone(), name.clone()))
                .add(depth + 1, event);
            return;
        }

        match event.action {
            Action::Output => self.output.push(OutputLine {
                timestamp: event.timestamp,
                text: event.output.clone().unwrap_or_default(),
            }),
            Action::Run => {
                if let Some(ts) = event.timestamp {
                    self.start = Some(ts);
                    self.run_seen = true;
                }
            }
            Action::Skip => self.skipped = true,
            Action::Fail => {
                self.failed = true;
                self.finish(event);
            }
            Action::Pass => self.finish(event),
            Action::Other(_) => {}
        }
    }

    fn widen(&mut self, ts: Timestamp) {
        self.start = Some(self.start.map_or(ts, |start| start.min(ts)));
        self.end = Some(self.end.map_or(ts, |end| end.max(ts)));
    }

    fn finish(&mut self, event: &TestEvent) {
        let Some(ts) = event.timestamp else {
            return;
        };

        // Without a run event the start is reconstructed from the elapsed time
        if !self.run_seen {
            let elapsed = TimeDelta::from_std(event.elapsed_duration()).unwrap_or_else(|_| TimeDelta::zero());
            let backdated = ts.checked_sub_signed(elapsed).unwrap_or(ts);
            self.start = Some(self.start.map_or(backdated, |start| start.min(backdated)));
        }
        // The terminal timestamp wins, so own output logged after it can fall
        // outside the span; only children feed `effective_interval`
        self.end = Some(ts);
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn test(&self) -> &str {
        &self.test
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }

    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn skipped(&self) -> bool {
        self.skipped
    }

    pub fn output(&self) -> &[OutputLine] {
        &self.output
    }

    pub fn children(&self) -> impl Iterator<Item = &SpanNode> {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&SpanNode> {
        self.children.get(name)
    }

    /// Find a descendant by its full test path
    pub fn find(&self, test_path: &str) -> Option<&SpanNode> {
        let mut node = self;
        let mut consumed = 0;
        for segment in test_path.split(PATH_SEPARATOR) {
            consumed += segment.len();
            node = node.children.get(&test_path[..consumed])?;
            consumed += PATH_SEPARATOR.len_utf8();
        }
        Some(node)
    }

    /// The node's own bounds, if both ends were observed
    pub fn interval(&self) -> Option<Interval> {
        Some(Interval::new(self.start?, self.end?))
    }

    /// Own bounds widened by every descendant's effective bounds
    pub fn effective_interval(&self) -> Option<Interval> {
        self.children
            .values()
            .fold(self.interval(), |acc, child| Interval::merge(acc, child.effective_interval()))
    }

    fn span_name(&self) -> &'static str {
        if self.skipped {
            "test/skipped"
        } else if self.test.is_empty() {
            "test/package"
        } else {
            "test/run"
        }
    }

    fn status(&self) -> Option<Status> {
        if self.failed {
            Some(Status::error("test failed"))
        } else if !self.skipped {
            Some(Status::Ok)
        } else {
            None
        }
    }

    /// Emit this node and its subtree as spans under `parent`
    pub fn report<T>(&self, parent: &Context, tracer: &T, stats: &mut ReportStats)
    where
        T: Tracer,
        T::Span: Send + Sync + 'static,
    {
        self.report_within(parent, tracer, None, stats, |_, _| {});
    }

    /// Like [`SpanNode::report`], widening the span by `extra` and letting
    /// `nested` emit additional children under it before it closes.
    pub(crate) fn report_within<T, F>(
        &self,
        parent: &Context,
        tracer: &T,
        extra: Option<Interval>,
        stats: &mut ReportStats,
        nested: F,
    ) where
        T: Tracer,
        T::Span: Send + Sync + 'static,
        F: FnOnce(&Context, &mut ReportStats),
    {
        let mut intervals = HashMap::new();
        self.collect_intervals(&mut intervals);
        self.report_with(parent, tracer, extra, &intervals, stats, nested);
    }

    /// Effective interval of every node in this subtree, keyed by test path
    fn collect_intervals<'a>(&'a self, intervals: &mut HashMap<&'a str, Option<Interval>>) -> Option<Interval> {
        let interval = self
            .children
            .values()
            .fold(self.interval(), |acc, child| Interval::merge(acc, child.collect_intervals(intervals)));
        intervals.insert(self.test.as_str(), interval);
        interval
    }

    fn report_with<T, F>(
        &self,
        parent: &Context,
        tracer: &T,
        extra: Option<Interval>,
        intervals: &HashMap<&str, Option<Interval>>,
        stats: &mut ReportStats,
        nested: F,
    ) where
        T: Tracer,
        T::Span: Send + Sync + 'static,
        F: FnOnce(&Context, &mut ReportStats),
    {
        let own = intervals.get(self.test.as_str()).copied().flatten();
        let Some(bounds) = Interval::merge(own, extra) else {
            let incomplete = IncompleteInterval {
                package: self.package.clone(),
                test: self.test.clone(),
            };
            tracing::warn!("{}", incomplete);
            stats.incomplete.push(incomplete);
            return;
        };

        let mut span = tracer
            .span_builder(self.span_name())
            .with_start_time(SystemTime::from(bounds.start))
            .with_attributes(vec![
                KeyValue::new(PACKAGE_ATTRIBUTE, self.package.clone()),
                KeyValue::new(TEST_ATTRIBUTE, self.test.clone()),
            ])
            .start_with_context(tracer, parent);

        if let Some(status) = self.status() {
            span.set_status(status);
        }

        for line in &self.output {
            span.add_event_with_timestamp(
                OUTPUT_EVENT_NAME,
                SystemTime::from(line.timestamp.unwrap_or(bounds.start)),
                vec![KeyValue::new(OUTPUT_ATTRIBUTE, line.text.clone())],
            );
        }
        stats.spans += 1;

        let cx = parent.with_span(span);
        for child in self.children.values() {
            child.report_with::<T, fn(&Context, &mut ReportStats)>(&cx, tracer, None, intervals, stats, |_, _| {});
        }
        nested(&cx, stats);

        cx.span().end_with_timestamp(SystemTime::from(bounds.end));
    }
}
