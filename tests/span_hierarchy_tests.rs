//! End-to-end span tree tests
//!
//! Feeds recorded `go test -json` transcripts through the library and checks
//! the exported span tree with the SDK's in-memory exporter.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use gotest_otel::collector::EventGroups;
use gotest_otel::event::{Action, EventStream, TestEvent};
use gotest_otel::hierarchy::PrefixNode;
use gotest_otel::pipeline::{export_groups, ROOT_SPAN_NAME};
use gotest_otel::reporter::TreeReporter;
use gotest_otel::span_node::{SpanNode, OUTPUT_ATTRIBUTE, PACKAGE_ATTRIBUTE, TEST_ATTRIBUTE};
use opentelemetry::trace::{SpanId, Status, TracerProvider as _};
use opentelemetry::Context;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider, SpanData};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::time::{Duration, SystemTime};

fn fixture(name: &str) -> EventGroups {
    let path = format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name);
    let reader = BufReader::new(File::open(path).unwrap());
    EventGroups::collect(EventStream::new(reader), |_| {}).unwrap()
}

fn export(groups: &EventGroups) -> Vec<SpanData> {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = provider.tracer("integration");

    export_groups(groups, &tracer, &Context::new(), SystemTime::now()).unwrap();
    exporter.get_finished_spans().unwrap()
}

fn attr(span: &SpanData, key: &str) -> String {
    span.attributes
        .iter()
        .find(|kv| kv.key.as_str() == key)
        .map(|kv| kv.value.as_str().into_owned())
        .unwrap_or_default()
}

fn find<'a>(spans: &'a [SpanData], package: &str, test: &str) -> &'a SpanData {
    spans
        .iter()
        .find(|s| s.name != ROOT_SPAN_NAME && attr(s, PACKAGE_ATTRIBUTE) == package && attr(s, TEST_ATTRIBUTE) == test)
        .unwrap_or_else(|| panic!("no span for {package} {test:?}"))
}

fn parent_of<'a>(spans: &'a [SpanData], span: &SpanData) -> Option<&'a SpanData> {
    spans
        .iter()
        .find(|s| s.span_context.span_id() == span.parent_span_id)
}

fn t(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::seconds(secs)
}

// ============================================================================
// Recorded transcript
// ============================================================================

#[test]
fn test_transcript_builds_package_tree() {
    let spans = export(&fixture("nested_packages.json"));

    // root, example.com/shop, store grouping, 2 packages, TestAdd, empty_cart, TestRemove, TestQuery
    assert_eq!(spans.len(), 9);

    let shop = find(&spans, "example.com/shop", "");
    let store = find(&spans, "example.com/shop/store", "");
    let cart = find(&spans, "example.com/shop/cart", "");
    let sql = find(&spans, "example.com/shop/store/sql", "");

    assert_eq!(parent_of(&spans, shop).unwrap().name, ROOT_SPAN_NAME);
    assert_eq!(cart.parent_span_id, shop.span_context.span_id());
    assert_eq!(store.parent_span_id, shop.span_context.span_id());
    assert_eq!(sql.parent_span_id, store.span_context.span_id());

    let query = find(&spans, "example.com/shop/store/sql", "TestQuery");
    assert_eq!(query.parent_span_id, sql.span_context.span_id());
}

#[test]
fn test_transcript_statuses() {
    let spans = export(&fixture("nested_packages.json"));

    let cart = find(&spans, "example.com/shop/cart", "");
    assert!(matches!(cart.status, Status::Error { .. }));

    let sub = find(&spans, "example.com/shop/cart", "TestAdd/empty_cart");
    assert!(matches!(sub.status, Status::Error { .. }));
    assert_eq!(sub.name, "test/run");

    let remove = find(&spans, "example.com/shop/cart", "TestRemove");
    assert_eq!(remove.name, "test/skipped");
    assert_eq!(remove.status, Status::Unset);

    let query = find(&spans, "example.com/shop/store/sql", "TestQuery");
    assert_eq!(query.status, Status::Ok);

    // Synthetic groupings carry no failure of their own
    assert_eq!(find(&spans, "example.com/shop", "").status, Status::Ok);
}

#[test]
fn test_transcript_output_is_attached_in_order() {
    let spans = export(&fixture("nested_packages.json"));

    let sub = find(&spans, "example.com/shop/cart", "TestAdd/empty_cart");
    let lines: Vec<String> = sub
        .events
        .events
        .iter()
        .map(|e| e.attributes[0].value.as_str().into_owned())
        .collect();
    assert_eq!(
        lines,
        vec![
            "=== RUN   TestAdd/empty_cart\n",
            "    cart_test.go:42: expected 1 item, got 0\n",
            "--- FAIL: TestAdd/empty_cart (0.20s)\n",
        ]
    );
    assert!(sub
        .events
        .events
        .iter()
        .all(|e| e.attributes[0].key.as_str() == OUTPUT_ATTRIBUTE));

    let cart = find(&spans, "example.com/shop/cart", "");
    assert_eq!(cart.events.events.len(), 1);
}

#[test]
fn test_transcript_intervals_nest() {
    let spans = export(&fixture("nested_packages.json"));

    for span in spans.iter().filter(|s| s.parent_span_id != SpanId::INVALID) {
        let parent = parent_of(&spans, span).unwrap();
        assert!(
            parent.start_time <= span.start_time && span.end_time <= parent.end_time,
            "{} {:?} escapes its parent {:?}",
            span.name,
            attr(span, TEST_ATTRIBUTE),
            attr(parent, PACKAGE_ATTRIBUTE)
        );
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_run_and_pass_make_one_ok_span() {
    let mut groups = EventGroups::new();
    groups.push(TestEvent::new(Action::Run, "Pkg", "TestA").at(t(0)));
    groups.push(
        TestEvent::new(Action::Pass, "Pkg", "TestA")
            .at(t(5))
            .with_elapsed(Duration::from_secs(5)),
    );
    let spans = export(&groups);

    let test = find(&spans, "Pkg", "TestA");
    assert_eq!(test.start_time, SystemTime::from(t(0)));
    assert_eq!(test.end_time, SystemTime::from(t(5)));
    assert_eq!(test.status, Status::Ok);
}

#[test]
fn test_failed_subtest_without_run_does_not_fail_parent() {
    let mut groups = EventGroups::new();
    groups.push(TestEvent::new(Action::Run, "Pkg", "TestA").at(t(0)));
    groups.push(
        TestEvent::new(Action::Fail, "Pkg", "TestA/Sub")
            .at(t(3))
            .with_elapsed(Duration::from_secs(3)),
    );

    let nodes = groups.fold();
    let sub = nodes["Pkg"].find("TestA/Sub").unwrap();
    assert_eq!(sub.start(), Some(t(0)));
    assert_eq!(sub.end(), Some(t(3)));
    assert!(sub.failed());
    assert!(!nodes["Pkg"].child("TestA").unwrap().failed());

    let spans = export(&groups);
    assert!(matches!(find(&spans, "Pkg", "TestA/Sub").status, Status::Error { .. }));
    assert_eq!(find(&spans, "Pkg", "TestA").status, Status::Ok);
}

#[test]
fn test_synthetic_package_groupings() {
    let mut groups = EventGroups::new();
    for (package, start, end) in [("a/b/c", 1, 2), ("a/b/d", 3, 7), ("a/x", 0, 4)] {
        groups.push(TestEvent::new(Action::Output, package, "").at(t(start)).with_output("start\n"));
        groups.push(TestEvent::new(Action::Pass, package, "").at(t(end)));
    }

    let nodes = groups.fold();
    let reporter = TreeReporter::new(&nodes).unwrap();
    assert_eq!(reporter.root().name(), "a");

    let spans = export(&groups);
    let a = find(&spans, "a", "");
    let ab = find(&spans, "a/b", "");
    assert_eq!((a.start_time, a.end_time), (SystemTime::from(t(0)), SystemTime::from(t(7))));
    assert_eq!((ab.start_time, ab.end_time), (SystemTime::from(t(1)), SystemTime::from(t(7))));
    assert_eq!(find(&spans, "a/b/c", "").parent_span_id, ab.span_context.span_id());
    assert_eq!(find(&spans, "a/b/d", "").parent_span_id, ab.span_context.span_id());
    assert_eq!(find(&spans, "a/x", "").parent_span_id, a.span_context.span_id());
}

#[test]
fn test_package_level_output_is_kept() {
    let mut groups = EventGroups::new();
    groups.push(TestEvent::new(Action::Output, "Pkg", "").at(t(1)).with_output("ok  \tPkg\n"));

    let spans = export(&groups);
    let package = find(&spans, "Pkg", "");
    assert_eq!(package.events.events.len(), 1);
    assert_eq!(package.events.events[0].attributes[0].value.as_str(), "ok  \tPkg\n");
}

#[test]
fn test_hierarchy_only_key_is_synthetic() {
    let nodes: BTreeMap<String, SpanNode> = BTreeMap::new();
    let mut root = PrefixNode::new("a");
    root.add("a/b/c").unwrap();

    // "a/b" exists only in the hierarchy
    assert!(root.child("a/b").is_some());
    assert!(!nodes.contains_key("a/b"));

    let mut groups = EventGroups::new();
    groups.push(TestEvent::new(Action::Pass, "a/b/c", "").at(t(2)));
    groups.push(TestEvent::new(Action::Pass, "a/x", "").at(t(4)));
    let spans = export(&groups);

    let ab = find(&spans, "a/b", "");
    assert_eq!(ab.start_time, SystemTime::from(t(2)));
    assert_eq!(ab.end_time, SystemTime::from(t(2)));
}

#[test]
fn test_untimed_package_is_skipped_not_fatal() {
    let mut groups = fixture("passing.json");
    groups.push(TestEvent::new(Action::Run, "example.com/other", "TestNoTime"));

    let spans = export(&groups);
    assert!(spans
        .iter()
        .all(|s| attr(s, PACKAGE_ATTRIBUTE) != "example.com/other"));
    find(&spans, "example.com/lib", "TestOK");
}
