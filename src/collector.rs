//! Event grouping by package
//!
//! `go test` interleaves the events of packages that run in parallel; the
//! collector sorts them into one ordered list per package before folding.

use crate::event::{DecodeError, TestEvent};
use crate::span_node::SpanNode;
use std::collections::BTreeMap;

/// Decoded events keyed by package import path
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventGroups {
    groups: BTreeMap<String, Vec<TestEvent>>,
}

impl EventGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain a decoded stream, calling `observe` on every event as it arrives
    ///
    /// Stops at the first decode error.
    pub fn collect<I, F>(events: I, mut observe: F) -> Result<Self, DecodeError>
    where
        I: IntoIterator<Item = Result<TestEvent, DecodeError>>,
        F: FnMut(&TestEvent),
    {
        let mut groups = EventGroups::new();
        for event in events {
            let event = event?;
            observe(&event);
            groups.push(event);
        }
        tracing::debug!(
            packages = groups.len(),
            events = groups.event_count(),
            "collected test events"
        );
        Ok(groups)
    }

    /// Record one event; events without a package have no owner and are dropped
    pub fn push(&mut self, event: TestEvent) {
        if event.package.is_empty() {
            return;
        }
        self.groups
            .entry(event.package.clone())
            .or_default()
            .push(event);
    }

    pub fn get(&self, package: &str) -> Option<&[TestEvent]> {
        self.groups.get(package).map(Vec::as_slice)
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TestEvent])> {
        self.groups
            .iter()
            .map(|(package, events)| (package.as_str(), events.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn event_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    /// Fold every group into its package span tree
    pub fn fold(&self) -> BTreeMap<String, SpanNode> {
        self.groups
            .iter()
            .map(|(package, events)| (package.clone(), SpanNode::from_events(package.clone(), events)))
            .collect()
    }
}
