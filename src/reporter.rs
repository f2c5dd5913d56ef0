//! Tree reporting
//!
//! Walks the package [`PrefixNode`] hierarchy and emits one span per node.
//! Packages that produced events are reported from their [`SpanNode`];
//! synthetic groupings get a placeholder span spanning their descendants.

use crate::hierarchy::{HierarchyInsertionMismatch, PrefixNode};
use crate::span_node::{IncompleteInterval, Interval, ReportStats, SpanNode};
use opentelemetry::{trace::Tracer, Context};
use std::collections::{BTreeMap, HashMap};

pub struct TreeReporter<'a> {
    nodes: &'a BTreeMap<String, SpanNode>,
    root: PrefixNode,
    /// Bounds of each hierarchy node's subtree, own package included
    bounds: HashMap<String, Option<Interval>>,
}

impl<'a> TreeReporter<'a> {
    pub fn new(nodes: &'a BTreeMap<String, SpanNode>) -> Result<Self, HierarchyInsertionMismatch> {
        let root = PrefixNode::build(nodes.keys().map(String::as_str))?;
        let mut bounds = HashMap::new();
        subtree_bounds(nodes, &root, &mut bounds);
        Ok(TreeReporter { nodes, root, bounds })
    }

    pub fn root(&self) -> &PrefixNode {
        &self.root
    }

    /// Bounds of the whole tree, if any package resolved an interval
    pub fn bounds(&self) -> Option<Interval> {
        self.bounds.get(self.root.name()).copied().flatten()
    }

    /// Bounds of every real package below `node`, excluding `node` itself
    pub fn descendant_interval(&self, node: &PrefixNode) -> Option<Interval> {
        node.children().fold(None, |acc, child| {
            Interval::merge(acc, self.bounds.get(child.name()).copied().flatten())
        })
    }

    pub fn report<T>(&self, parent: &Context, tracer: &T) -> ReportStats
    where
        T: Tracer,
        T::Span: Send + Sync + 'static,
    {
        let mut stats = ReportStats::default();
        if !self.nodes.is_empty() {
            self.report_node(&self.root, parent, tracer, &mut stats);
        }
        stats
    }

    fn report_node<T>(&self, node: &PrefixNode, parent: &Context, tracer: &T, stats: &mut ReportStats)
    where
        T: Tracer,
        T::Span: Send + Sync + 'static,
    {
        let nested = |cx: &Context, stats: &mut ReportStats| {
            for child in node.children() {
                self.report_node(child, cx, tracer, stats);
            }
        };
        let extra = self.descendant_interval(node);

        match self.nodes.get(node.name()) {
            Some(span) => span.report_within(parent, tracer, extra, stats, nested),
            None => match extra {
                Some(bounds) => {
                    tracing::debug!(name = node.name(), "reporting synthetic package grouping");
                    SpanNode::placeholder(node.name(), bounds).report_within(
                        parent, tracer, None, stats, nested,
                    )
                }
                None => {
                    let incomplete = IncompleteInterval {
                        package: node.name().to_string(),
                        test: String::new(),
                    };
                    tracing::warn!("{}", incomplete);
                    stats.incomplete.push(incomplete);
                }
            },
        }
    }
}

fn subtree_bounds(
    nodes: &BTreeMap<String, SpanNode>,
    node: &PrefixNode,
    bounds: &mut HashMap<String, Option<Interval>>,
) -> Option<Interval> {
    let own = nodes.get(node.name()).and_then(SpanNode::effective_interval);
    let interval = node
        .children()
        .fold(own, |acc, child| Interval::merge(acc, subtree_bounds(nodes, child, bounds)));
    bounds.insert(node.name().to_string(), interval);
    interval
}
