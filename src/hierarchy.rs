//! Package path hierarchy
//!
//! Package import paths are flat strings, but they describe a namespace:
//! `example.com/app/store/sql` and `example.com/app/store/mem` share the
//! `example.com/app/store` grouping. This module infers the common root of
//! a set of keys and builds a prefix tree whose leaves are the keys and whose
//! inner nodes are the shared groupings.
//!
//! Inner nodes that are not themselves keys are "synthetic"; whether a node
//! is real is decided by the caller, by looking its name up in the map the
//! keys came from.

use std::collections::BTreeMap;
use thiserror::Error;

/// Separator between package path segments
pub const SEPARATOR: char = '/';

/// A key handed to a node it cannot belong to
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("key {key:?} is not below hierarchy node {node:?}")]
pub struct HierarchyInsertionMismatch {
    pub node: String,
    pub key: String,
}

/// Longest character-level prefix shared by every key
///
/// The seed is the first key; each further key narrows it one character at
/// a time until it matches. The result may end mid-segment (`a/bc`, `a/bd`
/// give `a/b`); trailing separators are dropped. An empty set yields `""`.
pub fn common_prefix<'a, I>(keys: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let mut keys = keys.into_iter();

    let mut prefix = match keys.next() {
        Some(seed) => seed.to_string(),
        None => return String::new(),
    };

    for key in keys {
        while !key.starts_with(prefix.as_str()) {
            prefix.pop();
        }
    }

    let trimmed = prefix.trim_end_matches(SEPARATOR).len();
    prefix.truncate(trimmed);
    prefix
}

/// Grouping node of the package hierarchy, named by its full path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixNode {
    name: String,
    children: BTreeMap<String, PrefixNode>,
}

impl PrefixNode {
    pub fn new(name: impl Into<String>) -> Self {
        PrefixNode {
            name: name.into(),
            children: BTreeMap::new(),
        }
    }

    /// Root the tree at the keys' common prefix and insert every key
    pub fn build<'a, I>(keys: I) -> Result<Self, HierarchyInsertionMismatch>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let keys: Vec<&str> = keys.into_iter().collect();
        let mut root = PrefixNode::new(common_prefix(keys.iter().copied()));
        for key in keys {
            root.add(key)?;
        }
        Ok(root)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> impl Iterator<Item = &PrefixNode> {
        self.children.values()
    }

    pub fn child(&self, name: &str) -> Option<&PrefixNode> {
        self.children.get(name)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Names of this node and every descendant, depth first
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![self.name.as_str()];
        for child in self.children.values() {
            names.extend(child.names());
        }
        names
    }

    /// Insert `full_key` below this node, creating intermediate groupings
    ///
    /// Intermediate nodes are named by their own path (`a/b` when inserting
    /// `a/b/c`), never by the key that caused their creation.
    pub fn add(&mut self, full_key: &str) -> Result<(), HierarchyInsertionMismatch> {
        let Some(rest) = full_key.strip_prefix(self.name.as_str()) else {
            return Err(HierarchyInsertionMismatch {
                node: self.name.clone(),
                key: full_key.to_string(),
            });
        };

        if rest.is_empty() {
            return Ok(());
        }

        // A trailing separator (`a/` below `a`) leaves an empty remainder
        // that still names a distinct key
        let rest = rest.strip_prefix(SEPARATOR).unwrap_or(rest);

        match rest.find(SEPARATOR) {
            None => {
                self.children
                    .entry(full_key.to_string())
                    .or_insert_with(|| PrefixNode::new(full_key));
                Ok(())
            }
            Some(index) => {
                let child_key = &full_key[..full_key.len() - rest.len() + index];
                self.children
                    .entry(child_key.to_string())
                    .or_insert_with(|| PrefixNode::new(child_key))
                    .add(full_key)
            }
        }
    }
}
