//! Annotation Extractor
//!
//! Turns marker comments into the label maps the verifier consumes:
//!
//! ```text
//! // stackcheck: root irq      -> enclosing function is the root of label `irq`
//! // stackcheck: irq           -> enclosing function is guarded by label `irq`
//! ```

use crate::common::config::DEFAULT_MARKER;
use crate::domain::callgraph::FunctionId;
use crate::domain::span::SourceRange;
use std::collections::BTreeMap;

const ROOT_SUBMARKER: &str = "root ";

/// A comment with the marker characters (`//`, `/* */`, doc markers) removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    pub range: SourceRange,
}

/// Finds the function whose declaration lexically contains a span.
pub trait EnclosingFunction {
    fn enclosing_function(&self, range: &SourceRange) -> Option<FunctionId>;
}

/// Label maps for one analyzed unit.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnnotationMap {
    /// label -> root (last root comment wins)
    pub roots: BTreeMap<String, FunctionId>,
    /// label -> number of root comments seen
    pub root_counts: BTreeMap<String, usize>,
    /// label -> guarded functions in extraction order, duplicates kept
    pub guards: BTreeMap<String, Vec<FunctionId>>,
}

impl AnnotationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_root(&mut self, label: impl Into<String>, function: FunctionId) {
        let label = label.into();
        *self.root_counts.entry(label.clone()).or_insert(0) += 1;
        self.roots.insert(label, function);
    }

    pub fn add_guard(&mut self, label: impl Into<String>, function: FunctionId) {
        self.guards.entry(label.into()).or_default().push(function);
    }

    /// Labels that received more than one root comment, with their count.
    pub fn duplicate_roots(&self) -> Vec<(&str, usize)> {
        self.root_counts
            .iter()
            .filter(|&(_, &count)| count > 1)
            .map(|(label, &count)| (label.as_str(), count))
            .collect()
    }

    /// The (label, root, guard) work list. Each guard appears once per label.
    pub fn guard_tasks(&self) -> Vec<(&str, FunctionId, FunctionId)> {
        let mut tasks = Vec::new();
        for (label, root) in &self.roots {
            let Some(guards) = self.guards.get(label) else {
                continue;
            };
            let mut seen = Vec::with_capacity(guards.len());
            for &guard in guards {
                if !seen.contains(&guard) {
                    seen.push(guard);
                    tasks.push((label.as_str(), *root, guard));
                }
            }
        }
        tasks
    }

    /// Labels that yield no work: guards without a root, or a root without guards.
    pub fn idle_labels(&self) -> Vec<String> {
        let mut idle: Vec<String> = self
            .guards
            .keys()
            .filter(|label| !self.roots.contains_key(*label))
            .chain(self.roots.keys().filter(|label| !self.guards.contains_key(*label)))
            .cloned()
            .collect();
        idle.sort();
        idle
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.guards.is_empty()
    }
}

/// Classifies marker comments into root and guard declarations.
#[derive(Debug, Clone)]
pub struct AnnotationExtractor {
    marker: String,
}

impl Default for AnnotationExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl AnnotationExtractor {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    /// Add every annotation found in `comments` to `into`, in comment order.
    /// Comments outside any function are dropped.
    pub fn extract<R>(&self, comments: &[Comment], resolver: &R, into: &mut AnnotationMap)
    where
        R: EnclosingFunction + ?Sized,
    {
        for comment in comments {
            let Some(body) = comment.text.trim_start().strip_prefix(self.marker.as_str()) else {
                continue;
            };
            let Some(function) = resolver.enclosing_function(&comment.range) else {
                log::debug!(
                    "annotation at line {} has no enclosing function, ignored",
                    comment.range.start_line
                );
                continue;
            };

            let body = body.trim();
            match body.strip_prefix(ROOT_SUBMARKER) {
                Some(label) => into.set_root(label.trim(), function),
                None => into.add_guard(body, function),
            }
        }
    }
}
