// Call graph structures for stackcheck.
// Nodes are function declarations, edges are individual call sites.

use crate::domain::span::SourcePos;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identity of a function declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(usize);

impl FunctionId {
    /// Ids are dense indices; the program index mirrors graph numbering.
    pub(crate) fn from_index(index: usize) -> Self {
        FunctionId(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the callee runs relative to the caller's stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Synchronous call on the caller's stack.
    #[default]
    Ordinary,
    /// Starts an independently scheduled activity (thread, task).
    Spawn,
}

/// A node in the call graph.
#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub id: FunctionId,
    /// Fully qualified name, e.g. `kernel::irq::Handler::run`
    pub name: String,
    /// Declaration position, when the provider knows it
    pub location: Option<SourcePos>,
}

/// One call site. Several edges may connect the same pair of functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEdge {
    pub caller: FunctionId,
    pub callee: FunctionId,
    pub site: SourcePos,
    pub kind: EdgeKind,
}

/// Read access the verifier needs from a call graph.
pub trait CallGraphQuery {
    /// Edges whose callee is `function`, in insertion order.
    fn incoming_edges(&self, function: FunctionId) -> &[CallEdge];
    fn function_name(&self, function: FunctionId) -> &str;
}

/// The call graph itself. Edges are stored grouped by callee.
#[derive(Debug, Default, Clone)]
pub struct CallGraph {
    nodes: Vec<FunctionNode>,
    incoming: Vec<Vec<CallEdge>>,
    edge_count: usize,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, name: impl Into<String>, location: Option<SourcePos>) -> FunctionId {
        let id = FunctionId(self.nodes.len());
        self.nodes.push(FunctionNode {
            id,
            name: name.into(),
            location,
        });
        self.incoming.push(Vec::new());
        id
    }

    /// Add a call site. Both ends must already be functions of this graph.
    pub fn add_edge(&mut self, caller: FunctionId, callee: FunctionId, site: SourcePos, kind: EdgeKind) {
        debug_assert!(caller.0 < self.nodes.len() && callee.0 < self.nodes.len());
        self.incoming[callee.0].push(CallEdge {
            caller,
            callee,
            site,
            kind,
        });
        self.edge_count += 1;
    }

    pub fn contains(&self, id: FunctionId) -> bool {
        id.0 < self.nodes.len()
    }

    pub fn function(&self, id: FunctionId) -> &FunctionNode {
        &self.nodes[id.0]
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionNode> {
        self.nodes.iter()
    }

    /// All functions with this exact qualified name (overloads stay distinct).
    pub fn find_by_name(&self, name: &str) -> Vec<FunctionId> {
        self.nodes
            .iter()
            .filter(|n| n.name == name)
            .map(|n| n.id)
            .collect()
    }

    pub fn edges(&self) -> impl Iterator<Item = &CallEdge> {
        self.incoming.iter().flatten()
    }

    /// Functions nothing calls: the true program entry points.
    pub fn entry_points(&self) -> Vec<FunctionId> {
        self.nodes
            .iter()
            .filter(|n| self.incoming[n.id.0].is_empty())
            .map(|n| n.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }
}

impl CallGraphQuery for CallGraph {
    fn incoming_edges(&self, function: FunctionId) -> &[CallEdge] {
        self.incoming.get(function.0).map_or(&[], Vec::as_slice)
    }

    fn function_name(&self, function: FunctionId) -> &str {
        self.nodes.get(function.0).map_or("<unknown>", |n| n.name.as_str())
    }
}
