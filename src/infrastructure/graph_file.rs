//! JSON call graph files.
//!
//! Lets graphs built by other front ends be verified directly, and lets a graph
//! built from sources be saved for inspection or reuse.

use crate::api::dto::GraphDto;
use crate::common::error::StackcheckError;
use crate::domain::annotation::AnnotationMap;
use crate::domain::callgraph::{CallGraph, FunctionId};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A prebuilt graph together with its label annotations.
#[derive(Debug, Default)]
pub struct GraphFile {
    pub graph: CallGraph,
    pub annotations: AnnotationMap,
}

impl GraphFile {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read graph file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid graph file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let dto: GraphDto = serde_json::from_str(text).context("Failed to parse call graph JSON")?;
        Ok(Self::from_dto(dto)?)
    }

    pub fn from_dto(dto: GraphDto) -> Result<Self, StackcheckError> {
        let mut graph = CallGraph::new();
        let mut ids: HashMap<String, FunctionId> = HashMap::new();
        for node in dto.nodes {
            if ids.contains_key(&node.id) {
                return Err(StackcheckError::InvalidGraph(format!("duplicate node id `{}`", node.id)));
            }
            let id = graph.add_function(node.id.clone(), node.location);
            ids.insert(node.id, id);
        }

        let lookup = |name: &str| ids.get(name).copied().ok_or_else(|| StackcheckError::UnknownFunction(name.to_string()));

        for edge in dto.edges {
            graph.add_edge(lookup(&edge.from)?, lookup(&edge.to)?, edge.site, edge.kind);
        }

        let mut annotations = AnnotationMap::new();
        for (label, root) in &dto.roots {
            annotations.set_root(label.clone(), lookup(root)?);
            if let Some(&count) = dto.root_counts.get(label) {
                annotations.root_counts.insert(label.clone(), count.max(1));
            }
        }
        for (label, guards) in &dto.guards {
            for guard in guards {
                annotations.add_guard(label.clone(), lookup(guard)?);
            }
        }

        log::info!(
            "Loaded call graph: {} functions, {} edges, {} labels",
            graph.len(),
            graph.edge_count(),
            annotations.guards.len()
        );
        Ok(Self { graph, annotations })
    }

    /// Write `graph` (and annotations, when given) in the same format `load` reads.
    pub fn write(graph: &CallGraph, annotations: Option<&AnnotationMap>, path: &Path) -> Result<()> {
        let dto = GraphDto::from_graph(graph, annotations);
        let json = serde_json::to_string_pretty(&dto)?;
        fs::write(path, json).with_context(|| format!("Failed to write graph file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::callgraph::{CallGraphQuery, EdgeKind};

    const GRAPH: &str = r#"{
        "nodes": [
            { "id": "main" },
            { "id": "f1", "location": { "file": "a.rs", "line": 3, "column": 0 } },
            { "id": "g" }
        ],
        "edges": [
            { "from": "main", "to": "f1" },
            { "from": "f1", "to": "g", "kind": "spawn", "site": { "file": "a.rs", "line": 4, "column": 4 } }
        ],
        "roots": { "irq": "f1" },
        "guards": { "irq": ["g", "g"] }
    }"#;

    #[test]
    fn test_parse_graph_file() {
        let file = GraphFile::parse(GRAPH).unwrap();
        let g = file.graph.find_by_name("g")[0];
        let edges = file.graph.incoming_edges(g);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].kind, EdgeKind::Spawn);
        assert_eq!(edges[0].site.line, 4);

        let main = file.graph.find_by_name("main")[0];
        assert_eq!(file.graph.incoming_edges(file.graph.find_by_name("f1")[0])[0].caller, main);
        assert_eq!(file.annotations.guards["irq"], vec![g, g]);
        assert_eq!(file.annotations.guard_tasks().len(), 1);
    }

    #[test]
    fn test_unknown_node_reference() {
        let text = r#"{ "nodes": [{ "id": "a" }], "edges": [{ "from": "a", "to": "missing" }] }"#;
        let err = GraphFile::parse(text).unwrap_err();
        let typed = err.downcast_ref::<StackcheckError>().unwrap();
        assert!(matches!(typed, StackcheckError::UnknownFunction(name) if name == "missing"));
    }

    #[test]
    fn test_duplicate_node_id() {
        let text = r#"{ "nodes": [{ "id": "a" }, { "id": "a" }] }"#;
        let err = GraphFile::parse(text).unwrap_err();
        assert!(matches!(err.downcast_ref::<StackcheckError>(), Some(StackcheckError::InvalidGraph(_))));
    }

    #[test]
    fn test_write_then_load() {
        let file = GraphFile::parse(GRAPH).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        GraphFile::write(&file.graph, Some(&file.annotations), &path).unwrap();

        let reloaded = GraphFile::load(&path).unwrap();
        assert_eq!(reloaded.graph.len(), 3);
        assert_eq!(reloaded.graph.edge_count(), 2);
        assert_eq!(reloaded.annotations.roots.len(), 1);
    }

    #[test]
    fn test_duplicate_roots_survive_write_and_load() {
        let mut file = GraphFile::parse(GRAPH).unwrap();
        let main = file.graph.find_by_name("main")[0];
        file.annotations.set_root("irq", main);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        GraphFile::write(&file.graph, Some(&file.annotations), &path).unwrap();

        let reloaded = GraphFile::load(&path).unwrap();
        assert_eq!(reloaded.annotations.roots["irq"], reloaded.graph.find_by_name("main")[0]);
        assert_eq!(reloaded.annotations.duplicate_roots(), vec![("irq", 2)]);
    }

    #[test]
    fn test_name_clashing_with_suffixed_id_round_trips() {
        let mut graph = CallGraph::new();
        let a0 = graph.add_function("a", None);
        let a1 = graph.add_function("a", None);
        let literal = graph.add_function("a#1", None);
        graph.add_edge(a0, a1, Default::default(), EdgeKind::Ordinary);
        graph.add_edge(literal, a0, Default::default(), EdgeKind::Ordinary);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        GraphFile::write(&graph, None, &path).unwrap();

        let reloaded = GraphFile::load(&path).unwrap();
        assert_eq!(reloaded.graph.len(), 3);
        assert_eq!(reloaded.graph.edge_count(), 2);
    }
}
