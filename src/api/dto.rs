use crate::domain::annotation::AnnotationMap;
use crate::domain::callgraph::{CallGraph, EdgeKind, FunctionId};
use crate::domain::span::SourcePos;
use crate::domain::verifier::{TraceEnd, VerificationReport, Violation};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Call graph file format. Node ids are unique strings; edges and
/// annotations refer to nodes by id.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GraphDto {
    pub nodes: Vec<NodeDto>,
    #[serde(default)]
    pub edges: Vec<EdgeDto>,
    /// label -> root node id
    #[serde(default)]
    pub roots: BTreeMap<String, String>,
    /// label -> number of root comments, for labels that had more than one
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub root_counts: BTreeMap<String, usize>,
    /// label -> guard node ids
    #[serde(default)]
    pub guards: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeDto {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourcePos>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeDto {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub kind: EdgeKind,
    #[serde(default)]
    pub site: SourcePos,
}

impl GraphDto {
    pub fn from_graph(cg: &CallGraph, annotations: Option<&AnnotationMap>) -> Self {
        let ids = node_ids(cg);
        let nodes = cg
            .functions()
            .map(|n| NodeDto {
                id: ids[n.id.index()].clone(),
                location: n.location.clone(),
            })
            .collect();

        let edges = cg
            .edges()
            .map(|e| EdgeDto {
                from: ids[e.caller.index()].clone(),
                to: ids[e.callee.index()].clone(),
                kind: e.kind,
                site: e.site.clone(),
            })
            .collect();

        let (roots, root_counts, guards) = match annotations {
            Some(map) => (
                map.roots
                    .iter()
                    .map(|(label, id)| (label.clone(), ids[id.index()].clone()))
                    .collect(),
                map.duplicate_roots()
                    .into_iter()
                    .map(|(label, count)| (label.to_string(), count))
                    .collect(),
                map.guards
                    .iter()
                    .map(|(label, list)| (label.clone(), list.iter().map(|id| ids[id.index()].clone()).collect()))
                    .collect(),
            ),
            None => Default::default(),
        };

        GraphDto {
            nodes,
            edges,
            roots,
            root_counts,
            guards,
        }
    }
}

/// Node names, made unique by appending `#<id>` to repeated names. A suffixed
/// id that collides with an existing name gets the suffix again.
pub fn node_ids(cg: &CallGraph) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for node in cg.functions() {
        *counts.entry(node.name.as_str()).or_default() += 1;
    }
    let mut taken: HashSet<String> = counts.keys().map(|name| name.to_string()).collect();
    cg.functions()
        .map(|n| {
            if counts[n.name.as_str()] == 1 {
                return n.name.clone();
            }
            let suffix = format!("#{}", n.id.index());
            let mut id = format!("{}{}", n.name, suffix);
            while taken.contains(&id) {
                id.push_str(&suffix);
            }
            taken.insert(id.clone());
            id
        })
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportDto {
    pub clean: bool,
    pub labels_checked: usize,
    pub guards_checked: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub idle_labels: Vec<String>,
    pub violations: Vec<ViolationDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ViolationDto {
    pub label: String,
    pub root: String,
    pub guard: String,
    pub origin: String,
    pub end: TraceEnd,
    /// Outermost call site first
    pub steps: Vec<StepDto>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StepDto {
    pub site: SourcePos,
    pub caller: String,
    pub callee: String,
    pub kind: EdgeKind,
}

impl ReportDto {
    pub fn from_report(cg: &CallGraph, report: &VerificationReport) -> Self {
        let name = |id: FunctionId| -> String {
            if cg.contains(id) {
                cg.function(id).name.clone()
            } else {
                id.to_string()
            }
        };
        let violation = |v: &Violation| ViolationDto {
            label: v.label.clone(),
            root: name(v.root),
            guard: name(v.guard),
            origin: name(v.origin()),
            end: v.end,
            steps: v
                .trace
                .iter()
                .rev()
                .map(|e| StepDto {
                    site: e.site.clone(),
                    caller: name(e.caller),
                    callee: name(e.callee),
                    kind: e.kind,
                })
                .collect(),
        };

        ReportDto {
            clean: report.is_clean(),
            labels_checked: report.labels_checked,
            guards_checked: report.guards_checked,
            idle_labels: report.idle_labels.clone(),
            violations: report.violations.iter().map(violation).collect(),
        }
    }
}
