//! Violation DOT Exporter
//!
//! Renders every violating trace as one Graphviz flowchart: callers above
//! callees, guards and roots coloured, spawn sites dashed.

use crate::domain::callgraph::{CallGraph, EdgeKind, FunctionId};
use crate::domain::verifier::{TraceEnd, VerificationReport};
use crate::ports::ViolationExporter;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{Result, Write};

/// Classification of trace nodes for visual styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum TraceNodeType {
    /// Guarded function (red)
    Guard,
    /// Label root named by the violation (green)
    Root,
    /// Uncovered spawner (purple)
    Spawner,
    /// Entry point without callers (yellow)
    Entry,
    /// Intermediate caller (blue)
    Call,
}

pub struct DotExporter;

impl DotExporter {
    /// Convert a report to a DOT string.
    pub fn to_dot(graph: &CallGraph, report: &VerificationReport) -> String {
        // Lowest variant wins when a function plays several roles.
        let mut nodes: BTreeMap<FunctionId, TraceNodeType> = BTreeMap::new();
        let mut mark = |id: FunctionId, kind: TraceNodeType| {
            let slot = nodes.entry(id).or_insert(kind);
            *slot = (*slot).min(kind);
        };
        let mut edges = BTreeSet::new();

        for v in &report.violations {
            mark(v.guard, TraceNodeType::Guard);
            mark(v.root, TraceNodeType::Root);
            let origin_kind = match v.end {
                TraceEnd::EntryPoint => TraceNodeType::Entry,
                TraceEnd::Spawn => TraceNodeType::Spawner,
            };
            mark(v.origin(), origin_kind);
            for e in &v.trace {
                mark(e.caller, TraceNodeType::Call);
                mark(e.callee, TraceNodeType::Call);
                edges.insert((e.caller, e.callee, e.site.to_string(), e.kind == EdgeKind::Spawn, v.label.clone()));
            }
        }

        let mut lines = Vec::new();
        lines.push("digraph Violations {".to_string());
        lines.push("    rankdir=TB;".to_string());
        lines.push("    nodesep=0.8;".to_string());
        lines.push("    node [fontname=\"Helvetica\", fontsize=12];".to_string());
        lines.push("    edge [fontname=\"Helvetica\", fontsize=10];".to_string());
        lines.push("".to_string());

        for (id, kind) in &nodes {
            let (shape, color, style) = Self::node_style(*kind);
            let name = if graph.contains(*id) {
                graph.function(*id).name.as_str()
            } else {
                "<unknown>"
            };
            lines.push(format!(
                "    \"n{}\" [label=\"{}\", shape={}, style=\"{}\", fillcolor=\"{}\", color=\"{}\"];",
                id.index(),
                Self::escape_label(name),
                shape,
                style,
                color,
                Self::border_color(*kind)
            ));
        }

        lines.push("".to_string());

        for (caller, callee, site, spawn, label) in &edges {
            let style = if *spawn { ", style=dashed" } else { "" };
            lines.push(format!(
                "    \"n{}\" -> \"n{}\" [label=\"{}\\n{}\"{}];",
                caller.index(),
                callee.index(),
                Self::escape_label(label),
                Self::escape_label(site),
                style
            ));
        }

        lines.push("}".to_string());
        lines.join("\n")
    }

    fn node_style(kind: TraceNodeType) -> (&'static str, &'static str, &'static str) {
        match kind {
            TraceNodeType::Guard => ("box", "#f38ba8", "filled,bold"),     // Red
            TraceNodeType::Root => ("box", "#a6e3a1", "filled,rounded"),   // Green
            TraceNodeType::Spawner => ("hexagon", "#cba6f7", "filled"),    // Purple
            TraceNodeType::Entry => ("box", "#f9e2af", "filled,rounded"),  // Yellow
            TraceNodeType::Call => ("box", "#89b4fa", "filled"),           // Blue
        }
    }

    fn border_color(kind: TraceNodeType) -> &'static str {
        match kind {
            TraceNodeType::Guard => "#d20f39",
            TraceNodeType::Root => "#40a02b",
            TraceNodeType::Spawner => "#8839ef",
            TraceNodeType::Entry => "#df8e1d",
            TraceNodeType::Call => "#1e66f5",
        }
    }

    fn escape_label(label: &str) -> String {
        label
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
    }
}

impl ViolationExporter for DotExporter {
    fn export(&self, graph: &CallGraph, report: &VerificationReport, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "{}", Self::to_dot(graph, report))
    }
}
