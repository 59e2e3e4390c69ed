//! Plain text trace report.
//!
//! One block per violation, outermost step first:
//!
//! ```text
//! trace found with bad root (label `irq`, root kernel::irq::entry)
//!     src/main.rs:1:1: kernel::main
//!     src/main.rs:3:5: kernel::f2
//!     src/f2.rs:7:5: kernel::irq::ack
//! ```
//!
//! A clean report renders nothing.

use crate::domain::callgraph::{CallGraph, EdgeKind, FunctionId};
use crate::domain::verifier::{TraceEnd, VerificationReport, Violation};
use crate::ports::ViolationExporter;
use std::io::{Result, Write};

pub struct TextExporter;

impl TextExporter {
    pub fn write_violation(graph: &CallGraph, violation: &Violation, out: &mut dyn Write) -> Result<()> {
        writeln!(
            out,
            "trace found with bad root (label `{}`, root {})",
            violation.label,
            Self::name(graph, violation.root)
        )?;

        let origin = violation.origin();
        let location = graph
            .function(origin)
            .location
            .as_ref()
            .map_or_else(|| "<unknown>".to_string(), ToString::to_string);
        let note = match violation.end {
            TraceEnd::EntryPoint if violation.trace.is_empty() => " (guard is never called)",
            TraceEnd::EntryPoint => "",
            TraceEnd::Spawn => " (spawner not covered by root)",
        };
        writeln!(out, "\t{}: {}{}", location, Self::name(graph, origin), note)?;

        for edge in violation.trace.iter().rev() {
            let marker = match edge.kind {
                EdgeKind::Spawn => " [spawn]",
                EdgeKind::Ordinary => "",
            };
            writeln!(out, "\t{}: {}{}", edge.site, Self::name(graph, edge.callee), marker)?;
        }
        Ok(())
    }

    fn name(graph: &CallGraph, id: FunctionId) -> &str {
        if graph.contains(id) {
            &graph.function(id).name
        } else {
            "<unknown>"
        }
    }
}

impl ViolationExporter for TextExporter {
    fn export(&self, graph: &CallGraph, report: &VerificationReport, out: &mut dyn Write) -> Result<()> {
        if report.is_clean() {
            return Ok(());
        }
        for violation in &report.violations {
            Self::write_violation(graph, violation, out)?;
        }
        writeln!(
            out,
            "{} violation(s); {} guard(s) checked across {} label(s)",
            report.violation_count(),
            report.guards_checked,
            report.labels_checked
        )
    }
}
