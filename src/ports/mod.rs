use crate::domain::callgraph::CallGraph;
use crate::domain::program::ProgramIndex;
use crate::domain::verifier::VerificationReport;
use std::io::Write;

pub mod flowchart_exporter;
pub mod json_exporter;
pub mod text_exporter;

pub use flowchart_exporter::DotExporter;
pub use json_exporter::JsonExporter;
pub use text_exporter::TextExporter;

/// Builds the call graph of an analyzed program. Node ids must match the
/// program's function ids (see `ProgramIndex::empty_graph`).
pub trait CallGraphProvider {
    fn build_call_graph(&self, program: &ProgramIndex) -> anyhow::Result<CallGraph>;
}

/// Renders a verification report.
pub trait ViolationExporter {
    fn export(&self, graph: &CallGraph, report: &VerificationReport, out: &mut dyn Write) -> std::io::Result<()>;
}
