use crate::api::dto::ReportDto;
use crate::domain::callgraph::CallGraph;
use crate::domain::verifier::VerificationReport;
use crate::ports::ViolationExporter;
use std::io::{Result, Write};

/// Pretty printed `ReportDto`, always emitted, even for a clean run.
pub struct JsonExporter;

impl ViolationExporter for JsonExporter {
    fn export(&self, graph: &CallGraph, report: &VerificationReport, out: &mut dyn Write) -> Result<()> {
        let dto = ReportDto::from_report(graph, report);
        serde_json::to_writer_pretty(&mut *out, &dto)?;
        writeln!(out)
    }
}
