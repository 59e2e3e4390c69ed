//! Use case wiring: sources in, report out.

use crate::common::config::{CheckConfig, DuplicateRootPolicy};
use crate::common::error::StackcheckError;
use crate::domain::annotation::{AnnotationExtractor, AnnotationMap};
use crate::domain::callgraph::CallGraph;
use crate::domain::verifier::{VerificationReport, Verifier};
use crate::infrastructure::graph_file::GraphFile;
use crate::infrastructure::syn_loader::{LoadOptions, SynProgramLoader};
use crate::ports::{CallGraphProvider, ViolationExporter};
use anyhow::{Context, Result};
use std::io::Write;

/// Everything one run produced, for callers that want more than the rendering.
#[derive(Debug)]
pub struct CheckOutcome {
    pub graph: CallGraph,
    pub annotations: AnnotationMap,
    pub report: VerificationReport,
}

pub struct CheckUsecase<'a> {
    pub provider: &'a dyn CallGraphProvider,
    pub exporter: &'a dyn ViolationExporter,
    pub config: &'a CheckConfig,
}

impl<'a> CheckUsecase<'a> {
    /// Analyze `(crate_name, file_path, content)` sources; annotations are read
    /// from the `target` unit only, the graph spans every source.
    pub fn analyze(&self, sources: &[(String, String, String)], target: Option<&str>) -> Result<CheckOutcome> {
        let target = target.ok_or(StackcheckError::MissingTarget)?.replace('-', "_");

        let program = SynProgramLoader::load(sources, &LoadOptions::from(self.config));
        if !program.has_crate(&target) {
            return Err(StackcheckError::TargetNotFound(target).into());
        }

        let extractor = AnnotationExtractor::new(self.config.marker.clone());
        let annotations = program.annotations(&target, &extractor);
        let graph = self
            .provider
            .build_call_graph(&program)
            .context("Failed to build call graph")?;

        self.verify(graph, annotations)
    }

    /// Verify a graph and annotation map built elsewhere.
    pub fn verify(&self, graph: CallGraph, annotations: AnnotationMap) -> Result<CheckOutcome> {
        for (label, count) in annotations.duplicate_roots() {
            match self.config.duplicate_roots {
                DuplicateRootPolicy::Error => {
                    return Err(StackcheckError::DuplicateRoot {
                        label: label.to_string(),
                        count,
                    }
                    .into());
                }
                DuplicateRootPolicy::LastWins => {
                    log::warn!("label `{}` declares {} roots; using the last one", label, count);
                }
            }
        }
        for label in annotations.idle_labels() {
            log::warn!("label `{}` has a root or guards but not both; nothing to check", label);
        }

        let verifier = Verifier::new(&graph, self.config.spawn_policy);
        let report = verifier.verify_all(&annotations, self.config.parallel);
        log::info!(
            "Checked {} guard(s) across {} label(s): {} violation(s)",
            report.guards_checked,
            report.labels_checked,
            report.violation_count()
        );

        Ok(CheckOutcome {
            graph,
            annotations,
            report,
        })
    }

    pub fn export(&self, outcome: &CheckOutcome, out: &mut dyn Write) -> Result<()> {
        self.exporter
            .export(&outcome.graph, &outcome.report, out)
            .context("Failed to write report")
    }

    /// Analyze, verify and render in one go.
    pub fn run(&self, sources: &[(String, String, String)], target: Option<&str>, out: &mut dyn Write) -> Result<CheckOutcome> {
        let outcome = self.analyze(sources, target)?;
        self.export(&outcome, out)?;
        Ok(outcome)
    }

    /// Verify and render a graph file.
    pub fn run_prebuilt(&self, file: GraphFile, out: &mut dyn Write) -> Result<CheckOutcome> {
        let outcome = self.verify(file.graph, file.annotations)?;
        self.export(&outcome, out)?;
        Ok(outcome)
    }
}
