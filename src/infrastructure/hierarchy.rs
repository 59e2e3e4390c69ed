//! Conservative class-hierarchy call graph construction.
//!
//! Every raw call site is resolved by name against the symbol index. When a
//! site has several feasible targets (trait methods, method calls on an unknown
//! receiver type) it becomes one ordinary edge per target.

use crate::domain::callgraph::{CallGraph, FunctionId};
use crate::domain::index::SymbolIndex;
use crate::domain::program::{CallTarget, FunctionDecl, ProgramIndex, RawCall};
use crate::ports::CallGraphProvider;
use anyhow::Result;

pub struct HierarchyCallGraphBuilder;

impl CallGraphProvider for HierarchyCallGraphBuilder {
    fn build_call_graph(&self, program: &ProgramIndex) -> Result<CallGraph> {
        let index = SymbolIndex::build(program.functions());
        let mut graph = program.empty_graph();
        let mut unresolved = 0usize;

        for call in program.calls() {
            let targets = resolve(program, &index, call);
            if targets.is_empty() {
                // std, external crates, closures bound to locals
                unresolved += 1;
                continue;
            }
            for target in targets {
                graph.add_edge(call.caller, target, call.site.clone(), call.kind);
            }
        }

        log::info!(
            "Call graph: {} functions, {} edges ({} call sites outside the analyzed sources)",
            graph.len(),
            graph.edge_count(),
            unresolved
        );
        Ok(graph)
    }
}

fn resolve(program: &ProgramIndex, index: &SymbolIndex, call: &RawCall) -> Vec<FunctionId> {
    let caller = program.function(call.caller);
    match &call.target {
        CallTarget::Method(name) => index.find_methods_by_name(name).to_vec(),
        CallTarget::Path(segments) => {
            let Some((name, qualifier)) = segments.split_last() else {
                return Vec::new();
            };
            let qualifier: Vec<&str> = qualifier
                .iter()
                .map(String::as_str)
                .filter(|s| !matches!(*s, "crate" | "self" | "super"))
                .collect();

            match qualifier.last() {
                None => nearest(program, caller, index.free_functions(name)),
                Some(&"Self") => caller
                    .impl_type
                    .as_deref()
                    .map(|ty| index.methods_of(ty, name).to_vec())
                    .unwrap_or_default(),
                Some(&last) => {
                    if index.is_type(last) {
                        let methods = index.methods_of(last, name);
                        if !methods.is_empty() {
                            return methods.to_vec();
                        }
                    }
                    index
                        .free_functions(name)
                        .iter()
                        .copied()
                        .filter(|&id| in_module(program.function(id), &qualifier))
                        .collect()
                }
            }
        }
    }
}

/// Whether `crate::module::path` of the declaration ends with `qualifier`.
fn in_module(decl: &FunctionDecl, qualifier: &[&str]) -> bool {
    let path: Vec<&str> = std::iter::once(decl.crate_name.as_str())
        .chain(decl.module_path.iter().map(String::as_str))
        .collect();
    path.ends_with(qualifier)
}

/// Bare names: same module first, then same crate, then anywhere.
fn nearest(program: &ProgramIndex, caller: &FunctionDecl, candidates: &[FunctionId]) -> Vec<FunctionId> {
    let same_crate: Vec<FunctionId> = candidates
        .iter()
        .copied()
        .filter(|&id| program.function(id).crate_name == caller.crate_name)
        .collect();
    let same_module: Vec<FunctionId> = same_crate
        .iter()
        .copied()
        .filter(|&id| program.function(id).module_path == caller.module_path)
        .collect();

    if !same_module.is_empty() {
        same_module
    } else if !same_crate.is_empty() {
        same_crate
    } else {
        candidates.to_vec()
    }
}
