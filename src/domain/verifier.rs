//! Reachability Verifier
//!
//! For a label's root `R` and a guarded function `G`, walks the caller relation
//! backwards from `G` depth-first and records every caller chain that runs out
//! of callers, or crosses an uncovered spawn site, without passing through `R`.
//!
//! Revisits are tracked per active path only. A function popped off the stack
//! can be entered again through another caller; only re-entering a function that
//! is still open on the current path (recursion) stops the descent.

use crate::domain::annotation::AnnotationMap;
use crate::domain::callgraph::{CallEdge, CallGraphQuery, EdgeKind, FunctionId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;

/// How a spawn edge on the backward path is judged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpawnPolicy {
    /// The spawn must be issued by the root, or by a function the root covers.
    #[default]
    RequireRoot,
    /// A spawn edge ends the path and counts as covered.
    Terminate,
}

impl FromStr for SpawnPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "require-root" => Ok(SpawnPolicy::RequireRoot),
            "terminate" => Ok(SpawnPolicy::Terminate),
            other => Err(format!("unknown spawn policy `{}` (expected require-root or terminate)", other)),
        }
    }
}

/// Where a violating trace stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TraceEnd {
    /// The outermost function has no callers at all.
    EntryPoint,
    /// The outermost edge is a spawn site the root does not cover.
    Spawn,
}

/// One caller chain reaching a guard without passing through its root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub label: String,
    pub root: FunctionId,
    pub guard: FunctionId,
    /// Call sites, innermost (the edge into the guard) first
    pub trace: Vec<CallEdge>,
    pub end: TraceEnd,
}

impl Violation {
    /// The outermost function of the trace: the entry point, or the spawner.
    pub fn origin(&self) -> FunctionId {
        self.trace.last().map_or(self.guard, |edge| edge.caller)
    }
}

/// Outcome of verifying every (label, guard) pair of one run.
#[derive(Debug, Default, Clone)]
pub struct VerificationReport {
    pub violations: Vec<Violation>,
    pub labels_checked: usize,
    pub guards_checked: usize,
    /// Labels with guards but no root, or a root but no guards
    pub idle_labels: Vec<String>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violation_count(&self) -> usize {
        self.violations.len()
    }

    pub fn violations_for<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Violation> + 'a {
        self.violations.iter().filter(move |v| v.label == label)
    }
}

pub struct Verifier<'g, G: ?Sized> {
    graph: &'g G,
    policy: SpawnPolicy,
}

impl<'g, G> Verifier<'g, G>
where
    G: CallGraphQuery + Sync + ?Sized,
{
    pub fn new(graph: &'g G, policy: SpawnPolicy) -> Self {
        Self { graph, policy }
    }

    /// All violating traces for `guard` under `root`. Empty means covered.
    pub fn verify_guard(&self, label: &str, root: FunctionId, guard: FunctionId) -> Vec<Violation> {
        let mut search = Search::new(self.graph, root, self.policy, false);
        search.walk(guard);
        log::debug!(
            "label `{}`: {} -> {} trace(s)",
            label,
            self.graph.function_name(guard),
            search.found.len()
        );
        search
            .found
            .into_iter()
            .map(|(trace, end)| Violation {
                label: label.to_string(),
                root,
                guard,
                trace,
                end,
            })
            .collect()
    }

    /// Check every label that has a root and at least one guard.
    /// Tasks are independent, so `parallel` only changes scheduling, never results.
    pub fn verify_all(&self, annotations: &AnnotationMap, parallel: bool) -> VerificationReport {
        let tasks = annotations.guard_tasks();
        let run = |&(label, root, guard): &(&str, FunctionId, FunctionId)| self.verify_guard(label, root, guard);

        let per_task: Vec<Vec<Violation>> = if parallel {
            tasks.par_iter().map(run).collect()
        } else {
            tasks.iter().map(run).collect()
        };

        let labels_checked = {
            let mut labels: Vec<&str> = tasks.iter().map(|(label, _, _)| *label).collect();
            labels.dedup();
            labels.len()
        };

        VerificationReport {
            violations: per_task.into_iter().flatten().collect(),
            labels_checked,
            guards_checked: tasks.len(),
            idle_labels: annotations.idle_labels(),
        }
    }

    /// True when every caller chain above `function` passes through `root`.
    pub fn is_covered(&self, root: FunctionId, function: FunctionId) -> bool {
        let mut search = Search::new(self.graph, root, self.policy, true);
        search.walk(function);
        search.found.is_empty()
    }
}

/// One backward depth-first search toward a fixed root.
///
/// The descent keeps its own frame stack, so caller chains of any length are
/// walked without growing the thread stack.
struct Search<'a, G: ?Sized> {
    graph: &'a G,
    root: FunctionId,
    policy: SpawnPolicy,
    /// Stop after the first finding (coverage queries only need a yes/no)
    first_only: bool,
    stack: Vec<&'a CallEdge>,
    on_path: HashSet<FunctionId>,
    /// Spawner coverage answers, reused for every spawn edge of the search
    spawners: HashMap<FunctionId, bool>,
    found: Vec<(Vec<CallEdge>, TraceEnd)>,
}

impl<'a, G> Search<'a, G>
where
    G: CallGraphQuery + ?Sized,
{
    fn new(graph: &'a G, root: FunctionId, policy: SpawnPolicy, first_only: bool) -> Self {
        Self {
            graph,
            root,
            policy,
            first_only,
            stack: Vec::new(),
            on_path: HashSet::new(),
            spawners: HashMap::new(),
            found: Vec::new(),
        }
    }

    fn done(&self) -> bool {
        self.first_only && !self.found.is_empty()
    }

    fn walk(&mut self, start: FunctionId) {
        if start == self.root {
            return;
        }
        let graph = self.graph;
        // (function, index of the next incoming edge to follow)
        let mut frames: Vec<(FunctionId, usize)> = Vec::new();
        self.enter(start, &mut frames);

        while let Some(frame) = frames.last_mut() {
            let (node, cursor) = *frame;
            let edges = graph.incoming_edges(node);
            if self.done() || cursor >= edges.len() {
                frames.pop();
                self.on_path.remove(&node);
                if !frames.is_empty() {
                    self.stack.pop(); // pop
                }
                continue;
            }
            frame.1 += 1;

            let edge = &edges[cursor];
            match edge.kind {
                EdgeKind::Ordinary => {
                    if edge.caller == self.root {
                        continue;
                    }
                    if self.on_path.contains(&edge.caller) {
                        // cycle closes on the active path
                        log::trace!("cycle closes at {}", graph.function_name(edge.caller));
                        continue;
                    }
                    self.stack.push(edge); // push
                    self.enter(edge.caller, &mut frames);
                }
                EdgeKind::Spawn => {
                    if !self.spawn_covered(edge) {
                        self.report(Some(edge), TraceEnd::Spawn);
                    }
                }
            }
        }
    }

    /// Open `node` on the current path. A function without callers ends the chain here.
    fn enter(&mut self, node: FunctionId, frames: &mut Vec<(FunctionId, usize)>) {
        self.on_path.insert(node);
        if self.graph.incoming_edges(node).is_empty() {
            self.report(None, TraceEnd::EntryPoint);
        }
        frames.push((node, 0));
    }

    fn spawn_covered(&mut self, edge: &CallEdge) -> bool {
        match self.policy {
            SpawnPolicy::Terminate => true,
            // a root further up the path is judged by the spawner's own coverage
            SpawnPolicy::RequireRoot => edge.caller == self.root || self.spawner_covered(edge.caller),
        }
    }

    /// Whether the root covers every chain above `spawner`.
    ///
    /// A spawner is uncovered when a function without callers can be reached from
    /// it over incoming edges of either kind without crossing the root. Chains
    /// that only close into cycles count as covered.
    fn spawner_covered(&mut self, spawner: FunctionId) -> bool {
        if let Some(&covered) = self.spawners.get(&spawner) {
            return covered;
        }

        let graph = self.graph;
        let mut seen: HashSet<FunctionId> = HashSet::new();
        let mut pending = vec![spawner];
        seen.insert(spawner);
        let mut covered = true;

        while let Some(node) = pending.pop() {
            match self.spawners.get(&node) {
                Some(false) => {
                    covered = false;
                    break;
                }
                // every chain above an already covered function reaches the root
                Some(true) => continue,
                None => {}
            }
            let edges = graph.incoming_edges(node);
            if edges.is_empty() {
                covered = false;
                break;
            }
            for edge in edges {
                if edge.caller != self.root && seen.insert(edge.caller) {
                    pending.push(edge.caller);
                }
            }
        }

        if covered {
            // nothing above any visited function escapes the root either
            for node in seen {
                self.spawners.insert(node, true);
            }
        } else {
            self.spawners.insert(spawner, false);
        }
        log::trace!(
            "spawner {} {}",
            graph.function_name(spawner),
            if covered { "covered" } else { "not covered" }
        );
        covered
    }

    fn report(&mut self, spawn: Option<&CallEdge>, end: TraceEnd) {
        let mut trace: Vec<CallEdge> = self.stack.iter().map(|e| (*e).clone()).collect();
        trace.extend(spawn.cloned());
        self.found.push((trace, end));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::callgraph::CallGraph;
    use crate::domain::span::SourcePos;

    fn site(line: usize) -> SourcePos {
        SourcePos::new("k.rs", line, 0)
    }

    #[test]
    fn test_guard_that_is_the_root_is_covered() {
        let mut cg = CallGraph::new();
        let r = cg.add_function("r", None);
        let verifier = Verifier::new(&cg, SpawnPolicy::default());
        assert!(verifier.verify_guard("l", r, r).is_empty());
    }

    #[test]
    fn test_uncalled_guard_reports_empty_trace() {
        let mut cg = CallGraph::new();
        let r = cg.add_function("r", None);
        let g = cg.add_function("g", None);
        let verifier = Verifier::new(&cg, SpawnPolicy::default());

        let violations = verifier.verify_guard("l", r, g);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].trace.is_empty());
        assert_eq!(violations[0].origin(), g);
        assert_eq!(violations[0].end, TraceEnd::EntryPoint);
    }

    #[test]
    fn test_self_recursion_terminates() {
        let mut cg = CallGraph::new();
        let main = cg.add_function("main", None);
        let r = cg.add_function("r", None);
        let g = cg.add_function("g", None);
        cg.add_edge(main, r, site(1), EdgeKind::Ordinary);
        cg.add_edge(r, g, site(2), EdgeKind::Ordinary);
        cg.add_edge(g, g, site(3), EdgeKind::Ordinary);

        let verifier = Verifier::new(&cg, SpawnPolicy::default());
        assert!(verifier.verify_guard("l", r, g).is_empty());
    }

    #[test]
    fn test_parallel_edges_give_separate_traces() {
        let mut cg = CallGraph::new();
        let r = cg.add_function("r", None);
        let main = cg.add_function("main", None);
        let g = cg.add_function("g", None);
        cg.add_edge(main, g, site(1), EdgeKind::Ordinary);
        cg.add_edge(main, g, site(2), EdgeKind::Ordinary);

        let verifier = Verifier::new(&cg, SpawnPolicy::default());
        let violations = verifier.verify_guard("l", r, g);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].trace[0].site, site(1));
        assert_eq!(violations[1].trace[0].site, site(2));
    }

    #[test]
    fn test_spawn_cycle_without_entry_is_covered() {
        // x and y only spawn each other; nothing else reaches them
        let mut cg = CallGraph::new();
        let r = cg.add_function("r", None);
        let x = cg.add_function("x", None);
        let y = cg.add_function("y", None);
        let g = cg.add_function("g", None);
        cg.add_edge(x, y, site(1), EdgeKind::Spawn);
        cg.add_edge(y, x, site(2), EdgeKind::Spawn);
        cg.add_edge(y, g, site(3), EdgeKind::Ordinary);

        let verifier = Verifier::new(&cg, SpawnPolicy::RequireRoot);
        assert!(verifier.verify_guard("l", r, g).is_empty());
    }

    #[test]
    fn test_spawn_cycle_with_uncovered_entry() {
        let mut cg = CallGraph::new();
        let r = cg.add_function("r", None);
        let main = cg.add_function("main", None);
        let x = cg.add_function("x", None);
        let y = cg.add_function("y", None);
        let g = cg.add_function("g", None);
        cg.add_edge(main, x, site(1), EdgeKind::Ordinary);
        cg.add_edge(x, y, site(2), EdgeKind::Spawn);
        cg.add_edge(y, x, site(3), EdgeKind::Spawn);
        cg.add_edge(y, g, site(4), EdgeKind::Ordinary);

        let verifier = Verifier::new(&cg, SpawnPolicy::RequireRoot);
        let violations = verifier.verify_guard("l", r, g);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].end, TraceEnd::Spawn);
        assert_eq!(violations[0].origin(), x);
        assert!(!verifier.is_covered(r, x));
        assert!(!verifier.is_covered(r, y));
    }

    #[test]
    fn test_spawners_in_a_spawn_cycle_share_an_uncovered_entry() {
        // x and y spawn each other; y is also called from main, so neither is covered
        let mut cg = CallGraph::new();
        let r = cg.add_function("r", None);
        let main = cg.add_function("main", None);
        let x = cg.add_function("x", None);
        let y = cg.add_function("y", None);
        let h = cg.add_function("h", None);
        cg.add_edge(x, y, site(1), EdgeKind::Spawn);
        cg.add_edge(main, y, site(2), EdgeKind::Ordinary);
        cg.add_edge(y, x, site(3), EdgeKind::Spawn);
        cg.add_edge(y, h, site(4), EdgeKind::Spawn);
        cg.add_edge(x, h, site(5), EdgeKind::Spawn);

        let verifier = Verifier::new(&cg, SpawnPolicy::RequireRoot);
        let violations = verifier.verify_guard("l", r, h);
        let origins: Vec<FunctionId> = violations.iter().map(|v| v.origin()).collect();
        assert_eq!(origins, vec![y, x]);
        assert!(violations.iter().all(|v| v.end == TraceEnd::Spawn));
    }

    /// f{n} -> ... -> f1 -> f0, root unrelated
    fn chain(n: usize, kind: EdgeKind) -> (CallGraph, FunctionId, FunctionId) {
        let mut cg = CallGraph::new();
        let r = cg.add_function("r", None);
        let ids: Vec<FunctionId> = (0..=n).map(|i| cg.add_function(format!("f{}", i), None)).collect();
        for i in 0..n {
            cg.add_edge(ids[i + 1], ids[i], site(i + 1), kind);
        }
        (cg, r, ids[0])
    }

    #[test]
    fn test_very_long_caller_chain() {
        let (cg, r, g) = chain(200_000, EdgeKind::Ordinary);
        let verifier = Verifier::new(&cg, SpawnPolicy::default());

        let violations = verifier.verify_guard("l", r, g);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].trace.len(), 200_000);
        assert_eq!(violations[0].end, TraceEnd::EntryPoint);
        assert_eq!(cg.function(violations[0].origin()).name, "f200000");
    }

    #[test]
    fn test_very_long_spawn_chain() {
        let (cg, r, g) = chain(200_000, EdgeKind::Spawn);
        let verifier = Verifier::new(&cg, SpawnPolicy::RequireRoot);

        let violations = verifier.verify_guard("l", r, g);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].trace.len(), 1);
        assert_eq!(violations[0].end, TraceEnd::Spawn);
        assert!(!verifier.is_covered(r, g));
    }

    #[test]
    fn test_long_chain_through_root_is_covered() {
        let (mut cg, r, g) = chain(100_000, EdgeKind::Ordinary);
        let top = cg.find_by_name("f100000")[0];
        cg.add_edge(r, top, site(0), EdgeKind::Ordinary);
        let main = cg.add_function("main", None);
        cg.add_edge(main, r, site(0), EdgeKind::Ordinary);

        let verifier = Verifier::new(&cg, SpawnPolicy::default());
        assert!(verifier.verify_guard("l", r, g).is_empty());
        assert!(verifier.is_covered(r, g));
    }

    #[test]
    fn test_spawner_coverage_is_reused_within_a_search() {
        // s spawns g twice; s sits under the root, so both sites are covered
        let mut cg = CallGraph::new();
        let main = cg.add_function("main", None);
        let r = cg.add_function("r", None);
        let s = cg.add_function("s", None);
        let g = cg.add_function("g", None);
        cg.add_edge(main, r, site(1), EdgeKind::Ordinary);
        cg.add_edge(r, s, site(2), EdgeKind::Ordinary);
        cg.add_edge(s, s, site(3), EdgeKind::Ordinary);
        cg.add_edge(s, g, site(4), EdgeKind::Spawn);
        cg.add_edge(s, g, site(5), EdgeKind::Spawn);

        let verifier = Verifier::new(&cg, SpawnPolicy::RequireRoot);
        assert!(verifier.verify_guard("l", r, g).is_empty());
    }

    #[test]
    fn test_spawn_policy_from_str() {
        assert_eq!("require-root".parse::<SpawnPolicy>(), Ok(SpawnPolicy::RequireRoot));
        assert_eq!("Terminate".parse::<SpawnPolicy>(), Ok(SpawnPolicy::Terminate));
        assert!("ignore".parse::<SpawnPolicy>().is_err());
    }
}
