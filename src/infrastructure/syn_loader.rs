//! Rust source front end.
//!
//! Parses every source file with `syn`, records function declarations and raw
//! call sites, and keeps the file's comments for annotation extraction. Call
//! targets stay unresolved here; see `HierarchyCallGraphBuilder`.

use crate::common::config::CheckConfig;
use crate::domain::annotation::Comment;
use crate::domain::callgraph::{EdgeKind, FunctionId};
use crate::domain::program::{CallTarget, FunctionDecl, ProgramIndex, RawCall};
use crate::domain::span::{SourcePos, SourceRange};
use crate::infrastructure::comments::scan_comments;
use proc_macro2::Span;
use rayon::prelude::*;
use std::path::{Component, Path};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;
use syn::visit::{self, Visit};
use syn::{Attribute, Expr, ExprCall, ExprMethodCall, ImplItemFn, ItemFn, ItemImpl, ItemMod, ItemTrait, Macro, Token, TraitItemFn, Type};

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Last path segment or method name of calls that start a new activity
    pub spawn_functions: Vec<String>,
    pub include_tests: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from(&CheckConfig::default())
    }
}

impl From<&CheckConfig> for LoadOptions {
    fn from(config: &CheckConfig) -> Self {
        Self {
            spawn_functions: config.spawn_functions.clone(),
            include_tests: config.include_tests,
        }
    }
}

pub struct SynProgramLoader;

impl SynProgramLoader {
    /// Parse `(crate_name, file_path, content)` triples into a program index.
    /// Files are parsed in parallel; ids are assigned in input order.
    pub fn load(sources: &[(String, String, String)], options: &LoadOptions) -> ProgramIndex {
        // Span positions only resolve on the thread that parsed the file,
        // so each worker hands back plain data.
        let parsed: Vec<ParsedFile> = sources
            .par_iter()
            .map(|(crate_name, path, content)| parse_source(crate_name, path, content, options))
            .collect();

        let mut program = ProgramIndex::new();
        for file in parsed {
            program.begin_file(&file.crate_name, &file.path, file.comments);
            let base = program.functions().len();
            for decl in file.decls {
                program.add_function(decl);
            }
            for call in file.calls {
                program.add_call(RawCall {
                    caller: FunctionId::from_index(base + call.caller),
                    target: call.target,
                    site: call.site,
                    kind: call.kind,
                });
            }
        }
        log::info!(
            "Loaded {} files: {} functions, {} call sites",
            program.files().len(),
            program.functions().len(),
            program.calls().len()
        );
        program
    }
}

struct ParsedFile {
    crate_name: String,
    path: String,
    comments: Vec<Comment>,
    decls: Vec<FunctionDecl>,
    calls: Vec<LocalCall>,
}

/// A call whose caller is an index into the file's own declarations.
struct LocalCall {
    caller: usize,
    target: CallTarget,
    site: SourcePos,
    kind: EdgeKind,
}

fn parse_source(crate_name: &str, path: &str, content: &str, options: &LoadOptions) -> ParsedFile {
    let mut visitor = FileVisitor::new(crate_name, path, options);
    match syn::parse_file(content) {
        Ok(ast) => visitor.visit_file(&ast),
        Err(e) => log::warn!("Failed to parse {}: {}", path, e),
    }
    ParsedFile {
        crate_name: crate_name.to_string(),
        path: path.to_string(),
        comments: scan_comments(content),
        decls: visitor.decls,
        calls: visitor.calls,
    }
}

/// Module segments implied by the file's location below `src/`.
pub fn module_path_for_file(path: &str) -> Vec<String> {
    let parts: Vec<String> = Path::new(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str().map(str::to_string),
            _ => None,
        })
        .collect();
    let start = parts
        .iter()
        .rposition(|p| p == "src")
        .map(|i| i + 1)
        .unwrap_or_else(|| parts.len().saturating_sub(1));

    let mut segments = parts[start..].to_vec();
    if let Some(file) = segments.pop() {
        let stem = file.strip_suffix(".rs").unwrap_or(&file);
        if !matches!(stem, "lib" | "main" | "mod") {
            segments.push(stem.to_string());
        }
    }
    segments
}

fn is_test_item(attrs: &[Attribute]) -> bool {
    attrs.iter().any(|a| {
        let path = a.path();
        if path.segments.last().is_some_and(|s| s.ident == "test") {
            // #[test], #[tokio::test]
            return true;
        }
        path.is_ident("cfg")
            && a.meta
                .require_list()
                .is_ok_and(|list| list.tokens.to_string() == "test")
    })
}

fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(p) => p.path.segments.last().map(|s| s.ident.to_string()),
        Type::Reference(r) => type_name(&r.elem),
        Type::Paren(p) => type_name(&p.elem),
        Type::Group(g) => type_name(&g.elem),
        _ => None,
    }
}

fn path_segments(path: &syn::Path) -> Vec<String> {
    path.segments.iter().map(|s| s.ident.to_string()).collect()
}

fn fn_range(item: Span, body_close: Span) -> SourceRange {
    let start = item.start();
    let end = body_close.end();
    SourceRange::new((start.line, start.column), (end.line, end.column))
}

struct FileVisitor<'a> {
    crate_name: &'a str,
    path: &'a str,
    options: &'a LoadOptions,
    modules: Vec<String>,
    /// Self type of the enclosing impl or trait block
    owner: Option<String>,
    trait_name: Option<String>,
    /// Qualifying names of enclosing functions, for nested fns
    fn_names: Vec<String>,
    fn_stack: Vec<usize>,
    /// Depth of spawned closures / async blocks within the current function
    spawn_depth: usize,
    decls: Vec<FunctionDecl>,
    calls: Vec<LocalCall>,
}

impl<'a> FileVisitor<'a> {
    fn new(crate_name: &'a str, path: &'a str, options: &'a LoadOptions) -> Self {
        Self {
            crate_name,
            path,
            options,
            modules: module_path_for_file(path),
            owner: None,
            trait_name: None,
            fn_names: Vec::new(),
            fn_stack: Vec::new(),
            spawn_depth: 0,
            decls: Vec::new(),
            calls: Vec::new(),
        }
    }

    fn skip(&self, attrs: &[Attribute]) -> bool {
        !self.options.include_tests && is_test_item(attrs)
    }

    fn is_spawn_name(&self, name: &str) -> bool {
        self.options.spawn_functions.iter().any(|s| s == name)
    }

    fn declare(&mut self, ident: &syn::Ident, range: SourceRange) -> usize {
        let name = ident.to_string();
        let mut segments = vec![self.crate_name.to_string()];
        segments.extend(self.modules.iter().cloned());
        segments.extend(self.fn_names.iter().cloned());
        if let Some(owner) = &self.owner {
            segments.push(owner.clone());
        }
        segments.push(name.clone());

        self.decls.push(FunctionDecl {
            crate_name: self.crate_name.to_string(),
            qualified_name: segments.join("::"),
            name,
            impl_type: self.owner.clone(),
            trait_name: self.trait_name.clone(),
            module_path: self.modules.clone(),
            file: self.path.to_string(),
            range,
        });
        self.decls.len() - 1
    }

    /// Visit a function body with `idx` as the caller of every call inside.
    fn in_function<F: FnOnce(&mut Self)>(&mut self, idx: usize, body: F) {
        let qualifier = match &self.owner {
            Some(owner) => format!("{}::{}", owner, self.decls[idx].name),
            None => self.decls[idx].name.clone(),
        };
        let saved_owner = self.owner.take();
        let saved_trait = self.trait_name.take();
        let saved_depth = std::mem::replace(&mut self.spawn_depth, 0);
        self.fn_names.push(qualifier);
        self.fn_stack.push(idx);

        body(self);

        self.fn_stack.pop();
        self.fn_names.pop();
        self.spawn_depth = saved_depth;
        self.trait_name = saved_trait;
        self.owner = saved_owner;
    }

    fn record(&mut self, target: CallTarget, span: Span) {
        let Some(&caller) = self.fn_stack.last() else {
            return;
        };
        let start = span.start();
        let kind = if self.spawn_depth > 0 {
            EdgeKind::Spawn
        } else {
            EdgeKind::Ordinary
        };
        self.calls.push(LocalCall {
            caller,
            target,
            site: SourcePos::new(self.path, start.line, start.column),
            kind,
        });
    }

    /// Argument of a spawn call: whatever it runs belongs to a new activity.
    fn visit_spawned(&mut self, arg: &Expr) {
        match arg {
            Expr::Closure(closure) => {
                self.spawn_depth += 1;
                self.visit_expr(&closure.body);
                self.spawn_depth -= 1;
            }
            Expr::Async(block) => {
                self.spawn_depth += 1;
                self.visit_block(&block.block);
                self.spawn_depth -= 1;
            }
            Expr::Path(p) => {
                self.spawn_depth += 1;
                self.record(CallTarget::Path(path_segments(&p.path)), p.span());
                self.spawn_depth -= 1;
            }
            // `spawn(worker(rx))`: the future runs elsewhere, its arguments
            // are evaluated here.
            Expr::Call(call) => match &*call.func {
                Expr::Path(p) => {
                    self.spawn_depth += 1;
                    self.record(CallTarget::Path(path_segments(&p.path)), call.func.span());
                    self.spawn_depth -= 1;
                    for a in &call.args {
                        self.visit_expr(a);
                    }
                }
                _ => self.visit_expr(arg),
            },
            Expr::MethodCall(m) => {
                self.spawn_depth += 1;
                self.record(CallTarget::Method(m.method.to_string()), m.method.span());
                self.spawn_depth -= 1;
                self.visit_expr(&m.receiver);
                for a in &m.args {
                    self.visit_expr(a);
                }
            }
            _ => self.visit_expr(arg),
        }
    }
}

impl<'ast> Visit<'ast> for FileVisitor<'_> {
    fn visit_item_fn(&mut self, node: &'ast ItemFn) {
        if self.skip(&node.attrs) {
            return;
        }
        let range = fn_range(node.span(), node.block.brace_token.span.close());
        let idx = self.declare(&node.sig.ident, range);
        self.in_function(idx, |v| visit::visit_item_fn(v, node));
    }

    fn visit_item_impl(&mut self, node: &'ast ItemImpl) {
        if self.skip(&node.attrs) {
            return;
        }
        let owner = type_name(&node.self_ty);
        let trait_name = node
            .trait_
            .as_ref()
            .and_then(|(_, path, _)| path.segments.last())
            .map(|s| s.ident.to_string());
        let saved_owner = std::mem::replace(&mut self.owner, owner);
        let saved_trait = std::mem::replace(&mut self.trait_name, trait_name);
        visit::visit_item_impl(self, node);
        self.trait_name = saved_trait;
        self.owner = saved_owner;
    }

    fn visit_impl_item_fn(&mut self, node: &'ast ImplItemFn) {
        if self.skip(&node.attrs) {
            return;
        }
        let range = fn_range(node.span(), node.block.brace_token.span.close());
        let idx = self.declare(&node.sig.ident, range);
        self.in_function(idx, |v| visit::visit_impl_item_fn(v, node));
    }

    fn visit_item_trait(&mut self, node: &'ast ItemTrait) {
        if self.skip(&node.attrs) {
            return;
        }
        let saved_owner = self.owner.replace(node.ident.to_string());
        let saved_trait = self.trait_name.take();
        visit::visit_item_trait(self, node);
        self.trait_name = saved_trait;
        self.owner = saved_owner;
    }

    fn visit_trait_item_fn(&mut self, node: &'ast TraitItemFn) {
        // Required methods have no body and are not functions of the graph.
        let Some(block) = &node.default else {
            return;
        };
        if self.skip(&node.attrs) {
            return;
        }
        let range = fn_range(node.span(), block.brace_token.span.close());
        let idx = self.declare(&node.sig.ident, range);
        self.in_function(idx, |v| visit::visit_trait_item_fn(v, node));
    }

    fn visit_item_mod(&mut self, node: &'ast ItemMod) {
        if self.skip(&node.attrs) || node.content.is_none() {
            return;
        }
        self.modules.push(node.ident.to_string());
        visit::visit_item_mod(self, node);
        self.modules.pop();
    }

    fn visit_expr_call(&mut self, node: &'ast ExprCall) {
        if let Expr::Path(p) = &*node.func {
            let segments = path_segments(&p.path);
            if segments.last().is_some_and(|last| self.is_spawn_name(last)) {
                for arg in &node.args {
                    self.visit_spawned(arg);
                }
                return;
            }
            self.record(CallTarget::Path(segments), node.func.span());
        }
        visit::visit_expr_call(self, node);
    }

    fn visit_expr_method_call(&mut self, node: &'ast ExprMethodCall) {
        let name = node.method.to_string();
        if self.is_spawn_name(&name) {
            self.visit_expr(&node.receiver);
            for arg in &node.args {
                self.visit_spawned(arg);
            }
            return;
        }
        self.record(CallTarget::Method(name), node.method.span());
        visit::visit_expr_method_call(self, node);
    }

    // Macro bodies are opaque token streams; calls inside comma separated
    // expression arguments (`println!`, `vec!`, `assert!`) still count.
    fn visit_macro(&mut self, node: &'ast Macro) {
        if self.fn_stack.is_empty() {
            return;
        }
        if let Ok(args) = node.parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated) {
            for expr in &args {
                self.visit_expr(expr);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(files: &[(&str, &str)]) -> ProgramIndex {
        load_with(files, &LoadOptions::default())
    }

    fn load_with(files: &[(&str, &str)], options: &LoadOptions) -> ProgramIndex {
        let sources: Vec<(String, String, String)> = files
            .iter()
            .map(|(path, code)| ("k".to_string(), path.to_string(), code.to_string()))
            .collect();
        SynProgramLoader::load(&sources, options)
    }

    fn names(program: &ProgramIndex) -> Vec<&str> {
        program.functions().iter().map(|f| f.qualified_name.as_str()).collect()
    }

    fn calls_from<'p>(program: &'p ProgramIndex, caller: &str) -> Vec<(&'p CallTarget, EdgeKind)> {
        program
            .calls()
            .iter()
            .filter(|c| program.function(c.caller).qualified_name == caller)
            .map(|c| (&c.target, c.kind))
            .collect()
    }

    #[test]
    fn test_module_path_for_file() {
        assert!(module_path_for_file("src/lib.rs").is_empty());
        assert!(module_path_for_file("/w/kernel/src/main.rs").is_empty());
        assert_eq!(module_path_for_file("/w/kernel/src/irq/mod.rs"), vec!["irq"]);
        assert_eq!(module_path_for_file("src/irq/timer.rs"), vec!["irq", "timer"]);
        assert_eq!(module_path_for_file("timer.rs"), vec!["timer"]);
    }

    #[test]
    fn test_declarations_and_qualified_names() {
        let code = r#"
fn top() {}
mod inner {
    pub fn helper() {}
}
struct Timer;
impl Timer {
    fn tick(&self) {}
}
trait Device {
    fn probe(&self);
    fn reset(&self) { self.probe() }
}
impl Device for Timer {
    fn probe(&self) {}
}
fn outer() {
    fn nested() {}
}
"#;
        let program = load(&[("src/irq.rs", code)]);
        assert_eq!(
            names(&program),
            vec![
                "k::irq::top",
                "k::irq::inner::helper",
                "k::irq::Timer::tick",
                "k::irq::Device::reset",
                "k::irq::Timer::probe",
                "k::irq::outer",
                "k::irq::outer::nested",
            ]
        );
        let probe = &program.functions()[4];
        assert_eq!(probe.impl_type.as_deref(), Some("Timer"));
        assert_eq!(probe.trait_name.as_deref(), Some("Device"));
        assert_eq!(program.functions()[1].module_path, vec!["irq", "inner"]);
    }

    #[test]
    fn test_range_includes_doc_comment() {
        let code = "/// stackcheck: root irq\nfn entry() {\n    work();\n}\n";
        let program = load(&[("src/lib.rs", code)]);
        let range = program.functions()[0].range;
        assert_eq!((range.start_line, range.start_col), (1, 0));
        assert_eq!((range.end_line, range.end_col), (4, 1));
    }

    #[test]
    fn test_call_sites_recorded() {
        let code = r#"
fn caller(t: &Timer) {
    helper();
    crate::irq::ack(1);
    Self::new();
    t.tick();
    println!("{}", format_it(t));
}
"#;
        let program = load(&[("src/lib.rs", code)]);
        let calls = calls_from(&program, "k::caller");
        let targets: Vec<&CallTarget> = calls.iter().map(|(t, _)| *t).collect();
        assert_eq!(
            targets,
            vec![
                &CallTarget::Path(vec!["helper".into()]),
                &CallTarget::Path(vec!["crate".into(), "irq".into(), "ack".into()]),
                &CallTarget::Path(vec!["Self".into(), "new".into()]),
                &CallTarget::Method("tick".into()),
                &CallTarget::Path(vec!["format_it".into()]),
            ]
        );
        assert!(calls.iter().all(|(_, k)| *k == EdgeKind::Ordinary));

        let site = &program.calls()[0].site;
        assert_eq!((site.line, site.column), (3, 4));
    }

    #[test]
    fn test_spawn_sites() {
        let code = r#"
fn start(rx: Receiver) {
    std::thread::spawn(move || {
        worker();
    });
    tokio::spawn(serve(make_rx()));
    std::thread::spawn(background);
    after();
}
"#;
        let program = load(&[("src/lib.rs", code)]);
        let calls = calls_from(&program, "k::start");
        assert_eq!(
            calls,
            vec![
                (&CallTarget::Path(vec!["worker".into()]), EdgeKind::Spawn),
                (&CallTarget::Path(vec!["serve".into()]), EdgeKind::Spawn),
                (&CallTarget::Path(vec!["make_rx".into()]), EdgeKind::Ordinary),
                (&CallTarget::Path(vec!["background".into()]), EdgeKind::Spawn),
                (&CallTarget::Path(vec!["after".into()]), EdgeKind::Ordinary),
            ]
        );
    }

    #[test]
    fn test_method_spawn_and_custom_names() {
        let code = r#"
fn start(pool: &Pool) {
    pool.submit(|| job());
}
"#;
        let options = LoadOptions {
            spawn_functions: vec!["submit".to_string()],
            include_tests: false,
        };
        let program = load_with(&[("src/lib.rs", code)], &options);
        assert_eq!(
            calls_from(&program, "k::start"),
            vec![(&CallTarget::Path(vec!["job".into()]), EdgeKind::Spawn)]
        );
    }

    #[test]
    fn test_nested_fn_inside_spawn_is_ordinary_caller() {
        let code = r#"
fn start() {
    std::thread::spawn(|| {
        fn local() { inner(); }
        local();
    });
}
"#;
        let program = load(&[("src/lib.rs", code)]);
        assert_eq!(
            calls_from(&program, "k::start::local"),
            vec![(&CallTarget::Path(vec!["inner".into()]), EdgeKind::Ordinary)]
        );
    }

    #[test]
    fn test_test_code_skipped_unless_requested() {
        let code = r#"
fn real() {}
#[test]
fn a_test() { real(); }
#[cfg(test)]
mod tests {
    fn helper() {}
}
"#;
        let program = load(&[("src/lib.rs", code)]);
        assert_eq!(names(&program), vec!["k::real"]);

        let options = LoadOptions {
            include_tests: true,
            ..LoadOptions::default()
        };
        let program = load_with(&[("src/lib.rs", code)], &options);
        assert_eq!(names(&program), vec!["k::real", "k::a_test", "k::tests::helper"]);
    }

    #[test]
    fn test_unparsable_file_keeps_comments() {
        let program = load(&[("src/lib.rs", "fn broken( { // stackcheck: x\n")]);
        assert!(program.functions().is_empty());
        assert_eq!(program.files()[0].comments.len(), 1);
    }

    #[test]
    fn test_ids_continue_across_files() {
        let program = load(&[("src/a.rs", "fn one() { two(); }"), ("src/b.rs", "fn two() { one(); }")]);
        assert_eq!(names(&program), vec!["k::a::one", "k::b::two"]);
        assert_eq!(program.calls()[1].caller, FunctionId::from_index(1));
        assert_eq!(program.files()[1].functions, vec![FunctionId::from_index(1)]);
    }
}
