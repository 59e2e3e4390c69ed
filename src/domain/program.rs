//! Analyzable program form.
//!
//! Produced by the source front end, consumed by call graph providers and by the
//! annotation extractor. Function ids are positions in `functions` and match the
//! ids of any graph built with `ProgramIndex::empty_graph`.

use crate::domain::annotation::{AnnotationExtractor, AnnotationMap, Comment, EnclosingFunction};
use crate::domain::callgraph::{CallGraph, EdgeKind, FunctionId};
use crate::domain::span::{SourcePos, SourceRange};

/// A function or method declaration.
#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub crate_name: String,
    /// e.g. `kernel::irq::Handler::run`
    pub qualified_name: String,
    pub name: String,
    /// Type (or trait) of the enclosing `impl`/`trait` block
    pub impl_type: Option<String>,
    /// Trait implemented by the enclosing `impl Trait for Type` block
    pub trait_name: Option<String>,
    /// Module segments below the crate root
    pub module_path: Vec<String>,
    pub file: String,
    /// From the first attribute to the closing brace of the body
    pub range: SourceRange,
}

impl FunctionDecl {
    pub fn location(&self) -> SourcePos {
        self.range.start_pos(&self.file)
    }
}

/// What a call site names, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    /// `foo()`, `module::foo()`, `Type::method()`, `Self::method()`
    Path(Vec<String>),
    /// `receiver.method()`
    Method(String),
}

/// A call site as written in the source.
#[derive(Debug, Clone)]
pub struct RawCall {
    pub caller: FunctionId,
    pub target: CallTarget,
    pub site: SourcePos,
    pub kind: EdgeKind,
}

/// Per-file facts kept for annotation extraction.
#[derive(Debug, Clone, Default)]
pub struct FileFacts {
    pub crate_name: String,
    pub path: String,
    pub comments: Vec<Comment>,
    /// Functions declared in this file
    pub functions: Vec<FunctionId>,
}

#[derive(Debug, Default)]
pub struct ProgramIndex {
    functions: Vec<FunctionDecl>,
    files: Vec<FileFacts>,
    calls: Vec<RawCall>,
}

impl ProgramIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a file. Functions and calls added afterwards belong to it.
    pub fn begin_file(&mut self, crate_name: &str, path: &str, comments: Vec<Comment>) {
        self.files.push(FileFacts {
            crate_name: crate_name.to_string(),
            path: path.to_string(),
            comments,
            functions: Vec::new(),
        });
    }

    pub fn add_function(&mut self, decl: FunctionDecl) -> FunctionId {
        let id = FunctionId::from_index(self.functions.len());
        self.functions.push(decl);
        if let Some(file) = self.files.last_mut() {
            file.functions.push(id);
        }
        id
    }

    pub fn add_call(&mut self, call: RawCall) {
        self.calls.push(call);
    }

    pub fn function(&self, id: FunctionId) -> &FunctionDecl {
        &self.functions[id.index()]
    }

    pub fn functions(&self) -> &[FunctionDecl] {
        &self.functions
    }

    pub fn files(&self) -> &[FileFacts] {
        &self.files
    }

    pub fn calls(&self) -> &[RawCall] {
        &self.calls
    }

    pub fn has_crate(&self, crate_name: &str) -> bool {
        self.files.iter().any(|f| f.crate_name == crate_name)
    }

    pub fn files_of<'a>(&'a self, crate_name: &'a str) -> impl Iterator<Item = &'a FileFacts> + 'a {
        self.files.iter().filter(move |f| f.crate_name == crate_name)
    }

    /// A graph holding one node per declared function, with matching ids.
    pub fn empty_graph(&self) -> CallGraph {
        let mut graph = CallGraph::new();
        for decl in &self.functions {
            graph.add_function(decl.qualified_name.clone(), Some(decl.location()));
        }
        graph
    }

    /// The innermost function of `file` whose declaration contains `range`.
    pub fn enclosing_function(&self, file: &FileFacts, range: &SourceRange) -> Option<FunctionId> {
        file.functions
            .iter()
            .copied()
            .filter(|&id| self.function(id).range.contains(range))
            .min_by_key(|&id| self.function(id).range.size())
    }

    /// Run the extractor over every file of the target unit, in load order.
    pub fn annotations(&self, target: &str, extractor: &AnnotationExtractor) -> AnnotationMap {
        let mut map = AnnotationMap::new();
        for file in self.files_of(target) {
            let scope = FileScope { program: self, file };
            extractor.extract(&file.comments, &scope, &mut map);
        }
        map
    }
}

/// Enclosing-function resolution restricted to one file.
pub struct FileScope<'a> {
    program: &'a ProgramIndex,
    file: &'a FileFacts,
}

impl EnclosingFunction for FileScope<'_> {
    fn enclosing_function(&self, range: &SourceRange) -> Option<FunctionId> {
        self.program.enclosing_function(self.file, range)
    }
}
