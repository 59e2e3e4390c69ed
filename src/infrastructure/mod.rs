// Infrastructure implementations for stackcheck: source front end, call graph
// construction, graph files, project loading and the worker pool.

pub mod comments;
pub mod concurrency;
pub mod graph_file;
pub mod hierarchy;
pub mod project_loader;
pub mod syn_loader;

pub use graph_file::GraphFile;
pub use hierarchy::HierarchyCallGraphBuilder;
pub use project_loader::ProjectLoader;
pub use syn_loader::{LoadOptions, SynProgramLoader};
