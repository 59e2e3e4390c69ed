// Domain model and algorithms for stackcheck. No I/O lives here.

pub mod annotation;
pub mod callgraph;
pub mod index;
pub mod program;
pub mod span;
pub mod verifier;
