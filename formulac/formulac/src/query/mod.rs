//! Plan-level passes: forking and dead-column elimination.

mod forker;
mod graph;
mod sanitizer;

pub use forker::scan_and_fork_multi_query;
pub use graph::{dependencies, render_dependencies, Dependency};
pub use sanitizer::sanitize_multi_query;
