//! Shared types for the Kestrel compiler: source spans, line lookup and
//! module paths.

pub mod module_path;
pub mod span;

pub use module_path::ModulePath;
pub use span::{LineIndex, Span};
