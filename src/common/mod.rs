//! Contains datastructures and utility functions
//! common to both the `compiler` and `vm`.
//!
//! - Source code representation and span annotations.

pub mod source;
pub mod span;

pub use source::Source;
pub use span::{Span, Spanned};
