//! This module contains the core VM implementation.
//! Parsed functions are compiled into a registry on load,
//! then run one frame at a time on request of a host.

pub mod function;
pub mod trace;
pub mod value;
pub mod vm;

pub use trace::{Trace, TraceKind};
pub use value::Value;
pub use vm::VM;
