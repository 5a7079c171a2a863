//! Datastructures passed between the compiler and the vm:
//! tokens, instructions, and function definitions.

pub mod function;
pub mod instruction;
pub mod token;
