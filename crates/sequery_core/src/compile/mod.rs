//! Tree to closure compilation.

pub mod analyze;
pub mod compiler;
pub mod scope;

pub use compiler::{CompiledQuery, compile};
