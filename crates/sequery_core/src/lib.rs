//! Deferred in-memory query engine.
//!
//! Queries are built as trees of deferred operator calls. On first
//! enumeration the tree is retargeted at the in-memory operator catalog,
//! compiled into a closure chain, executed once, and cached.

pub mod collection;
pub mod compile;
pub mod expr;
pub mod functions;
pub mod query;
pub mod rewrite;
pub mod types;
