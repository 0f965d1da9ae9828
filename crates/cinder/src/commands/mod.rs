//! Command implementations. Each provides an `execute` function taking the
//! parsed arguments.

pub mod serve;

pub use serve::execute as serve_execute;
