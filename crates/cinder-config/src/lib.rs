//! Configuration for the cinder development server.
//!
//! Settings are layered with `figment`:
//! defaults, then `cinder.toml`, then `cinder.json`, then `CINDER_*`
//! environment variables, then explicit overrides from the command line.

pub mod config;
pub mod dev;
pub mod error;
pub mod serve;

pub use config::*;
pub use dev::*;
pub use error::*;
pub use serve::*;
