//! Development server core.
//!
//! Build results flow through the modules in this order:
//! - [`result`]: the typed result stream
//! - [`session`]: the ingestion loop that drives everything else
//! - [`store`]: the in-memory mirror of the build output
//! - [`invalidate`]: server-side module cache invalidation
//! - [`decision`]: the choice between hot update, reload and nothing
//! - [`channel`]: notifications to and events from browsers
//!
//! [`lifecycle`] and [`server`] build the serving environment once, on the
//! first full build.

pub mod channel;
pub mod decision;
pub mod externals;
pub mod invalidate;
pub mod lifecycle;
pub mod result;
pub mod server;
pub mod session;
pub mod source;
pub mod store;

pub use channel::{ClientChannel, ClientEvent, ClientHub, ClientMessage, InboundHandlers};
pub use decision::{decide, Decision};
pub use externals::ExternalDependencyMetadata;
pub use invalidate::{invalidate_changed, ModuleInvalidator, NoopInvalidator};
pub use lifecycle::{AllowList, Lifecycle, ServerContext, ServerFactory, ServerHandle};
pub use result::{BuildResult, FullResult, IncrementalResult, OutputFile, OutputKind};
pub use server::AxumServerFactory;
pub use session::{BuildStatus, DevSession};
pub use source::json_lines;
pub use store::{OutputRecordStore, SharedStore};
