//! Notify layer core - transport independent pieces
//!
//! Domain types, error types, configuration, the auth and GraphQL transport
//! contracts, observer sinks and the subscription session that turns a
//! process id into exactly one "process done" notification.

mod auth;
mod config;
pub mod documents;
mod error;
mod local;
mod observer;
mod process;
mod session;
mod transport;

pub use auth::*;
pub use config::*;
pub use error::*;
pub use local::LocalBackend;
pub use observer::*;
pub use process::*;
pub use session::*;
pub use transport::*;
