//! Notify layer - start backend processes and get told when they are done
//!
//! Wraps the transport independent core with an HTTP GraphQL transport, the
//! application state handlers work on ([`NotifyLayer`]) and tracing setup.

mod http;
mod layer;
mod report;
mod sessions;
mod telemetry;

pub use http::HttpTransport;
pub use layer::NotifyLayer;
pub use report::Report;
pub use sessions::SessionRegistry;
pub use telemetry::init_tracing;

// Re-export core functionality
pub use notify_layer_core::*;
