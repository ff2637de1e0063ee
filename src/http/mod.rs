//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request id)
//!     → gateway pipeline
//!     → forward.rs (upstream call, buffered response)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod server;

pub use forward::{Forwarder, OutboundRequest, UpstreamResponse};
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use server::HttpServer;
