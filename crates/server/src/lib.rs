//! HTTP transport for the routing-and-pipeline engine: turns a
//! [`cmdgate_core::ResolvedConfig`] into a listening axum server.

pub mod pipeline;
pub mod reload;
pub mod router;
pub mod serve;
pub mod state;

pub use router::build_router;
pub use serve::{build_app, run, serve as serve_listener};
pub use state::AppState;
