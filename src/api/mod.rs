//! HTTP surface: insight, podcast and market proxy endpoints plus the static
//! dashboard frontend.

pub mod routes;
pub mod server;

pub use server::{build_router, start_server, AppState};
