//! # Mnemo Server
//!
//! The HTTP surface: every tool invocation enters through
//! `POST /tool/{name}`, passes the bearer-auth gate, and leaves wrapped in
//! the response envelope (`requestId`, `serverVersion`, `timestamp`,
//! `elapsedMs`). `GET /health` is unauthenticated.

pub mod auth;
pub mod envelope;
pub mod routes;
pub mod state;
pub mod tools;

pub use routes::router;
pub use state::AppState;

/// Reported in every envelope.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
