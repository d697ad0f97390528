//! HTTP surface of the rewriting proxy

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
