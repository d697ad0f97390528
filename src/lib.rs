//! Framegate - embeddable content proxy
//!
//! Two cooperating halves:
//!
//! - **Selection engine**: probes public relay providers, caches the working
//!   set, fails over between providers and persists its state so a restart
//!   can skip probing.
//! - **Rewriting proxy**: an axum server whose `/proxy` endpoint fetches a
//!   target page and rewrites it so it renders inside a sandboxed iframe
//!   despite `X-Frame-Options`, CSP and frame-busting scripts.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod repository;
pub mod selection;

pub use config::Config;
pub use error::{FramegateError, Result};
pub use selection::SelectionEngine;
