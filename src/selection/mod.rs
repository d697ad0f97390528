//! Client-side provider selection

pub mod client;
pub mod engine;
pub mod notifier;
pub mod registry;
pub mod target;

pub use client::{HttpProviderClient, ProviderClient, ProviderReply};
pub use engine::{EngineConfig, HealthSnapshot, SelectionEngine};
pub use notifier::{StatusCallback, StatusNotifier};
pub use registry::ProviderRegistry;
pub use target::{embed_video_url, encode_component, normalize_target};
