pub mod connection;
pub mod provider;
pub mod rewrite;

pub use connection::*;
pub use provider::*;
pub use rewrite::*;
