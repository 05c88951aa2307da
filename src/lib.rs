//! Client-side quota reconciliation and optimistic favorites.

pub mod config;
pub mod counter_store;
pub mod engine;
pub mod errors;
pub mod favorites;
pub mod mutation;
pub mod quota;
pub mod remote;
pub mod services;
pub mod signal_bus;
pub mod structured_logger;
pub mod sync_paths;

#[cfg(test)]
mod testing;

pub use config::SyncConfig;
pub use engine::{EngineServices, SyncEngine};
pub use errors::RemoteError;
