//! Shared building blocks for the state proxy crates.
//!
//! - `types`: JSON wire shapes exchanged with HTTP clients
//! - `utils::logging`: tracing subscriber setup shared by binaries and tests

pub mod types;
pub mod utils;

/// Store component name the service reads and writes.
pub const STORE_NAME: &str = "statestore-2";

/// The single key this service addresses inside [`STORE_NAME`].
pub const STATE_KEY: &str = "dapr-series-go";
