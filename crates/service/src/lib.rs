//! Service layer: the state store capability and its backends.
//! - `state::StateStore` is the only seam handlers talk to.
//! - `state::connect` picks a backend from configuration.
//! - `storage` holds reusable file-backed helpers.

pub mod errors;
pub mod state;
pub mod storage;

pub use errors::StoreError;
pub use state::{connect, StateEntry, StateItem, StateStore};
