//! File-backed helpers used by the dev state backend.

pub mod json_map_store;
