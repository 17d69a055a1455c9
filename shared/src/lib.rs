//! Shared types and utilities for tint
//!
//! This crate contains the data model exchanged between the filter host,
//! the session layer and the CLI: pixel buffers, transform parameters,
//! linear-memory regions and the filter module ABI.

pub mod types;
pub mod utils;
pub mod wasm;

// Re-export commonly used types
pub use types::{params::*, pixels::*, region::*};
