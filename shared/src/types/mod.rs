//! Core data model

pub mod params;
pub mod pixels;
pub mod region;
