//! tint studio
//!
//! Everything between a user and the filter module: configuration,
//! acquiring images from files or a camera, and the filter session that
//! re-renders whenever the image or the controls change.

pub mod acquire;
pub mod config;
pub mod session;

pub use acquire::{AcquireError, ImageAcquirer, SourceImage, SourceOrigin};
pub use config::{ConfigError, StudioConfig};
pub use session::{FilterSession, Notice, RenderedFrame, SessionConfig, SessionHandle, SessionState};
