//! telemetry-feed: live telemetry dashboard core.
//!
//! Ingests timestamped readings from serial lines, pub/sub messaging and
//! recorded files, keeps a bounded rolling buffer per channel and emits
//! down-sampled, display-ready frame batches at a fixed cadence. A single
//! `embedded` flag picks the resource profile for low-powered hosts.
//!
//! The crate exposes data and policy; drawing is left to a
//! [`render::RenderSurface`] supplied by the host.

pub mod api;
pub mod core;
pub mod error;
pub mod render;
pub mod source;
pub mod telemetry;

pub use api::{LiveFeedController, RenderProfile, SessionConfig};
pub use error::{FeedError, FeedResult};
