//! Shared building blocks for the gameid disc readers.
//!
//! This crate holds the pieces that both the container decoder and the
//! filesystem layer need: CD sector constants, the identification-layer
//! error type, fixed-width ASCII helpers, and the settings file loader.

pub mod cd;
pub mod error;
pub mod settings;
pub mod util;

pub use error::AnalysisError;

/// Positional (offset-addressed) byte source used throughout the workspace.
///
/// Re-exported so downstream crates agree on a single trait without each
/// naming the `positioned-io` dependency directly.
pub use positioned_io::ReadAt;
