#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime risk surfaces.
//!
//! Geocoded crime points are projected into the street graph's planar
//! CRS ([`crs`]), their scores turned into replication counts, and a
//! Gaussian KDE ([`kde`]) fitted over the result ([`surface`]). The
//! fitted [`surface::RiskSurface`] is read-only and can be evaluated at
//! any planar coordinate.

pub mod crs;
pub mod kde;
pub mod surface;

pub use crs::{Crs, CrsError, Transformer};
pub use kde::{Bandwidth, GaussianKde};
pub use surface::{RiskSurface, RiskSurfaceOptions, build_risk_surface, replication_counts};

use thiserror::Error;

/// Errors from building a risk surface.
#[derive(Debug, Error)]
pub enum RiskError {
    /// Nothing left to fit after filtering.
    #[error("Insufficient data for risk surface: {reason}")]
    InsufficientData {
        /// Which filtering step removed the last point.
        reason: String,
    },

    /// A coordinate could not be projected.
    #[error(transparent)]
    Crs(#[from] CrsError),

    /// The point set or bandwidth is malformed.
    #[error("Invalid KDE input: {message}")]
    InvalidPoints {
        /// What is wrong with the input.
        message: String,
    },
}
