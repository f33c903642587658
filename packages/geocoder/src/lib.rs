#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Turns ambiguous crime block addresses into geocoded point samples.
//!
//! Incident reports locate crimes by *block* (`"800 BLOCK WASHINGTON ST"`),
//! which names a 100-number street segment rather than a building. This
//! crate:
//!
//! 1. parses raw block addresses into a [`address::BlockDescriptor`],
//! 2. expands each block into evenly spaced candidate addresses
//!    ([`sampling`]),
//! 3. geocodes the candidates with the US Census Bureau batch geocoder
//!    ([`census`]), honoring its batch-size limit, and
//! 4. joins matched samples back to their crime groups as weighted crime
//!    points ([`blocks`]).

pub mod address;
pub mod blocks;
pub mod census;
pub mod sampling;

use std::str::FromStr;

use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// An address to be geocoded, one row of a batch upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressInput {
    /// Unique identifier for correlating results back to the source record.
    pub id: String,
    /// Street address (e.g., "800 WASHINGTON ST").
    pub street: String,
    /// City name.
    pub city: String,
    /// Two-letter state abbreviation.
    pub state: String,
    /// ZIP code, if available.
    pub zip: Option<String>,
}

impl AddressInput {
    /// Formats the input as a single comma-separated address line.
    #[must_use]
    pub fn one_line(&self) -> String {
        sampling::format_address_for_geocoding(
            &self.street,
            &self.city,
            &self.state,
            self.zip.as_deref(),
        )
    }
}

/// Match outcome reported by the geocoding service for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum MatchStatus {
    /// The address matched a single location.
    Match,
    /// The address matched several locations equally well.
    Tie,
    /// The address could not be matched.
    #[strum(serialize = "No_Match")]
    NoMatch,
}

impl MatchStatus {
    /// Parses a status column, treating anything unrecognized as
    /// [`MatchStatus::NoMatch`].
    #[must_use]
    pub fn parse_lenient(s: &str) -> Self {
        Self::from_str(s.trim()).unwrap_or(Self::NoMatch)
    }
}

/// One parsed row of a batch geocoding response.
///
/// Coordinates are `None` when the service returned no match or an
/// unparseable coordinate pair.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    /// Row id echoed back from the request.
    pub row_id: String,
    /// Address as the service read it.
    pub input_address: String,
    /// Match outcome.
    pub match_status: MatchStatus,
    /// `Exact` / `Non_Exact`, when matched.
    pub match_type: Option<String>,
    /// Canonical matched address.
    pub matched_address: Option<String>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// TIGER/Line feature id of the matched street segment.
    pub tiger_line_id: Option<String>,
    /// Side of the street (`L` / `R`).
    pub side: Option<String>,
}

impl GeocodeResult {
    /// A no-match placeholder for a row the service did not return.
    #[must_use]
    pub fn missing(input: &AddressInput) -> Self {
        Self {
            row_id: input.id.clone(),
            input_address: input.one_line(),
            match_status: MatchStatus::NoMatch,
            match_type: None,
            matched_address: None,
            longitude: None,
            latitude: None,
            tiger_line_id: None,
            side: None,
        }
    }

    /// Returns `(lon, lat)` if the row is usable as a point: a definite
    /// match (or a tie, when `accept_ties`) with both coordinates.
    #[must_use]
    pub fn usable_coordinates(&self, accept_ties: bool) -> Option<(f64, f64)> {
        let status_ok = match self.match_status {
            MatchStatus::Match => true,
            MatchStatus::Tie => accept_ties,
            MatchStatus::NoMatch => false,
        };
        if !status_ok {
            return None;
        }
        Some((self.longitude?, self.latitude?))
    }
}

/// A single geocoded address (used for route endpoints).
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    /// Latitude (WGS84).
    pub latitude: f64,
    /// Longitude (WGS84).
    pub longitude: f64,
    /// The matched/canonical address returned by the geocoder.
    pub matched_address: Option<String>,
}

/// Errors from geocoding operations.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// The service answered a batch with a non-success status.
    #[error("Geocoding service returned {status} for batch {batch}: {body}")]
    Service {
        /// 1-based batch number, 0 for single-line requests.
        batch: usize,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Writing or reading a temporary batch file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing a batch or parsing a response table failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },
}
