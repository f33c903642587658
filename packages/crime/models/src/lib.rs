#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Crime record types shared across the crime-route pipeline.
//!
//! Aggregated incident data arrives as [`CrimeGroup`] rows keyed by a
//! block address and an interval of day. After block sampling and
//! geocoding, each matched sample becomes a [`WeightedCrimePoint`], the
//! unit consumed by the risk surface builder. Risk surfaces are computed
//! per [`TimeBucket`], a 4-hour window of the day.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Width of a time-of-day bucket in hours.
pub const BUCKET_HOURS: u8 = 4;

/// One aggregated crime row: a block address observed during an interval
/// of day, with a summed crime score.
///
/// Column names match the aggregated crimes CSV export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrimeGroup {
    /// Raw block address (e.g. `"800 BLOCK WASHINGTON ST"`).
    #[serde(rename = "Block Address")]
    pub block_address: String,
    /// City the block is in.
    #[serde(rename = "City")]
    pub city: String,
    /// ZIP code, when known.
    #[serde(rename = "Zip Code", default)]
    pub zip_code: Option<String>,
    /// Neighborhood label.
    #[serde(rename = "Neighborhood", default)]
    pub neighborhood: String,
    /// Interval of day as `"start-end"` hours (e.g. `"12-16"`).
    #[serde(rename = "Interval of Day")]
    pub interval_of_day: String,
    /// Weighted crime score for the group.
    #[serde(rename = "Crime Score")]
    pub crime_score: f64,
}

/// Groups aggregated crime rows by block address, city, ZIP code,
/// neighborhood and interval of day, summing their crime scores.
///
/// Output is ordered by the grouping key.
#[must_use]
pub fn group_crime_records(records: &[CrimeGroup]) -> Vec<CrimeGroup> {
    let mut groups: BTreeMap<(String, String, String, String, String), f64> = BTreeMap::new();

    for record in records {
        let key = (
            record.block_address.trim().to_string(),
            record.city.trim().to_string(),
            normalize_zip(record.zip_code.as_deref()).unwrap_or_default(),
            record.neighborhood.trim().to_string(),
            record.interval_of_day.trim().to_string(),
        );
        *groups.entry(key).or_insert(0.0) += record.crime_score;
    }

    groups
        .into_iter()
        .map(
            |((block_address, city, zip, neighborhood, interval_of_day), crime_score)| CrimeGroup {
                block_address,
                city,
                zip_code: if zip.is_empty() { None } else { Some(zip) },
                neighborhood,
                interval_of_day,
                crime_score,
            },
        )
        .collect()
}

/// Normalizes a ZIP code to five digits, restoring leading zeros lost by
/// spreadsheet exports (`"2118"` becomes `"02118"`).
#[must_use]
pub fn normalize_zip(zip: Option<&str>) -> Option<String> {
    let zip = zip?.trim();
    if zip.is_empty() {
        return None;
    }
    // "2118.0" from float-typed columns
    let zip = zip.split('.').next().unwrap_or(zip);
    if zip.chars().all(|c| c.is_ascii_digit()) && zip.len() < 5 {
        Some(format!("{zip:0>5}"))
    } else {
        Some(zip.to_string())
    }
}

/// A geocoded crime sample carrying the score of the group it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedCrimePoint {
    /// Latitude (WGS84), if geocoded.
    pub lat: Option<f64>,
    /// Longitude (WGS84), if geocoded.
    pub lon: Option<f64>,
    /// Importance weight. Negative values are clamped to zero before
    /// density fitting.
    pub crime_score: f64,
    /// Neighborhood label of the originating group.
    #[serde(default)]
    pub neighborhood: String,
    /// Interval of day (`"start-end"`) of the originating group.
    pub time_interval: String,
    /// Originating block address.
    #[serde(default)]
    pub block_address: String,
    /// Sampled address that was geocoded.
    #[serde(default)]
    pub sample_address: String,
    /// Address the geocoder matched, if any.
    #[serde(default)]
    pub matched_address: Option<String>,
}

impl WeightedCrimePoint {
    /// Returns `(lon, lat)` when both coordinates are present and finite.
    #[must_use]
    pub fn lon_lat(&self) -> Option<(f64, f64)> {
        match (self.lon, self.lat) {
            (Some(lon), Some(lat)) if lon.is_finite() && lat.is_finite() => Some((lon, lat)),
            _ => None,
        }
    }

    /// Whether this point's interval of day contains `hour`.
    ///
    /// Points with an unparseable interval never match.
    #[must_use]
    pub fn active_at(&self, hour: u8) -> bool {
        self.time_interval
            .parse::<TimeInterval>()
            .is_ok_and(|interval| interval.contains(hour))
    }
}

/// Half-open interval of day in whole hours, `start <= hour < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeInterval {
    /// First hour included.
    pub start: u8,
    /// First hour excluded.
    pub end: u8,
}

impl TimeInterval {
    /// Whether `hour` falls inside the interval.
    #[must_use]
    pub const fn contains(self, hour: u8) -> bool {
        self.start <= hour && hour < self.end
    }
}

impl FromStr for TimeInterval {
    type Err = InvalidIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidIntervalError {
            value: s.to_string(),
        };
        let (start, end) = s.trim().split_once('-').ok_or_else(invalid)?;
        let start = start.trim().parse::<u8>().map_err(|_| invalid())?;
        let end = end.trim().parse::<u8>().map_err(|_| invalid())?;
        Ok(Self { start, end })
    }
}

impl std::fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Error returned when an interval-of-day string is not `"start-end"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIntervalError {
    /// The rejected input.
    pub value: String,
}

impl std::fmt::Display for InvalidIntervalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid interval of day {:?}: expected \"start-end\"",
            self.value
        )
    }
}

impl std::error::Error for InvalidIntervalError {}

/// A 4-hour window of the day that risk scores are computed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket {
    hour: u8,
}

impl TimeBucket {
    /// Creates the bucket containing `hour`.
    ///
    /// # Errors
    ///
    /// Returns an error if `hour` is not in `0..=23`.
    pub const fn from_hour(hour: u8) -> Result<Self, InvalidHourError> {
        if hour > 23 {
            return Err(InvalidHourError { hour });
        }
        Ok(Self { hour })
    }

    /// The requested hour of day.
    #[must_use]
    pub const fn hour(self) -> u8 {
        self.hour
    }

    /// First hour of the bucket (the hour floored to a 4-hour boundary).
    #[must_use]
    pub const fn start(self) -> u8 {
        (self.hour / BUCKET_HOURS) * BUCKET_HOURS
    }

    /// End hour of the bucket (exclusive).
    #[must_use]
    pub const fn end(self) -> u8 {
        self.start() + BUCKET_HOURS
    }

    /// Edge attribute that stores density scores for this bucket, e.g.
    /// `kde_score_for_12_16`.
    #[must_use]
    pub fn attribute_name(self) -> String {
        format!("kde_score_for_{:02}_{:02}", self.start(), self.end())
    }
}

impl std::fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.start(), self.end())
    }
}

/// Error returned for an hour of day outside `0..=23`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidHourError {
    /// The rejected hour.
    pub hour: u8,
}

impl std::fmt::Display for InvalidHourError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid hour of day {}: expected 0-23", self.hour)
    }
}

impl std::error::Error for InvalidHourError {}
