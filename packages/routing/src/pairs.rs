//! Route pair input files.
//!
//! A pairs CSV has a header row and either `start,end` columns holding
//! one-line addresses, or `start_lon,start_lat,end_lon,end_lat` columns
//! holding WGS84 coordinates. Coordinate columns win when both are
//! present.

use std::path::Path;

use crate::RouteError;

/// One end of a route.
#[derive(Debug, Clone, PartialEq)]
pub enum Endpoint {
    /// A one-line address still to be geocoded.
    Address(String),
    /// WGS84 coordinates.
    LonLat {
        /// Longitude.
        lon: f64,
        /// Latitude.
        lat: f64,
    },
}

impl Endpoint {
    /// Human-readable label for reports.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Address(address) => address.clone(),
            Self::LonLat { lon, lat } => format!("{lat:.6},{lon:.6}"),
        }
    }
}

/// A start/end pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePair {
    /// Route start.
    pub start: Endpoint,
    /// Route end.
    pub end: Endpoint,
}

#[derive(Clone, Copy)]
enum Layout {
    Addresses { start: usize, end: usize },
    Coordinates([usize; 4]),
}

/// Reads route pairs from a CSV file.
///
/// # Errors
///
/// * [`RouteError::Csv`] if the file cannot be read.
/// * [`RouteError::InvalidPair`] if the header has neither layout or a
///   row is incomplete or holds a non-numeric coordinate.
pub fn read_route_pairs(path: &Path) -> Result<Vec<RoutePair>, RouteError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let layout = match (
        column("start_lon"),
        column("start_lat"),
        column("end_lon"),
        column("end_lat"),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => Layout::Coordinates([a, b, c, d]),
        _ => match (column("start"), column("end")) {
            (Some(start), Some(end)) => Layout::Addresses { start, end },
            _ => {
                return Err(RouteError::InvalidPair {
                    line: 1,
                    message: "expected start,end or start_lon,start_lat,end_lon,end_lat columns"
                        .to_string(),
                });
            }
        },
    };

    let mut pairs = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        let line = idx + 2;
        let field = |i: usize| {
            record
                .get(i)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| RouteError::InvalidPair {
                    line,
                    message: format!("missing column {}", headers.get(i).unwrap_or("?")),
                })
        };
        let number = |i: usize| {
            field(i)?.parse::<f64>().map_err(|e| RouteError::InvalidPair {
                line,
                message: format!("{}: {e}", headers.get(i).unwrap_or("?")),
            })
        };

        let pair = match layout {
            Layout::Addresses { start, end } => RoutePair {
                start: Endpoint::Address(field(start)?.to_string()),
                end: Endpoint::Address(field(end)?.to_string()),
            },
            Layout::Coordinates([start_lon, start_lat, end_lon, end_lat]) => RoutePair {
                start: Endpoint::LonLat {
                    lon: number(start_lon)?,
                    lat: number(start_lat)?,
                },
                end: Endpoint::LonLat {
                    lon: number(end_lon)?,
                    lat: number(end_lat)?,
                },
            },
        };
        pairs.push(pair);
    }

    log::info!("Read {} route pairs from {}", pairs.len(), path.display());
    Ok(pairs)
}
