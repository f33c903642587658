//! Coordinate reference systems and forward projection.
//!
//! Street graphs record the CRS their node coordinates are in, either as
//! an EPSG code or as a PROJ string. Crime points always arrive as WGS84
//! longitude/latitude and are projected into the graph's frame before
//! density fitting.

use std::f64::consts::PI;
use std::str::FromStr;

use thiserror::Error;

/// WGS84 semi-major axis in meters.
const WGS84_A: f64 = 6_378_137.0;
/// WGS84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// UTM central scale factor.
const UTM_K0: f64 = 0.9996;
const UTM_FALSE_EASTING: f64 = 500_000.0;
const UTM_FALSE_NORTHING_SOUTH: f64 = 10_000_000.0;

/// Errors from parsing a CRS or projecting a coordinate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CrsError {
    /// The CRS identifier is not one this crate can project into.
    #[error("Unsupported CRS: {0}")]
    Unsupported(String),

    /// A UTM zone outside `1..=60`.
    #[error("Invalid UTM zone {0}: expected 1-60")]
    InvalidZone(u32),

    /// The coordinate cannot be projected (non-finite or at a pole).
    #[error("Coordinate ({lon}, {lat}) is outside the projection domain")]
    OutOfDomain {
        /// Longitude in degrees.
        lon: f64,
        /// Latitude in degrees.
        lat: f64,
    },
}

/// A supported coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// WGS84 longitude/latitude in degrees (`EPSG:4326`).
    Geographic,
    /// Spherical Web Mercator in meters (`EPSG:3857`).
    WebMercator,
    /// WGS84 Universal Transverse Mercator in meters.
    Utm {
        /// Zone number, `1..=60`.
        zone: u8,
        /// Southern hemisphere (false northing of 10 000 km).
        south: bool,
    },
}

impl Crs {
    /// Whether coordinates are angular degrees rather than planar meters.
    #[must_use]
    pub const fn is_geographic(self) -> bool {
        matches!(self, Self::Geographic)
    }

    /// The UTM zone containing a longitude.
    #[must_use]
    pub fn utm_for_lon_lat(lon: f64, lat: f64) -> Self {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let zone = (((lon + 180.0) / 6.0).floor() as i64).clamp(0, 59) as u8 + 1;
        Self::Utm {
            zone,
            south: lat < 0.0,
        }
    }

    fn utm(zone: u32, south: bool) -> Result<Self, CrsError> {
        match u8::try_from(zone) {
            Ok(zone @ 1..=60) => Ok(Self::Utm { zone, south }),
            _ => Err(CrsError::InvalidZone(zone)),
        }
    }

    fn from_epsg(code: u32) -> Option<Result<Self, CrsError>> {
        match code {
            4326 => Some(Ok(Self::Geographic)),
            3857 | 900_913 => Some(Ok(Self::WebMercator)),
            32_601..=32_660 => Some(Self::utm(code - 32_600, false)),
            32_701..=32_760 => Some(Self::utm(code - 32_700, true)),
            _ => None,
        }
    }

    fn from_proj(proj: &str) -> Result<Self, CrsError> {
        let unsupported = || CrsError::Unsupported(proj.to_string());
        let mut projection = None;
        let mut zone = None;
        let mut south = false;

        for token in proj.split_whitespace() {
            let token = token.trim_start_matches('+');
            match token.split_once('=') {
                Some(("proj", value)) => projection = Some(value),
                Some(("zone", value)) => {
                    zone = Some(value.parse::<u32>().map_err(|_| unsupported())?);
                }
                None if token == "south" => south = true,
                _ => {}
            }
        }

        match projection {
            Some("longlat" | "latlong") => Ok(Self::Geographic),
            Some("merc") => Ok(Self::WebMercator),
            Some("utm") => Self::utm(zone.ok_or_else(unsupported)?, south),
            _ => Err(unsupported()),
        }
    }
}

impl FromStr for Crs {
    type Err = CrsError;

    /// Accepts `EPSG:<code>` (or a bare code), `WGS84`, and PROJ strings
    /// (`+proj=utm +zone=19 +ellps=WGS84 +units=m +no_defs`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.contains("+proj=") {
            return Self::from_proj(&lower);
        }
        if lower == "wgs84" {
            return Ok(Self::Geographic);
        }

        let code = lower.strip_prefix("epsg:").unwrap_or(&lower);
        code.parse::<u32>()
            .ok()
            .and_then(Self::from_epsg)
            .unwrap_or_else(|| Err(CrsError::Unsupported(trimmed.to_string())))
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Geographic => f.write_str("EPSG:4326"),
            Self::WebMercator => f.write_str("EPSG:3857"),
            Self::Utm { zone, south } => {
                write!(f, "EPSG:{}{zone:02}", if *south { 327 } else { 326 })
            }
        }
    }
}

/// Projects WGS84 longitude/latitude into a target CRS.
///
/// Input is always `(lon, lat)`; output is always `(x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformer {
    target: Crs,
    /// Cached central meridian for UTM targets, radians.
    lon0: f64,
}

impl Transformer {
    /// Builds a transformer from WGS84 into `target`.
    #[must_use]
    pub fn new(target: Crs) -> Self {
        let lon0 = match target {
            Crs::Utm { zone, .. } => (f64::from(zone) * 6.0 - 183.0).to_radians(),
            Crs::Geographic | Crs::WebMercator => 0.0,
        };
        Self { target, lon0 }
    }

    /// The CRS this transformer projects into.
    #[must_use]
    pub const fn target(&self) -> Crs {
        self.target
    }

    /// Projects one coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`CrsError::OutOfDomain`] for non-finite input or latitudes
    /// at or beyond the poles.
    pub fn forward(&self, lon: f64, lat: f64) -> Result<(f64, f64), CrsError> {
        if !lon.is_finite() || !lat.is_finite() || lat.abs() >= 90.0 {
            return Err(CrsError::OutOfDomain { lon, lat });
        }

        Ok(match self.target {
            Crs::Geographic => (lon, lat),
            Crs::WebMercator => {
                let x = lon.to_radians() * WGS84_A;
                let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * WGS84_A;
                (x, y)
            }
            Crs::Utm { south, .. } => {
                let (x, y) = self.transverse_mercator(lon.to_radians(), lat.to_radians());
                let y = if south {
                    y + UTM_FALSE_NORTHING_SOUTH
                } else {
                    y
                };
                (x + UTM_FALSE_EASTING, y)
            }
        })
    }

    /// Projects many coordinates.
    ///
    /// # Errors
    ///
    /// Fails on the first coordinate [`Self::forward`] rejects.
    pub fn forward_all(&self, lon_lat: &[(f64, f64)]) -> Result<Vec<[f64; 2]>, CrsError> {
        lon_lat
            .iter()
            .map(|&(lon, lat)| self.forward(lon, lat).map(|(x, y)| [x, y]))
            .collect()
    }

    /// Ellipsoidal transverse Mercator (Snyder, USGS PP 1395, eq. 8-9..8-10)
    /// scaled by the UTM `k0`, without false origin offsets.
    fn transverse_mercator(&self, lam: f64, phi: f64) -> (f64, f64) {
        let e2 = WGS84_F * (2.0 - WGS84_F);
        let e4 = e2 * e2;
        let e6 = e4 * e2;
        let ep2 = e2 / (1.0 - e2);

        let (sin_phi, cos_phi) = phi.sin_cos();
        let tan_phi = phi.tan();

        let n = WGS84_A / (1.0 - e2 * sin_phi * sin_phi).sqrt();
        let t = tan_phi * tan_phi;
        let c = ep2 * cos_phi * cos_phi;
        let a = cos_phi * (lam - self.lon0);

        let m = WGS84_A
            * ((1.0 - e2 / 4.0 - 3.0 * e4 / 64.0 - 5.0 * e6 / 256.0) * phi
                - (3.0 * e2 / 8.0 + 3.0 * e4 / 32.0 + 45.0 * e6 / 1024.0) * (2.0 * phi).sin()
                + (15.0 * e4 / 256.0 + 45.0 * e6 / 1024.0) * (4.0 * phi).sin()
                - (35.0 * e6 / 3072.0) * (6.0 * phi).sin());

        let a2 = a * a;
        let a3 = a2 * a;
        let a4 = a3 * a;
        let a5 = a4 * a;
        let a6 = a5 * a;

        let x = UTM_K0
            * n
            * (a + (1.0 - t + c) * a3 / 6.0
                + (5.0 - 18.0 * t + t * t + 72.0 * c - 58.0 * ep2) * a5 / 120.0);
        let y = UTM_K0
            * (m + n
                * tan_phi
                * (a2 / 2.0
                    + (5.0 - t + 9.0 * c + 4.0 * c * c) * a4 / 24.0
                    + (61.0 - 58.0 * t + t * t + 600.0 * c - 330.0 * ep2) * a6 / 720.0));

        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epsg_codes() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::Geographic);
        assert_eq!("epsg:3857".parse::<Crs>().unwrap(), Crs::WebMercator);
        assert_eq!(
            "EPSG:32619".parse::<Crs>().unwrap(),
            Crs::Utm {
                zone: 19,
                south: false
            }
        );
        assert_eq!(
            "32733".parse::<Crs>().unwrap(),
            Crs::Utm {
                zone: 33,
                south: true
            }
        );
    }

    #[test]
    fn parses_proj_strings() {
        assert_eq!(
            "+proj=utm +zone=19 +ellps=WGS84 +datum=WGS84 +units=m +no_defs +type=crs"
                .parse::<Crs>()
                .unwrap(),
            Crs::Utm {
                zone: 19,
                south: false
            }
        );
        assert_eq!(
            "+proj=utm +zone=56 +south".parse::<Crs>().unwrap(),
            Crs::Utm {
                zone: 56,
                south: true
            }
        );
        assert_eq!(
            "+proj=longlat +datum=WGS84".parse::<Crs>().unwrap(),
            Crs::Geographic
        );
    }

    #[test]
    fn rejects_unknown_crs() {
        assert!(matches!(
            "EPSG:2249".parse::<Crs>(),
            Err(CrsError::Unsupported(_))
        ));
        assert!(matches!(
            "+proj=utm +zone=61".parse::<Crs>(),
            Err(CrsError::InvalidZone(61))
        ));
        assert!("+proj=lcc".parse::<Crs>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for crs in [
            Crs::Geographic,
            Crs::WebMercator,
            Crs::Utm {
                zone: 4,
                south: false,
            },
            Crs::Utm {
                zone: 60,
                south: true,
            },
        ] {
            assert_eq!(crs.to_string().parse::<Crs>().unwrap(), crs);
        }
        assert_eq!(
            Crs::Utm {
                zone: 4,
                south: false
            }
            .to_string(),
            "EPSG:32604"
        );
    }

    #[test]
    fn picks_utm_zone_for_boston() {
        assert_eq!(
            Crs::utm_for_lon_lat(-71.06, 42.36),
            Crs::Utm {
                zone: 19,
                south: false
            }
        );
        assert_eq!(
            Crs::utm_for_lon_lat(151.2, -33.9),
            Crs::Utm {
                zone: 56,
                south: true
            }
        );
    }

    #[test]
    fn geographic_is_identity() {
        let t = Transformer::new(Crs::Geographic);
        assert_eq!(t.forward(-71.06, 42.36).unwrap(), (-71.06, 42.36));
    }

    #[test]
    fn web_mercator_origin_and_scale() {
        let t = Transformer::new(Crs::WebMercator);
        let (x, y) = t.forward(0.0, 0.0).unwrap();
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9);
        let (x, _) = t.forward(180.0, 0.0).unwrap();
        assert!((x - PI * WGS84_A).abs() < 1e-6);
    }

    #[test]
    fn utm_central_meridian() {
        let t = Transformer::new("EPSG:32619".parse().unwrap());
        let (x, y) = t.forward(-69.0, 0.0).unwrap();
        assert!((x - 500_000.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);

        // Meridian arc to 45N on WGS84 is 4 984 944.378 m
        let (x, y) = t.forward(-69.0, 45.0).unwrap();
        assert!((x - 500_000.0).abs() < 1e-6);
        assert!((y - 0.9996 * 4_984_944.378).abs() < 0.5, "y = {y}");
    }

    #[test]
    fn utm_is_symmetric_about_central_meridian() {
        let t = Transformer::new("EPSG:32619".parse().unwrap());
        let (east, north_e) = t.forward(-68.0, 42.0).unwrap();
        let (west, north_w) = t.forward(-70.0, 42.0).unwrap();
        assert!(((east - 500_000.0) + (west - 500_000.0)).abs() < 1e-6);
        assert!((north_e - north_w).abs() < 1e-6);
        // One degree of longitude at 42N is roughly 83 km
        assert!((east - 500_000.0 - 82_900.0).abs() < 500.0, "east = {east}");
    }

    #[test]
    fn southern_hemisphere_adds_false_northing() {
        let t = Transformer::new("EPSG:32719".parse().unwrap());
        let (_, y) = t.forward(-69.0, -10.0).unwrap();
        assert!(y > 8_800_000.0 && y < 10_000_000.0);
    }

    #[test]
    fn rejects_poles_and_nan() {
        let t = Transformer::new(Crs::WebMercator);
        assert!(t.forward(0.0, 90.0).is_err());
        assert!(t.forward(f64::NAN, 0.0).is_err());
        assert!(t.forward_all(&[(0.0, 0.0), (0.0, -90.0)]).is_err());
    }
}
