//! Risk surfaces: a KDE fitted to weighted crime points in a planar CRS.

use crime_route_crime_models::WeightedCrimePoint;

use crate::RiskError;
use crate::crs::{Crs, Transformer};
use crate::kde::{Bandwidth, GaussianKde};

/// Default upper bound of the per-point replication count.
pub const DEFAULT_MAX_REPLICATIONS: u32 = 50;

/// Parameters for [`build_risk_surface`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskSurfaceOptions {
    /// Kernel bandwidth selection.
    pub bandwidth: Bandwidth,
    /// Replication count given to the heaviest point.
    pub max_replications: u32,
}

impl Default for RiskSurfaceOptions {
    fn default() -> Self {
        Self {
            bandwidth: Bandwidth::Scott,
            max_replications: DEFAULT_MAX_REPLICATIONS,
        }
    }
}

/// A fitted density estimator bound to the CRS it was fitted in.
#[derive(Debug, Clone)]
pub struct RiskSurface {
    kde: GaussianKde,
    transformer: Transformer,
    source_points: usize,
}

impl RiskSurface {
    /// Density at each planar `(x, y)` in the surface's CRS, clamped to
    /// be non-negative.
    #[must_use]
    pub fn evaluate_kde_at_points(&self, points: &[[f64; 2]]) -> Vec<f64> {
        self.kde.evaluate(points)
    }

    /// The transformer used to project the training points.
    #[must_use]
    pub const fn transformer(&self) -> &Transformer {
        &self.transformer
    }

    /// The CRS the surface is evaluated in.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.transformer.target()
    }

    /// The fitted estimator.
    #[must_use]
    pub const fn kde(&self) -> &GaussianKde {
        &self.kde
    }

    /// Number of distinct weighted points the surface was fitted to,
    /// before replication.
    #[must_use]
    pub const fn source_points(&self) -> usize {
        self.source_points
    }
}

/// Maps positive weights onto integer replication counts in
/// `1..=max_replications`.
///
/// Weights are rescaled linearly between the observed minimum and maximum.
/// When every weight is equal each point gets `max_replications`.
#[must_use]
pub fn replication_counts(weights: &[f64], max_replications: u32) -> Vec<u32> {
    let max_replications = max_replications.max(1);
    let (min, max) = weights
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), w| {
            (lo.min(*w), hi.max(*w))
        });

    if max <= min {
        return vec![max_replications; weights.len()];
    }

    let span = f64::from(max_replications - 1);
    weights
        .iter()
        .map(|w| {
            let scaled = 1.0 + (w - min) / (max - min) * span;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let count = scaled.round() as u32;
            count.clamp(1, max_replications)
        })
        .collect()
}

/// Fits a risk surface to the weighted crime points in `crs`.
///
/// Points without coordinates are dropped, the rest are projected from
/// WGS84, weights are clamped to be non-negative and zero-weight points
/// dropped. Remaining weights become replication counts (see
/// [`replication_counts`]) and the KDE is fitted to the replicated cloud.
///
/// # Errors
///
/// * [`RiskError::InsufficientData`] if no point has coordinates or every
///   weight is zero.
/// * [`RiskError::Crs`] if a coordinate cannot be projected.
pub fn build_risk_surface(
    points: &[WeightedCrimePoint],
    crs: Crs,
    options: &RiskSurfaceOptions,
) -> Result<RiskSurface, RiskError> {
    let located: Vec<((f64, f64), f64)> = points
        .iter()
        .filter_map(|p| p.lon_lat().map(|ll| (ll, p.crime_score)))
        .collect();

    if located.is_empty() {
        return Err(RiskError::InsufficientData {
            reason: format!("none of {} points have coordinates", points.len()),
        });
    }
    log::debug!(
        "{} of {} points have coordinates",
        located.len(),
        points.len()
    );

    let transformer = Transformer::new(crs);
    let (lon_lat, weights): (Vec<_>, Vec<_>) = located.into_iter().unzip();
    let projected = transformer.forward_all(&lon_lat)?;

    let (xy, weights): (Vec<[f64; 2]>, Vec<f64>) = projected
        .into_iter()
        .zip(weights)
        .map(|(p, w)| (p, if w.is_finite() { w.max(0.0) } else { 0.0 }))
        .filter(|(_, w)| *w > 0.0)
        .unzip();

    if xy.is_empty() {
        return Err(RiskError::InsufficientData {
            reason: "all crime scores are zero".to_string(),
        });
    }

    let counts = replication_counts(&weights, options.max_replications);
    let kde = GaussianKde::fit_counts(&xy, &counts, options.bandwidth)?;

    log::info!(
        "Fitted risk surface in {crs} from {} points ({} replicated samples)",
        xy.len(),
        kde.n()
    );

    Ok(RiskSurface {
        kde,
        transformer,
        source_points: xy.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lon: f64, lat: f64, score: f64) -> WeightedCrimePoint {
        WeightedCrimePoint {
            lat: Some(lat),
            lon: Some(lon),
            crime_score: score,
            neighborhood: "Roxbury".to_string(),
            time_interval: "0-4".to_string(),
            block_address: String::new(),
            sample_address: String::new(),
            matched_address: None,
        }
    }

    fn boston_points() -> Vec<WeightedCrimePoint> {
        vec![
            point(-71.0589, 42.3601, 5.0),
            point(-71.0603, 42.3588, 3.0),
            point(-71.0577, 42.3612, 1.0),
            point(-71.0832, 42.3318, 8.0),
            point(-71.0845, 42.3305, 2.0),
            point(-71.0700, 42.3500, 4.0),
        ]
    }

    fn utm19() -> Crs {
        "EPSG:32619".parse().unwrap()
    }

    #[test]
    fn replication_rescales_between_min_and_max() {
        let counts = replication_counts(&[1.0, 2.0, 3.0], 50);
        assert_eq!(counts, vec![1, 26, 50]);
        assert!(counts.iter().all(|c| (1..=50).contains(c)));
    }

    #[test]
    fn equal_weights_replicate_fully() {
        assert_eq!(replication_counts(&[2.5, 2.5, 2.5], 50), vec![50, 50, 50]);
        assert_eq!(replication_counts(&[7.0], 50), vec![50]);
    }

    #[test]
    fn builds_surface_in_utm() {
        let surface =
            build_risk_surface(&boston_points(), utm19(), &RiskSurfaceOptions::default()).unwrap();
        assert_eq!(surface.crs(), utm19());
        assert_eq!(surface.source_points(), 6);

        let (near_x, near_y) = surface.transformer().forward(-71.0589, 42.3601).unwrap();
        let (far_x, far_y) = surface.transformer().forward(-70.5, 42.9).unwrap();
        let values = surface.evaluate_kde_at_points(&[[near_x, near_y], [far_x, far_y]]);
        assert!(values[0] > 0.0);
        assert!(values[0] > values[1]);
        assert!(values[1] >= 0.0);
    }

    #[test]
    fn evaluation_is_never_negative() {
        let surface =
            build_risk_surface(&boston_points(), utm19(), &RiskSurfaceOptions::default()).unwrap();
        let probes = [
            [0.0, 0.0],
            [-1e7, -1e7],
            [1e9, 1e9],
            [330_000.0, 4_690_000.0],
        ];
        assert!(
            surface
                .evaluate_kde_at_points(&probes)
                .iter()
                .all(|v| *v >= 0.0)
        );
    }

    #[test]
    fn negative_and_zero_scores_are_dropped() {
        let mut points = boston_points();
        points.push(point(-71.2, 42.5, -10.0));
        points.push(point(-71.3, 42.6, 0.0));
        let surface =
            build_risk_surface(&points, utm19(), &RiskSurfaceOptions::default()).unwrap();
        assert_eq!(surface.source_points(), 6);
    }

    #[test]
    fn missing_coordinates_are_insufficient() {
        let mut p = point(0.0, 0.0, 1.0);
        p.lat = None;
        let err = build_risk_surface(&[p], utm19(), &RiskSurfaceOptions::default()).unwrap_err();
        assert!(matches!(err, RiskError::InsufficientData { .. }));

        let err = build_risk_surface(&[], utm19(), &RiskSurfaceOptions::default()).unwrap_err();
        assert!(matches!(err, RiskError::InsufficientData { .. }));
    }

    #[test]
    fn all_zero_scores_are_insufficient() {
        let points = vec![point(-71.06, 42.36, 0.0), point(-71.07, 42.35, -2.0)];
        let err =
            build_risk_surface(&points, utm19(), &RiskSurfaceOptions::default()).unwrap_err();
        assert!(matches!(err, RiskError::InsufficientData { .. }));
    }

    #[test]
    fn fixed_bandwidth_is_used() {
        let options = RiskSurfaceOptions {
            bandwidth: Bandwidth::Fixed(150.0),
            ..RiskSurfaceOptions::default()
        };
        let surface = build_risk_surface(&boston_points(), utm19(), &options).unwrap();
        assert_eq!(
            surface.kde().covariance(),
            [[22_500.0, 0.0], [0.0, 22_500.0]]
        );
    }

    #[test]
    fn unprojectable_points_fail() {
        let points = vec![point(0.0, 90.0, 1.0)];
        let err = build_risk_surface(&points, Crs::WebMercator, &RiskSurfaceOptions::default())
            .unwrap_err();
        assert!(matches!(err, RiskError::Crs(_)));
    }
}
