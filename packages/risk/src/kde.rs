//! Two-dimensional Gaussian kernel density estimation.
//!
//! The estimator follows the usual full-covariance formulation: the
//! kernel covariance is the sample covariance of the data (with an
//! `n - 1` denominator) scaled by the square of a bandwidth factor, and
//! the density at `q` is
//!
//! ```text
//! f(q) = 1/n * sum_i exp(-0.5 * (q - p_i)^T K^-1 (q - p_i)) / (2 pi sqrt(det K))
//! ```
//!
//! Identical input points are collapsed into one weighted sample and
//! stored in an R-tree, so evaluation only visits samples within a few
//! kernel standard deviations of the query.

use std::collections::BTreeMap;

use rstar::RTree;
use rstar::primitives::GeomWithData;

use crate::RiskError;

/// Kernel support radius in Mahalanobis units. Samples further away
/// contribute less than `exp(-32)` of their peak and are skipped.
const CUTOFF_SIGMAS: f64 = 8.0;

/// Variance (map units squared) added to both axes when the kernel
/// covariance is singular.
pub const VARIANCE_FLOOR: f64 = 1.0;

/// Bandwidth selection.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Bandwidth {
    /// Scott's rule of thumb, `n^(-1/6)` in two dimensions.
    #[default]
    Scott,
    /// Explicit factor applied to the data covariance.
    Factor(f64),
    /// Isotropic kernel with this standard deviation in map units,
    /// independent of the data spread.
    Fixed(f64),
}

type Sample = GeomWithData<[f64; 2], f64>;

/// A fitted 2-D Gaussian KDE.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    samples: RTree<Sample>,
    n: f64,
    covariance: [[f64; 2]; 2],
    inv_covariance: [[f64; 2]; 2],
    /// `1 / (n * 2 pi sqrt(det K))`
    norm: f64,
    max_sq_radius: f64,
    factor: Option<f64>,
}

impl GaussianKde {
    /// Fits the estimator to unweighted points.
    ///
    /// # Errors
    ///
    /// See [`Self::fit_counts`].
    pub fn fit(points: &[[f64; 2]], bandwidth: Bandwidth) -> Result<Self, RiskError> {
        let counts = vec![1; points.len()];
        Self::fit_counts(points, &counts, bandwidth)
    }

    /// Fits the estimator to points where `points[i]` appears `counts[i]`
    /// times in the sample. Equivalent to fitting the replicated cloud.
    ///
    /// # Errors
    ///
    /// * [`RiskError::InsufficientData`] if the total count is zero.
    /// * [`RiskError::InvalidPoints`] on non-finite coordinates, mismatched
    ///   lengths or a non-positive bandwidth.
    pub fn fit_counts(
        points: &[[f64; 2]],
        counts: &[u32],
        bandwidth: Bandwidth,
    ) -> Result<Self, RiskError> {
        if points.len() != counts.len() {
            return Err(RiskError::InvalidPoints {
                message: format!("{} points but {} counts", points.len(), counts.len()),
            });
        }
        if let Some(bad) = points.iter().find(|p| !p[0].is_finite() || !p[1].is_finite()) {
            return Err(RiskError::InvalidPoints {
                message: format!("non-finite coordinate {bad:?}"),
            });
        }

        let merged = merge_duplicates(points, counts);
        let n: f64 = merged.iter().map(|(_, c)| *c).sum();
        if n <= 0.0 {
            return Err(RiskError::InsufficientData {
                reason: "no points to fit a density to".to_string(),
            });
        }

        let (covariance, factor) = match bandwidth {
            Bandwidth::Scott => {
                let factor = n.powf(-1.0 / 6.0);
                (scale(data_covariance(&merged, n), factor * factor), Some(factor))
            }
            Bandwidth::Factor(factor) => {
                check_positive(factor)?;
                (scale(data_covariance(&merged, n), factor * factor), Some(factor))
            }
            Bandwidth::Fixed(sigma) => {
                check_positive(sigma)?;
                let var = sigma * sigma;
                ([[var, 0.0], [0.0, var]], None)
            }
        };
        let covariance = regularize(covariance);

        let det = determinant(covariance);
        let inv_covariance = [
            [covariance[1][1] / det, -covariance[0][1] / det],
            [-covariance[1][0] / det, covariance[0][0] / det],
        ];
        let norm = 1.0 / (n * 2.0 * std::f64::consts::PI * det.sqrt());
        let max_sq_radius = CUTOFF_SIGMAS * CUTOFF_SIGMAS * largest_eigenvalue(covariance);

        log::debug!(
            "Fitted KDE on {n} samples ({} distinct), covariance {covariance:?}",
            merged.len()
        );

        Ok(Self {
            samples: RTree::bulk_load(
                merged
                    .into_iter()
                    .map(|(p, c)| Sample::new(p, c))
                    .collect(),
            ),
            n,
            covariance,
            inv_covariance,
            norm,
            max_sq_radius,
            factor,
        })
    }

    /// Density at one planar point. Never negative.
    #[must_use]
    pub fn evaluate_point(&self, q: [f64; 2]) -> f64 {
        if !q[0].is_finite() || !q[1].is_finite() {
            return 0.0;
        }

        let sum: f64 = self
            .samples
            .locate_within_distance(q, self.max_sq_radius)
            .map(|sample| {
                let p = sample.geom();
                let dx = q[0] - p[0];
                let dy = q[1] - p[1];
                let ic = &self.inv_covariance;
                let m = dx * (ic[0][0] * dx + ic[0][1] * dy) + dy * (ic[1][0] * dx + ic[1][1] * dy);
                sample.data * (-0.5 * m).exp()
            })
            .sum();

        let density = sum * self.norm;
        if density.is_finite() {
            density.max(0.0)
        } else {
            0.0
        }
    }

    /// Density at each planar point, in input order. Never negative.
    #[must_use]
    pub fn evaluate(&self, points: &[[f64; 2]]) -> Vec<f64> {
        points.iter().map(|q| self.evaluate_point(*q)).collect()
    }

    /// Total sample count (sum of replication counts).
    #[must_use]
    pub const fn n(&self) -> f64 {
        self.n
    }

    /// Kernel covariance matrix.
    #[must_use]
    pub const fn covariance(&self) -> [[f64; 2]; 2] {
        self.covariance
    }

    /// Bandwidth factor applied to the data covariance, `None` for a
    /// fixed bandwidth.
    #[must_use]
    pub const fn factor(&self) -> Option<f64> {
        self.factor
    }
}

fn check_positive(value: f64) -> Result<(), RiskError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RiskError::InvalidPoints {
            message: format!("bandwidth must be positive, got {value}"),
        })
    }
}

/// Collapses identical points, summing their counts. Zero counts are
/// dropped.
fn merge_duplicates(points: &[[f64; 2]], counts: &[u32]) -> Vec<([f64; 2], f64)> {
    let mut merged: BTreeMap<(u64, u64), ([f64; 2], f64)> = BTreeMap::new();
    for (p, &c) in points.iter().zip(counts) {
        if c == 0 {
            continue;
        }
        merged
            .entry((p[0].to_bits(), p[1].to_bits()))
            .or_insert((*p, 0.0))
            .1 += f64::from(c);
    }
    merged.into_values().collect()
}

/// Sample covariance of the weighted cloud with an `n - 1` denominator.
/// A single sample has zero covariance.
fn data_covariance(samples: &[([f64; 2], f64)], n: f64) -> [[f64; 2]; 2] {
    let mean_x = samples.iter().map(|(p, c)| p[0] * c).sum::<f64>() / n;
    let mean_y = samples.iter().map(|(p, c)| p[1] * c).sum::<f64>() / n;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (p, c) in samples {
        let dx = p[0] - mean_x;
        let dy = p[1] - mean_y;
        sxx += c * dx * dx;
        sxy += c * dx * dy;
        syy += c * dy * dy;
    }

    let denom = n - 1.0;
    if denom <= 0.0 {
        return [[0.0, 0.0], [0.0, 0.0]];
    }
    [[sxx / denom, sxy / denom], [sxy / denom, syy / denom]]
}

fn scale(m: [[f64; 2]; 2], s: f64) -> [[f64; 2]; 2] {
    [[m[0][0] * s, m[0][1] * s], [m[1][0] * s, m[1][1] * s]]
}

fn determinant(m: [[f64; 2]; 2]) -> f64 {
    m[0][0].mul_add(m[1][1], -(m[0][1] * m[1][0]))
}

fn largest_eigenvalue(m: [[f64; 2]; 2]) -> f64 {
    let half_trace = (m[0][0] + m[1][1]) / 2.0;
    let disc = (half_trace * half_trace - determinant(m)).max(0.0);
    half_trace + disc.sqrt()
}

/// Adds [`VARIANCE_FLOOR`] to the diagonal when the covariance is
/// (numerically) singular: all points identical or collinear.
fn regularize(m: [[f64; 2]; 2]) -> [[f64; 2]; 2] {
    let det = determinant(m);
    let diag = m[0][0] * m[1][1];
    if m[0][0] > 0.0 && m[1][1] > 0.0 && det > 1e-9 * diag {
        return m;
    }
    log::warn!("Singular KDE covariance {m:?}; adding variance floor of {VARIANCE_FLOOR}");
    [
        [m[0][0] + VARIANCE_FLOOR, m[0][1]],
        [m[1][0], m[1][1] + VARIANCE_FLOOR],
    ]
}
