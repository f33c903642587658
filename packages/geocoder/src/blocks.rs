//! Turns aggregated crime groups into weighted crime points.
//!
//! Every group's block address is parsed and sampled; all samples from
//! all groups go through the batch geocoder together, each with its own
//! row id, and matched samples are joined back to the group they came
//! from. Groups that cannot be sampled (intersections, bare streets, block
//! 0) are counted and skipped.

use std::sync::Arc;

use crime_route_crime_models::{CrimeGroup, WeightedCrimePoint};
use crime_route_progress::ProgressCallback;

use crate::address::parse_block_address;
use crate::census::CensusGeocoder;
use crate::{AddressInput, GeocodeError, GeocodeResult};

/// Sampling parameters for [`process_all_block_addresses`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSamplingOptions {
    /// Address-number step between samples.
    pub spacing: u32,
    /// State abbreviation sent with every sample.
    pub state: String,
    /// Keep `Tie` matches as points.
    pub accept_ties: bool,
}

impl Default for BlockSamplingOptions {
    fn default() -> Self {
        Self {
            spacing: crate::sampling::DEFAULT_SPACING,
            state: "MA".to_string(),
            accept_ties: false,
        }
    }
}

/// Where a sample row came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleOrigin {
    /// Index of the group in the input slice.
    pub group: usize,
    /// Sampled street address.
    pub sample_address: String,
}

/// All geocoding inputs for a set of crime groups.
///
/// `inputs[i]` has id `i` and originates from `origins[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplePlan {
    /// Rows to submit to the geocoder.
    pub inputs: Vec<AddressInput>,
    /// Origin of each row, by position.
    pub origins: Vec<SampleOrigin>,
    /// Number of groups whose address could not be sampled.
    pub unsamplable: usize,
}

/// Summary of a block geocoding run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockGeocodeOutcome {
    /// One point per usable geocoded sample.
    pub points: Vec<WeightedCrimePoint>,
    /// Groups skipped because their address could not be sampled.
    pub unsamplable_groups: usize,
    /// Samples submitted to the geocoder.
    pub samples_submitted: usize,
    /// Samples dropped as unmatched, tied or missing coordinates.
    pub samples_dropped: usize,
}

/// Parses and samples every group's block address.
#[must_use]
pub fn plan_block_samples(groups: &[CrimeGroup], options: &BlockSamplingOptions) -> SamplePlan {
    let mut plan = SamplePlan::default();

    for (group_idx, group) in groups.iter().enumerate() {
        let descriptor = parse_block_address(&group.block_address);
        if !descriptor.is_samplable() {
            log::debug!("Unsamplable block address: {:?}", group.block_address);
            plan.unsamplable += 1;
            continue;
        }

        for sample in descriptor.samples(options.spacing) {
            let id = plan.inputs.len().to_string();
            plan.inputs.push(AddressInput {
                id,
                street: sample.clone(),
                city: group.city.clone(),
                state: options.state.clone(),
                zip: group.zip_code.clone(),
            });
            plan.origins.push(SampleOrigin {
                group: group_idx,
                sample_address: sample,
            });
        }
    }

    plan
}

/// Joins geocoder results back to their groups.
///
/// Results are matched to plan rows by row id, so their order does not
/// matter. Only definite matches (and ties, with `accept_ties`) that carry
/// coordinates become points.
#[must_use]
pub fn join_geocoded_samples(
    groups: &[CrimeGroup],
    plan: &SamplePlan,
    results: &[GeocodeResult],
    accept_ties: bool,
) -> Vec<WeightedCrimePoint> {
    results
        .iter()
        .filter_map(|result| {
            let Some((lon, lat)) = result.usable_coordinates(accept_ties) else {
                log::debug!(
                    "Dropping sample {} ({}): {}",
                    result.row_id,
                    result.input_address,
                    result.match_status
                );
                return None;
            };
            let origin = result
                .row_id
                .parse::<usize>()
                .ok()
                .and_then(|idx| plan.origins.get(idx))?;
            let group = groups.get(origin.group)?;

            Some(WeightedCrimePoint {
                lat: Some(lat),
                lon: Some(lon),
                crime_score: group.crime_score,
                neighborhood: group.neighborhood.clone(),
                time_interval: group.interval_of_day.clone(),
                block_address: group.block_address.clone(),
                sample_address: origin.sample_address.clone(),
                matched_address: result.matched_address.clone(),
            })
        })
        .collect()
}

/// Samples, geocodes and joins every group.
///
/// # Errors
///
/// Returns [`GeocodeError`] if any geocoding batch fails; no points are
/// returned in that case.
pub async fn process_all_block_addresses(
    geocoder: &CensusGeocoder,
    groups: &[CrimeGroup],
    options: &BlockSamplingOptions,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<BlockGeocodeOutcome, GeocodeError> {
    let plan = plan_block_samples(groups, options);
    log::info!(
        "Sampled {} addresses from {} crime groups ({} unsamplable)",
        plan.inputs.len(),
        groups.len(),
        plan.unsamplable
    );

    if plan.inputs.is_empty() {
        return Ok(BlockGeocodeOutcome {
            unsamplable_groups: plan.unsamplable,
            ..BlockGeocodeOutcome::default()
        });
    }

    let results = geocoder.geocode_addresses(&plan.inputs, progress).await?;
    let points = join_geocoded_samples(groups, &plan, &results, options.accept_ties);

    log::info!(
        "Geocoded {} of {} samples into weighted crime points",
        points.len(),
        plan.inputs.len()
    );

    Ok(BlockGeocodeOutcome {
        samples_submitted: plan.inputs.len(),
        samples_dropped: plan.inputs.len() - points.len(),
        unsamplable_groups: plan.unsamplable,
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MatchStatus;

    fn group(address: &str, score: f64) -> CrimeGroup {
        CrimeGroup {
            block_address: address.to_string(),
            city: "BOSTON".to_string(),
            zip_code: Some("02118".to_string()),
            neighborhood: "South End".to_string(),
            interval_of_day: "12-16".to_string(),
            crime_score: score,
        }
    }

    fn matched(row_id: &str, status: MatchStatus, lon: f64, lat: f64) -> GeocodeResult {
        GeocodeResult {
            row_id: row_id.to_string(),
            input_address: String::new(),
            match_status: status,
            match_type: Some("Exact".to_string()),
            matched_address: Some("MATCHED".to_string()),
            longitude: Some(lon),
            latitude: Some(lat),
            tiger_line_id: None,
            side: None,
        }
    }

    #[test]
    fn plans_samples_for_block_groups_only() {
        let groups = vec![
            group("800 BLOCK WASHINGTON ST", 4.0),
            group("WASHINGTON ST & WILLIAMS ST", 2.0),
            group("0 BLOCK CLINTON ST", 1.0),
            group("100 BLOCK E COTTAGE ST", 3.0),
        ];
        let plan = plan_block_samples(&groups, &BlockSamplingOptions::default());

        assert_eq!(plan.unsamplable, 2);
        assert_eq!(plan.inputs.len(), 10);
        assert_eq!(plan.inputs.len(), plan.origins.len());
        assert_eq!(plan.inputs[0].street, "800 WASHINGTON ST");
        assert_eq!(plan.inputs[0].state, "MA");
        assert_eq!(plan.inputs[5].street, "100 E COTTAGE ST");
        assert_eq!(plan.origins[5].group, 3);
        for (idx, input) in plan.inputs.iter().enumerate() {
            assert_eq!(input.id, idx.to_string());
        }
    }

    #[test]
    fn joins_matches_back_to_groups() {
        let groups = vec![
            group("800 BLOCK WASHINGTON ST", 4.0),
            group("100 BLOCK E COTTAGE ST", 3.0),
        ];
        let plan = plan_block_samples(&groups, &BlockSamplingOptions::default());
        let results = vec![
            matched("6", MatchStatus::Match, -71.06, 42.31),
            matched("0", MatchStatus::Match, -71.07, 42.34),
            matched("1", MatchStatus::Tie, -71.07, 42.34),
            GeocodeResult::missing(&plan.inputs[2]),
        ];

        let points = join_geocoded_samples(&groups, &plan, &results, false);
        assert_eq!(points.len(), 2);
        assert!((points[0].crime_score - 3.0).abs() < f64::EPSILON);
        assert_eq!(points[0].sample_address, "120 E COTTAGE ST");
        assert_eq!(points[1].block_address, "800 BLOCK WASHINGTON ST");
        assert_eq!(points[1].time_interval, "12-16");
        assert_eq!(points[1].lon_lat(), Some((-71.07, 42.34)));

        let with_ties = join_geocoded_samples(&groups, &plan, &results, true);
        assert_eq!(with_ties.len(), 3);
    }

    #[test]
    fn unknown_row_ids_are_ignored() {
        let groups = vec![group("800 BLOCK WASHINGTON ST", 4.0)];
        let plan = plan_block_samples(&groups, &BlockSamplingOptions::default());
        let results = vec![
            matched("99", MatchStatus::Match, -71.0, 42.0),
            matched("x", MatchStatus::Match, -71.0, 42.0),
        ];
        assert!(join_geocoded_samples(&groups, &plan, &results, false).is_empty());
    }
}
