//! The pipeline stages behind the `geocode`, `annotate` and `route`
//! subcommands.
//!
//! Each stage takes the loaded [`Config`] by value, applies its command
//! line overrides, revalidates, and reports progress on the shared
//! [`MultiProgress`].

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Args, ValueEnum};
use crime_route_cli_utils::{IndicatifProgress, MultiProgress};
use crime_route_config::{BandwidthConfig, Config, ConfigError};
use crime_route_crime_models::{CrimeGroup, TimeBucket, WeightedCrimePoint, group_crime_records};
use crime_route_geocoder::blocks::{BlockSamplingOptions, process_all_block_addresses};
use crime_route_geocoder::census::{CensusGeocoder, CensusSettings};
use crime_route_graph::cache::{CacheOutcome, GraphCache};
use crime_route_graph::{AnnotateOptions, StreetGraph, add_risk_cost_weights};
use crime_route_progress::ProgressCallback;
use crime_route_risk::{Bandwidth, RiskSurfaceOptions};
use crime_route_routing::{
    Endpoint, EvaluationSummary, LocatedPair, RouteEvaluator, RoutePair, read_route_pairs,
    summarize, write_report_csv,
};
use serde::de::DeserializeOwned;

use crate::error::PipelineError;

pub const DEFAULT_POINTS_FILE: &str = "geocoded_crimes.csv";
pub const DEFAULT_REPORT_FILE: &str = "route_evaluation_results.csv";

#[derive(Debug, Clone, Args)]
pub struct GeocodeArgs {
    /// Aggregated crimes CSV (`Block Address`, `City`, `Zip Code`,
    /// `Neighborhood`, `Interval of Day`, `Crime Score`)
    pub input: PathBuf,
    /// Where to write the weighted crime points
    #[arg(long, short, default_value = DEFAULT_POINTS_FILE)]
    pub output: PathBuf,
    /// Address-number step between samples within a block
    #[arg(long)]
    pub spacing: Option<u32>,
    /// State abbreviation sent with every sample (e.g. "MA")
    #[arg(long)]
    pub state: Option<String>,
    /// Keep tied matches as crime points
    #[arg(long)]
    pub accept_ties: bool,
}

impl GeocodeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(spacing) = self.spacing {
            config.sampling.spacing = spacing;
        }
        if let Some(state) = &self.state {
            config.sampling.state.clone_from(state);
        }
        if self.accept_ties {
            config.geocoder.accept_ties = true;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BandwidthRule {
    /// Scott's rule of thumb
    Scott,
    /// Scale the data covariance by a factor
    Factor,
    /// Fixed isotropic kernel width in map units
    Fixed,
}

#[derive(Debug, Clone, Args)]
pub struct SurfaceArgs {
    /// Base street graph (JSON)
    #[arg(long)]
    pub graph: PathBuf,
    /// Weighted crime points CSV written by `geocode`
    #[arg(long, default_value = DEFAULT_POINTS_FILE)]
    pub points: PathBuf,
    /// Hour of day (0-23); its 4-hour bucket is scored
    #[arg(long)]
    pub hour: u8,
    /// Distance between samples along an edge, in map units
    #[arg(long)]
    pub step: Option<f64>,
    /// Kernel bandwidth rule
    #[arg(long, value_enum)]
    pub bandwidth_rule: Option<BandwidthRule>,
    /// Value for the `factor` and `fixed` bandwidth rules
    #[arg(long, requires = "bandwidth_rule")]
    pub bandwidth_value: Option<f64>,
    /// Recompute scores even if the cached graph already has them
    #[arg(long)]
    pub force: bool,
    /// Directory holding the annotated graph cache
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

impl SurfaceArgs {
    fn apply(&self, config: &mut Config) -> Result<(), PipelineError> {
        if let Some(step) = self.step {
            config.graph.step = step;
        }
        if let Some(dir) = &self.cache_dir {
            config.graph.cache_dir.clone_from(dir);
        }
        if let Some(rule) = self.bandwidth_rule {
            config.risk.bandwidth = Some(match (rule, self.bandwidth_value) {
                (BandwidthRule::Scott, _) => BandwidthConfig::Scott,
                (BandwidthRule::Factor, Some(value)) => BandwidthConfig::Factor { value },
                (BandwidthRule::Fixed, Some(value)) => BandwidthConfig::Fixed { value },
                (_, None) => {
                    return Err(ConfigError::Invalid {
                        field: "bandwidth-value",
                        message: format!("required by bandwidth rule {rule:?}"),
                    }
                    .into());
                }
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Args)]
pub struct RouteArgs {
    /// Route pairs CSV (`start,end` addresses or
    /// `start_lon,start_lat,end_lon,end_lat`)
    pub pairs: PathBuf,
    #[command(flatten)]
    pub surface: SurfaceArgs,
    /// Risk amplification factor in the safe route's edge cost
    #[arg(long)]
    pub alpha: Option<f64>,
    /// Where to write the comparison report
    #[arg(long, short, default_value = DEFAULT_REPORT_FILE)]
    pub output: PathBuf,
}

const fn bandwidth(config: Option<BandwidthConfig>) -> Bandwidth {
    match config {
        None | Some(BandwidthConfig::Scott) => Bandwidth::Scott,
        Some(BandwidthConfig::Factor { value }) => Bandwidth::Factor(value),
        Some(BandwidthConfig::Fixed { value }) => Bandwidth::Fixed(value),
    }
}

fn annotate_options(config: &Config) -> AnnotateOptions {
    AnnotateOptions {
        step: config.graph.step,
        surface: RiskSurfaceOptions {
            bandwidth: bandwidth(config.risk.bandwidth),
            max_replications: config.risk.max_replications,
        },
    }
}

fn census_settings(config: &Config) -> CensusSettings {
    CensusSettings {
        base_url: config.geocoder.base_url.clone(),
        benchmark: config.geocoder.benchmark.clone(),
        max_batch_size: config.geocoder.max_batch_size,
        timeout: Duration::from_secs(config.geocoder.timeout_secs),
        temp_dir: None,
    }
}

fn read_csv<T: DeserializeOwned>(stage: &'static str, path: &Path) -> Result<Vec<T>, PipelineError> {
    let input = |source: csv::Error| PipelineError::Input {
        stage,
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(input)?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .map_err(input)
}

fn write_points(path: &Path, points: &[WeightedCrimePoint]) -> Result<(), PipelineError> {
    let output = |source: csv::Error| PipelineError::Output {
        stage: "geocode",
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(output)?;
    for point in points {
        writer.serialize(point).map_err(output)?;
    }
    writer.flush().map_err(|e| output(e.into()))
}

/// Groups, samples and geocodes aggregated crimes into weighted crime
/// points. Returns the number of points written.
///
/// # Errors
///
/// Fails if the input cannot be read, any geocoding batch fails, or the
/// output cannot be written.
#[allow(clippy::future_not_send)]
pub async fn run_geocode(
    args: &GeocodeArgs,
    mut config: Config,
    multi: &MultiProgress,
) -> Result<usize, PipelineError> {
    args.apply(&mut config);
    config.validate()?;
    let started = Instant::now();

    let records: Vec<CrimeGroup> = read_csv("geocode", &args.input)?;
    let groups = group_crime_records(&records);
    log::info!(
        "Grouped {} crime rows into {} block groups",
        records.len(),
        groups.len()
    );

    let geocoder = CensusGeocoder::new(census_settings(&config))?;
    let options = BlockSamplingOptions {
        spacing: config.sampling.spacing,
        state: config.sampling.state.clone(),
        accept_ties: config.geocoder.accept_ties,
    };
    let progress = IndicatifProgress::batch_bar(multi, "Geocoding block samples");
    let outcome = process_all_block_addresses(&geocoder, &groups, &options, &progress).await?;

    write_points(&args.output, &outcome.points)?;
    log::info!(
        "Wrote {} crime points to {} in {:.1}s ({} samples dropped, {} groups unsamplable)",
        outcome.points.len(),
        args.output.display(),
        started.elapsed().as_secs_f64(),
        outcome.samples_dropped,
        outcome.unsamplable_groups
    );
    Ok(outcome.points.len())
}

fn annotate_for_hour(
    args: &SurfaceArgs,
    config: &Config,
    multi: &MultiProgress,
) -> Result<(StreetGraph, TimeBucket), PipelineError> {
    let bucket = TimeBucket::from_hour(args.hour)?;
    let points: Vec<WeightedCrimePoint> = read_csv("annotate", &args.points)?;
    let cache = GraphCache::new(config.graph.cache_dir.clone());

    let progress = IndicatifProgress::records_bar(multi, &format!("Scoring edges for {bucket}"));
    let (graph, outcome) = cache.annotate(
        &args.graph,
        &points,
        bucket,
        &annotate_options(config),
        args.force,
        &progress,
    )?;

    match outcome {
        CacheOutcome::Hit => progress.finish(format!("{} already cached", bucket.attribute_name())),
        CacheOutcome::Computed => log::info!(
            "Cached {} for {} edges in {}",
            bucket.attribute_name(),
            graph.edge_count(),
            cache.path().display()
        ),
    }
    Ok((graph, bucket))
}

/// Scores every graph edge for the requested hour's bucket, reusing the
/// annotated graph cache.
///
/// # Errors
///
/// Fails on invalid overrides, unreadable inputs, or when the bucket has
/// no usable crime points.
pub fn run_annotate(
    args: &SurfaceArgs,
    mut config: Config,
    multi: &MultiProgress,
) -> Result<StreetGraph, PipelineError> {
    args.apply(&mut config)?;
    config.validate()?;
    let (graph, _) = annotate_for_hour(args, &config, multi)?;
    Ok(graph)
}

async fn resolve(geocoder: Option<&CensusGeocoder>, endpoint: &Endpoint) -> Option<(f64, f64)> {
    match endpoint {
        Endpoint::LonLat { lon, lat } => Some((*lon, *lat)),
        Endpoint::Address(address) => match geocoder?.geocode_one_line(address).await {
            Ok(Some(found)) => Some((found.longitude, found.latitude)),
            Ok(None) => {
                log::warn!("No geocoder match for {address}");
                None
            }
            Err(e) => {
                log::warn!("Geocoding {address} failed: {e}");
                None
            }
        },
    }
}

#[allow(clippy::future_not_send)]
async fn locate_pairs(
    pairs: &[RoutePair],
    config: &Config,
    multi: &MultiProgress,
) -> Result<Vec<LocatedPair>, PipelineError> {
    let is_address = |e: &Endpoint| matches!(e, Endpoint::Address(_));
    let geocoder = if pairs.iter().any(|p| is_address(&p.start) || is_address(&p.end)) {
        Some(CensusGeocoder::new(census_settings(config))?)
    } else {
        None
    };

    let progress = IndicatifProgress::batch_bar(multi, "Geocoding route endpoints");
    progress.set_total(pairs.len() as u64);

    let mut located = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let start = resolve(geocoder.as_ref(), &pair.start).await;
        let end = resolve(geocoder.as_ref(), &pair.end).await;
        if let (Some(start_lon_lat), Some(end_lon_lat)) = (start, end) {
            located.push(LocatedPair {
                start: pair.start.label(),
                end: pair.end.label(),
                start_lon_lat,
                end_lon_lat,
            });
        } else {
            log::warn!(
                "Skipping {} -> {}: endpoint not located",
                pair.start.label(),
                pair.end.label()
            );
        }
        progress.inc(1);
    }

    progress.finish(format!(
        "Located {} of {} route pairs",
        located.len(),
        pairs.len()
    ));
    Ok(located)
}

/// Compares the fastest and safest route for every pair and writes the
/// report.
///
/// # Errors
///
/// Fails on invalid overrides, unreadable inputs, annotation failures, or
/// an unwritable report. Individual pairs that cannot be located or
/// routed are skipped.
#[allow(clippy::future_not_send)]
pub async fn run_route(
    args: &RouteArgs,
    mut config: Config,
    multi: &MultiProgress,
) -> Result<EvaluationSummary, PipelineError> {
    args.surface.apply(&mut config)?;
    if let Some(alpha) = args.alpha {
        config.graph.alpha = alpha;
    }
    config.validate()?;

    let pairs = read_route_pairs(&args.pairs)?;
    let (graph, bucket) = annotate_for_hour(&args.surface, &config, multi)?;
    let risk_attr = bucket.attribute_name();
    let (graph, cost_attr) = add_risk_cost_weights(&graph, &risk_attr, config.graph.alpha)?;

    let located = locate_pairs(&pairs, &config, multi).await?;
    let evaluator = RouteEvaluator::new(
        &graph,
        &risk_attr,
        cost_attr,
        config.routing.walking_speed_kmh,
    )?;
    let progress = IndicatifProgress::steps_bar(multi, "Evaluating routes", located.len() as u64);
    let comparisons = evaluator.evaluate_all(&located, &progress);

    write_report_csv(&args.output, &comparisons)?;
    let summary = summarize(&comparisons);
    log::info!("Route evaluation for {bucket}:\n{summary}");
    Ok(summary)
}
