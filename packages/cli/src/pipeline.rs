//! Interactive walkthrough used when `crime_route` runs without a
//! subcommand.
//!
//! Prompts for the stage to run and its inputs, then hands off to the
//! same stage functions as the subcommands. The full pipeline chains
//! geocode -> annotate -> route, feeding the geocoded points file into the
//! later stages.

use std::path::PathBuf;
use std::time::Instant;

use crime_route_cli_utils::MultiProgress;
use crime_route_config::Config;
use dialoguer::{Confirm, Input, Select};

use crate::error::PipelineError;
use crate::stages::{
    self, DEFAULT_POINTS_FILE, DEFAULT_REPORT_FILE, GeocodeArgs, RouteArgs, SurfaceArgs,
};

enum Stage {
    FullPipeline,
    Geocode,
    Annotate,
    Route,
}

impl Stage {
    const ALL: &[Self] = &[Self::FullPipeline, Self::Geocode, Self::Annotate, Self::Route];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::FullPipeline => "Run full pipeline (geocode, annotate, route)",
            Self::Geocode => "Geocode block-level crimes",
            Self::Annotate => "Score street graph for a time of day",
            Self::Route => "Compare fast and safe routes",
        }
    }
}

fn prompt_path(prompt: &str, default: &str) -> Result<PathBuf, PipelineError> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()?;
    Ok(PathBuf::from(value))
}

fn prompt_geocode() -> Result<GeocodeArgs, PipelineError> {
    Ok(GeocodeArgs {
        input: prompt_path("Aggregated crimes CSV", "aggregated_crimes.csv")?,
        output: prompt_path("Write crime points to", DEFAULT_POINTS_FILE)?,
        spacing: None,
        state: None,
        accept_ties: false,
    })
}

fn prompt_surface(points: Option<PathBuf>) -> Result<SurfaceArgs, PipelineError> {
    let graph = prompt_path("Street graph JSON", "street_graph.json")?;
    let points = match points {
        Some(points) => points,
        None => prompt_path("Crime points CSV", DEFAULT_POINTS_FILE)?,
    };
    let hour: u8 = Input::new()
        .with_prompt("Hour of day (0-23)")
        .default(12)
        .validate_with(|h: &u8| if *h <= 23 { Ok(()) } else { Err("must be 0-23") })
        .interact_text()?;
    let force = Confirm::new()
        .with_prompt("Recompute scores even if cached?")
        .default(false)
        .interact()?;

    Ok(SurfaceArgs {
        graph,
        points,
        hour,
        step: None,
        bandwidth_rule: None,
        bandwidth_value: None,
        force,
        cache_dir: None,
    })
}

fn prompt_route(surface: SurfaceArgs) -> Result<RouteArgs, PipelineError> {
    Ok(RouteArgs {
        pairs: prompt_path("Route pairs CSV", "route_pairs.csv")?,
        surface,
        alpha: None,
        output: prompt_path("Write report to", DEFAULT_REPORT_FILE)?,
    })
}

/// Runs the interactive walkthrough.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected stage fails.
#[allow(clippy::future_not_send)]
pub async fn run(config: Config, multi: &MultiProgress) -> Result<(), PipelineError> {
    println!("Crime Route Toolchain");
    println!();

    let labels: Vec<&str> = Stage::ALL.iter().map(Stage::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Stage::ALL[idx] {
        Stage::Geocode => {
            let args = prompt_geocode()?;
            stages::run_geocode(&args, config, multi).await?;
        }
        Stage::Annotate => {
            let args = prompt_surface(None)?;
            stages::run_annotate(&args, config, multi)?;
        }
        Stage::Route => {
            let args = prompt_route(prompt_surface(None)?)?;
            let summary = stages::run_route(&args, config, multi).await?;
            println!("{summary}");
        }
        Stage::FullPipeline => {
            let geocode = prompt_geocode()?;
            let route = prompt_route(prompt_surface(Some(geocode.output.clone()))?)?;

            let started = Instant::now();
            stages::run_geocode(&geocode, config.clone(), multi).await?;
            let summary = stages::run_route(&route, config, multi).await?;
            println!("{summary}");
            println!(
                "Pipeline finished in {:.1}s",
                started.elapsed().as_secs_f64()
            );
        }
    }

    Ok(())
}
