#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `crime_route`: geocode block-level crime data, score a street graph
//! with crime density for a time of day, and compare the fastest walking
//! route against the safest one.
//!
//! Run without a subcommand for an interactive walkthrough. Logging goes
//! through `indicatif-log-bridge` (via
//! [`crime_route_cli_utils::init_logger`]) so log lines and progress bars
//! share the terminal.

mod error;
mod pipeline;
mod stages;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crime_route_cli_utils::MultiProgress;
use crime_route_config::Config;

use crate::error::PipelineError;
use crate::stages::{GeocodeArgs, RouteArgs, SurfaceArgs};

#[derive(Parser)]
#[command(
    name = "crime_route",
    about = "Crime-risk-aware walking route evaluation"
)]
struct Cli {
    /// TOML file overriding the built-in defaults (falls back to
    /// `CRIME_ROUTE_CONFIG`)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Geocode aggregated block-level crimes into weighted crime points
    Geocode(GeocodeArgs),
    /// Score street graph edges with crime density for one time bucket
    Annotate(SurfaceArgs),
    /// Compare the fastest and safest route for each start/end pair
    Route(RouteArgs),
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli, multi: &MultiProgress) -> Result<(), PipelineError> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        None => pipeline::run(config, multi).await,
        Some(Commands::Geocode(args)) => {
            stages::run_geocode(&args, config, multi).await?;
            Ok(())
        }
        Some(Commands::Annotate(args)) => {
            stages::run_annotate(&args, config, multi)?;
            Ok(())
        }
        Some(Commands::Route(args)) => {
            let summary = stages::run_route(&args, config, multi).await?;
            println!("{summary}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let multi = crime_route_cli_utils::init_logger();
    let cli = Cli::parse();

    if let Err(e) = run(cli, &multi).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_route_with_global_config() {
        let cli = Cli::try_parse_from([
            "crime_route",
            "route",
            "pairs.csv",
            "--graph",
            "boston.json",
            "--hour",
            "22",
            "--alpha",
            "5",
            "--config",
            "local.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("local.toml")));
        let Some(Commands::Route(args)) = cli.command else {
            panic!("expected route");
        };
        assert_eq!(args.pairs, PathBuf::from("pairs.csv"));
        assert_eq!(args.surface.hour, 22);
        assert_eq!(args.surface.points, PathBuf::from(stages::DEFAULT_POINTS_FILE));
        assert_eq!(args.alpha, Some(5.0));
        assert_eq!(args.output, PathBuf::from(stages::DEFAULT_REPORT_FILE));
    }

    #[test]
    fn no_subcommand_is_interactive() {
        let cli = Cli::try_parse_from(["crime_route"]).unwrap();
        assert!(cli.command.is_none());
    }
}
