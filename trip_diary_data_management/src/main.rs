use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trip_diary_data_management::{DataManager, default_store_dir, gpx_util};
use trip_diary_lib::trip::TransportMode;

// CLI for manual data operations
#[derive(Parser)]
#[command(name = "trip-diary-data")]
#[command(about = "Inspect and repair the stored trip diary", long_about = None)]
struct Cli {
    /// Store directory, defaults to data/store under the project root
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all completed trips, newest first
    List,
    /// Print a trip as JSON
    Show { trip_id: i64 },
    /// Write a trip's path to a GPX file
    ExportGpx { trip_id: i64, gpx_file: PathBuf },
    /// Set the stored consent flag
    Consent {
        #[arg(action = clap::ArgAction::Set)]
        granted: bool,
    },
    /// Discard a stuck in-progress trip. BE CAREFUL
    DropActive,
    /// Totals over the whole history
    Stats,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info,trip_diary_data_management=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let store_dir = cli.data_dir.unwrap_or_else(default_store_dir);
    let mut data_manager = DataManager::open(&store_dir).context("Failed to open store")?;
    let mut state = data_manager.load();

    match cli.command {
        Commands::List => {
            if state.trips.is_empty() {
                println!("No trips recorded yet.");
            }
            for trip in &state.trips {
                println!("{}\t{}", trip.id, trip.summary());
            }
            if let Some(active) = &state.active_trip {
                println!("In progress: {} from {} with {} points", active.id, active.origin, active.path.len());
            }
        }
        Commands::Show { trip_id } => {
            let Some(trip) = state.trips.iter().find(|trip| trip.id == trip_id) else {
                bail!("No trip with id {trip_id}");
            };
            println!("{}", serde_json::to_string_pretty(trip)?);
        }
        Commands::ExportGpx { trip_id, gpx_file } => {
            let Some(trip) = state.trips.iter().find(|trip| trip.id == trip_id) else {
                bail!("No trip with id {trip_id}");
            };
            gpx_util::export_trip_gpx(trip, &gpx_file)?;
            tracing::info!("Exported trip {} to {:?}", trip_id, gpx_file);
        }
        Commands::Consent { granted } => {
            state.consent = granted;
            data_manager.save(&state)?;
        }
        Commands::DropActive => {
            match state.active_trip.take() {
                Some(active) => {
                    tracing::warn!("Dropping active trip {} with {} points", active.id, active.path.len());
                    data_manager.save(&state)?;
                }
                None => println!("No trip in progress."),
            }
        }
        Commands::Stats => {
            let total_km: f64 = state.trips.iter().map(|trip| trip.distance).sum();
            let total_minutes: i64 = state.trips.iter().map(|trip| trip.duration_minutes()).sum();

            let mut per_mode: BTreeMap<&str, (usize, f64)> = BTreeMap::new();
            for trip in &state.trips {
                let entry = per_mode.entry(trip.mode.label()).or_default();
                entry.0 += 1;
                entry.1 += trip.distance;
            }

            println!("{} trips, {:.2} km, {} min", state.trips.len(), total_km, total_minutes);
            for mode in TransportMode::ALL {
                if let Some((count, km)) = per_mode.get(mode.label()) {
                    println!("  {:<14}{:>4} trips {:>10.2} km", mode.label(), count, km);
                }
            }
        }
    }

    Ok(())
}
