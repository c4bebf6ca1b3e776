use std::{fs::OpenOptions, sync::Arc};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};
use trip_diary::{
    configuration::{Cli, Configuration},
    console,
    controller::TripController,
    dispatcher::{AppMessage, Dispatcher},
    geocoding::{Geocoder, NominatimGeocoder, OfflineGeocoder},
    map_view::TerminalMap,
    position::PositionSource,
    replay::GpxPositionSource,
    simulator::SimulatedPositionSource,
};
use trip_diary_data_management::DataManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let configuration = Configuration::load(&cli).context("Failed to load configuration")?;

    std::fs::create_dir_all(&configuration.log_dir).context("Failed to create log directory")?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(configuration.log_dir.join("trip_diary.log"))
        .context("Failed to open log file")?;

    // The terminal is shared with the prompt, so only warnings go there
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace,trip_diary_data_management=debug", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(LevelFilter::WARN))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(log_file))
        .init();

    configuration.log_summary();
    tracing::info!("Starting trip diary with {:?}", configuration);

    let data_manager = DataManager::open(&configuration.data_dir).context("Failed to open store")?;
    let controller = TripController::load(&data_manager, configuration.lookup_debounce);

    let source: Arc<dyn PositionSource> = match &configuration.replay {
        Some(path) => Arc::new(GpxPositionSource::open(path, configuration.simulation.sample_interval)?),
        None => Arc::new(SimulatedPositionSource::new(configuration.simulation.clone())),
    };

    let geocoder: Arc<dyn Geocoder> = if configuration.offline {
        Arc::new(OfflineGeocoder)
    } else {
        Arc::new(NominatimGeocoder::new(
            &configuration.geocoder_url,
            &configuration.user_agent,
            configuration.geocode_timeout,
        )?)
    };

    let dispatcher = Dispatcher::new(controller, data_manager, source, geocoder, Box::new(TerminalMap::new()));

    let input = tokio::io::BufReader::new(tokio::io::stdin());
    let tx = dispatcher.sender();
    tokio::spawn(async move {
        if let Err(err) = console::read_commands(input, tx.clone()).await {
            tracing::error!("Console failed: {}", err);
            let _ = tx.send(AppMessage::Shutdown);
        }
    });

    println!("Trip diary. Type `help` for commands.");
    dispatcher.run().await;

    tracing::info!("Bye");
    Ok(())
}
