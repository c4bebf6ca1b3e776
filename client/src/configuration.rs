use std::{path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use const_format::concatcp;
use trip_diary_data_management::{DATA_DIR, default_log_dir, default_store_dir, project_dir};
use trip_diary_lib::coordinate::Coordinate;

use crate::{controller::DEFAULT_LOOKUP_DEBOUNCE, simulator::SimulationSettings};

pub const CONFIG_FILE: &str = concatcp!(DATA_DIR, "trip_diary.conf");
pub const DEFAULT_GEOCODER_URL: &str = "https://nominatim.openstreetmap.org";
pub const USER_AGENT: &str = concat!("trip-diary/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line_number}: expected `key = value`, got {line:?}")]
    Syntax { line_number: usize, line: String },
    #[error("invalid value {value:?} for {key}")]
    Value { key: String, value: String },
}

#[derive(Parser, Debug, Default)]
#[command(name = "trip-diary")]
#[command(about = "Record trips from the terminal", long_about = None)]
pub struct Cli {
    /// Config file with `key = value` lines. Defaults to data/trip_diary.conf if it exists
    #[arg(long, env = "TRIP_DIARY_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "TRIP_DIARY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "TRIP_DIARY_GEOCODER_URL")]
    pub geocoder_url: Option<String>,

    /// Never contact the geocoder, name places by their coordinates
    #[arg(long)]
    pub offline: bool,

    /// Quiet period before a picked destination is looked up
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    #[arg(long)]
    pub sample_interval_ms: Option<u64>,

    #[arg(long)]
    pub fix_delay_ms: Option<u64>,

    /// Chance in [0, 1] that a simulated position read fails
    #[arg(long)]
    pub error_rate: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub start_lat: Option<f64>,

    #[arg(long, allow_negative_numbers = true)]
    pub start_lon: Option<f64>,

    /// Replay a GPX track instead of simulating movement
    #[arg(long, env = "TRIP_DIARY_REPLAY")]
    pub replay: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,

    pub geocoder_url: String,
    pub user_agent: String,
    pub offline: bool,
    pub geocode_timeout: Duration,
    pub lookup_debounce: Duration,

    pub simulation: SimulationSettings,
    pub replay: Option<PathBuf>,

    /// File the settings were read from, if any
    pub source: Option<PathBuf>,
    /// Keys in the file that mean nothing to us. Kept until logging is up.
    pub unknown_keys: Vec<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            data_dir: default_store_dir(),
            log_dir: default_log_dir(),
            geocoder_url: DEFAULT_GEOCODER_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
            offline: false,
            geocode_timeout: Duration::from_secs(10),
            lookup_debounce: DEFAULT_LOOKUP_DEBOUNCE,
            simulation: SimulationSettings::default(),
            replay: None,
            source: None,
            unknown_keys: Vec::new(),
        }
    }
}

impl Configuration {
    /// Config file (if any) first, then command line flags on top.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let mut configuration = Self::default();

        let (path, required) = match &cli.config {
            Some(path) => (path.clone(), true),
            None => (project_dir(CONFIG_FILE), false),
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                configuration.apply_file(&text)?;
                configuration.source = Some(path);
            }
            Err(err) if !required && err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(ConfigError::Read { path, source }),
        }

        configuration.apply_cli(cli);
        Ok(configuration)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut configuration = Self::default();
        configuration.apply_file(text)?;
        Ok(configuration)
    }

    fn apply_file(&mut self, text: &str) -> Result<(), ConfigError> {
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(ConfigError::Syntax {
                    line_number: index + 1,
                    line: line.to_string(),
                });
            };
            let key = key.trim();
            let value = value.trim();

            match key {
                "data_dir" => self.data_dir = PathBuf::from(value),
                "log_dir" => self.log_dir = PathBuf::from(value),
                "geocoder_url" => self.geocoder_url = value.to_string(),
                "user_agent" => self.user_agent = value.to_string(),
                "offline" => self.offline = parse_value(key, value)?,
                "geocode_timeout_ms" => self.geocode_timeout = Duration::from_millis(parse_value(key, value)?),
                "lookup_debounce_ms" => self.lookup_debounce = Duration::from_millis(parse_value(key, value)?),
                "sample_interval_ms" => self.simulation.sample_interval = Duration::from_millis(parse_value(key, value)?),
                "fix_delay_ms" => self.simulation.fix_delay = Duration::from_millis(parse_value(key, value)?),
                "error_rate" => self.simulation.error_rate = parse_value(key, value)?,
                "start_lat" => self.simulation.start.lat = parse_value(key, value)?,
                "start_lon" => self.simulation.start.lon = parse_value(key, value)?,
                "replay" => self.replay = Some(PathBuf::from(value)),
                _ => self.unknown_keys.push(key.to_string()),
            }
        }

        Ok(())
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(data_dir) = &cli.data_dir {
            self.data_dir = data_dir.clone();
        }
        if let Some(geocoder_url) = &cli.geocoder_url {
            self.geocoder_url = geocoder_url.clone();
        }
        self.offline |= cli.offline;
        if let Some(debounce_ms) = cli.debounce_ms {
            self.lookup_debounce = Duration::from_millis(debounce_ms);
        }
        if let Some(sample_interval_ms) = cli.sample_interval_ms {
            self.simulation.sample_interval = Duration::from_millis(sample_interval_ms);
        }
        if let Some(fix_delay_ms) = cli.fix_delay_ms {
            self.simulation.fix_delay = Duration::from_millis(fix_delay_ms);
        }
        if let Some(error_rate) = cli.error_rate {
            self.simulation.error_rate = error_rate;
        }
        if let Some(lat) = cli.start_lat {
            self.simulation.start.lat = lat;
        }
        if let Some(lon) = cli.start_lon {
            self.simulation.start.lon = lon;
        }
        if let Some(replay) = &cli.replay {
            self.replay = Some(replay.clone());
        }

        self.simulation.error_rate = self.simulation.error_rate.clamp(0., 1.);
    }

    /// Reports where the settings came from. Loading happens before the
    /// subscriber exists, so this is called once it does.
    pub fn log_summary(&self) {
        match &self.source {
            Some(path) => tracing::info!("Read configuration from {:?}", path),
            None => tracing::info!("No configuration file, using defaults"),
        }
        for key in &self.unknown_keys {
            tracing::warn!("Unknown config key: {}", key);
        }
    }

    pub fn start(&self) -> Coordinate {
        self.simulation.start
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Value {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[test]
fn parses_config_file() {
    let configuration = Configuration::parse(
        "
        # Simulated walk around the harbour
        geocoder_url = http://localhost:8080/nominatim?key=abc
        lookup_debounce_ms = 250
        start_lat = 56.15
        start_lon = -10.2
        error_rate=0.1
        offline = true
        colour = blue
        ",
    )
    .unwrap();

    assert_eq!(configuration.geocoder_url, "http://localhost:8080/nominatim?key=abc");
    assert_eq!(configuration.lookup_debounce, Duration::from_millis(250));
    assert_eq!(configuration.start(), Coordinate::new(56.15, -10.2));
    assert_eq!(configuration.simulation.error_rate, 0.1);
    assert!(configuration.offline);
    assert_eq!(configuration.replay, None);
    assert_eq!(configuration.unknown_keys, vec!["colour"]);
}

#[test]
fn rejects_bad_lines_and_values() {
    assert!(matches!(
        Configuration::parse("offline"),
        Err(ConfigError::Syntax { line_number: 1, .. })
    ));
    assert!(matches!(
        Configuration::parse("\nfix_delay_ms = soon"),
        Err(ConfigError::Value { .. })
    ));
}

#[test]
fn command_line_wins_over_file() {
    let mut configuration = Configuration::parse("lookup_debounce_ms = 250\nerror_rate = 0.2").unwrap();

    let cli = Cli::parse_from(["trip-diary", "--debounce-ms", "40", "--error-rate", "3", "--start-lat", "-33.9"]);
    configuration.apply_cli(&cli);

    assert_eq!(configuration.lookup_debounce, Duration::from_millis(40));
    assert_eq!(configuration.simulation.error_rate, 1.);
    assert_eq!(configuration.simulation.start.lat, -33.9);
}

#[test]
fn load_remembers_the_file_and_its_unknown_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trip_diary.conf");
    std::fs::write(&path, "colour = blue\noffline = true\nspeed = 3\n").unwrap();

    let cli = Cli {
        config: Some(path.clone()),
        ..Default::default()
    };
    let configuration = Configuration::load(&cli).unwrap();

    assert!(configuration.offline);
    assert_eq!(configuration.source, Some(path));
    assert_eq!(configuration.unknown_keys, vec!["colour", "speed"]);

    let missing = Cli {
        config: Some(dir.path().join("missing.conf")),
        ..Default::default()
    };
    assert!(matches!(Configuration::load(&missing), Err(ConfigError::Read { .. })));
}
