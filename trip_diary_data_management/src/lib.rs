use std::path::PathBuf;

use const_format::concatcp;

mod data_manager;
pub mod file_store;
pub mod gpx_util;
pub mod schema;
pub mod store;

pub use data_manager::*;
pub use file_store::FileStore;
pub use store::{KeyValueStore, MemoryStore};

pub const DATA_DIR: &str = "data/";
pub const STORE_DIR: &str = concatcp!(DATA_DIR, "store");
pub const LOG_DIR: &str = concatcp!(DATA_DIR, "log");

pub const KEY_PREFIX: &str = "trip-diary";
pub const CONSENT_KEY: &str = concatcp!(KEY_PREFIX, "-consent");
pub const TRIPS_KEY: &str = concatcp!(KEY_PREFIX, "-trips");
pub const ACTIVE_TRIP_KEY: &str = concatcp!(KEY_PREFIX, "-active-trip");

#[derive(Debug, thiserror::Error)]
pub enum DataManagerError {
    #[error("store: {0}")]
    Store(String),
    #[error("failed to encode {key}: {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("refusing to store {key}: it holds a non-finite coordinate")]
    NonFinite { key: &'static str },
    #[error("gpx: {0}")]
    Gpx(String),
}

/// Directory under the project root, or under the working directory when
/// there is no project root to be found.
pub fn project_dir(relative: &str) -> PathBuf {
    let root = project_root::get_project_root().unwrap_or_else(|_| PathBuf::from("."));
    root.join(relative)
}

pub fn default_store_dir() -> PathBuf {
    project_dir(STORE_DIR)
}

pub fn default_log_dir() -> PathBuf {
    project_dir(LOG_DIR)
}
