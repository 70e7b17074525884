//! Runtime settings shared by the library and the command line.

use std::path::PathBuf;

/// Largest number of tracks a document holds at once.
pub const DEFAULT_CAPACITY: usize = 40;

/// File name of the GPX 1.1 schema inside the data directory.
pub const SCHEMA_FILE: &str = "gpx.xsd";

pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Value of the `creator` attribute on documents we write.
pub const CREATOR: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Directory holding `gpx.xsd`.
    pub data_dir: PathBuf,
    pub capacity: usize,
    /// IANA zone the photos' clocks were set to.
    pub timezone: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            data_dir: PathBuf::from("."),
            capacity: DEFAULT_CAPACITY,
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

impl Settings {
    pub fn schema_path(&self) -> PathBuf {
        self.data_dir.join(SCHEMA_FILE)
    }
}
