//! Plugin configuration
//!
//! The host hands init a configuration locator. An empty locator selects [`Config::default`];
//! anything else names a JSON file such as:
//!
//! ```json
//! {
//!     "name": "edge-counter",
//!     "max_batch": 256,
//!     "prefetch": true,
//!     "log_filter": "vpp_plugin_bridge=debug"
//! }
//! ```
//!
//! Every field is optional and unknown fields are rejected.

use std::{fs::File, io::BufReader, path::Path};

use serde::Deserialize;

use crate::{vlib::FRAME_SIZE, Error};

/// Parsed plugin configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Name the plugin reports in log events
    pub name: String,
    /// Largest batch accepted by process-batch
    ///
    /// Defaults to the VPP frame size.
    pub max_batch: usize,
    /// Prefetch the next buffer while processing the current one
    pub prefetch: bool,
    /// When set, install a `tracing` subscriber with this filter directive
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "vpp-plugin".to_string(),
            max_batch: FRAME_SIZE,
            prefetch: true,
            log_filter: None,
        }
    }
}

impl Config {
    /// Loads the configuration named by a locator
    ///
    /// An empty locator yields the defaults, otherwise the locator is the path of a JSON file.
    pub fn load(locator: &str) -> Result<Self, Error> {
        if locator.is_empty() {
            return Ok(Self::default());
        }
        let path = Path::new(locator);
        let file = File::open(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file))?;
        config.validated()
    }

    /// Parses and validates a configuration from a JSON string
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validated()
    }

    fn validated(self) -> Result<Self, Error> {
        if self.name.is_empty() {
            return Err(Error::InvalidConfig("name must not be empty".to_string()));
        }
        // Batch results are returned as a C int
        if self.max_batch == 0 || self.max_batch > i32::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "max_batch must be between 1 and {}, got {}",
                i32::MAX,
                self.max_batch
            )));
        }
        Ok(self)
    }
}
