//! Port configuration loaded from YAML
//!
//! Every field except `name` is optional:
//!
//! ```yaml
//! name: dataFloat_in
//! queue_threshold: 50
//! blocking: true
//! routes:
//!   - stream_id: tone
//!     connection_id: conn-1
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PortError;
use crate::port::{DEFAULT_QUEUE_THRESHOLD, MAX_TRANSFER_BYTES, StreamRoute};

/// Settings for one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    pub name: String,
    /// Bits per element for throughput statistics; the element type's size when unset
    pub bits_per_element: Option<f64>,
    pub statistics_enabled: bool,
    pub queue_threshold: usize,
    pub max_transfer_bytes: usize,
    pub blocking: bool,
    pub poll_interval_ms: u64,
    /// Output stream routing; empty sends every stream to every connection
    pub routes: Vec<StreamRoute>,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            bits_per_element: None,
            statistics_enabled: true,
            queue_threshold: DEFAULT_QUEUE_THRESHOLD,
            max_transfer_bytes: MAX_TRANSFER_BYTES,
            blocking: false,
            poll_interval_ms: 1000,
            routes: Vec::new(),
        }
    }
}

impl PortConfig {
    /// Default settings for a named port.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PortConfig = serde_yaml_ng::from_str(yaml).map_err(|e| PortError::Config {
            context: "Port configuration".to_string(),
            details: format!("YAML parsing failed: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| PortError::config_file(path.to_path_buf(), e))?;
        debug!(path = %path.display(), bytes = yaml.len(), "Loaded port configuration");
        Self::from_yaml(&yaml)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.name.trim().is_empty() {
            return Err(PortError::invalid_config("name", "Port name must not be empty"));
        }
        if self.queue_threshold == 0 {
            return Err(PortError::invalid_config("queue_threshold", "Queue threshold must be at least 1"));
        }
        if self.max_transfer_bytes == 0 {
            return Err(PortError::invalid_config("max_transfer_bytes", "Transfer ceiling must be positive"));
        }
        if let Some(bits) = self.bits_per_element {
            if !(bits.is_finite() && bits > 0.0) {
                return Err(PortError::invalid_config(
                    "bits_per_element",
                    format!("Bits per element must be positive, got {}", bits),
                ));
            }
        }
        if self.poll_interval_ms == 0 {
            return Err(PortError::invalid_config("poll_interval_ms", "Poll interval must be positive"));
        }
        if let Some(route) = self.routes.iter().find(|route| route.stream_id.is_empty() || route.connection_id.is_empty()) {
            return Err(PortError::invalid_config(
                "routes",
                format!("Route needs both a stream and a connection, got {:?}", route),
            ));
        }
        Ok(())
    }

    /// Bits per element, falling back to the size of `T`.
    pub fn bits_for<T>(&self) -> f64 {
        self.bits_per_element.unwrap_or((std::mem::size_of::<T>() * 8) as f64)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn minimal_yaml_uses_defaults() {
        let config = PortConfig::from_yaml("name: dataShort_out\n").unwrap();
        assert_eq!(config, PortConfig::named("dataShort_out"));
        assert_eq!(config.queue_threshold, 100);
        assert_eq!(config.max_transfer_bytes, 2 * 1024 * 1024);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.bits_for::<i16>(), 16.0);
    }

    #[test]
    fn explicit_values_override_defaults() {
        let yaml = "name: in\nbits_per_element: 12\nqueue_threshold: 5\nblocking: true\nstatistics_enabled: false\n";
        let config = PortConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.bits_for::<i16>(), 12.0);
        assert_eq!(config.queue_threshold, 5);
        assert!(config.blocking);
        assert!(!config.statistics_enabled);
    }

    #[test]
    fn zero_threshold_fails_validation() {
        let error = PortConfig::from_yaml("name: in\nqueue_threshold: 0\n").unwrap_err();
        let port_error = error.downcast_ref::<PortError>().unwrap();
        assert!(matches!(port_error, PortError::Config { context, .. } if context == "queue_threshold"));
        assert!(error.to_string().contains("Queue threshold must be at least 1"));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let error = PortConfig::from_yaml("name: [unclosed\n").unwrap_err();
        assert!(matches!(error.downcast_ref::<PortError>(), Some(PortError::Config { .. })));
    }

    #[test]
    fn routes_parse_and_validate() {
        let yaml = "name: out\nroutes:\n  - stream_id: tone\n    connection_id: conn-1\n";
        let config = PortConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.routes, [StreamRoute::new("tone", "conn-1")]);

        let error = PortConfig::from_yaml("name: out\nroutes:\n  - stream_id: tone\n    connection_id: ''\n").unwrap_err();
        assert!(matches!(error.downcast_ref::<PortError>(), Some(PortError::Config { context, .. }) if context == "routes"));
    }

    #[test]
    fn missing_name_fails_validation() {
        assert!(PortConfig::from_yaml("queue_threshold: 10\n").is_err());
        assert!(PortConfig::default().validate().is_err());
    }

    #[test]
    fn load_reads_file_and_reports_missing_path() {
        let path = std::env::temp_dir().join(format!("sigport-config-{}.yaml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "name: from_file\nmax_transfer_bytes: 4096").unwrap();
        drop(file);

        let config = PortConfig::load(&path).unwrap();
        assert_eq!(config.name, "from_file");
        assert_eq!(config.max_transfer_bytes, 4096);
        std::fs::remove_file(&path).unwrap();

        let missing = PortConfig::load(&path).unwrap_err();
        assert!(matches!(missing.downcast_ref::<PortError>(), Some(PortError::ConfigFile { .. })));
    }
}
