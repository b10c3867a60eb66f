//! Loader configuration

use std::time::Duration;

use cx_core::{DatasetError, Result};
use serde::{Deserialize, Serialize};

/// Configuration applied to every source load
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Per-fetch timeout in humantime form ("30s", "2m"). No timeout when unset.
    #[serde(default)]
    pub fetch_timeout: Option<String>,
}

impl LoaderConfig {
    /// Configuration with a fixed fetch timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            fetch_timeout: Some(humantime::format_duration(timeout).to_string()),
        }
    }

    /// Parsed fetch timeout
    pub fn fetch_timeout(&self) -> Result<Option<Duration>> {
        self.fetch_timeout
            .as_deref()
            .map(|text| {
                humantime::parse_duration(text).map_err(|e| {
                    DatasetError::config(format!("invalid fetch timeout '{}': {}", text, e))
                })
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_timeout() {
        assert_eq!(LoaderConfig::default().fetch_timeout().unwrap(), None);
    }

    #[test]
    fn test_parse_timeout() {
        let config: LoaderConfig = serde_json::from_str(r#"{"fetch_timeout": "1m 30s"}"#).unwrap();
        assert_eq!(config.fetch_timeout().unwrap(), Some(Duration::from_secs(90)));

        let config = LoaderConfig::with_timeout(Duration::from_millis(250));
        assert_eq!(config.fetch_timeout().unwrap(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_invalid_timeout() {
        let config = LoaderConfig {
            fetch_timeout: Some("soon".to_string()),
        };
        assert!(config.fetch_timeout().is_err());
    }
}
