use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use jobdeck_client::TransportSettings;
use jobdeck_core::PollPolicy;
use serde::{Deserialize, Serialize};

use super::logging::LogDestination;

pub(crate) const DEFAULT_CONFIG_FILE: &str = "jobdeck.ron";

/// Console settings read from a RON file. Every field is optional in the
/// file; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ConsoleConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub request_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub max_consecutive_failures: Option<u32>,
    pub cache_dir: PathBuf,
    pub log: LogDestination,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        let transport = TransportSettings::default();
        let policy = PollPolicy::default();
        Self {
            base_url: transport.base_url,
            token: None,
            request_timeout_ms: duration_ms(transport.request_timeout),
            poll_interval_ms: duration_ms(policy.interval),
            max_consecutive_failures: policy.max_consecutive_failures,
            cache_dir: PathBuf::from(".jobdeck"),
            log: LogDestination::default(),
        }
    }
}

impl ConsoleConfig {
    pub(crate) fn transport_settings(&self) -> TransportSettings {
        TransportSettings {
            base_url: self.base_url.clone(),
            token: self.token.clone().filter(|token| !token.is_empty()),
            request_timeout: Duration::from_millis(self.request_timeout_ms.max(1)),
            ..TransportSettings::default()
        }
    }

    pub(crate) fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            max_consecutive_failures: self.max_consecutive_failures,
            ..PollPolicy::default()
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Reads the config file. `Ok(None)` when there is no file at `path`.
pub(crate) fn load_config(path: &Path) -> anyhow::Result<Option<ConsoleConfig>> {
    let content = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read config from {:?}", path))
        }
    };
    let config = ron::from_str(&content)
        .with_context(|| format!("failed to parse config from {:?}", path))?;
    Ok(Some(config))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(&dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(loaded, None);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(
            &path,
            r#"(base_url: "https://media.example.com/api/admin", poll_interval_ms: 1500, log: Both)"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap().unwrap();
        assert_eq!(config.base_url, "https://media.example.com/api/admin");
        assert_eq!(config.log, LogDestination::Both);
        assert_eq!(config.poll_policy().interval, Duration::from_millis(1500));
        assert_eq!(config.request_timeout_ms, 6_000);
        assert_eq!(config.cache_dir, PathBuf::from(".jobdeck"));
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, "(base_url: 42").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("failed to parse config"));
    }

    #[test]
    fn empty_token_is_not_sent() {
        let config = ConsoleConfig {
            token: Some(String::new()),
            ..ConsoleConfig::default()
        };
        assert_eq!(config.transport_settings().token, None);
        assert_eq!(
            config.transport_settings().request_timeout,
            Duration::from_secs(6)
        );
    }
}
