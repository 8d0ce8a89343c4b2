//! Application configuration
//!
//! Loaded from YAML; every field has a default so partial files are fine.

use std::path::PathBuf;
use std::time::Duration;

use action_locator::RacePolicy;
use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserSettings,
    /// Step timeout used when a plan sets none
    pub default_timeout_secs: u64,
    pub race: RaceSettings,
    /// Base directory for screenshots with relative or derived names
    pub output_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub executable: Option<PathBuf>,
    /// Attach to a running browser instead of launching one
    pub ws_endpoint: Option<String>,
    pub window_size: Option<WindowSize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RaceSettings {
    pub widen_per_retry_ms: u64,
    pub poll_interval_ms: u64,
    pub settle_diff: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserSettings::default(),
            default_timeout_secs: 120,
            race: RaceSettings::default(),
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            ws_endpoint: None,
            window_size: None,
        }
    }
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            widen_per_retry_ms: 1000,
            poll_interval_ms: 100,
            settle_diff: 0.1,
        }
    }
}

impl Config {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn race_policy(&self) -> RacePolicy {
        RacePolicy {
            widen_per_retry: Duration::from_millis(self.race.widen_per_retry_ms),
            poll_interval: Duration::from_millis(self.race.poll_interval_ms.max(1)),
            settle_diff: self.race.settle_diff,
        }
    }

    /// Driver settings; an unset executable keeps the detected one.
    pub fn cdp_config(&self) -> CdpConfig {
        let mut cdp = CdpConfig::default();
        cdp.headless = self.browser.headless;
        if let Some(executable) = &self.browser.executable {
            cdp.executable = Some(executable.clone());
        }
        cdp.websocket_url = self.browser.ws_endpoint.clone();
        cdp.window_size = self
            .browser
            .window_size
            .map(|size| (size.width, size.height));
        cdp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "browser:\n  headless: false\n  window_size: { width: 1280, height: 720 }\nrace:\n  poll_interval_ms: 50\n",
        )
        .unwrap();
        assert!(!config.browser.headless);
        assert_eq!(config.default_timeout(), Duration::from_secs(120));
        assert_eq!(config.race_policy().poll_interval, Duration::from_millis(50));
        assert_eq!(config.race_policy().widen_per_retry, Duration::from_secs(1));

        let cdp = config.cdp_config();
        assert!(!cdp.headless);
        assert_eq!(cdp.window_size, Some((1280, 720)));
        assert!(cdp.websocket_url.is_none());
    }
}
