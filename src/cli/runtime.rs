use std::path::PathBuf;

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Logs go to stderr so structured output on stdout stays parseable.
pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_string())),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

/// Resolves the configuration file: `--config`, then `./config/config.yaml`, then
/// `<config dir>/tabflow/config.yaml`. Defaults apply when none exists.
pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let candidates = match config_path {
        Some(path) => vec![path.clone()],
        None => {
            let mut candidates = vec![PathBuf::from("config/config.yaml")];
            if let Some(mut path) = dirs::config_dir() {
                path.push("tabflow");
                path.push("config.yaml");
                candidates.push(path);
            }
            candidates
        }
    };

    for path in candidates {
        if !path.exists() {
            if config_path.is_some() {
                warn!("Config file not found, using defaults: {}", path.display());
            }
            continue;
        }
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        info!("Loaded configuration from: {}", path.display());
        return Ok(LoadedConfig {
            config,
            path: Some(path),
        });
    }

    Ok(LoadedConfig {
        config: Config::default(),
        path: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn explicit_config_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabflow.yaml");
        std::fs::write(&path, "default_timeout_secs: 9\noutput_dir: shots\n").unwrap();

        let loaded = load_config(Some(&path)).await.unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
        assert_eq!(loaded.config.default_timeout_secs, 9);
        assert_eq!(loaded.config.output_dir, PathBuf::from("shots"));
    }

    #[tokio::test]
    async fn missing_explicit_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let loaded = load_config(Some(&path)).await.unwrap();
        assert!(loaded.path.is_none());
        assert_eq!(loaded.config.default_timeout_secs, 120);
    }

    #[tokio::test]
    async fn malformed_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "default_timeout_secs: [not, a, number]\n").unwrap();
        assert!(load_config(Some(&path)).await.is_err());
    }
}
