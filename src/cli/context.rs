use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::output::OutputFormat;
use crate::config::Config;

pub struct CliContext {
    config: Arc<Config>,
    config_path: Option<PathBuf>,
    output: OutputFormat,
}

impl CliContext {
    pub fn new(config: Config, config_path: Option<PathBuf>, output: OutputFormat) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            output,
        }
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    /// File the configuration was read from; `None` when defaults are in use.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    pub fn output(&self) -> &OutputFormat {
        &self.output
    }
}
