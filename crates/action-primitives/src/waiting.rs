//! Built-in waiting mechanisms for action primitives

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{PageDriver, PageHandle};
use tracing::debug;

use crate::{errors::ActionError, types::WaitTier};

/// Waiting strategy trait
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// Block until `page` reaches `tier` or `timeout` elapses
    async fn wait(
        &self,
        driver: Arc<dyn PageDriver>,
        page: &PageHandle,
        tier: WaitTier,
        timeout: Duration,
    ) -> Result<(), ActionError>;
}

/// Default waiting strategy implementation
#[derive(Debug, Clone)]
pub struct DefaultWaitStrategy {
    /// Relative DOM change tolerated by the `Settled` tier
    pub settle_diff: f64,
}

impl Default for DefaultWaitStrategy {
    fn default() -> Self {
        Self { settle_diff: 0.1 }
    }
}

impl DefaultWaitStrategy {
    pub fn new(settle_diff: f64) -> Self {
        Self { settle_diff }
    }
}

#[async_trait]
impl WaitStrategy for DefaultWaitStrategy {
    async fn wait(
        &self,
        driver: Arc<dyn PageDriver>,
        page: &PageHandle,
        tier: WaitTier,
        timeout: Duration,
    ) -> Result<(), ActionError> {
        match tier {
            WaitTier::None => {
                debug!("WaitTier::None - no waiting");
                Ok(())
            }

            WaitTier::Loaded => {
                debug!(page = %page, "WaitTier::Loaded - waiting for load");
                driver.wait_loaded(page, timeout).await?;
                Ok(())
            }

            WaitTier::Settled => {
                debug!(page = %page, diff = self.settle_diff, "WaitTier::Settled - waiting for a stable DOM");
                driver.wait_loaded(page, timeout).await?;
                driver
                    .wait_dom_stable(page, self.settle_diff, timeout)
                    .await?;
                Ok(())
            }
        }
    }
}
