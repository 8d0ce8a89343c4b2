//! Core types for the race resolver

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cdp_adapter::{DriverError, ElementHandle, PageDriver, PageHandle, Scope};
use serde::{Deserialize, Serialize};

/// Whether a candidate stands for an acceptable outcome or a recognized failure state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateKind {
    Success,
    Failure,
}

impl CandidateKind {
    pub fn name(&self) -> &'static str {
        match self {
            CandidateKind::Success => "success",
            CandidateKind::Failure => "failure",
        }
    }
}

/// Decision taken once a candidate was located
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The race ends with this element
    Accept,
    /// Reload and run another attempt
    Retry,
    /// The race ends with an error
    Reject(String),
}

/// Remaining reload-and-retry attempts of one race, shared by the failure resolvers and
/// the timeout path.
#[derive(Debug)]
pub struct RetryBudget {
    total: u32,
    remaining: AtomicU32,
}

impl RetryBudget {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            remaining: AtomicU32::new(total),
        }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::SeqCst)
    }

    pub fn consumed(&self) -> u32 {
        self.total - self.remaining()
    }

    /// Takes one attempt from the budget. Returns `false` when it was already empty.
    pub fn consume(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

/// Tunables of the race loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RacePolicy {
    /// Extra time granted per consumed retry, since later attempts follow a reload
    pub widen_per_retry: Duration,
    /// Delay between two probes of the same candidate
    pub poll_interval: Duration,
    /// Relative DOM change tolerated when waiting for the page to settle after a reload
    pub settle_diff: f64,
}

impl Default for RacePolicy {
    fn default() -> Self {
        Self {
            widen_per_retry: Duration::from_secs(1),
            poll_interval: cdp_adapter::POLL_INTERVAL,
            settle_diff: 0.1,
        }
    }
}

impl RacePolicy {
    /// Per-attempt timeout once `consumed` retries were used.
    pub fn attempt_timeout(&self, base: Duration, consumed: u32) -> Duration {
        base + self.widen_per_retry * consumed
    }
}

/// Non-blocking existence check of one candidate
#[async_trait]
pub trait Probe: Send + Sync {
    async fn locate(
        &self,
        driver: &dyn PageDriver,
        page: &PageHandle,
    ) -> Result<Option<ElementHandle>, DriverError>;
}

/// Probe matching a selector anywhere in the page
#[derive(Debug, Clone)]
pub struct SelectorProbe {
    pub selector: String,
}

impl SelectorProbe {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
        }
    }
}

#[async_trait]
impl Probe for SelectorProbe {
    async fn locate(
        &self,
        driver: &dyn PageDriver,
        page: &PageHandle,
    ) -> Result<Option<ElementHandle>, DriverError> {
        driver.locate(Scope::Page(page), &self.selector).await
    }
}

/// Decides what happens once a candidate was located.
pub type Resolver = Arc<dyn Fn(&ElementHandle, &RetryBudget) -> Verdict + Send + Sync>;

/// One arm of a race
#[derive(Clone)]
pub struct RaceCandidate {
    pub selector_key: String,
    pub kind: CandidateKind,
    pub probe: Arc<dyn Probe>,
    pub resolve: Resolver,
}

impl RaceCandidate {
    pub fn new(
        selector_key: impl Into<String>,
        kind: CandidateKind,
        probe: Arc<dyn Probe>,
        resolve: Resolver,
    ) -> Self {
        Self {
            selector_key: selector_key.into(),
            kind,
            probe,
            resolve,
        }
    }

    /// Success candidate on a plain selector: accepting ends the race.
    pub fn success(selector: impl Into<String>) -> Self {
        let selector = selector.into();
        Self::new(
            selector.clone(),
            CandidateKind::Success,
            Arc::new(SelectorProbe::new(selector)),
            Arc::new(|_: &ElementHandle, _: &RetryBudget| Verdict::Accept),
        )
    }

    /// Failure candidate on a plain selector: each sighting spends one retry, the race
    /// fails once the budget is gone.
    pub fn failure(selector: impl Into<String>) -> Self {
        let selector = selector.into();
        let key = selector.clone();
        Self::new(
            selector.clone(),
            CandidateKind::Failure,
            Arc::new(SelectorProbe::new(selector)),
            Arc::new(move |_: &ElementHandle, budget: &RetryBudget| {
                budget.consume();
                if budget.remaining() > 0 {
                    Verdict::Retry
                } else {
                    Verdict::Reject(format!("failed to find element: {}", key))
                }
            }),
        )
    }
}

impl fmt::Debug for RaceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaceCandidate")
            .field("selector_key", &self.selector_key)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Winning candidate of a race
#[derive(Debug, Clone, PartialEq)]
pub struct RaceOutcome {
    pub selector_key: String,
    pub kind: CandidateKind,
    pub element: ElementHandle,
    /// Retries spent before the race resolved
    pub retries_used: u32,
}
