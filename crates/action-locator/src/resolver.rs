//! Race resolver: first of several candidates wins, bounded retries through reloads

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use action_primitives::{DefaultWaitStrategy, WaitStrategy, WaitTier};
use cdp_adapter::{ElementHandle, PageDriver, PageHandle};
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::{errors::LocatorError, types::*};

/// Runs races against one page driver
pub struct RaceResolver {
    driver: Arc<dyn PageDriver>,
    wait_strategy: Arc<dyn WaitStrategy>,
    policy: RacePolicy,
}

impl RaceResolver {
    pub fn new(driver: Arc<dyn PageDriver>, policy: RacePolicy) -> Self {
        Self {
            driver,
            wait_strategy: Arc::new(DefaultWaitStrategy::new(policy.settle_diff)),
            policy,
        }
    }

    /// Replace the strategy used to wait for the page after a reload
    pub fn with_wait_strategy(mut self, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        self.wait_strategy = wait_strategy;
        self
    }

    pub fn policy(&self) -> &RacePolicy {
        &self.policy
    }

    /// Race plain selectors: `success` selectors end the race, `failure` selectors spend
    /// the retry budget. Empty selectors are ignored. Every probe searches the whole of
    /// `page`, so a race under an element step still sees content outside that element.
    pub async fn race_element(
        &self,
        page: &PageHandle,
        success: &[String],
        failure: &[String],
        max_retries: u32,
        timeout: Duration,
    ) -> Result<RaceOutcome, LocatorError> {
        let non_empty = |selectors: &[String]| -> Vec<String> {
            selectors
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };
        let mut candidates = Vec::new();
        for selector in non_empty(success) {
            candidates.push(RaceCandidate::success(selector));
        }
        for selector in non_empty(failure) {
            candidates.push(RaceCandidate::failure(selector));
        }
        self.race(page, candidates, max_retries, timeout).await
    }

    /// Run a race.
    ///
    /// Every attempt either resolves the race or spends one unit of the retry budget,
    /// so at most `max_retries + 1` attempts run. The per-attempt timeout is `timeout`
    /// widened by [`RacePolicy::widen_per_retry`] for each spent retry.
    pub async fn race(
        &self,
        page: &PageHandle,
        candidates: Vec<RaceCandidate>,
        max_retries: u32,
        timeout: Duration,
    ) -> Result<RaceOutcome, LocatorError> {
        check_unique(&candidates)?;

        let budget = RetryBudget::new(max_retries);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let limit = self.policy.attempt_timeout(timeout, budget.consumed());
            debug!(
                page = %page,
                attempt,
                remaining = budget.remaining(),
                timeout_ms = limit.as_millis() as u64,
                "starting race attempt"
            );

            match self.race_once(page, &candidates, limit).await? {
                Some((index, element)) => {
                    let candidate = &candidates[index];
                    let before = budget.remaining();
                    let verdict = (candidate.resolve)(&element, &budget);
                    debug!(
                        selector = %candidate.selector_key,
                        kind = candidate.kind.name(),
                        verdict = ?verdict,
                        "candidate located"
                    );
                    match verdict {
                        Verdict::Reject(reason) => {
                            return Err(LocatorError::CandidateRejected(reason));
                        }
                        Verdict::Retry if candidate.kind == CandidateKind::Failure => {
                            // a resolver asking for a retry must pay for it
                            if budget.remaining() == before && !budget.consume() {
                                return Err(LocatorError::CandidateRejected(format!(
                                    "failed to find element: {}",
                                    candidate.selector_key
                                )));
                            }
                            warn!(
                                selector = %candidate.selector_key,
                                attempt,
                                remaining = budget.remaining(),
                                "failure candidate appeared, reloading"
                            );
                            self.reload(page, timeout).await?;
                        }
                        _ => {
                            info!(
                                selector = %candidate.selector_key,
                                attempt,
                                "race resolved"
                            );
                            return Ok(RaceOutcome {
                                selector_key: candidate.selector_key.clone(),
                                kind: candidate.kind,
                                element,
                                retries_used: budget.consumed(),
                            });
                        }
                    }
                }
                None => {
                    if !budget.consume() {
                        return Err(LocatorError::Timeout(format!(
                            "none of [{}] appeared within {}ms after {} attempt(s)",
                            keys(&candidates),
                            limit.as_millis(),
                            attempt
                        )));
                    }
                    warn!(
                        page = %page,
                        attempt,
                        remaining = budget.remaining(),
                        "no candidate appeared, reloading"
                    );
                    self.reload(page, timeout).await?;
                }
            }
        }
    }

    /// One attempt: a waiter per candidate, first located candidate wins, the other
    /// waiters are aborted. `None` means the deadline passed.
    async fn race_once(
        &self,
        page: &PageHandle,
        candidates: &[RaceCandidate],
        limit: Duration,
    ) -> Result<Option<(usize, ElementHandle)>, LocatorError> {
        let mut waiters = JoinSet::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let driver = Arc::clone(&self.driver);
            let probe = Arc::clone(&candidate.probe);
            let page = page.clone();
            let poll = self.policy.poll_interval;
            let key = candidate.selector_key.clone();
            waiters.spawn(async move {
                loop {
                    match probe.locate(driver.as_ref(), &page).await {
                        Ok(Some(element)) => return (index, element),
                        Ok(None) => {}
                        Err(err) => debug!(selector = %key, error = %err, "probe failed"),
                    }
                    sleep(poll).await;
                }
            });
        }

        let first = timeout(limit, async {
            while let Some(joined) = waiters.join_next().await {
                match joined {
                    Ok(found) => return Some(found),
                    Err(err) => warn!(error = %err, "race waiter stopped"),
                }
            }
            None
        })
        .await;
        waiters.abort_all();

        match first {
            Ok(Some(found)) => Ok(Some(found)),
            Ok(None) => Err(LocatorError::Internal(
                "every race waiter stopped without a result".to_string(),
            )),
            Err(_) => Ok(None),
        }
    }

    async fn reload(&self, page: &PageHandle, settle: Duration) -> Result<(), LocatorError> {
        let top = page.top();
        self.driver.reload(&top).await?;
        if let Err(err) = self
            .wait_strategy
            .wait(Arc::clone(&self.driver), &top, WaitTier::Settled, settle)
            .await
        {
            warn!(page = %top, error = %err, "page did not settle after reload");
        }
        Ok(())
    }
}

fn check_unique(candidates: &[RaceCandidate]) -> Result<(), LocatorError> {
    if candidates.is_empty() {
        return Err(LocatorError::Configuration(
            "race needs at least one candidate".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for candidate in candidates {
        let key = candidate.selector_key.as_str();
        if key.is_empty() {
            continue;
        }
        if !seen.insert(key) {
            return Err(LocatorError::Configuration(format!(
                "selector must be unique: {}",
                key
            )));
        }
    }
    Ok(())
}

fn keys(candidates: &[RaceCandidate]) -> String {
    candidates
        .iter()
        .map(|candidate| candidate.selector_key.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_adapter::stub::{StubDriver, StubNode, StubPage};

    fn fast_policy() -> RacePolicy {
        RacePolicy {
            widen_per_retry: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
            settle_diff: 0.1,
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn resolver(stub: &Arc<StubDriver>) -> RaceResolver {
        RaceResolver::new(stub.clone(), fast_policy())
    }

    #[tokio::test]
    async fn failure_sighting_reloads_then_success_wins() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(
            StubPage::new("stub://race")
                .node(StubNode::new("#blocked").until_reloads(1))
                .node(StubNode::new("#ok").after_reloads(1)),
        );

        let outcome = resolver(&stub)
            .race_element(
                &page,
                &strings(&["#ok"]),
                &strings(&["#blocked"]),
                2,
                Duration::from_millis(300),
            )
            .await
            .unwrap();

        assert_eq!(outcome.selector_key, "#ok");
        assert_eq!(outcome.kind, CandidateKind::Success);
        assert_eq!(outcome.retries_used, 1);
        assert_eq!(stub.reload_count(&page), 1);
    }

    #[tokio::test]
    async fn race_from_a_clicked_element_reloads_and_finds_a_sibling() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(
            StubPage::new("stub://form")
                .node(StubNode::new("#submit"))
                .node(StubNode::new("#ok").after_reloads(1)),
        );
        let submit = stub
            .locate(cdp_adapter::Scope::Page(&page), "#submit")
            .await
            .unwrap()
            .unwrap();

        let outcome = resolver(&stub)
            .race_element(
                &submit.page,
                &strings(&["#ok"]),
                &strings(&["#blocked"]),
                1,
                Duration::from_millis(60),
            )
            .await
            .unwrap();

        assert_eq!(outcome.selector_key, "#ok");
        assert_eq!(outcome.retries_used, 1);
        assert_ne!(outcome.element, submit);
        assert_eq!(stub.reload_count(&page), 1);
    }

    #[tokio::test]
    async fn absent_candidates_spend_the_budget_then_time_out() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://empty"));

        let err = resolver(&stub)
            .race_element(
                &page,
                &strings(&["#ok"]),
                &strings(&["#blocked"]),
                3,
                Duration::from_millis(40),
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(stub.reload_count(&page), 3);
    }

    #[tokio::test]
    async fn zero_retries_time_out_without_reloading() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://empty"));

        let err = resolver(&stub)
            .race_element(&page, &strings(&["#ok"]), &[], 0, Duration::from_millis(40))
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(stub.reload_count(&page), 0);
    }

    #[tokio::test]
    async fn duplicate_selectors_fail_before_probing() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://dup").node(StubNode::new("#ok")));

        let err = resolver(&stub)
            .race_element(
                &page,
                &strings(&["#ok", ""]),
                &strings(&["", "#ok"]),
                2,
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, LocatorError::Configuration(_)));
        assert!(stub.events().is_empty());
    }

    #[tokio::test]
    async fn last_failure_sighting_rejects_with_selector_name() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://blocked").node(StubNode::new("#blocked")));

        let err = resolver(&stub)
            .race_element(
                &page,
                &strings(&["#ok"]),
                &strings(&["#blocked"]),
                1,
                Duration::from_millis(200),
            )
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "failed to find element: #blocked");
        assert_eq!(stub.reload_count(&page), 0);
    }

    #[tokio::test]
    async fn earlier_success_beats_later_failure() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(
            StubPage::new("stub://both")
                .node(StubNode::new("#ok"))
                .node(StubNode::new("#blocked").appear_after(Duration::from_millis(300))),
        );

        let outcome = resolver(&stub)
            .race_element(
                &page,
                &strings(&["#ok"]),
                &strings(&["#blocked"]),
                1,
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(outcome.selector_key, "#ok");
        assert_eq!(outcome.retries_used, 0);
    }

    #[tokio::test]
    async fn custom_retry_without_spending_is_charged() {
        let stub = Arc::new(StubDriver::new());
        let page = stub.add_page(StubPage::new("stub://loop").node(StubNode::new("#spin")));
        let candidate = RaceCandidate::new(
            "#spin",
            CandidateKind::Failure,
            Arc::new(SelectorProbe::new("#spin")),
            Arc::new(|_: &ElementHandle, _: &RetryBudget| Verdict::Retry),
        );

        let err = resolver(&stub)
            .race(&page, vec![candidate], 2, Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, LocatorError::CandidateRejected(_)));
        assert_eq!(stub.reload_count(&page), 2);
    }
}
