//! The Condition-Wait Engine: the synchronization backbone of the harness.
//!
//! Every step that depends on an asynchronous UI update routes through
//! [`await_condition`] rather than a fixed sleep. The engine polls on a
//! fixed interval, yielding between polls, until the predicate holds or the
//! budget elapses.

use crate::driver::{ElementObservation, SessionDriver};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::debug;
use verity_common::condition::{Check, Condition};
use verity_common::error::HarnessError;

/// Evaluate `check` exactly once, without waiting. Branch steps use this for
/// bounded, single-shot decisions.
pub async fn check_once(
    driver: &mut dyn SessionDriver,
    check: &Check,
) -> Result<bool, HarnessError> {
    let (holds, _) = evaluate(driver, check).await?;
    Ok(holds)
}

/// Poll `condition` until it holds or its budget elapses.
///
/// Success is only returned after the predicate is observed true, and the
/// call returns within one poll interval past the budget otherwise. The
/// failure carries a snapshot of the page's visible text so the timeout can
/// be diagnosed without re-running. An in-flight wait aborts with
/// `Cancelled` the moment `cancel` fires.
pub async fn await_condition(
    driver: &mut dyn SessionDriver,
    condition: &Condition,
    cancel: &mut watch::Receiver<bool>,
) -> Result<ElementObservation, HarnessError> {
    let budget = Duration::from_millis(condition.timeout_ms);
    let poll = Duration::from_millis(condition.poll_ms.max(1));
    let started = Instant::now();

    loop {
        if *cancel.borrow() {
            return Err(HarnessError::Cancelled);
        }

        let (holds, observation) = evaluate(driver, &condition.check).await?;
        if holds {
            debug!(condition = %condition, elapsed_ms = started.elapsed().as_millis() as u64, "condition met");
            return Ok(observation);
        }

        if started.elapsed() >= budget {
            let last_observed = snapshot(driver).await;
            return Err(HarnessError::ConditionTimeout {
                description: condition.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
                last_observed,
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = cancel.changed() => return Err(HarnessError::Cancelled),
        }
    }
}

/// Poll until `selector` is visible and enabled. The Action Executor's
/// precondition; a timeout here surfaces as `ElementNotInteractable` at the
/// action layer.
pub async fn await_interactable(
    driver: &mut dyn SessionDriver,
    selector: &verity_common::selector::Selector,
    timeout_ms: u64,
    cancel: &mut watch::Receiver<bool>,
) -> Result<ElementObservation, HarnessError> {
    let budget = Duration::from_millis(timeout_ms);
    let poll = Duration::from_millis(verity_common::condition::DEFAULT_POLL_MS);
    let started = Instant::now();

    loop {
        if *cancel.borrow() {
            return Err(HarnessError::Cancelled);
        }

        let observation = driver.observe(selector).await?;
        if observation.interactable() {
            return Ok(observation);
        }

        if started.elapsed() >= budget {
            let last_observed = snapshot(driver).await;
            return Err(HarnessError::ConditionTimeout {
                description: format!("{} interactable", selector),
                elapsed_ms: started.elapsed().as_millis() as u64,
                last_observed,
            });
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = cancel.changed() => return Err(HarnessError::Cancelled),
        }
    }
}

async fn evaluate(
    driver: &mut dyn SessionDriver,
    check: &Check,
) -> Result<(bool, ElementObservation), HarnessError> {
    match check {
        Check::Visible { visible } => {
            let obs = driver.observe(visible).await?;
            let holds = obs.found && obs.visible;
            Ok((holds, obs))
        }
        Check::Hidden { hidden } => {
            let obs = driver.observe(hidden).await?;
            let holds = !obs.found || !obs.visible;
            Ok((holds, obs))
        }
        Check::TextEquals { target, equals } => {
            let obs = driver.observe(target).await?;
            let holds = obs.found && obs.text.trim() == equals.trim();
            Ok((holds, obs))
        }
        Check::UrlContains { url_contains } => {
            let url = driver.current_url().await?;
            Ok((url.contains(url_contains), ElementObservation::default()))
        }
    }
}

/// Best-effort page text for the timeout report, truncated to keep failure
/// output readable.
async fn snapshot(driver: &mut dyn SessionDriver) -> String {
    match driver.visible_text().await {
        Ok(text) => {
            let trimmed = text.trim();
            if trimmed.len() > 400 {
                let mut cut = 400;
                while !trimmed.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}…", &trimmed[..cut])
            } else {
                trimmed.to_string()
            }
        }
        Err(e) => format!("<unavailable: {}>", e),
    }
}
