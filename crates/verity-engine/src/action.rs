//! The Action Executor: one user-intent action at a time, each preceded by
//! an interactability wait.

use crate::driver::SessionDriver;
use crate::wait;
use tokio::sync::watch;
use tracing::debug;
use verity_common::error::HarnessError;
use verity_common::flow::ActionDef;

/// Budget for the target to become visible and enabled before the action is
/// declared stuck.
pub const INTERACT_TIMEOUT_MS: u64 = 5_000;

/// Perform one action: wait for the target to be interactable, then dispatch
/// the real input sequence through the driver.
///
/// A forced click skips the wait and dispatches at the element's last
/// observed position; everything else fails with `ElementNotInteractable`
/// when the wait times out.
pub async fn perform(
    driver: &mut dyn SessionDriver,
    action: &ActionDef,
    cancel: &mut watch::Receiver<bool>,
) -> Result<(), HarnessError> {
    debug!(action = %action, "performing action");

    if let ActionDef::Click(click) = action
        && click.force
    {
        let observation = driver.observe(&click.click).await?;
        return match observation.center {
            Some((x, y)) => driver.click_at(x, y).await,
            None => Err(HarnessError::ElementNotInteractable {
                selector: click.click.to_string(),
                reason: "not present in DOM".into(),
            }),
        };
    }

    let selector = action.selector();
    wait::await_interactable(driver, selector, INTERACT_TIMEOUT_MS, cancel)
        .await
        .map_err(|e| match e {
            HarnessError::ConditionTimeout { last_observed, .. } => {
                HarnessError::ElementNotInteractable {
                    selector: selector.to_string(),
                    reason: format!(
                        "not visible and enabled within {}ms; last observed: {}",
                        INTERACT_TIMEOUT_MS, last_observed
                    ),
                }
            }
            other => other,
        })?;

    match action {
        ActionDef::Fill(fill) => driver.fill(&fill.fill, &fill.text).await,
        ActionDef::Click(click) => driver.click(&click.click).await,
        ActionDef::Press(press) => driver.press_keys(&press.press, &press.keys).await,
        ActionDef::Scroll(scroll) => driver.scroll_into_view(&scroll.scroll).await,
    }
}
