//! The Flow Orchestrator: sequences actions and assertions into a scripted
//! scenario against exactly one session.

use crate::action;
use crate::artifact::ArtifactCollector;
use crate::driver::SessionDriver;
use crate::wait;
use async_recursion::async_recursion;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};
use url::Url;
use verity_common::error::HarnessError;
use verity_common::flow::{Flow, FlowStatus, ScenarioStep};
use verity_common::mock::MockPolicy;

/// Failure detail for one step, sufficient to diagnose without re-running.
#[derive(Debug)]
pub struct StepFailure {
    /// Linear step index across the flow, counting into branch arms.
    pub step_index: usize,
    pub description: String,
    pub error: HarnessError,
}

/// Outcome of one flow execution.
#[derive(Debug)]
pub struct FlowReport {
    pub name: String,
    pub status: FlowStatus,
    pub steps_executed: usize,
    pub elapsed_ms: u64,
    pub failure: Option<StepFailure>,
    pub artifacts: Vec<PathBuf>,
}

impl FlowReport {
    pub fn passed(&self) -> bool {
        self.status == FlowStatus::Completed
    }
}

/// Executes one flow over the session it exclusively owns.
///
/// Ownership is the serialization mechanism: holding the only handle to the
/// session for the duration of each step guarantees no two operations ever
/// interleave on one page. Flows over different sessions run concurrently
/// without coordination.
pub struct FlowExecutor {
    driver: Box<dyn SessionDriver>,
    artifacts: ArtifactCollector,
    cancel: watch::Receiver<bool>,
    base_url: Url,
    mock_policy: MockPolicy,
    step_counter: usize,
    last_description: String,
}

impl FlowExecutor {
    pub fn new(
        driver: Box<dyn SessionDriver>,
        artifacts: ArtifactCollector,
        cancel: watch::Receiver<bool>,
        base_url: Url,
        mock_policy: MockPolicy,
    ) -> Self {
        Self {
            driver,
            artifacts,
            cancel,
            base_url,
            mock_policy,
            step_counter: 0,
            last_description: String::new(),
        }
    }

    /// Run the flow to completion, returning its report. The session is
    /// closed on every exit path, including cancellation.
    pub async fn execute(mut self, flow: &Flow) -> FlowReport {
        let started = Instant::now();
        info!(flow = %flow.name, "flow starting");

        let mut status = FlowStatus::Running;
        let mut failure = None;

        // Mocks are armed during session setup, before the first navigation,
        // so the first matching request is already interceptable.
        let setup = self.register_mocks(flow).await;
        match setup {
            Err(error) => {
                status = FlowStatus::Failed;
                failure = Some(StepFailure {
                    step_index: 0,
                    description: "mock registration".to_string(),
                    error,
                });
            }
            Ok(()) => match self.run_steps(&flow.steps).await {
                Ok(()) => status = FlowStatus::Completed,
                Err(error) => {
                    if matches!(error, HarnessError::Cancelled) {
                        status = FlowStatus::Aborted;
                    } else {
                        status = FlowStatus::Failed;
                        self.capture_failure(&error).await;
                    }
                    failure = Some(StepFailure {
                        step_index: self.step_counter,
                        description: self.last_description.clone(),
                        error,
                    });
                }
            },
        }

        if let Err(e) = self.driver.close().await {
            warn!(flow = %flow.name, error = %e, "session close failed");
        }

        info!(flow = %flow.name, status = ?status, elapsed_ms = started.elapsed().as_millis() as u64, "flow finished");
        FlowReport {
            name: flow.name.clone(),
            status,
            steps_executed: self.step_counter,
            elapsed_ms: started.elapsed().as_millis() as u64,
            failure,
            artifacts: self.artifacts.into_written(),
        }
    }

    async fn register_mocks(&mut self, flow: &Flow) -> Result<(), HarnessError> {
        for def in &flow.mocks {
            let rule = def.build()?;
            self.driver.register_mock(rule).await?;
        }
        Ok(())
    }

    #[async_recursion]
    async fn run_steps(&mut self, steps: &[ScenarioStep]) -> Result<(), HarnessError> {
        for step in steps {
            if *self.cancel.borrow() {
                return Err(HarnessError::Cancelled);
            }
            self.step_counter += 1;
            self.last_description = step.describe();
            self.run_step(step).await?;
            self.check_mock_mismatches().await?;
        }
        Ok(())
    }

    async fn run_step(&mut self, step: &ScenarioStep) -> Result<(), HarnessError> {
        match step {
            ScenarioStep::Navigate(s) => {
                let target = self.resolve_url(&s.navigate)?;
                info!(url = %target, "navigate");
                self.driver.navigate(target.as_str()).await
            }
            ScenarioStep::Act(s) => {
                let result =
                    action::perform(self.driver.as_mut(), &s.act, &mut self.cancel).await;
                self.absorb_best_effort(result, s.best_effort)
            }
            ScenarioStep::Expect(s) => {
                let result =
                    wait::await_condition(self.driver.as_mut(), &s.expect, &mut self.cancel)
                        .await
                        .map(|_| ());
                self.absorb_best_effort(result, s.best_effort)
            }
            ScenarioStep::Branch(s) => {
                let taken = wait::check_once(self.driver.as_mut(), &s.branch.condition.check)
                    .await?;
                info!(condition = %s.branch.condition, taken, "branch");
                if taken {
                    self.run_steps(&s.branch.then_steps).await
                } else {
                    self.run_steps(&s.branch.else_steps).await
                }
            }
            ScenarioStep::Capture(s) => {
                self.artifacts
                    .capture_page(self.driver.as_mut(), &s.capture)
                    .await;
                Ok(())
            }
            ScenarioStep::Mock(s) => {
                let rule = s.mock.build()?;
                self.driver.register_mock(rule).await
            }
        }
    }

    /// A best-effort step absorbs its own failure; cancellation and a lost
    /// connection are never absorbed.
    fn absorb_best_effort(
        &mut self,
        result: Result<(), HarnessError>,
        best_effort: bool,
    ) -> Result<(), HarnessError> {
        match result {
            Err(e)
                if best_effort
                    && !matches!(
                        e,
                        HarnessError::Cancelled | HarnessError::ConnectionLost
                    ) =>
            {
                warn!(step = %self.last_description, error = %e, "best-effort step failed, continuing");
                Ok(())
            }
            other => other,
        }
    }

    async fn check_mock_mismatches(&mut self) -> Result<(), HarnessError> {
        let mismatches = self.driver.take_mock_mismatches().await;
        if self.mock_policy == MockPolicy::Strict
            && let Some(url) = mismatches.into_iter().next()
        {
            return Err(HarnessError::MockMismatch { url });
        }
        Ok(())
    }

    /// Diagnostic capture on failure: a screenshot plus the failing step's
    /// detail, both best effort.
    async fn capture_failure(&mut self, error: &HarnessError) {
        self.artifacts
            .capture_page(self.driver.as_mut(), "failure")
            .await;
        self.artifacts.capture_text(
            "failure",
            &format!("step: {}\nerror: {}\n", self.last_description, error),
        );
    }

    fn resolve_url(&self, target: &str) -> Result<Url, HarnessError> {
        self.base_url.join(target).map_err(|e| {
            HarnessError::Navigation(format!("invalid navigation target '{}': {}", target, e))
        })
    }
}
