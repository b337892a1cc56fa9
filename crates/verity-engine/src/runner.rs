//! Harness-level execution: every flow gets its own session and task, flows
//! over different sessions run concurrently, and a single cancellation
//! signal reaches them all.

use crate::artifact::ArtifactCollector;
use crate::driver::BrowserDriver;
use crate::orchestrator::{FlowExecutor, FlowReport, StepFailure};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use url::Url;
use verity_common::flow::{Flow, FlowStatus};
use verity_common::mock::MockPolicy;

/// Options shared by every flow in one harness invocation.
#[derive(Debug, Clone)]
pub struct HarnessOptions {
    /// Application under test; relative navigation targets join against it.
    pub base_url: Url,
    pub artifact_root: PathBuf,
    /// Applied to flows whose session config does not pick its own policy.
    pub default_mock_policy: MockPolicy,
    /// Overall wall-clock budget. Flows still running when it elapses are
    /// cancelled and reported as aborted.
    pub timeout: Option<Duration>,
}

/// Aggregated outcome of one harness invocation.
#[derive(Debug)]
pub struct HarnessReport {
    pub flows: Vec<FlowReport>,
}

impl HarnessReport {
    pub fn all_passed(&self) -> bool {
        !self.flows.is_empty() && self.flows.iter().all(FlowReport::passed)
    }

    pub fn exit_code(&self) -> i32 {
        if self.all_passed() { 0 } else { 1 }
    }

    /// Per-flow summary with enough failure context to diagnose without a
    /// debugger: step index, description, and the last observed state.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        for report in &self.flows {
            match report.status {
                FlowStatus::Completed => {
                    let _ = writeln!(
                        out,
                        "PASS {} ({} steps, {}ms)",
                        report.name, report.steps_executed, report.elapsed_ms
                    );
                }
                _ => {
                    let _ = writeln!(
                        out,
                        "FAIL {} ({:?} after {} steps, {}ms)",
                        report.name, report.status, report.steps_executed, report.elapsed_ms
                    );
                    if let Some(failure) = &report.failure {
                        let _ = writeln!(
                            out,
                            "     step {}: {}\n     {}",
                            failure.step_index, failure.description, failure.error
                        );
                    }
                    for artifact in &report.artifacts {
                        let _ = writeln!(out, "     artifact: {}", artifact.display());
                    }
                }
            }
        }
        out
    }
}

/// Run every flow concurrently, each over its own isolated session.
///
/// Sessions (and their mock rules) are created up front, one per flow, so no
/// state is shared once the tasks spawn. A flow whose session cannot be
/// created is reported as failed without affecting the others.
pub async fn run_flows(
    browser: &dyn BrowserDriver,
    flows: Vec<Flow>,
    options: &HarnessOptions,
) -> HarnessReport {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut reports = Vec::new();
    let mut set = JoinSet::new();

    for flow in flows {
        let mut session_config = flow.session.clone();
        let policy = session_config
            .mock_policy
            .unwrap_or(options.default_mock_policy);
        session_config.mock_policy = Some(policy);

        let session = match browser.create_session(&session_config).await {
            Ok(session) => session,
            Err(e) => {
                error!(flow = %flow.name, error = %e, "session setup failed");
                reports.push(FlowReport {
                    name: flow.name.clone(),
                    status: FlowStatus::Failed,
                    steps_executed: 0,
                    elapsed_ms: 0,
                    failure: Some(StepFailure {
                        step_index: 0,
                        description: "session setup".to_string(),
                        error: e,
                    }),
                    artifacts: Vec::new(),
                });
                continue;
            }
        };

        let artifacts =
            ArtifactCollector::new(options.artifact_root.join(sanitize_dir(&flow.name)));
        let executor = FlowExecutor::new(
            session,
            artifacts,
            cancel_rx.clone(),
            options.base_url.clone(),
            policy,
        );
        set.spawn(async move { executor.execute(&flow).await });
    }

    let deadline = options.timeout.map(|t| tokio::time::Instant::now() + t);
    loop {
        let joined = match deadline {
            Some(at) => match tokio::time::timeout_at(at, set.join_next()).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("harness timeout reached, cancelling remaining flows");
                    let _ = cancel_tx.send(true);
                    // Flows notice the signal at their next suspension point
                    // and abort, closing their sessions on the way out.
                    while let Some(res) = set.join_next().await {
                        match res {
                            Ok(report) => reports.push(report),
                            Err(e) => error!(error = %e, "flow task panicked"),
                        }
                    }
                    break;
                }
            },
            None => set.join_next().await,
        };

        match joined {
            Some(Ok(report)) => reports.push(report),
            Some(Err(e)) => error!(error = %e, "flow task panicked"),
            None => break,
        }
    }

    info!(
        flows = reports.len(),
        passed = reports.iter().filter(|r| r.passed()).count(),
        "harness run finished"
    );
    HarnessReport { flows: reports }
}

fn sanitize_dir(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
