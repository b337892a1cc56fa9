use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use verity_engine::driver::BrowserDriver;
use verity_engine::mock::MockPolicy;
use verity_engine::runner::{self, HarnessOptions};
use verity_engine::scenario::ScenarioLoader;
use verity_h::session::CdpBrowser;

#[derive(Parser)]
#[command(name = "verity", version, about = "End-to-end UI verification harness")]
struct Args {
    /// Scenario file, or directory of scenario files
    scenarios: PathBuf,

    /// Base URL of the application under test
    #[arg(long, default_value = "http://localhost:5173")]
    base_url: Url,

    /// Directory for screenshots and diagnostic captures
    #[arg(long, default_value = "artifacts")]
    artifacts: PathBuf,

    /// Launch the browser in visible mode (not headless)
    #[arg(long)]
    visible: bool,

    /// Fail flows whose requests match no mock rule
    #[arg(long)]
    strict_mocks: bool,

    /// Overall wall-clock budget in seconds; flows still running when it
    /// elapses are cancelled
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to stderr so stdout carries only the run summary
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let flows = ScenarioLoader::load(&args.scenarios)
        .await
        .with_context(|| format!("loading scenarios from {}", args.scenarios.display()))?;
    tracing::info!(count = flows.len(), "scenarios loaded");

    let mut browser = CdpBrowser::launch(args.visible)
        .await
        .context("launching browser")?;

    let options = HarnessOptions {
        base_url: args.base_url,
        artifact_root: args.artifacts,
        default_mock_policy: if args.strict_mocks {
            MockPolicy::Strict
        } else {
            MockPolicy::Passthrough
        },
        timeout: args.timeout.map(Duration::from_secs),
    };

    let report = runner::run_flows(&browser, flows, &options).await;

    if let Err(e) = browser.close().await {
        tracing::warn!(error = %e, "browser shutdown failed");
    }

    print!("{}", report.summary());
    std::process::exit(report.exit_code());
}
