//! Run orchestration
//!
//! Sequences one pass: preflight → collector up → launch → wait-healthy →
//! stimulus → wait-for-capture → evaluate → report, with teardown guaranteed
//! on every exit path. The collector's accept loop is the only concurrent
//! piece; the orchestrator itself is a single sequential owner, and every
//! wait it performs carries an explicit deadline.

use crate::assertions::{evaluate, ENVELOPE_FIELD, METADATA_FIELD};
use crate::collector::{CaptureOutcome, MockCollector};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::stimulus::StimulusInjector;
use crate::supervisor::{ensure_port_free, resolve_executable, wait_healthy, ProcessSupervisor};
use http::HeaderMap;
use serde_json::Value;
use tracing::info;

/// States of one harness pass, in order.
///
/// Failures before `CaptureReceived` are setup failures; failures detected
/// at `Evaluated` are assertion failures. `TornDown` is reached regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    PreflightChecked,
    CollectorUp,
    ProcessLaunched,
    ProcessHealthy,
    StimulusSent,
    CaptureReceived,
    Evaluated,
    Reported,
    TornDown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::PreflightChecked => "preflight-checked",
            Phase::CollectorUp => "collector-up",
            Phase::ProcessLaunched => "process-launched",
            Phase::ProcessHealthy => "process-healthy",
            Phase::StimulusSent => "stimulus-sent",
            Phase::CaptureReceived => "capture-received",
            Phase::Evaluated => "evaluated",
            Phase::Reported => "reported",
            Phase::TornDown => "torn-down",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed run (setup succeeded, assertions may not have)
#[derive(Debug)]
pub struct TestReport {
    /// Empty ⇔ pass
    pub failures: Vec<String>,
    /// The evaluated body, for the debug dump on failure
    pub captured_body: Option<Value>,
    /// The captured headers, for the debug dump on failure
    pub captured_headers: Option<HeaderMap>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drives one black-box pass against the process-under-test
pub struct Orchestrator {
    config: HarnessConfig,
}

impl Orchestrator {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    /// Run the full pass. Returns `Ok` with a report once the forwarded
    /// request has been captured and evaluated; any earlier failure maps to
    /// the error taxonomy. The child process and the collector are torn
    /// down on every path out of this function.
    pub async fn run(&self) -> Result<TestReport> {
        let config = &self.config;
        info!(phase = %Phase::Init, "Starting harness run");

        let executable = resolve_executable(&config.executable)?;
        ensure_port_free(&config.bind_addr, config.ingress_port).await?;
        ensure_port_free(&config.bind_addr, config.collector_port).await?;
        info!(phase = %Phase::PreflightChecked, executable = %executable.display(), "Preflight passed");

        let mut collector = MockCollector::start(&config.bind_addr, config.collector_port).await?;
        info!(phase = %Phase::CollectorUp, "Collector up");

        // Teardown applies here too: a failed launch must still release the
        // collector's port before the error propagates
        let supervisor =
            match ProcessSupervisor::launch(&executable, &config.args, &config.env_overrides()) {
                Ok(supervisor) => supervisor,
                Err(e) => {
                    collector.stop().await;
                    return Err(e);
                }
            };
        info!(phase = %Phase::ProcessLaunched, "Process launched");

        let result = self.drive(&mut collector, &supervisor).await;

        // Guaranteed teardown, whatever happened above
        supervisor.terminate(config.grace_period).await;
        collector.stop().await;
        info!(phase = %Phase::TornDown, "Teardown complete");

        result
    }

    /// Everything between launch and teardown. Split out so `run` can tear
    /// down on the error path as well.
    async fn drive(
        &self,
        collector: &mut MockCollector,
        supervisor: &ProcessSupervisor,
    ) -> Result<TestReport> {
        let config = &self.config;
        let client = reqwest::Client::new();

        let healthy = wait_healthy(
            &client,
            &config.health_url(),
            config.health_timeout,
            config.health_poll_interval,
        )
        .await;
        if !healthy {
            return Err(HarnessError::Setup {
                message: format!(
                    "process did not become healthy within {}s",
                    config.health_timeout.as_secs()
                ),
                process_stderr: supervisor.stderr_snapshot(),
            });
        }
        info!(phase = %Phase::ProcessHealthy, "Process is healthy");

        let status = StimulusInjector::new()
            .send(&config.ingress_url(), &config.payload)
            .await
            .map_err(|e| HarnessError::Setup {
                message: format!("failed to send stimulus: {e}"),
                process_stderr: supervisor.stderr_snapshot(),
            })?;
        if status != reqwest::StatusCode::OK {
            return Err(HarnessError::Setup {
                message: format!("process returned status {status} for the stimulus"),
                process_stderr: supervisor.stderr_snapshot(),
            });
        }
        info!(phase = %Phase::StimulusSent, "Stimulus accepted");

        match collector.wait_for_capture(config.capture_timeout).await {
            CaptureOutcome::Received => {}
            CaptureOutcome::TimedOut => {
                return Err(HarnessError::Timeout {
                    timeout_secs: config.capture_timeout.as_secs(),
                    process_stderr: supervisor.stderr_snapshot(),
                });
            }
            CaptureOutcome::Fault(message) => {
                return Err(HarnessError::Setup {
                    message: format!("collector fault: {message}"),
                    process_stderr: supervisor.stderr_snapshot(),
                });
            }
        }

        // Brief pause so any trailing requests land before we read the log
        tokio::time::sleep(config.settle_delay).await;
        info!(
            phase = %Phase::CaptureReceived,
            captured = collector.log().len(),
            "Forwarded request captured"
        );

        let Some(captured) = collector.log().first() else {
            return Err(HarnessError::Setup {
                message: "no requests recorded by the collector".to_string(),
                process_stderr: supervisor.stderr_snapshot(),
            });
        };

        let report = match serde_json::from_slice::<Value>(&captured.body) {
            Ok(body) => {
                let failures = evaluate(&config.expectation(), &body, &captured.headers);
                TestReport {
                    failures,
                    captured_body: Some(body),
                    captured_headers: Some(captured.headers.clone()),
                }
            }
            Err(e) => TestReport {
                failures: vec![format!("Forwarded body is not valid JSON: {e}")],
                captured_body: None,
                captured_headers: Some(captured.headers.clone()),
            },
        };
        info!(phase = %Phase::Evaluated, failures = report.failures.len(), "Assertions evaluated");

        Ok(report)
    }

    /// Print the verdict block. Returns `true` on pass.
    pub fn report(&self, report: &TestReport) -> bool {
        let config = &self.config;

        if report.passed() {
            println!("\nPASS: All assertions passed");
            println!("  - Body has '{ENVELOPE_FIELD}' with original payload");
            println!("  - Body has '{METADATA_FIELD}'");
            println!("  - Authorization: Bearer {}", config.auth_token);
            println!("  - Content-Type: application/json");
            println!("  - unity-catalog-endpoint: {}", config.workspace_url);
            println!("  - x-databricks-zerobus-table-name: {}", config.table_name);
        } else {
            println!("\nFAIL:");
            for failure in &report.failures {
                println!("  - {failure}");
            }
            if let Some(body) = &report.captured_body {
                let pretty =
                    serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
                println!("\n[debug] Forwarded body:\n{pretty}");
            }
            if let Some(headers) = &report.captured_headers {
                println!("[debug] Forwarded headers:");
                for (name, value) in headers {
                    println!("  {}: {}", name, value.to_str().unwrap_or("<non-utf8>"));
                }
            }
        }
        info!(phase = %Phase::Reported, passed = report.passed(), "Run reported");

        report.passed()
    }
}
