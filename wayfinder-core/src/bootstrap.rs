//! Bootstrap phases
//!
//! Runs named startup phases in order. Each phase is raced against its
//! timeout; losing the race drops the phase future, so work that does not
//! yield to the runtime keeps running until its next await point. A failed
//! phase goes through [`RecoveryOrchestrator::handle_error`] with the phase
//! name as the operation, so phase-specific recovery is just a fallback or
//! degrade handler registered under that name.
//!
//! A critical phase that cannot recover stops the run. An optional phase
//! that cannot recover is recorded as degraded and the run continues.

use futures::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{error, info, warn};

use crate::context::{ContextPriority, ContextType, ErrorContext};
use crate::error::ResilienceError;
use crate::failure::Failure;
use crate::history::RecoveryOutcome;
use crate::orchestrator::{HandleOptions, RecoveryOrchestrator, RecoveryResult};

/// Default time limit for a phase
pub const DEFAULT_PHASE_TIMEOUT: Duration = Duration::from_secs(10);

type PhaseOperation = Arc<dyn Fn() -> BoxFuture<'static, Result<(), Failure>> + Send + Sync>;

/// One named startup step
#[derive(Clone)]
pub struct BootstrapPhase {
    name: String,
    critical: bool,
    timeout: Duration,
    operation: PhaseOperation,
}

impl std::fmt::Debug for BootstrapPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapPhase")
            .field("name", &self.name)
            .field("critical", &self.critical)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl BootstrapPhase {
    /// A critical phase with the default timeout
    pub fn new<F, Fut>(name: impl Into<String>, operation: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        Self {
            name: name.into(),
            critical: true,
            timeout: DEFAULT_PHASE_TIMEOUT,
            operation: Arc::new(move || operation().boxed()),
        }
    }

    /// Failure of this phase degrades instead of stopping the run
    pub fn optional(mut self) -> Self {
        self.critical = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_critical(&self) -> bool {
        self.critical
    }

    async fn run_once(name: String, limit: Duration, operation: PhaseOperation) -> Result<(), Failure> {
        match timeout(limit, operation()).await {
            Ok(result) => result,
            Err(_) => Err(ResilienceError::Timeout {
                operation: name,
                duration: limit,
            }
            .to_failure()),
        }
    }
}

/// How one phase ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub name: String,
    pub outcome: PhaseOutcome,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Present when the phase needed recovery
    pub recovery: Option<RecoveryResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseOutcome {
    Completed,
    /// Failed, then recovered by retry or fallback
    Recovered,
    Degraded,
    Failed,
}

/// Summary of a bootstrap run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub phases: Vec<PhaseReport>,
    /// Critical phase that stopped the run
    pub aborted_at: Option<String>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl BootstrapReport {
    /// No critical phase failed
    pub fn is_success(&self) -> bool {
        self.aborted_at.is_none()
    }

    fn names(&self, outcome: PhaseOutcome) -> Vec<&str> {
        self.phases
            .iter()
            .filter(|p| p.outcome == outcome)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn completed(&self) -> Vec<&str> {
        let mut names = self.names(PhaseOutcome::Completed);
        names.extend(self.names(PhaseOutcome::Recovered));
        names
    }

    pub fn degraded(&self) -> Vec<&str> {
        self.names(PhaseOutcome::Degraded)
    }

    pub fn failed(&self) -> Vec<&str> {
        self.names(PhaseOutcome::Failed)
    }
}

/// Runs bootstrap phases through a shared orchestrator
#[derive(Debug)]
pub struct BootstrapRunner {
    orchestrator: Arc<RecoveryOrchestrator>,
    component: String,
    phases: Vec<BootstrapPhase>,
}

impl BootstrapRunner {
    pub fn new(orchestrator: Arc<RecoveryOrchestrator>) -> Self {
        Self {
            orchestrator,
            component: "bootstrap".to_string(),
            phases: Vec::new(),
        }
    }

    /// Component name recorded in each phase's error context
    pub fn with_component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    pub fn phase(mut self, phase: BootstrapPhase) -> Self {
        self.phases.push(phase);
        self
    }

    pub fn phases(&self) -> &[BootstrapPhase] {
        &self.phases
    }

    pub async fn run(&self) -> BootstrapReport {
        let start = Instant::now();
        let mut report = BootstrapReport::default();
        let logging = self.orchestrator.config().enable_logging;

        for phase in &self.phases {
            let phase_start = Instant::now();
            let first = BootstrapPhase::run_once(
                phase.name.clone(),
                phase.timeout,
                phase.operation.clone(),
            )
            .await;

            let failure = match first {
                Ok(()) => {
                    if logging {
                        info!("Bootstrap phase '{}' completed", phase.name);
                    }
                    report.phases.push(PhaseReport {
                        name: phase.name.clone(),
                        outcome: PhaseOutcome::Completed,
                        duration: phase_start.elapsed(),
                        recovery: None,
                    });
                    continue;
                }
                Err(failure) => failure,
            };

            let recovery = self.recover(phase, failure).await;
            let outcome = match (recovery.success, recovery.outcome) {
                (true, RecoveryOutcome::Degraded) => PhaseOutcome::Degraded,
                (true, _) => PhaseOutcome::Recovered,
                (false, _) if !phase.critical => PhaseOutcome::Degraded,
                (false, _) => PhaseOutcome::Failed,
            };

            if logging {
                match outcome {
                    PhaseOutcome::Failed => error!(
                        "Critical bootstrap phase '{}' failed: {}",
                        phase.name, recovery.error
                    ),
                    PhaseOutcome::Degraded => warn!(
                        "Bootstrap phase '{}' degraded: {}",
                        phase.name, recovery.error
                    ),
                    _ => info!("Bootstrap phase '{}' recovered", phase.name),
                }
            }

            report.phases.push(PhaseReport {
                name: phase.name.clone(),
                outcome,
                duration: phase_start.elapsed(),
                recovery: Some(recovery),
            });

            if outcome == PhaseOutcome::Failed {
                report.aborted_at = Some(phase.name.clone());
                break;
            }
        }

        report.duration = start.elapsed();
        report
    }

    async fn recover(&self, phase: &BootstrapPhase, failure: Failure) -> RecoveryResult {
        let priority = if phase.critical {
            ContextPriority::High
        } else {
            ContextPriority::Normal
        };
        let context = ErrorContext::for_operation(self.component.clone(), phase.name.clone())
            .with_type(ContextType::Bootstrap)
            .with_priority(priority)
            .with_data("critical", phase.critical);

        let name = phase.name.clone();
        let limit = phase.timeout;
        let operation = phase.operation.clone();
        let options = HandleOptions::new().with_retry(move || {
            let name = name.clone();
            let operation = operation.clone();
            async move {
                BootstrapPhase::run_once(name, limit, operation)
                    .await
                    .map(|()| Value::Null)
            }
        });

        self.orchestrator.handle_error(failure, context, options).await
    }
}
