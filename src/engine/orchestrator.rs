use std::sync::Arc;
use std::time::Duration;

use crate::capability::CapabilityProvider;
use crate::config::{SafetyConfig, TimingConfig};
use crate::decision::{decode_action, DecisionRequest, DecisionService};
use crate::engine::cancel::CancellationController;
use crate::engine::notice::NoticeSender;
use crate::engine::retry::{
    acquire_with_retry, cancellable_sleep, RetryPolicy, PRIMARY_CAPTURE, SECONDARY_CAPTURE,
};
use crate::engine::session::{ExecutionUnit, Session};
use crate::engine::TaskInput;
use crate::errors::AgentError;
use crate::executor::{ActionDispatcher, DispatchOutcome};
use crate::perception::ScreenshotArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// A non-terminal action was dispatched; the chain continues.
    Continue,
    /// Terminal action, cancellation, or error; the chain stops.
    Stop,
}

/// Drives the capture → encode → call → decode → dispatch cycle.
///
/// One task runs as an explicit loop on a spawned tokio task; each pass of
/// the loop registers a fresh execution unit with the session, so only one
/// iteration is ever in flight and every pass is independently cancellable.
/// The caller never blocks on iteration completion; results flow back over
/// the notice channel.
#[derive(Clone)]
pub struct Orchestrator {
    session: Session,
    controller: CancellationController,
    provider: Arc<dyn CapabilityProvider>,
    decision: Arc<dyn DecisionService>,
    dispatcher: ActionDispatcher,
    notices: NoticeSender,
    step_delay: Duration,
}

impl Orchestrator {
    pub fn new(
        session: Session,
        provider: Arc<dyn CapabilityProvider>,
        decision: Arc<dyn DecisionService>,
        safety: SafetyConfig,
        timing: TimingConfig,
        notices: NoticeSender,
    ) -> Self {
        let controller = CancellationController::new(session.clone());
        let dispatcher = ActionDispatcher::new(
            provider.clone(),
            safety,
            session.clone(),
            controller.clone(),
            notices.clone(),
        );
        Self {
            session,
            controller,
            provider,
            decision,
            dispatcher,
            notices,
            step_delay: Duration::from_millis(timing.step_delay_ms),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn controller(&self) -> &CancellationController {
        &self.controller
    }

    /// Entry point for free-text user input: control commands are handled
    /// here, anything else starts a new task chain.
    pub fn submit(&self, input: &str) -> Option<tokio::task::JoinHandle<()>> {
        match TaskInput::parse(input) {
            TaskInput::Done => {
                self.controller.request_reset();
                self.notices.info("Done: task stopped and session reset");
                None
            }
            TaskInput::Sigint => {
                self.controller.request_fast_interrupt();
                self.notices.warning("Interrupted: all units cancelled, history cleared");
                None
            }
            TaskInput::Task(task) => Some(self.spawn_task(task)),
            TaskInput::Empty => None,
        }
    }

    /// Spawns the iteration chain for one task. Each pass registers its own
    /// execution unit; the chain ends on a terminal action, an error, or
    /// cancellation.
    pub fn spawn_task(&self, task: String) -> tokio::task::JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            // A user-initiated task supersedes any lingering interrupt flag
            // from a previous fast interrupt.
            if this.session.is_interrupted() {
                tracing::info!("new task clears previous interrupt flag");
                this.session.set_interrupted(false);
            }

            tracing::info!(task = %task, session = %this.session.id, "task chain started");
            let mut steps = 0u32;
            loop {
                match this.run_iteration(&task).await {
                    IterationOutcome::Continue => steps += 1,
                    IterationOutcome::Stop => break,
                }
            }
            tracing::info!(task = %task, steps, "task chain ended");
        })
    }

    /// One full perception-action iteration under a freshly registered unit.
    pub async fn run_iteration(&self, task: &str) -> IterationOutcome {
        if self.session.is_interrupted() {
            tracing::debug!("interrupted at iteration entry, aborting");
            return IterationOutcome::Stop;
        }

        let unit = self.session.register_unit();
        let outcome = self.iterate(task, &unit).await;
        self.session.unregister_unit(unit.id);
        outcome
    }

    async fn iterate(&self, task: &str, unit: &ExecutionUnit) -> IterationOutcome {
        self.notices.info("Executing next step...");

        // ── capture + encode ─────────────────────────────────────────────
        let Some(artifact) = self.capture_artifact(unit).await else {
            return IterationOutcome::Stop;
        };

        if self.checkpoint(unit, "before decision request") {
            return IterationOutcome::Stop;
        }

        // ── decision request ─────────────────────────────────────────────
        let request = DecisionRequest {
            task: task.to_string(),
            image: artifact.encoded_payload,
            history: self.session.history_snapshot(),
        };
        let raw = match self.decision.decide(&request).await {
            Ok(raw) => raw,
            Err(AgentError::Cancelled) => return IterationOutcome::Stop,
            Err(e) => {
                tracing::error!(error = %e, "decision request failed");
                self.notices.error(format!("Failed to load due to {e}"));
                return IterationOutcome::Stop;
            }
        };

        if raw.trim().is_empty() {
            tracing::warn!("decision service returned an empty body");
            self.notices.warning("Decision service returned no content");
            return IterationOutcome::Stop;
        }

        // ── decode ───────────────────────────────────────────────────────
        let (response, descriptor) = match decode_action(&raw) {
            Ok(decoded) => decoded,
            Err(e) => {
                // The raw body is archived even when it does not decode.
                self.session.push_history(raw);
                tracing::warn!(error = %e, "decision response decode failed");
                self.notices.error(format!("Response decode failed: {e}"));
                return IterationOutcome::Stop;
            }
        };

        // A terminal action clears history; everything else appends.
        if descriptor.kind.is_terminal() {
            self.session.clear_history();
        } else {
            self.session.push_history(raw);
        }

        if !response.reasoning.is_empty() {
            self.notices
                .info(format!("{}\n→ {}", response.reasoning, descriptor.name));
        }

        if self.checkpoint(unit, "before dispatch") {
            return IterationOutcome::Stop;
        }

        // ── dispatch ─────────────────────────────────────────────────────
        self.session.set_pending_action(Some(descriptor.clone()));
        let outcome = self.dispatcher.dispatch(&descriptor, unit).await;
        self.session.set_pending_action(None);

        match outcome {
            DispatchOutcome::Continue => {
                match cancellable_sleep(&self.session, unit, self.step_delay).await {
                    Ok(()) => IterationOutcome::Continue,
                    Err(_) => {
                        tracing::debug!("cancelled during inter-iteration delay");
                        IterationOutcome::Stop
                    }
                }
            }
            DispatchOutcome::Done
            | DispatchOutcome::Terminated
            | DispatchOutcome::Unknown
            | DispatchOutcome::Cancelled => IterationOutcome::Stop,
        }
    }

    /// Acquires a usable screenshot artifact. The primary budget retries
    /// capture errors only; a capture that succeeds but encodes to an empty
    /// payload switches to the secondary budget, which re-captures until the
    /// payload is non-empty. Returns `None` after surfacing the failure; the
    /// decision service is never called in that case.
    async fn capture_artifact(&self, unit: &ExecutionUnit) -> Option<ScreenshotArtifact> {
        let artifact = match self.capture_once(unit, PRIMARY_CAPTURE, false).await {
            Ok(artifact) => artifact,
            Err(e) => return self.surface_capture_failure(e),
        };

        if !artifact.payload_is_empty() {
            return Some(artifact);
        }

        tracing::warn!("primary capture produced an empty payload, re-capturing");
        match self.capture_once(unit, SECONDARY_CAPTURE, true).await {
            Ok(retry) => Some(retry),
            Err(e) => self.surface_capture_failure(e),
        }
    }

    async fn capture_once(
        &self,
        unit: &ExecutionUnit,
        policy: RetryPolicy,
        retry_on_empty: bool,
    ) -> crate::errors::AgentResult<ScreenshotArtifact> {
        let provider = self.provider.clone();
        let session = self.session.clone();
        acquire_with_retry(&self.session, unit, policy, move || {
            let provider = provider.clone();
            let session = session.clone();
            async move {
                let artifact = ScreenshotArtifact::acquire(provider.as_ref()).await?;

                // Storage hygiene: the file is gone the moment the payload
                // exists, usable or not.
                session.set_last_artifact(Some(artifact.path.clone()));
                artifact.delete_file();
                session.set_last_artifact(None);

                if retry_on_empty && artifact.payload_is_empty() {
                    return Err(AgentError::EmptyCapture);
                }
                Ok(artifact)
            }
        })
        .await
    }

    fn surface_capture_failure(&self, error: AgentError) -> Option<ScreenshotArtifact> {
        match error {
            AgentError::Cancelled => {
                tracing::debug!("capture cancelled");
            }
            e => {
                tracing::error!(error = %e, "screenshot acquisition exhausted");
                self.notices
                    .error(format!("{e}. Check capture permissions and retry."));
            }
        }
        None
    }

    /// True (and logs) when cancellation is observed at a checkpoint.
    fn checkpoint(&self, unit: &ExecutionUnit, stage: &str) -> bool {
        if self.session.is_interrupted() || unit.is_cancelled() {
            tracing::debug!(stage, "cancellation observed at checkpoint");
            true
        } else {
            false
        }
    }
}
