use std::sync::Arc;
use std::time::Duration;

use crate::capability::CapabilityProvider;
use crate::config::SafetyConfig;
use crate::decision::{ActionDescriptor, ActionKind};
use crate::engine::cancel::CancellationController;
use crate::engine::notice::NoticeSender;
use crate::engine::retry::cancellable_sleep;
use crate::engine::session::{ExecutionUnit, Session};
use crate::executor::safety;

/// The decision service operates on a half-scale screenshot, so its
/// coordinates are half of device space. Hard contract, not a heuristic.
pub const COORDINATE_SCALE: i64 = 2;

/// Fixed pause for the `wait` action.
pub const WAIT_ACTION_DURATION: Duration = Duration::from_millis(1500);

/// What the orchestrator should do after an action was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Non-terminal action; continue with the next iteration.
    Continue,
    /// Graceful completion; history cleared, chain stops.
    Done,
    /// Abnormal termination; full reset protocol ran, chain stops.
    Terminated,
    /// Unrecognized action; chain stops with an explicit notice.
    Unknown,
    /// Cancellation observed mid-dispatch; chain stops quietly.
    Cancelled,
}

/// Maps one decoded action to a capability call. Dispatch failures are
/// reported and logged but never propagate past this boundary.
#[derive(Clone)]
pub struct ActionDispatcher {
    provider: Arc<dyn CapabilityProvider>,
    safety: SafetyConfig,
    session: Session,
    controller: CancellationController,
    notices: NoticeSender,
}

impl ActionDispatcher {
    pub fn new(
        provider: Arc<dyn CapabilityProvider>,
        safety: SafetyConfig,
        session: Session,
        controller: CancellationController,
        notices: NoticeSender,
    ) -> Self {
        Self {
            provider,
            safety,
            session,
            controller,
            notices,
        }
    }

    pub async fn dispatch(
        &self,
        descriptor: &ActionDescriptor,
        unit: &ExecutionUnit,
    ) -> DispatchOutcome {
        tracing::info!(kind = ?descriptor.kind, name = %descriptor.name, "dispatching action");
        match descriptor.kind {
            ActionKind::Click => self.dispatch_click(descriptor).await,
            ActionKind::Input => self.dispatch_input(descriptor).await,
            ActionKind::Swipe => self.dispatch_swipe(descriptor).await,
            ActionKind::OpenApp => self.dispatch_open_app(descriptor).await,
            ActionKind::Done => {
                self.session.clear_history();
                self.notices.info("Task complete");
                DispatchOutcome::Done
            }
            ActionKind::Terminate => self.terminate("Task terminated abnormally"),
            ActionKind::Wait => {
                self.notices.info("Waiting for the screen to settle");
                match cancellable_sleep(&self.session, unit, WAIT_ACTION_DURATION).await {
                    Ok(()) => DispatchOutcome::Continue,
                    Err(_) => {
                        tracing::debug!("cancelled during wait action");
                        DispatchOutcome::Cancelled
                    }
                }
            }
            ActionKind::Unknown => {
                self.notices
                    .error(format!("Unrecognized action '{}', task terminated", descriptor.name));
                DispatchOutcome::Unknown
            }
        }
    }

    async fn dispatch_click(&self, descriptor: &ActionDescriptor) -> DispatchOutcome {
        let target = descriptor.param_str("target_element").unwrap_or_default();
        if safety::is_grant_forever_target(target, &self.safety.grant_forever_markers) {
            tracing::warn!(target = %target, "click target is a persistent permission grant");
            self.notices
                .warning("Permission-grant target detected, terminating task");
            return self.terminate("Task terminated: persistent permission grant blocked");
        }

        let (Some(x), Some(y)) = (descriptor.param_i64("x"), descriptor.param_i64("y")) else {
            self.report_failure("click", "missing coordinates");
            return DispatchOutcome::Continue;
        };

        // Back-transform from the decision service's half-scale space.
        let (device_x, device_y) = (x * COORDINATE_SCALE, y * COORDINATE_SCALE);
        tracing::info!(x = device_x, y = device_y, "clicking");
        match self.provider.click(device_x, device_y).await {
            Ok(()) => {
                self.notices
                    .info(format!("Clicked ({device_x}, {device_y})"));
            }
            Err(e) => self.report_failure("click", &e.to_string()),
        }
        DispatchOutcome::Continue
    }

    async fn dispatch_input(&self, descriptor: &ActionDescriptor) -> DispatchOutcome {
        let package = descriptor.param_str("package_name").unwrap_or_default();
        if safety::requires_manual_input(package, &self.safety.manual_input_packages) {
            tracing::info!(package = %package, "app rejects programmatic input");
            self.notices
                .warning(format!("{package} does not accept automated input, please type manually"));
            return DispatchOutcome::Continue;
        }

        let Some(text) = descriptor.param_str("text").filter(|t| !t.is_empty()) else {
            self.report_failure("input", "missing text");
            return DispatchOutcome::Continue;
        };

        match self.provider.input_text(text).await {
            Ok(()) => self.notices.info(format!("Entered text: {text}")),
            Err(e) => self.report_failure("input", &e.to_string()),
        }
        DispatchOutcome::Continue
    }

    async fn dispatch_swipe(&self, descriptor: &ActionDescriptor) -> DispatchOutcome {
        let Some(direction) = descriptor.param_str("direction").filter(|d| !d.is_empty()) else {
            self.report_failure("swipe", "missing direction");
            return DispatchOutcome::Continue;
        };

        match self.provider.swipe(direction).await {
            Ok(()) => self.notices.info(format!("Swiped {direction}")),
            Err(e) => self.report_failure("swipe", &e.to_string()),
        }
        DispatchOutcome::Continue
    }

    async fn dispatch_open_app(&self, descriptor: &ActionDescriptor) -> DispatchOutcome {
        let Some(package) = descriptor.param_str("package_name").filter(|p| !p.is_empty())
        else {
            self.report_failure("open_app", "missing package_name");
            return DispatchOutcome::Continue;
        };

        match self.provider.launch_app(package).await {
            Ok(()) => {
                self.notices.info(format!("Launched {package}"));
                if safety::requires_manual_input(package, &self.safety.manual_input_packages) {
                    self.notices
                        .warning("Automated text entry is unreliable in this app, please type manually");
                }
            }
            Err(e) => self.report_failure("open_app", &e.to_string()),
        }
        DispatchOutcome::Continue
    }

    fn terminate(&self, message: &str) -> DispatchOutcome {
        self.session.clear_history();
        self.controller.request_reset();
        self.notices.warning(message.to_string());
        DispatchOutcome::Terminated
    }

    fn report_failure(&self, action: &str, detail: &str) {
        tracing::warn!(action, detail, "dispatch failure");
        self.notices.error(format!("{action} failed: {detail}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionResponse;
    use crate::engine::notice::Notice;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Click(i64, i64),
        Swipe(String),
        Input(String),
        Launch(String),
    }

    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<Call>>,
        fail: bool,
    }

    impl RecordingProvider {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) -> crate::errors::AgentResult<()> {
            self.calls.lock().unwrap().push(call);
            if self.fail {
                Err(crate::errors::AgentError::Dispatch("backend failure".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl CapabilityProvider for RecordingProvider {
        async fn click(&self, x: i64, y: i64) -> crate::errors::AgentResult<()> {
            self.record(Call::Click(x, y))
        }
        async fn swipe(&self, direction: &str) -> crate::errors::AgentResult<()> {
            self.record(Call::Swipe(direction.into()))
        }
        async fn input_text(&self, text: &str) -> crate::errors::AgentResult<()> {
            self.record(Call::Input(text.into()))
        }
        async fn launch_app(&self, package: &str) -> crate::errors::AgentResult<()> {
            self.record(Call::Launch(package.into()))
        }
        async fn capture_screen(&self) -> crate::errors::AgentResult<PathBuf> {
            Ok(PathBuf::from("/tmp/unused.png"))
        }
    }

    struct Fixture {
        provider: Arc<RecordingProvider>,
        dispatcher: ActionDispatcher,
        session: Session,
        unit: ExecutionUnit,
        rx: mpsc::Receiver<Notice>,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(RecordingProvider::default());
        let session = Session::new();
        let unit = session.register_unit();
        let controller = CancellationController::new(session.clone());
        let (notices, rx) = NoticeSender::channel(32);
        let dispatcher = ActionDispatcher::new(
            provider.clone(),
            SafetyConfig::default(),
            session.clone(),
            controller,
            notices,
        );
        Fixture {
            provider,
            dispatcher,
            session,
            unit,
            rx,
        }
    }

    fn descriptor(action: &str, parameters: serde_json::Value) -> ActionDescriptor {
        ActionDescriptor::from_response(&DecisionResponse {
            reasoning: String::new(),
            action: action.into(),
            parameters: parameters.as_object().cloned().unwrap_or_default(),
        })
    }

    #[tokio::test]
    async fn click_doubles_decoded_coordinates() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .dispatch(&descriptor("click", serde_json::json!({"x": 100, "y": 200})), &f.unit)
            .await;
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert_eq!(f.provider.calls(), vec![Call::Click(200, 400)]);
    }

    #[tokio::test]
    async fn grant_forever_click_short_circuits_to_terminate() {
        let mut f = fixture();
        f.session.push_history("earlier step".into());
        let outcome = f
            .dispatcher
            .dispatch(
                &descriptor(
                    "click",
                    serde_json::json!({"x": 1, "y": 1, "target_element": "Always Allow"}),
                ),
                &f.unit,
            )
            .await;
        assert_eq!(outcome, DispatchOutcome::Terminated);
        assert!(f.provider.calls().is_empty());
        assert_eq!(f.session.history_len(), 0);
        // Reset protocol is synchronous: the session is re-armed on return.
        assert!(!f.session.is_interrupted());
        let first = f.rx.recv().await.unwrap();
        assert!(first.text.contains("Permission-grant"));
    }

    #[tokio::test]
    async fn click_without_coordinates_reports_failure_and_continues() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .dispatch(&descriptor("click", serde_json::json!({})), &f.unit)
            .await;
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert!(f.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn manual_input_package_skips_injection() {
        let mut f = fixture();
        let outcome = f
            .dispatcher
            .dispatch(
                &descriptor(
                    "input",
                    serde_json::json!({"text": "hello", "package_name": "com.tencent.mm"}),
                ),
                &f.unit,
            )
            .await;
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert!(f.provider.calls().is_empty());
        let notice = f.rx.recv().await.unwrap();
        assert!(notice.text.contains("type manually"));
    }

    #[tokio::test]
    async fn input_reaches_provider_for_ordinary_packages() {
        let f = fixture();
        f.dispatcher
            .dispatch(
                &descriptor(
                    "input",
                    serde_json::json!({"text": "hello", "package_name": "com.example.notes"}),
                ),
                &f.unit,
            )
            .await;
        assert_eq!(f.provider.calls(), vec![Call::Input("hello".into())]);
    }

    #[tokio::test]
    async fn swipe_passes_direction_through() {
        let f = fixture();
        f.dispatcher
            .dispatch(&descriptor("swipe", serde_json::json!({"direction": "up"})), &f.unit)
            .await;
        assert_eq!(f.provider.calls(), vec![Call::Swipe("up".into())]);
    }

    #[tokio::test]
    async fn open_app_emits_manual_input_follow_up_for_listed_packages() {
        let mut f = fixture();
        f.dispatcher
            .dispatch(
                &descriptor("open_app", serde_json::json!({"package_name": "com.tencent.mm"})),
                &f.unit,
            )
            .await;
        assert_eq!(f.provider.calls(), vec![Call::Launch("com.tencent.mm".into())]);
        let launched = f.rx.recv().await.unwrap();
        assert!(launched.text.contains("Launched"));
        let follow_up = f.rx.recv().await.unwrap();
        assert!(follow_up.text.contains("type manually"));
    }

    #[tokio::test]
    async fn provider_failure_is_reported_not_propagated() {
        let mut f = fixture();
        f.provider = Arc::new(RecordingProvider {
            fail: true,
            ..Default::default()
        });
        let controller = CancellationController::new(f.session.clone());
        let (notices, mut rx) = NoticeSender::channel(32);
        let dispatcher = ActionDispatcher::new(
            f.provider.clone(),
            SafetyConfig::default(),
            f.session.clone(),
            controller,
            notices,
        );

        let outcome = dispatcher
            .dispatch(&descriptor("swipe", serde_json::json!({"direction": "down"})), &f.unit)
            .await;
        assert_eq!(outcome, DispatchOutcome::Continue);
        let notice = rx.recv().await.unwrap();
        assert!(notice.text.contains("swipe failed"));
        f.rx.close();
    }

    #[tokio::test(start_paused = true)]
    async fn wait_pauses_then_continues() {
        let f = fixture();
        let outcome = f
            .dispatcher
            .dispatch(&descriptor("wait", serde_json::json!({})), &f.unit)
            .await;
        assert_eq!(outcome, DispatchOutcome::Continue);
        assert!(f.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn interrupted_wait_reports_cancellation() {
        let f = fixture();
        f.session.set_interrupted(true);
        let outcome = f
            .dispatcher
            .dispatch(&descriptor("wait", serde_json::json!({})), &f.unit)
            .await;
        assert_eq!(outcome, DispatchOutcome::Cancelled);
    }

    #[tokio::test]
    async fn done_clears_history_and_stops() {
        let f = fixture();
        f.session.push_history("step".into());
        let outcome = f
            .dispatcher
            .dispatch(&descriptor("done", serde_json::json!({})), &f.unit)
            .await;
        assert_eq!(outcome, DispatchOutcome::Done);
        assert_eq!(f.session.history_len(), 0);
    }

    #[tokio::test]
    async fn unknown_action_ends_the_session() {
        let mut f = fixture();
        let outcome = f
            .dispatcher
            .dispatch(&descriptor("long_press", serde_json::json!({})), &f.unit)
            .await;
        assert_eq!(outcome, DispatchOutcome::Unknown);
        assert!(f.provider.calls().is_empty());
        let notice = f.rx.recv().await.unwrap();
        assert!(notice.text.contains("Unrecognized action 'long_press'"));
    }
}
