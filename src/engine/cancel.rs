use std::time::Duration;

use crate::engine::session::Session;

/// Grace period before the fast-interrupt path re-arms the session, giving
/// in-flight cancellation checks time to observe the flag.
pub const FAST_INTERRUPT_GRACE: Duration = Duration::from_millis(500);

/// Owns the two cancellation protocols of the engine.
///
/// Both protocols cancel every registered execution unit and clear history;
/// they differ only in when `interrupted` is re-armed. Cancellation is
/// cooperative: units must poll their own token and the session flag at each
/// checkpoint (before sleeping, before network calls, before dispatch). A
/// unit that never checks runs to completion — a documented limitation of
/// the model, not something this controller works around.
#[derive(Clone)]
pub struct CancellationController {
    session: Session,
}

impl CancellationController {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Synchronous reset: cancel everything, wipe session state, and leave
    /// the session immediately ready for a new task (`interrupted == false`
    /// on return).
    pub fn request_reset(&self) {
        tracing::info!("reset requested");
        self.session.set_interrupted(true);
        self.session.cancel_all_units();
        self.session.clear_history();
        self.session.clear_transients();
        self.session.set_interrupted(false);
        tracing::info!("reset complete, session ready for new tasks");
    }

    /// Fast interrupt: cancel everything and keep `interrupted` raised for a
    /// fixed grace period before re-arming on a timer.
    pub fn request_fast_interrupt(&self) {
        tracing::info!("fast interrupt requested");
        self.session.set_interrupted(true);
        self.session.cancel_all_units();
        self.session.clear_history();

        let session = self.session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FAST_INTERRUPT_GRACE).await;
            session.set_interrupted(false);
            tracing::info!("interrupt flag re-armed after grace period");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_leaves_session_ready() {
        let session = Session::new();
        let controller = CancellationController::new(session.clone());
        let unit = session.register_unit();
        session.push_history("entry".into());

        controller.request_reset();

        assert!(!session.is_interrupted());
        assert!(unit.is_cancelled());
        assert_eq!(session.active_unit_count(), 0);
        assert_eq!(session.history_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_interrupt_re_arms_after_grace_period() {
        let session = Session::new();
        let controller = CancellationController::new(session.clone());
        let unit = session.register_unit();
        session.push_history("entry".into());

        controller.request_fast_interrupt();

        assert!(session.is_interrupted());
        assert!(unit.is_cancelled());
        assert_eq!(session.history_len(), 0);

        // Just before the grace period the flag is still raised.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(session.is_interrupted());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!session.is_interrupted());
    }

    #[tokio::test]
    async fn no_new_unit_survives_a_reset() {
        let session = Session::new();
        let controller = CancellationController::new(session.clone());
        let _ = session.register_unit();
        controller.request_reset();
        // Units registered after the reset start fresh.
        let unit = session.register_unit();
        assert!(!unit.is_cancelled());
        assert_eq!(session.active_unit_count(), 1);
    }
}
