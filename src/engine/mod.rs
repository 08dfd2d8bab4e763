pub mod cancel;
pub mod notice;
pub mod orchestrator;
pub mod retry;
pub mod session;

pub use cancel::CancellationController;
pub use notice::{Notice, NoticeLevel, NoticeSender};
pub use orchestrator::{IterationOutcome, Orchestrator};
pub use session::{ExecutionUnit, Session};

/// Free-text user input, parsed case-insensitively into control commands or
/// a new task description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskInput {
    /// Graceful stop: synchronous reset, session immediately ready.
    Done,
    /// Fast interrupt: cancel everything, re-arm after a grace period.
    Sigint,
    /// A new task for the orchestrator.
    Task(String),
    Empty,
}

impl TaskInput {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            TaskInput::Empty
        } else if trimmed.eq_ignore_ascii_case("done") {
            TaskInput::Done
        } else if trimmed.eq_ignore_ascii_case("sigint") {
            TaskInput::Sigint
        } else {
            TaskInput::Task(trimmed.to_string())
        }
    }
}
