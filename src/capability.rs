use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::AgentResult;

/// The local automation surface that executes primitive device actions.
///
/// Implementations wrap whatever injection backend the platform offers
/// (accessibility service, uiautomator bridge, ...). Every call reports
/// failure as an error value; nothing panics across this boundary.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    async fn click(&self, x: i64, y: i64) -> AgentResult<()>;

    async fn swipe(&self, direction: &str) -> AgentResult<()>;

    async fn input_text(&self, text: &str) -> AgentResult<()>;

    async fn launch_app(&self, package: &str) -> AgentResult<()>;

    /// Captures the current screen to a file and returns its path.
    async fn capture_screen(&self) -> AgentResult<PathBuf>;
}
