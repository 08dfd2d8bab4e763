use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// User-visible status message emitted by the engine. The UI layer consumes
/// these asynchronously; the engine never blocks on delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Clone)]
pub struct NoticeSender {
    tx: mpsc::Sender<Notice>,
}

impl NoticeSender {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<Notice>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    pub fn info(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Info, text.into());
    }

    pub fn warning(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Warning, text.into());
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(NoticeLevel::Error, text.into());
    }

    fn emit(&self, level: NoticeLevel, text: String) {
        tracing::info!(?level, notice = %text, "notice emitted");
        // Best effort: a full or closed channel drops the notice rather than
        // stalling the iteration.
        if let Err(e) = self.tx.try_send(Notice { level, text }) {
            tracing::warn!(error = %e, "notice delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notices_arrive_in_order() {
        let (sender, mut rx) = NoticeSender::channel(8);
        sender.info("first");
        sender.error("second");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.level, NoticeLevel::Info);
        assert_eq!(first.text, "first");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, NoticeLevel::Error);
    }

    #[tokio::test]
    async fn full_channel_drops_rather_than_blocks() {
        let (sender, _rx) = NoticeSender::channel(1);
        sender.info("kept");
        sender.info("dropped");
    }
}
