//! Delivery seam: status messages and documents going back to the requester.
//!
//! The chat transport lives behind [Notifier]. [Session] wraps a notifier and a chat
//! and makes status traffic fire-and-forget: a failed status send, edit, or delete
//! is logged and otherwise ignored. Only document delivery reports errors.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::AbortHandle;

/// Identifies the chat a request came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatRef(pub String);

impl ChatRef {
    /// Filesystem-safe scope name for this chat's temporary files.
    pub fn scope(&self) -> String {
        let s: String = self
            .0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("chat-{}", s)
    }
}

/// A message previously sent with [Notifier::send_text].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat: ChatRef,
    pub id: u64,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Message {0} no longer exists")]
    UnknownMessage(u64),

    #[error("Failed to deliver {path}: {source}")]
    Delivery {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Transport error: {0}")]
    Transport(String),
}

/// Chat transport consumed by the pipeline.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_text(&self, chat: &ChatRef, text: &str) -> Result<MessageRef, NotifyError>;

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), NotifyError>;

    async fn delete_message(&self, message: &MessageRef) -> Result<(), NotifyError>;

    async fn send_document(
        &self,
        chat: &ChatRef,
        path: &Path,
        filename: &str,
    ) -> Result<(), NotifyError>;

    /// Delete `message` after `delay`. Aborting the returned handle keeps the message.
    /// Transports without scheduling return None and the message stays.
    fn schedule_delete(&self, _message: MessageRef, _delay: Duration) -> Option<AbortHandle> {
        None
    }
}

/// A notifier bound to one chat.
#[derive(Clone)]
pub struct Session {
    notifier: Arc<dyn Notifier>,
    chat: ChatRef,
}

impl Session {
    pub fn new(notifier: Arc<dyn Notifier>, chat: ChatRef) -> Self {
        Self { notifier, chat }
    }

    pub fn chat(&self) -> &ChatRef {
        &self.chat
    }

    pub async fn say(&self, text: &str) -> Option<MessageRef> {
        match self.notifier.send_text(&self.chat, text).await {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!("status message not sent: {}", e);
                None
            }
        }
    }

    /// Edit `message` if there is one, otherwise send `text` as a new message.
    pub async fn update(&self, message: Option<&MessageRef>, text: &str) {
        let result = match message {
            Some(m) => self.notifier.edit_text(m, text).await,
            None => self.notifier.send_text(&self.chat, text).await.map(|_| ()),
        };
        if let Err(e) = result {
            tracing::warn!("status update not sent: {}", e);
        }
    }

    pub fn delete_later(&self, message: Option<MessageRef>, delay: Duration) -> Option<AbortHandle> {
        self.notifier.schedule_delete(message?, delay)
    }

    pub async fn send_document(&self, path: &Path, filename: &str) -> Result<(), NotifyError> {
        self.notifier.send_document(&self.chat, path, filename).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingNotifier;

    #[test]
    fn chat_scope_is_filesystem_safe() {
        assert_eq!(ChatRef("-100/42".into()).scope(), "chat--100_42");
    }

    #[tokio::test]
    async fn status_failures_do_not_surface() {
        let notifier = Arc::new(RecordingNotifier::failing_status());
        let session = Session::new(notifier.clone(), ChatRef("1".into()));
        assert!(session.say("hello").await.is_none());
        session.update(None, "still quiet").await;
        assert!(notifier.texts().is_empty());
    }

    #[tokio::test]
    async fn update_edits_existing_message() {
        let notifier = Arc::new(RecordingNotifier::new());
        let session = Session::new(notifier.clone(), ChatRef("1".into()));
        let m = session.say("Downloading, please wait...").await;
        session.update(m.as_ref(), "Generating PDF...").await;
        assert_eq!(notifier.texts(), vec!["Generating PDF...".to_string()]);
    }
}
