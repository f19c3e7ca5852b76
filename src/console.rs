//! Terminal transport: each status message is a spinner line and delivered
//! documents are copied into the output directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::task::AbortHandle;

use crate::notify::{ChatRef, MessageRef, Notifier, NotifyError};

type Bars = Arc<Mutex<HashMap<u64, ProgressBar>>>;

pub struct ConsoleNotifier {
    multi: MultiProgress,
    bars: Bars,
    next_id: AtomicU64,
    output_dir: PathBuf,
}

impl ConsoleNotifier {
    /// `quiet` hides the spinners; documents are still written.
    pub fn new(output_dir: impl Into<PathBuf>, quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            bars: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            output_dir: output_dir.into(),
        }
    }

    /// Stop every spinner that is still running, leaving its last text on screen.
    pub fn finish_all(&self) {
        for (_, bar) in lock(&self.bars).drain() {
            bar.finish();
        }
    }

    fn spinner(&self, text: &str) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
            bar.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏✓"));
        }
        bar.set_message(text.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    }
}

fn lock(bars: &Bars) -> MutexGuard<'_, HashMap<u64, ProgressBar>> {
    match bars.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send_text(&self, chat: &ChatRef, text: &str) -> Result<MessageRef, NotifyError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let bar = self.spinner(text);
        lock(&self.bars).insert(id, bar);
        Ok(MessageRef {
            chat: chat.clone(),
            id,
        })
    }

    async fn edit_text(&self, message: &MessageRef, text: &str) -> Result<(), NotifyError> {
        let bars = lock(&self.bars);
        let bar = bars
            .get(&message.id)
            .ok_or(NotifyError::UnknownMessage(message.id))?;
        bar.set_message(text.to_string());
        Ok(())
    }

    async fn delete_message(&self, message: &MessageRef) -> Result<(), NotifyError> {
        let bar = lock(&self.bars)
            .remove(&message.id)
            .ok_or(NotifyError::UnknownMessage(message.id))?;
        bar.finish_and_clear();
        Ok(())
    }

    async fn send_document(
        &self,
        _chat: &ChatRef,
        path: &Path,
        filename: &str,
    ) -> Result<(), NotifyError> {
        let target = self.output_dir.join(filename);
        let delivery_error = |source| NotifyError::Delivery {
            path: target.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(delivery_error)?;
        tokio::fs::copy(path, &target).await.map_err(delivery_error)?;
        tracing::info!("wrote {}", target.display());
        if let Err(e) = self.multi.println(format!("Wrote {}", target.display())) {
            tracing::debug!("console write failed: {}", e);
        }
        Ok(())
    }

    fn schedule_delete(&self, message: MessageRef, delay: Duration) -> Option<AbortHandle> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let bars = Arc::clone(&self.bars);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(bar) = lock(&bars).remove(&message.id) {
                bar.finish_and_clear();
            }
        });
        Some(task.abort_handle())
    }
}
