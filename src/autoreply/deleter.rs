//! Fire-and-forget deletion of the bot's own replies.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::autoreply::chat::ChatApi;

/// Deletes previously sent messages on detached tasks so the worker
/// loop never waits on the outcome. Timers are one-shot and never
/// cancelled; anything still pending is abandoned at process exit.
pub struct DeleteScheduler {
    api: Arc<dyn ChatApi>,
}

impl DeleteScheduler {
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self { api }
    }

    /// Delete right away, without blocking the caller.
    pub fn delete_now(&self, channel_id: &str, message_id: &str) {
        self.spawn_delete(channel_id.to_string(), message_id.to_string(), Duration::ZERO);
    }

    /// Delete after `delay` elapses.
    pub fn delete_after(&self, channel_id: &str, message_id: &str, delay: Duration) {
        info!(
            "[Channel {channel_id}] Message {message_id} will be deleted in {} seconds...",
            delay.as_secs()
        );
        self.spawn_delete(channel_id.to_string(), message_id.to_string(), delay);
    }

    fn spawn_delete(&self, channel_id: String, message_id: String, delay: Duration) {
        let api = self.api.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                sleep(delay).await;
            }
            match api.delete_message(&channel_id, &message_id).await {
                Ok(()) => {
                    info!("[Channel {channel_id}] Message {message_id} successfully deleted.");
                }
                Err(e) => {
                    warn!("[Channel {channel_id}] Failed to delete message {message_id}: {e}");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoreply::chat::{BotIdentity, ChannelInfo};
    use crate::autoreply::message::InboundMessage;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChat {
        deleted: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl ChatApi for RecordingChat {
        async fn fetch_latest_message(
            &self,
            _channel_id: &str,
        ) -> Result<Option<InboundMessage>, String> {
            Ok(None)
        }

        async fn fetch_slow_mode_seconds(&self, _channel_id: &str) -> Result<u64, String> {
            Ok(0)
        }

        async fn post_message(
            &self,
            _channel_id: &str,
            _text: &str,
            _reply_to: Option<&str>,
        ) -> Result<String, String> {
            Ok("0".to_string())
        }

        async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), String> {
            self.deleted
                .lock()
                .unwrap()
                .push((channel_id.to_string(), message_id.to_string()));
            Ok(())
        }

        async fn fetch_self_identity(&self) -> Result<BotIdentity, String> {
            Err("not implemented".to_string())
        }

        async fn fetch_channel_info(&self, _channel_id: &str) -> Result<ChannelInfo, String> {
            Err("not implemented".to_string())
        }
    }

    #[tokio::test]
    async fn test_delete_now_fires_without_waiting() {
        let chat = Arc::new(RecordingChat::default());
        let scheduler = DeleteScheduler::new(chat.clone());

        scheduler.delete_now("chan", "msg-1");
        // The call returned immediately; give the detached task a tick.
        sleep(Duration::from_millis(20)).await;

        let deleted = chat.deleted.lock().unwrap().clone();
        assert_eq!(deleted, vec![("chan".to_string(), "msg-1".to_string())]);
    }

    #[tokio::test]
    async fn test_delete_after_waits_for_delay() {
        let chat = Arc::new(RecordingChat::default());
        let scheduler = DeleteScheduler::new(chat.clone());

        scheduler.delete_after("chan", "msg-2", Duration::from_millis(80));

        sleep(Duration::from_millis(30)).await;
        assert!(chat.deleted.lock().unwrap().is_empty());

        sleep(Duration::from_millis(100)).await;
        let deleted = chat.deleted.lock().unwrap().clone();
        assert_eq!(deleted, vec![("chan".to_string(), "msg-2".to_string())]);
    }

    #[tokio::test]
    async fn test_each_schedule_fires_exactly_once() {
        let chat = Arc::new(RecordingChat::default());
        let scheduler = DeleteScheduler::new(chat.clone());

        scheduler.delete_after("chan", "a", Duration::from_millis(10));
        scheduler.delete_after("chan", "b", Duration::from_millis(10));
        sleep(Duration::from_millis(60)).await;

        let deleted = chat.deleted.lock().unwrap().clone();
        assert_eq!(deleted.len(), 2);
    }
}
