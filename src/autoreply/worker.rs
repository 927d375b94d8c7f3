//! Per-channel polling loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::autoreply::backend::TextBackendPool;
use crate::autoreply::chat::ChatApi;
use crate::autoreply::dedup::ProcessedSet;
use crate::autoreply::deleter::DeleteScheduler;
use crate::autoreply::message::{echoes_prompt, InboundMessage};
use crate::autoreply::session::ChannelSession;

/// Slow-mode wait applied when the channel lookup fails.
const DEFAULT_SLOW_MODE_SECS: u64 = 5;

/// One worker per monitored channel, bound to one credential. Runs
/// forever; transport failures only skip the current cycle.
pub struct ChannelWorker {
    session: ChannelSession,
    bot_user_id: String,
    api: Arc<dyn ChatApi>,
    pool: Arc<TextBackendPool>,
    processed: Arc<ProcessedSet>,
    deleter: DeleteScheduler,
}

impl ChannelWorker {
    pub fn new(
        session: ChannelSession,
        bot_user_id: String,
        api: Arc<dyn ChatApi>,
        pool: Arc<TextBackendPool>,
        processed: Arc<ProcessedSet>,
    ) -> Self {
        let deleter = DeleteScheduler::new(api.clone());
        Self {
            session,
            bot_user_id,
            api,
            pool,
            processed,
            deleter,
        }
    }

    /// Poll the channel forever. File-only sessions skip reading and just
    /// post a fallback line every interval.
    pub async fn run(mut self) {
        let channel = self.session.channel_id.clone();
        let read_delay = Duration::from_secs(self.session.policy.read_delay_secs);
        let poll_interval = Duration::from_secs(self.session.policy.poll_interval_secs);

        if self.session.policy.reads_messages() {
            loop {
                info!(
                    "[Channel {channel}] Waiting {}s before reading messages...",
                    read_delay.as_secs()
                );
                sleep(read_delay).await;
                self.run_cycle().await;
                info!(
                    "[Channel {channel}] Waiting {}s before next iteration...",
                    poll_interval.as_secs()
                );
                sleep(poll_interval).await;
            }
        } else {
            loop {
                info!(
                    "[Channel {channel}] Waiting {}s before sending message from file...",
                    poll_interval.as_secs()
                );
                sleep(poll_interval).await;
                self.send_fallback_cycle().await;
            }
        }
    }

    /// One read-decide-generate-send pass, without the surrounding sleeps.
    async fn run_cycle(&mut self) {
        let channel = self.session.channel_id.clone();

        let message = match self.api.fetch_latest_message(&channel).await {
            Ok(message) => message,
            Err(e) => {
                warn!("[Channel {channel}] Request error: {e}");
                return;
            }
        };

        let Some(message) = message else {
            info!("[Channel {channel}] No new messages.");
            return;
        };
        if self.session.last_seen_message_id.as_deref() == Some(message.id.as_str()) {
            debug!("[Channel {channel}] Latest message unchanged since last poll.");
        }
        self.session.last_seen_message_id = Some(message.id.clone());

        if !self.eligible(&message) {
            return;
        }
        info!("[Channel {channel}] Received: {}", message.content);

        if self.session.policy.use_slow_mode {
            let secs = match self.api.fetch_slow_mode_seconds(&channel).await {
                Ok(secs) => secs,
                Err(e) => {
                    warn!("[Channel {channel}] Failed to fetch slow mode info: {e}");
                    DEFAULT_SLOW_MODE_SECS
                }
            };
            info!("[Channel {channel}] Slow mode active, waiting {secs} seconds...");
            sleep(Duration::from_secs(secs)).await;
        }

        // Mark before generating so a slow generation cannot process the
        // same message twice.
        self.processed.mark_processed(&message.id);

        let policy = &self.session.policy;
        let Some(reply) = self
            .pool
            .generate(&message.content, &policy.language, policy.backend)
            .await
        else {
            warn!("[Channel {channel}] Invalid prompt language. Message skipped.");
            return;
        };

        if echoes_prompt(&reply, &message.content) {
            warn!("[Channel {channel}] Reply matches received message. Not sending reply.");
            return;
        }

        let reply_to = policy.reply_inline.then_some(message.id.as_str());
        self.send_reply(&reply, reply_to).await;
    }

    async fn send_fallback_cycle(&self) {
        let policy = &self.session.policy;
        if let Some(text) = self
            .pool
            .generate("", &policy.language, policy.backend)
            .await
        {
            self.send_reply(&text, None).await;
        }
    }

    fn eligible(&self, message: &InboundMessage) -> bool {
        let channel = &self.session.channel_id;

        if message.author_id == self.bot_user_id {
            return false;
        }
        if message.is_system() {
            return false;
        }
        if self.processed.is_processed(&message.id) {
            return false;
        }
        if !message.is_plain_text() {
            warn!("[Channel {channel}] Message not processed (not pure text).");
            return false;
        }
        true
    }

    async fn send_reply(&self, text: &str, reply_to: Option<&str>) {
        let channel = &self.session.channel_id;

        let message_id = match self.api.post_message(channel, text, reply_to).await {
            Ok(id) => {
                info!("[Channel {channel}] Message sent: \"{text}\" (ID: {id})");
                id
            }
            Err(e) => {
                warn!("[Channel {channel}] Error sending message: {e}");
                return;
            }
        };

        let policy = &self.session.policy;
        if policy.delete_immediately {
            info!("[Channel {channel}] Deleting message immediately without delay...");
            self.deleter.delete_now(channel, &message_id);
        } else if let Some(secs) = policy.delete_after_secs.filter(|secs| *secs > 0) {
            self.deleter
                .delete_after(channel, &message_id, Duration::from_secs(secs));
        }
    }
}
