//! Per-channel configuration and cursor state.

use serde::Deserialize;

/// Which text backend produces replies for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendChoice {
    /// Google Gemini, the primary AI provider.
    Gemini,
    /// Hugging Face inference API, the secondary AI provider.
    HuggingFace,
    /// Random line from the static messages file.
    File,
}

/// How a channel is replied to. Immutable after startup.
#[derive(Debug, Clone)]
pub struct ReplyPolicy {
    /// Language tag for the instruction prompt ("en", "vi").
    /// Validated at generation time, not at load time.
    pub language: String,
    pub backend: BackendChoice,
    /// Wait before each read of the channel.
    pub read_delay_secs: u64,
    /// Wait between loop iterations.
    pub poll_interval_secs: u64,
    /// Honor the channel's slow-mode interval before replying.
    pub use_slow_mode: bool,
    /// Attach a reply reference to the triggering message.
    pub reply_inline: bool,
    /// Delete the bot's own reply after this many seconds. `None` or 0 = keep it.
    pub delete_after_secs: Option<u64>,
    /// Delete the reply right away, overriding `delete_after_secs`.
    pub delete_immediately: bool,
}

impl ReplyPolicy {
    /// File-only sessions never read the channel; they just post on an interval.
    pub fn reads_messages(&self) -> bool {
        self.backend != BackendChoice::File
    }
}

/// One monitored channel: its policy plus the mutable read cursor.
/// Owned exclusively by the channel's worker for the process lifetime.
pub struct ChannelSession {
    pub channel_id: String,
    pub policy: ReplyPolicy,
    /// Id of the most recent message seen, `None` until the first read.
    pub last_seen_message_id: Option<String>,
}

impl ChannelSession {
    pub fn new(channel_id: String, policy: ReplyPolicy) -> Self {
        Self {
            channel_id,
            policy,
            last_seen_message_id: None,
        }
    }
}
