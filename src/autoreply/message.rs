//! Inbound message model and reply-eligibility checks.

use regex::Regex;
use std::sync::OnceLock;

/// Discord message type for system entries the bot must never answer.
const SYSTEM_MESSAGE_KIND: i64 = 8;

/// A message fetched from a channel. Transient: read fresh each poll,
/// never persisted.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub author_id: String,
    /// Raw Discord message type.
    pub kind: i64,
    pub content: String,
    pub attachment_count: usize,
}

impl InboundMessage {
    /// Non-content system marker (member joins and the like).
    pub fn is_system(&self) -> bool {
        self.kind == SYSTEM_MESSAGE_KIND
    }

    /// Plain conversational text: no attachments and at least one word
    /// character in the content.
    pub fn is_plain_text(&self) -> bool {
        self.attachment_count == 0 && word_char().is_match(&self.content)
    }
}

fn word_char() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w").unwrap())
}

/// True when a generated reply would just echo the prompt back at the
/// user, ignoring case and surrounding whitespace.
pub fn echoes_prompt(reply: &str, prompt: &str) -> bool {
    reply.trim().to_lowercase() == prompt.trim().to_lowercase()
}
