//! Auto-reply core: per-channel polling workers, backend rotation,
//! dedup and deferred deletion.

pub mod backend;
pub mod chat;
pub mod dedup;
pub mod deleter;
pub mod keypool;
pub mod message;
pub mod providers;
pub mod session;
pub mod worker;

pub use backend::{FallbackMessages, TextBackendPool};
pub use chat::{BotIdentity, ChatApi, DiscordClient};
pub use dedup::ProcessedSet;
pub use keypool::{KeyRotator, Provider};
pub use session::{BackendChoice, ChannelSession, ReplyPolicy};
pub use worker::ChannelWorker;
