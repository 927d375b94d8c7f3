//! Chat-platform capability trait and the Discord REST implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::autoreply::message::InboundMessage;

const API_BASE: &str = "https://discord.com/api/v9";

/// The account behind a credential.
#[derive(Debug, Clone)]
pub struct BotIdentity {
    pub id: String,
    pub username: String,
    pub discriminator: String,
}

/// Channel metadata, used for the startup summary.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub server_name: String,
    pub channel_name: String,
}

/// Chat-platform operations the auto-reply core depends on.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Most recent message in the channel, if any.
    async fn fetch_latest_message(
        &self,
        channel_id: &str,
    ) -> Result<Option<InboundMessage>, String>;

    /// Current per-user posting cooldown for the channel, in seconds.
    async fn fetch_slow_mode_seconds(&self, channel_id: &str) -> Result<u64, String>;

    /// Post `text`, optionally as a reply reference. Returns the new message id.
    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<String, String>;

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), String>;

    /// Account identity behind this client's credential.
    async fn fetch_self_identity(&self) -> Result<BotIdentity, String>;

    async fn fetch_channel_info(&self, channel_id: &str) -> Result<ChannelInfo, String>;
}

#[derive(Deserialize, Debug)]
struct MessageJson {
    id: String,
    #[serde(rename = "type")]
    kind: i64,
    #[serde(default)]
    content: String,
    author: AuthorJson,
    #[serde(default)]
    attachments: Vec<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct AuthorJson {
    id: String,
}

#[derive(Deserialize, Debug)]
struct ChannelJson {
    name: Option<String>,
    guild_id: Option<String>,
    #[serde(default)]
    rate_limit_per_user: u64,
}

#[derive(Deserialize, Debug)]
struct GuildJson {
    name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct SelfJson {
    id: String,
    username: Option<String>,
    #[serde(default)]
    discriminator: String,
}

#[derive(Serialize)]
struct PostBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_reference: Option<MessageReference<'a>>,
}

#[derive(Serialize)]
struct MessageReference<'a> {
    message_id: &'a str,
}

#[derive(Deserialize)]
struct PostedJson {
    id: String,
}

/// Discord v9 REST client, one per credential.
pub struct DiscordClient {
    token: String,
    client: reqwest::Client,
}

impl DiscordClient {
    pub fn new(token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self { token, client }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, String> {
        let response = self
            .client
            .get(url)
            .header("Authorization", &self.token)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))?;

        if !status.is_success() {
            return Err(format!("API error {status}: {body}"));
        }

        serde_json::from_str(&body).map_err(|e| format!("Failed to parse response: {e}"))
    }
}

#[async_trait]
impl ChatApi for DiscordClient {
    async fn fetch_latest_message(
        &self,
        channel_id: &str,
    ) -> Result<Option<InboundMessage>, String> {
        let url = format!("{API_BASE}/channels/{channel_id}/messages?limit=1");
        let messages: Vec<MessageJson> = self.get_json(&url).await?;

        debug!("[Channel {channel_id}] Fetched {} message(s)", messages.len());

        Ok(messages.into_iter().next().map(|m| InboundMessage {
            id: m.id,
            author_id: m.author.id,
            kind: m.kind,
            content: m.content.trim().to_string(),
            attachment_count: m.attachments.len(),
        }))
    }

    async fn fetch_slow_mode_seconds(&self, channel_id: &str) -> Result<u64, String> {
        let url = format!("{API_BASE}/channels/{channel_id}");
        let channel: ChannelJson = self.get_json(&url).await?;
        Ok(channel.rate_limit_per_user)
    }

    async fn post_message(
        &self,
        channel_id: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<String, String> {
        let body = PostBody {
            content: text,
            message_reference: reply_to.map(|id| MessageReference { message_id: id }),
        };

        let url = format!("{API_BASE}/channels/{channel_id}/messages");
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| format!("Failed to read response: {e}"))?;

        if !status.is_success() {
            return Err(format!("Failed to send message. Status {status}: {body}"));
        }

        let posted: PostedJson =
            serde_json::from_str(&body).map_err(|e| format!("Failed to parse response: {e}"))?;
        Ok(posted.id)
    }

    async fn delete_message(&self, channel_id: &str, message_id: &str) -> Result<(), String> {
        let url = format!("{API_BASE}/channels/{channel_id}/messages/{message_id}");
        let response = self
            .client
            .delete(&url)
            .header("Authorization", &self.token)
            .send()
            .await
            .map_err(|e| format!("HTTP error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Failed to delete message. Status {status}: {body}"));
        }

        Ok(())
    }

    async fn fetch_self_identity(&self) -> Result<BotIdentity, String> {
        let url = format!("{API_BASE}/users/@me");
        let me: SelfJson = self.get_json(&url).await?;

        Ok(BotIdentity {
            id: me.id,
            username: me.username.unwrap_or_else(|| "Unknown".to_string()),
            discriminator: me.discriminator,
        })
    }

    async fn fetch_channel_info(&self, channel_id: &str) -> Result<ChannelInfo, String> {
        let url = format!("{API_BASE}/channels/{channel_id}");
        let channel: ChannelJson = self.get_json(&url).await?;

        let channel_name = channel
            .name
            .unwrap_or_else(|| "Unknown Channel".to_string());

        // Channels without a guild are direct messages.
        let server_name = match channel.guild_id {
            Some(guild_id) => {
                let url = format!("{API_BASE}/guilds/{guild_id}");
                match self.get_json::<GuildJson>(&url).await {
                    Ok(guild) => guild.name.unwrap_or_else(|| "Unknown Server".to_string()),
                    Err(e) => {
                        warn!("Failed to fetch guild {guild_id}: {e}");
                        "Unknown Server".to_string()
                    }
                }
            }
            None => "Direct Message".to_string(),
        };

        Ok(ChannelInfo {
            server_name,
            channel_name,
        })
    }
}
