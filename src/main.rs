mod autoreply;
mod config;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use autoreply::providers::{GeminiProvider, HuggingFaceProvider, TextProvider};
use autoreply::{
    BackendChoice, BotIdentity, ChannelSession, ChannelWorker, ChatApi, DiscordClient,
    FallbackMessages, KeyRotator, ProcessedSet, Provider, TextBackendPool,
};
use config::Config;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "autochat.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("autochat.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting autochat...");
    info!("Loaded config from {config_path}");

    let rotator = Arc::new(KeyRotator::new());
    rotator.register(Provider::Gemini, config.google_api_keys.clone());
    if let Some(ref key) = config.huggingface_api_key {
        rotator.register(Provider::HuggingFace, vec![key.clone()]);
    }

    let gemini: Option<Arc<dyn TextProvider>> = if config.google_api_keys.is_empty() {
        None
    } else {
        Some(Arc::new(GeminiProvider::new()))
    };
    let huggingface: Option<Arc<dyn TextProvider>> = if config.huggingface_api_key.is_some() {
        Some(Arc::new(HuggingFaceProvider::new()))
    } else {
        None
    };

    let pool = Arc::new(TextBackendPool::new(
        rotator,
        gemini,
        huggingface,
        FallbackMessages::new(config.messages_file.clone()),
    ));
    let processed = Arc::new(ProcessedSet::new());

    // Resolve the account behind each credential. A token whose identity
    // cannot be fetched is unusable: workers must know their own user id
    // to avoid replying to themselves.
    let mut accounts: Vec<(Arc<DiscordClient>, BotIdentity)> = Vec::new();
    for token in &config.discord_tokens {
        let client = Arc::new(DiscordClient::new(token.clone()));
        match client.fetch_self_identity().await {
            Ok(me) => {
                info!("Bot Account: {}#{} (ID: {})", me.username, me.discriminator, me.id);
                accounts.push((client, me));
            }
            Err(e) => {
                error!("Failed to fetch bot account info: {e}");
            }
        }
    }
    if accounts.is_empty() {
        eprintln!("No usable Discord token: every identity lookup failed.");
        std::process::exit(1);
    }

    for (index, channel) in config.channels.iter().enumerate() {
        let (client, me) = &accounts[index % accounts.len()];
        let channel_id = &channel.channel_id;

        match client.fetch_channel_info(channel_id).await {
            Ok(ci) => info!(
                "[Channel {channel_id}] Connected to server: {} | Channel Name: {}",
                ci.server_name, ci.channel_name
            ),
            Err(e) => warn!("[Channel {channel_id}] Error fetching channel info: {e}"),
        }

        let backend = match channel.policy.backend {
            BackendChoice::Gemini => "Google Gemini",
            BackendChoice::HuggingFace => "Hugging Face",
            BackendChoice::File => "File messages",
        };
        info!(
            "[Channel {channel_id}] Settings: API = {backend}, Language = {}, \
             Read Delay = {}s, Interval = {}s, Slow Mode = {}, Reply = {}, Delete = {}",
            channel.policy.language.to_uppercase(),
            channel.policy.read_delay_secs,
            channel.policy.poll_interval_secs,
            if channel.policy.use_slow_mode { "Active" } else { "No" },
            if channel.policy.reply_inline { "Yes" } else { "No" },
            if channel.policy.delete_immediately {
                "Immediately".to_string()
            } else {
                match channel.policy.delete_after_secs {
                    Some(secs) if secs > 0 => format!("In {secs} seconds"),
                    _ => "No".to_string(),
                }
            },
        );

        let session = ChannelSession::new(channel_id.clone(), channel.policy.clone());
        let worker = ChannelWorker::new(
            session,
            me.id.clone(),
            client.clone() as Arc<dyn ChatApi>,
            pool.clone(),
            processed.clone(),
        );
        info!(
            "[Channel {channel_id}] Bot active: {}#{}",
            me.username, me.discriminator
        );
        tokio::spawn(worker.run());
    }

    info!(
        "Bot is running on {} channel(s). Press CTRL+C to stop.",
        config.channels.len()
    );
    loop {
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
}
