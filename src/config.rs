//! JSON configuration loading and validation.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::autoreply::{BackendChoice, ReplyPolicy};

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    /// One bot credential per entry; channels are assigned round-robin.
    #[serde(default)]
    discord_tokens: Vec<String>,
    /// Single-token shorthand, merged into `discord_tokens`.
    discord_token: Option<String>,
    #[serde(default)]
    google_api_keys: Vec<String>,
    huggingface_api_key: Option<String>,
    /// Source for the file-fallback backend, one reply per line.
    messages_file: Option<String>,
    /// Directory for log files. Defaults to the current directory.
    data_dir: Option<String>,
    channels: Vec<ChannelConfigFile>,
}

#[derive(Deserialize)]
struct ChannelConfigFile {
    channel_id: String,
    #[serde(default = "default_language")]
    language: String,
    backend: BackendChoice,
    #[serde(default = "default_read_delay")]
    read_delay_secs: u64,
    #[serde(default = "default_poll_interval")]
    poll_interval_secs: u64,
    #[serde(default)]
    use_slow_mode: bool,
    #[serde(default)]
    reply_inline: bool,
    delete_after_secs: Option<u64>,
    #[serde(default)]
    delete_immediately: bool,
}

fn default_language() -> String {
    "vi".to_string()
}

fn default_read_delay() -> u64 {
    30
}

fn default_poll_interval() -> u64 {
    60
}

/// One monitored channel and how to reply on it.
pub struct ChannelConfig {
    pub channel_id: String,
    pub policy: ReplyPolicy,
}

pub struct Config {
    pub discord_tokens: Vec<String>,
    pub google_api_keys: Vec<String>,
    pub huggingface_api_key: Option<String>,
    pub messages_file: PathBuf,
    pub data_dir: PathBuf,
    pub channels: Vec<ChannelConfig>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        let mut discord_tokens: Vec<String> = file
            .discord_tokens
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if discord_tokens.is_empty() {
            if let Some(token) = file.discord_token.filter(|t| !t.trim().is_empty()) {
                discord_tokens.push(token.trim().to_string());
            }
        }
        if discord_tokens.is_empty() {
            return Err(ConfigError::Validation(
                "no Discord token found: set discord_tokens or discord_token".into(),
            ));
        }

        if file.channels.is_empty() {
            return Err(ConfigError::Validation(
                "channels must contain at least one entry".into(),
            ));
        }

        let google_api_keys: Vec<String> = file
            .google_api_keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        let huggingface_api_key = file
            .huggingface_api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let mut channels = Vec::with_capacity(file.channels.len());
        for entry in file.channels {
            if entry.channel_id.trim().is_empty() {
                return Err(ConfigError::Validation("channel_id must not be empty".into()));
            }
            match entry.backend {
                BackendChoice::Gemini if google_api_keys.is_empty() => {
                    return Err(ConfigError::Validation(format!(
                        "channel {} uses the gemini backend but google_api_keys is empty",
                        entry.channel_id
                    )));
                }
                BackendChoice::HuggingFace if huggingface_api_key.is_none() => {
                    return Err(ConfigError::Validation(format!(
                        "channel {} uses the huggingface backend but huggingface_api_key is not set",
                        entry.channel_id
                    )));
                }
                _ => {}
            }

            channels.push(ChannelConfig {
                channel_id: entry.channel_id,
                policy: ReplyPolicy {
                    language: entry.language,
                    backend: entry.backend,
                    read_delay_secs: entry.read_delay_secs,
                    poll_interval_secs: entry.poll_interval_secs,
                    use_slow_mode: entry.use_slow_mode,
                    reply_inline: entry.reply_inline,
                    delete_after_secs: entry.delete_after_secs,
                    delete_immediately: entry.delete_immediately,
                },
            });
        }

        let messages_file = file
            .messages_file
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("messages.txt"));
        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            discord_tokens,
            google_api_keys,
            huggingface_api_key,
            messages_file,
            data_dir,
            channels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config() {
        let file = write_config(r#"{
            "discord_tokens": ["token-a", "token-b"],
            "google_api_keys": ["g1", "g2"],
            "channels": [
                {"channel_id": "111", "language": "en", "backend": "gemini"}
            ]
        }"#);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.discord_tokens.len(), 2);
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].policy.backend, BackendChoice::Gemini);
        assert_eq!(config.channels[0].policy.language, "en");
        // Defaults apply.
        assert_eq!(config.channels[0].policy.read_delay_secs, 30);
        assert_eq!(config.channels[0].policy.poll_interval_secs, 60);
        assert!(!config.channels[0].policy.use_slow_mode);
    }

    #[test]
    fn test_single_token_shorthand() {
        let file = write_config(r#"{
            "discord_token": "only-token",
            "channels": [
                {"channel_id": "111", "backend": "file"}
            ]
        }"#);
        let config = Config::load(file.path()).expect("should load");
        assert_eq!(config.discord_tokens, vec!["only-token".to_string()]);
    }

    #[test]
    fn test_missing_tokens() {
        let file = write_config(r#"{
            "channels": [{"channel_id": "111", "backend": "file"}]
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("Discord token"));
    }

    #[test]
    fn test_no_channels() {
        let file = write_config(r#"{
            "discord_token": "t",
            "channels": []
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("channels"));
    }

    #[test]
    fn test_gemini_backend_requires_keys() {
        let file = write_config(r#"{
            "discord_token": "t",
            "channels": [{"channel_id": "111", "backend": "gemini"}]
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("google_api_keys"));
    }

    #[test]
    fn test_huggingface_backend_requires_key() {
        let file = write_config(r#"{
            "discord_token": "t",
            "channels": [{"channel_id": "111", "backend": "huggingface"}]
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("huggingface_api_key"));
    }

    #[test]
    fn test_file_backend_needs_no_api_keys() {
        let file = write_config(r#"{
            "discord_token": "t",
            "channels": [{"channel_id": "111", "backend": "file", "poll_interval_secs": 5}]
        }"#);
        let config = Config::load(file.path()).expect("file backend needs no keys");
        assert_eq!(config.channels[0].policy.poll_interval_secs, 5);
        assert_eq!(config.messages_file, PathBuf::from("messages.txt"));
    }

    #[test]
    fn test_delete_policy_fields() {
        let file = write_config(r#"{
            "discord_token": "t",
            "google_api_keys": ["g"],
            "channels": [{
                "channel_id": "111",
                "backend": "gemini",
                "delete_after_secs": 120,
                "delete_immediately": true,
                "reply_inline": true
            }]
        }"#);
        let config = Config::load(file.path()).expect("should load");
        let policy = &config.channels[0].policy;
        assert_eq!(policy.delete_after_secs, Some(120));
        assert!(policy.delete_immediately);
        assert!(policy.reply_inline);
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let file = write_config(r#"{
            "discord_token": "t",
            "channels": [{"channel_id": "111", "backend": "markov"}]
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
