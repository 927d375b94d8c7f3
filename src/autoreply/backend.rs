//! Reply text production: AI providers with credential rotation, plus
//! the static file fallback.

use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::autoreply::keypool::{KeyRotator, Provider};
use crate::autoreply::providers::{ProviderError, TextProvider};
use crate::autoreply::session::BackendChoice;

/// Returned when the messages file is empty or unreadable.
const NO_MESSAGE_PLACEHOLDER: &str = "No messages available in file.";

/// Duplicate-text retry budget for the secondary provider.
const SECONDARY_REPEAT_RETRIES: usize = 3;

/// Static reply source: a plain text file, one candidate reply per line.
/// Read on every call so edits take effect without a restart.
pub struct FallbackMessages {
    path: PathBuf,
}

impl FallbackMessages {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Uniformly random non-empty line, or a fixed placeholder. Never fails.
    pub fn random_line(&self) -> String {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read messages file {}: {e}", self.path.display());
                return NO_MESSAGE_PLACEHOLDER.to_string();
            }
        };

        let lines: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        match lines.choose(&mut rand::thread_rng()) {
            Some(line) => line.to_string(),
            None => NO_MESSAGE_PLACEHOLDER.to_string(),
        }
    }
}

/// Wrap the user's message in a language-specific instruction.
/// Unsupported language tags produce `None`; callers skip the cycle.
fn wrap_prompt(user_message: &str, language: &str) -> Option<String> {
    match language {
        "vi" => Some(format!(
            "Bạn là một người bạn thật trên Discord, không phải chatbot, trả lời tin nhắn sau bằng tiếng Việt, \
             phong cách tự nhiên, dùng từ lóng thoải mái tự nhiên, không dùng dấu cảm thán cuối câu, \
             tránh câu trả lời cứng nhắc hoặc giống AI. Tin nhắn: {user_message}"
        )),
        "en" => Some(format!(
            "You're a friendly Discord user, reply to the following message in English, \
             with a casual, natural tone, like a real person chatting, use light slang if it fits, \
             avoid stiff or AI-like responses. Message: {user_message}"
        )),
        _ => None,
    }
}

/// Interchangeable text-production strategies behind one operation:
/// produce non-repeating reply text for a prompt.
pub struct TextBackendPool {
    rotator: Arc<KeyRotator>,
    gemini: Option<Arc<dyn TextProvider>>,
    huggingface: Option<Arc<dyn TextProvider>>,
    fallback: FallbackMessages,
}

impl TextBackendPool {
    pub fn new(
        rotator: Arc<KeyRotator>,
        gemini: Option<Arc<dyn TextProvider>>,
        huggingface: Option<Arc<dyn TextProvider>>,
        fallback: FallbackMessages,
    ) -> Self {
        Self {
            rotator,
            gemini,
            huggingface,
            fallback,
        }
    }

    /// Produce reply text for `prompt`. `None` means an unsupported
    /// language tag; every other failure degrades to a simpler backend
    /// and still yields text.
    pub async fn generate(
        &self,
        prompt: &str,
        language: &str,
        choice: BackendChoice,
    ) -> Option<String> {
        match choice {
            BackendChoice::File => Some(self.fallback.random_line()),
            BackendChoice::Gemini => self.generate_gemini(prompt, language).await,
            BackendChoice::HuggingFace => self.generate_huggingface(prompt, language).await,
        }
    }

    async fn generate_gemini(&self, prompt: &str, language: &str) -> Option<String> {
        let Some(ref provider) = self.gemini else {
            return self.generate_huggingface(prompt, language).await;
        };

        let Some(base_prompt) = wrap_prompt(prompt, language) else {
            warn!("Invalid prompt language '{language}'. Message skipped.");
            return None;
        };
        let ai_prompt =
            format!("{base_prompt}\n\nKeep it one sentence, conversational, and avoid formal phrases.");

        // Rate-limit rotation is bounded by the credential count; the
        // duplicate-text retry is not bounded, but each pass is logged and
        // a fresh credential typically yields different text.
        loop {
            let Some(key) = self.rotator.acquire(Provider::Gemini).await else {
                break;
            };

            match provider.generate(&key, &ai_prompt).await {
                Ok(text) => {
                    if self.rotator.is_repeat(Provider::Gemini, &text) {
                        info!("Gemini generated same text, requesting new text...");
                        continue;
                    }
                    self.rotator.record_text(Provider::Gemini, &text);
                    return Some(text);
                }
                Err(ProviderError::RateLimited) => {
                    warn!("Gemini key hit rate limit (429). Switching to another key or API...");
                    self.rotator.mark_cooling_down(Provider::Gemini, &key);
                    if self.rotator.eligible_count(Provider::Gemini) == 0 {
                        warn!("All Gemini credentials rate limited this cycle.");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Gemini API error: {e}");
                    break;
                }
            }
        }

        if self.huggingface.is_some() {
            info!("Switching to Hugging Face API...");
            self.generate_huggingface(prompt, language).await
        } else {
            Some(self.fallback.random_line())
        }
    }

    async fn generate_huggingface(&self, prompt: &str, language: &str) -> Option<String> {
        let Some(ref provider) = self.huggingface else {
            return Some(self.fallback.random_line());
        };

        let Some(ai_prompt) = wrap_prompt(prompt, language) else {
            warn!("Invalid prompt language '{language}'. Message skipped.");
            return None;
        };

        let Some(key) = self.rotator.acquire(Provider::HuggingFace).await else {
            return Some(self.fallback.random_line());
        };

        let mut repeated: Option<String> = None;
        for _ in 0..SECONDARY_REPEAT_RETRIES {
            match provider.generate(&key, &ai_prompt).await {
                Ok(text) => {
                    if self.rotator.is_repeat(Provider::HuggingFace, &text) {
                        info!("Hugging Face generated same text, requesting new text...");
                        repeated = Some(text);
                        continue;
                    }
                    self.rotator.record_text(Provider::HuggingFace, &text);
                    return Some(text);
                }
                Err(e) => {
                    warn!("Hugging Face API error: {e}");
                    return Some(self.fallback.random_line());
                }
            }
        }

        warn!("Hugging Face keeps returning the same text, using it anyway.");
        repeated.or_else(|| Some(self.fallback.random_line()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autoreply::providers::ProviderError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Scripted provider: pops one outcome per call and records the
    /// credential each call used.
    struct ScriptedProvider {
        outcomes: Mutex<VecDeque<Result<String, ProviderError>>>,
        credentials_used: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(outcomes: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                credentials_used: Mutex::new(Vec::new()),
            })
        }

        fn credentials_used(&self) -> Vec<String> {
            self.credentials_used.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextProvider for ScriptedProvider {
        async fn generate(&self, credential: &str, _prompt: &str) -> Result<String, ProviderError> {
            self.credentials_used
                .lock()
                .unwrap()
                .push(credential.to_string());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(ProviderError::Failed("script exhausted".to_string())))
        }
    }

    fn as_dyn(provider: &Arc<ScriptedProvider>) -> Arc<dyn TextProvider> {
        provider.clone()
    }

    fn messages_file(lines: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(lines.as_bytes()).unwrap();
        file
    }

    fn rotator_with_gemini_keys(keys: &[&str]) -> Arc<KeyRotator> {
        let rotator = Arc::new(KeyRotator::with_cooldown(Duration::from_millis(20)));
        rotator.register(
            Provider::Gemini,
            keys.iter().map(|k| k.to_string()).collect(),
        );
        rotator
    }

    fn pool(
        rotator: Arc<KeyRotator>,
        gemini: Option<Arc<dyn TextProvider>>,
        huggingface: Option<Arc<dyn TextProvider>>,
        fallback_path: PathBuf,
    ) -> TextBackendPool {
        TextBackendPool::new(rotator, gemini, huggingface, FallbackMessages::new(fallback_path))
    }

    #[test]
    fn test_fallback_random_line() {
        let file = messages_file("first\n\nsecond\n   \nthird\n");
        let fallback = FallbackMessages::new(file.path().to_path_buf());
        for _ in 0..20 {
            let line = fallback.random_line();
            assert!(["first", "second", "third"].contains(&line.as_str()));
        }
    }

    #[test]
    fn test_fallback_empty_file_placeholder() {
        let file = messages_file("");
        let fallback = FallbackMessages::new(file.path().to_path_buf());
        assert_eq!(fallback.random_line(), NO_MESSAGE_PLACEHOLDER);
    }

    #[test]
    fn test_fallback_missing_file_placeholder() {
        let fallback = FallbackMessages::new(PathBuf::from("/nonexistent/messages.txt"));
        assert_eq!(fallback.random_line(), NO_MESSAGE_PLACEHOLDER);
    }

    #[test]
    fn test_wrap_prompt_languages() {
        assert!(wrap_prompt("hi", "en").unwrap().contains("hi"));
        assert!(wrap_prompt("xin chào", "vi").unwrap().contains("xin chào"));
        assert!(wrap_prompt("hi", "fr").is_none());
        assert!(wrap_prompt("hi", "").is_none());
    }

    #[tokio::test]
    async fn test_invalid_language_returns_none() {
        let file = messages_file("hello\n");
        let provider = ScriptedProvider::new(vec![Ok("text".to_string())]);
        let rotator = rotator_with_gemini_keys(&["k1"]);
        let pool = pool(rotator, Some(as_dyn(&provider)), None, file.path().to_path_buf());

        let result = pool.generate("hi", "xx", BackendChoice::Gemini).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_gemini_success_records_last_text() {
        let file = messages_file("hello\n");
        let provider = ScriptedProvider::new(vec![Ok("fresh reply".to_string())]);
        let rotator = rotator_with_gemini_keys(&["k1"]);
        let pool = pool(
            rotator.clone(),
            Some(as_dyn(&provider)),
            None,
            file.path().to_path_buf(),
        );

        let result = pool.generate("hi", "en", BackendChoice::Gemini).await;
        assert_eq!(result.as_deref(), Some("fresh reply"));
        assert!(rotator.is_repeat(Provider::Gemini, "fresh reply"));
    }

    #[tokio::test]
    async fn test_rate_limited_twice_then_third_key_succeeds() {
        let file = messages_file("hello\n");
        let provider = ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited),
            Err(ProviderError::RateLimited),
            Ok("third time lucky".to_string()),
        ]);
        let rotator = rotator_with_gemini_keys(&["k1", "k2", "k3"]);
        let pool = pool(
            rotator.clone(),
            Some(as_dyn(&provider)),
            None,
            file.path().to_path_buf(),
        );

        let result = pool.generate("hi", "en", BackendChoice::Gemini).await;
        assert_eq!(result.as_deref(), Some("third time lucky"));

        // The two rate-limited credentials ended up cooling down.
        let used = provider.credentials_used();
        assert_eq!(used.len(), 3);
        assert_eq!(rotator.eligible_count(Provider::Gemini), 1);
        assert_eq!(rotator.try_acquire(Provider::Gemini).as_deref(), Some(used[2].as_str()));
    }

    #[tokio::test]
    async fn test_gemini_exhaustion_falls_back_to_file() {
        let file = messages_file("from the file\n");
        let provider = ScriptedProvider::new(vec![Err(ProviderError::RateLimited)]);
        let rotator = rotator_with_gemini_keys(&["only"]);
        let pool = pool(rotator, Some(as_dyn(&provider)), None, file.path().to_path_buf());

        let result = pool.generate("hi", "en", BackendChoice::Gemini).await;
        assert_eq!(result.as_deref(), Some("from the file"));
    }

    #[tokio::test]
    async fn test_gemini_transport_error_falls_through_to_secondary() {
        let file = messages_file("from the file\n");
        let gemini = ScriptedProvider::new(vec![Err(ProviderError::Failed("boom".to_string()))]);
        let huggingface = ScriptedProvider::new(vec![Ok("hf reply".to_string())]);
        let rotator = rotator_with_gemini_keys(&["k1"]);
        rotator.register(Provider::HuggingFace, vec!["hf-key".to_string()]);
        let pool = pool(
            rotator,
            Some(as_dyn(&gemini)),
            Some(as_dyn(&huggingface)),
            file.path().to_path_buf(),
        );

        let result = pool.generate("hi", "en", BackendChoice::Gemini).await;
        assert_eq!(result.as_deref(), Some("hf reply"));
    }

    #[tokio::test]
    async fn test_gemini_duplicate_text_rerequests() {
        let file = messages_file("hello\n");
        let provider = ScriptedProvider::new(vec![
            Ok("same old".to_string()),
            Ok("something new".to_string()),
        ]);
        let rotator = rotator_with_gemini_keys(&["k1"]);
        rotator.record_text(Provider::Gemini, "same old");
        let pool = pool(rotator, Some(as_dyn(&provider)), None, file.path().to_path_buf());

        let result = pool.generate("hi", "en", BackendChoice::Gemini).await;
        assert_eq!(result.as_deref(), Some("something new"));
    }

    #[tokio::test]
    async fn test_huggingface_repeat_budget_exhausted_returns_text_anyway() {
        let file = messages_file("hello\n");
        let provider = ScriptedProvider::new(vec![
            Ok("stuck".to_string()),
            Ok("stuck".to_string()),
            Ok("stuck".to_string()),
        ]);
        let rotator = Arc::new(KeyRotator::with_cooldown(Duration::from_millis(20)));
        rotator.register(Provider::HuggingFace, vec!["hf-key".to_string()]);
        rotator.record_text(Provider::HuggingFace, "stuck");
        let pool = pool(rotator, None, Some(as_dyn(&provider)), file.path().to_path_buf());

        let result = pool.generate("hi", "en", BackendChoice::HuggingFace).await;
        assert_eq!(result.as_deref(), Some("stuck"));
    }

    #[tokio::test]
    async fn test_huggingface_failure_falls_back_to_file() {
        let file = messages_file("canned line\n");
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Failed("down".to_string()))]);
        let rotator = Arc::new(KeyRotator::with_cooldown(Duration::from_millis(20)));
        rotator.register(Provider::HuggingFace, vec!["hf-key".to_string()]);
        let pool = pool(rotator, None, Some(as_dyn(&provider)), file.path().to_path_buf());

        let result = pool.generate("hi", "en", BackendChoice::HuggingFace).await;
        assert_eq!(result.as_deref(), Some("canned line"));
    }

    #[tokio::test]
    async fn test_file_backend_ignores_language() {
        let file = messages_file("only line\n");
        let rotator = Arc::new(KeyRotator::with_cooldown(Duration::from_millis(20)));
        let pool = pool(rotator, None, None, file.path().to_path_buf());

        let result = pool.generate("", "zz", BackendChoice::File).await;
        assert_eq!(result.as_deref(), Some("only line"));
    }
}
