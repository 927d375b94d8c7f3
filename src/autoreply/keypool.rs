//! Credential rotation with per-provider rate-limit cooldowns.

use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Wait applied when every credential of a provider is cooling down,
/// after which all marks for that provider are cleared.
const EXHAUSTION_COOLDOWN_SECS: u64 = 30;

/// A text-generation provider whose credentials are rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gemini,
    HuggingFace,
}

#[derive(Default)]
struct ProviderState {
    keys: Vec<String>,
    /// Credentials excluded from selection until the pool is cleared.
    cooling: HashSet<String>,
    /// Most recent successfully generated text, for repeat detection.
    last_text: Option<String>,
}

/// Process-wide credential pool, shared by every worker. A key
/// rate-limited on one channel is unusable on all of them.
pub struct KeyRotator {
    providers: Mutex<HashMap<Provider, ProviderState>>,
    cooldown: Duration,
}

impl KeyRotator {
    pub fn new() -> Self {
        Self::with_cooldown(Duration::from_secs(EXHAUSTION_COOLDOWN_SECS))
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            providers: Mutex::new(HashMap::new()),
            cooldown,
        }
    }

    pub fn register(&self, provider: Provider, keys: Vec<String>) {
        let mut providers = self.lock();
        providers.entry(provider).or_default().keys = keys;
    }

    /// Number of credentials not currently cooling down.
    pub fn eligible_count(&self, provider: Provider) -> usize {
        let providers = self.lock();
        match providers.get(&provider) {
            Some(state) => state.keys.iter().filter(|k| !state.cooling.contains(*k)).count(),
            None => 0,
        }
    }

    /// Pick a random credential that is not cooling down.
    pub fn try_acquire(&self, provider: Provider) -> Option<String> {
        let providers = self.lock();
        let state = providers.get(&provider)?;
        let eligible: Vec<&String> = state
            .keys
            .iter()
            .filter(|k| !state.cooling.contains(*k))
            .collect();
        eligible.choose(&mut rand::thread_rng()).map(|k| (*k).clone())
    }

    /// Like [`try_acquire`](Self::try_acquire), but when every credential
    /// is cooling down, waits out the cooldown, clears all marks for the
    /// provider, and retries once. Returns `None` only when the provider
    /// has no credentials registered at all.
    pub async fn acquire(&self, provider: Provider) -> Option<String> {
        if let Some(key) = self.try_acquire(provider) {
            return Some(key);
        }
        if self.key_count(provider) == 0 {
            return None;
        }
        warn!(
            "All {provider:?} credentials hit rate limit. Waiting {}s before retrying...",
            self.cooldown.as_secs()
        );
        tokio::time::sleep(self.cooldown).await;
        self.clear_cooldowns(provider);
        self.try_acquire(provider)
    }

    /// Idempotent: marking an already-cooling credential is a no-op.
    pub fn mark_cooling_down(&self, provider: Provider, key: &str) {
        let mut providers = self.lock();
        if let Some(state) = providers.get_mut(&provider) {
            state.cooling.insert(key.to_string());
        }
    }

    pub fn clear_cooldowns(&self, provider: Provider) {
        let mut providers = self.lock();
        if let Some(state) = providers.get_mut(&provider) {
            state.cooling.clear();
        }
    }

    /// Whether `text` matches the provider's previous successful output.
    pub fn is_repeat(&self, provider: Provider, text: &str) -> bool {
        let providers = self.lock();
        providers
            .get(&provider)
            .and_then(|s| s.last_text.as_deref())
            .is_some_and(|last| last == text)
    }

    pub fn record_text(&self, provider: Provider, text: &str) {
        let mut providers = self.lock();
        if let Some(state) = providers.get_mut(&provider) {
            state.last_text = Some(text.to_string());
        }
    }

    fn key_count(&self, provider: Provider) -> usize {
        let providers = self.lock();
        providers.get(&provider).map_or(0, |s| s.keys.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Provider, ProviderState>> {
        self.providers.lock().expect("key rotator lock poisoned")
    }
}
