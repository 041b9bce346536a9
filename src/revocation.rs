//! Revoked-token registry
//!
//! Consulted by the connection gate before a token's signature is trusted.
//! Entries expire when the token itself would have expired, after which the
//! token is rejected by expiry validation anyway, so a periodic sweep keeps
//! the set bounded.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound on how long one entry is kept, whatever `exp` the token claims
const MAX_ENTRY_LIFETIME: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Storage for revoked tokens. In-process by default; an external cache can
/// implement this to share revocations across relay instances.
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Revoke a token. `expires_at` is the token's `exp` (unix seconds) when
    /// known.
    async fn revoke(&self, token: &str, expires_at: Option<u64>);

    async fn is_revoked(&self, token: &str) -> bool;
}

/// Revocation settings
#[derive(Debug, Clone)]
pub struct RevocationConfig {
    /// Lifetime of an entry whose token expiry is unknown
    pub default_ttl: Duration,
    /// How often expired entries are swept
    pub sweep_interval: Duration,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl RevocationConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl: std::env::var("REVOCATION_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            sweep_interval: std::env::var("REVOCATION_SWEEP_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
        }
    }
}

/// In-memory revocation set keyed by the raw token
#[derive(Debug)]
pub struct RevocationRegistry {
    entries: DashMap<String, Instant>,
    default_ttl: Duration,
}

impl RevocationRegistry {
    pub fn new(config: &RevocationConfig) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl: config.default_ttl,
        }
    }

    /// Drop entries whose token has expired. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, until| *until > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn deadline(&self, expires_at: Option<u64>) -> Instant {
        let now = Instant::now();
        let fallback = now + self.default_ttl;
        let Some(exp) = expires_at else {
            return fallback;
        };
        let now_unix = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        let remaining = Duration::from_secs(exp.saturating_sub(now_unix)).min(MAX_ENTRY_LIFETIME);
        now.checked_add(remaining).unwrap_or(fallback)
    }
}

#[async_trait]
impl RevocationStore for RevocationRegistry {
    async fn revoke(&self, token: &str, expires_at: Option<u64>) {
        let until = self.deadline(expires_at);
        self.entries
            .entry(token.to_string())
            .and_modify(|existing| *existing = (*existing).max(until))
            .or_insert(until);
    }

    async fn is_revoked(&self, token: &str) -> bool {
        self.entries
            .get(token)
            .is_some_and(|until| *until > Instant::now())
    }
}

/// Spawn a background task that periodically evicts expired revocations
pub fn spawn_revocation_sweeper(registry: Arc<RevocationRegistry>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let removed = registry.sweep();
            if removed > 0 {
                tracing::debug!(removed, remaining = registry.len(), "Swept expired revocations");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now_unix() -> u64 {
        chrono::Utc::now().timestamp() as u64
    }

    #[tokio::test]
    async fn test_revoke_and_check() {
        let registry = RevocationRegistry::new(&RevocationConfig::default());
        assert!(!registry.is_revoked("tok").await);

        registry.revoke("tok", Some(now_unix() + 3600)).await;
        assert!(registry.is_revoked("tok").await);
        assert!(!registry.is_revoked("other").await);
    }

    #[tokio::test]
    async fn test_revoke_without_expiry_uses_default_ttl() {
        let registry = RevocationRegistry::new(&RevocationConfig::default());
        registry.revoke("tok", None).await;
        assert!(registry.is_revoked("tok").await);
        assert_eq!(registry.sweep(), 0);
    }

    #[tokio::test]
    async fn test_expired_entries_are_ignored_and_swept() {
        let registry = RevocationRegistry::new(&RevocationConfig::default());
        registry.revoke("old", Some(now_unix().saturating_sub(10))).await;
        registry.revoke("fresh", Some(now_unix() + 3600)).await;

        assert!(!registry.is_revoked("old").await);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.sweep(), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.is_revoked("fresh").await);
    }

    #[tokio::test]
    async fn test_revoke_twice_keeps_latest_deadline() {
        let registry = RevocationRegistry::new(&RevocationConfig::default());
        registry.revoke("tok", Some(now_unix() + 3600)).await;
        registry.revoke("tok", Some(now_unix().saturating_sub(10))).await;
        assert!(registry.is_revoked("tok").await);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_far_future_expiry_stays_revoked() {
        let registry = RevocationRegistry::new(&RevocationConfig::default());
        registry.revoke("max", Some(u64::MAX)).await;
        registry.revoke("past-i64", Some(i64::MAX as u64 + 10)).await;

        assert!(registry.is_revoked("max").await);
        assert!(registry.is_revoked("past-i64").await);
        assert_eq!(registry.sweep(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_revocations() {
        let registry = Arc::new(RevocationRegistry::new(&RevocationConfig::default()));
        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                registry.revoke(&format!("tok-{i}"), None).await;
                registry.is_revoked(&format!("tok-{i}")).await
            }));
        }
        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(registry.len(), 32);
    }

    #[test]
    fn test_revocation_config_default() {
        let config = RevocationConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(86400));
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
    }
}
