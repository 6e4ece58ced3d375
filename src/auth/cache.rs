//! Single-slot token cache.

use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A bearer token and the instant the vendor stops honouring it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// Usable while `now < expires_at - margin`.
    pub fn is_valid(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(margin)
            .is_some_and(|limit| now < limit)
    }

    /// Whole seconds left before expiry, floored at zero.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        self.expires_at
            .signed_duration_since(now)
            .num_seconds()
            .max(0)
    }
}

/// Storage for the process-wide token.
///
/// Writes replace the slot wholesale; concurrent writers race and the last
/// one wins.
pub trait TokenCache: Send + Sync {
    fn get(&self) -> Option<CachedToken>;
    fn set(&self, token: CachedToken);
    fn clear(&self);
}

/// In-process [`TokenCache`].
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    slot: RwLock<Option<CachedToken>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self) -> Option<CachedToken> {
        self.slot.read().ok().and_then(|guard| guard.clone())
    }

    fn set(&self, token: CachedToken) {
        if let Ok(mut guard) = self.slot.write() {
            *guard = Some(token);
        }
    }

    fn clear(&self) {
        if let Ok(mut guard) = self.slot.write() {
            *guard = None;
        }
    }
}
