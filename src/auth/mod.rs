//! Access-token management for OAuth-style vendors.
//!
//! [`TokenManager::get_token`] returns the cached token while it is inside
//! its validity window and otherwise performs exactly one fetch through the
//! injected [`TokenFetcher`]. No retry is attempted on failure.

mod cache;

pub use cache::{CachedToken, MemoryTokenCache, TokenCache};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use serde::Deserialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{ProxyError, Result};

/// Raw answer from a vendor credential endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FetchedToken {
    pub access_token: String,
    /// Lifetime in seconds.
    pub expires_in: i64,
}

/// One round trip to the vendor credential endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> Result<FetchedToken>;
}

pub struct TokenManager {
    cache: Arc<dyn TokenCache>,
    fetcher: Arc<dyn TokenFetcher>,
    clock: Arc<dyn Clock>,
    safety_margin: Duration,
}

impl TokenManager {
    pub fn new(
        cache: Arc<dyn TokenCache>,
        fetcher: Arc<dyn TokenFetcher>,
        clock: Arc<dyn Clock>,
        safety_margin: std::time::Duration,
    ) -> Self {
        Self {
            cache,
            fetcher,
            clock,
            safety_margin: Duration::from_std(safety_margin).unwrap_or(Duration::seconds(60)),
        }
    }

    /// Return a usable token, fetching a fresh one if the cached slot is
    /// empty or about to expire.
    pub async fn get_token(&self) -> Result<CachedToken> {
        let now = self.clock.now();
        if let Some(token) = self.cache.get() {
            if token.is_valid(now, self.safety_margin) {
                debug!(
                    remaining_secs = token.remaining_secs(now),
                    "reusing cached access token"
                );
                return Ok(token);
            }
            debug!("cached access token expired, refreshing");
        }

        let fetched = self.fetcher.fetch().await?;
        let expires_at = Duration::try_seconds(fetched.expires_in)
            .and_then(|lifetime| self.clock.now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                ProxyError::Auth(format!("invalid expires_in {}", fetched.expires_in))
            })?;
        let token = CachedToken {
            value: fetched.access_token,
            expires_at,
        };
        info!(expires_in = fetched.expires_in, "obtained new access token");
        self.cache.set(token.clone());
        Ok(token)
    }

    /// Drop the cached token so the next call refetches.
    pub fn invalidate(&self) {
        info!("invalidating cached access token");
        self.cache.clear();
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorKind;
    use chrono::{TimeZone, Utc};

    fn clock() -> ManualClock {
        ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
    }

    fn manager(fetcher: MockTokenFetcher, clock: &ManualClock) -> TokenManager {
        TokenManager::new(
            Arc::new(MemoryTokenCache::new()),
            Arc::new(fetcher),
            Arc::new(clock.clone()),
            std::time::Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn second_call_within_window_does_not_fetch() {
        let clock = clock();
        let mut fetcher = MockTokenFetcher::new();
        fetcher.expect_fetch().times(1).returning(|| {
            Ok(FetchedToken {
                access_token: "tok-1".into(),
                expires_in: 3600,
            })
        });
        let manager = manager(fetcher, &clock);

        assert_eq!(manager.get_token().await.unwrap().value, "tok-1");
        clock.advance(Duration::seconds(3000));
        assert_eq!(manager.get_token().await.unwrap().value, "tok-1");
    }

    #[tokio::test]
    async fn call_after_expiry_fetches_exactly_once() {
        let clock = clock();
        let mut fetcher = MockTokenFetcher::new();
        let mut seq = mockall::Sequence::new();
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Ok(FetchedToken {
                    access_token: "tok-1".into(),
                    expires_in: 3600,
                })
            });
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Ok(FetchedToken {
                    access_token: "tok-2".into(),
                    expires_in: 3600,
                })
            });
        let manager = manager(fetcher, &clock);

        manager.get_token().await.unwrap();
        // Inside the 60 s safety margin counts as expired.
        clock.advance(Duration::seconds(3550));
        assert_eq!(manager.get_token().await.unwrap().value, "tok-2");
        assert_eq!(manager.get_token().await.unwrap().value, "tok-2");
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let clock = clock();
        let mut fetcher = MockTokenFetcher::new();
        fetcher.expect_fetch().times(2).returning(|| {
            Ok(FetchedToken {
                access_token: "tok".into(),
                expires_in: 3600,
            })
        });
        let manager = manager(fetcher, &clock);

        manager.get_token().await.unwrap();
        manager.invalidate();
        manager.get_token().await.unwrap();
    }

    #[tokio::test]
    async fn fetch_failure_is_not_cached_or_retried() {
        let clock = clock();
        let mut fetcher = MockTokenFetcher::new();
        let mut seq = mockall::Sequence::new();
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(ProxyError::Auth("invalid_client".into())));
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Ok(FetchedToken {
                    access_token: "tok".into(),
                    expires_in: 3600,
                })
            });
        let manager = manager(fetcher, &clock);

        let err = manager.get_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthError);
        assert_eq!(manager.get_token().await.unwrap().value, "tok");
    }

    #[tokio::test]
    async fn expiry_is_measured_from_fetch_time() {
        let clock = clock();
        let start = clock.now();
        let mut fetcher = MockTokenFetcher::new();
        fetcher.expect_fetch().returning(|| {
            Ok(FetchedToken {
                access_token: "tok".into(),
                expires_in: 2_592_000,
            })
        });
        let manager = manager(fetcher, &clock);

        let token = manager.get_token().await.unwrap();
        assert_eq!(token.expires_at, start + Duration::seconds(2_592_000));
    }

    #[tokio::test]
    async fn unrepresentable_lifetime_is_auth_error_and_not_cached() {
        let clock = clock();
        let mut fetcher = MockTokenFetcher::new();
        let mut seq = mockall::Sequence::new();
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Ok(FetchedToken {
                    access_token: "tok-huge".into(),
                    expires_in: i64::MAX,
                })
            });
        fetcher
            .expect_fetch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Ok(FetchedToken {
                    access_token: "tok".into(),
                    expires_in: 3600,
                })
            });
        let manager = manager(fetcher, &clock);

        let err = manager.get_token().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AuthError);
        assert!(err.to_string().contains("invalid expires_in"));
        assert_eq!(manager.get_token().await.unwrap().value, "tok");
    }
}
