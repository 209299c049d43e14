//! OAuth2 client-credentials token lifecycle.
//!
//! The broker caches one bearer token per scope and coalesces concurrent
//! refreshes into a single upstream call. Token fetches retry with
//! exponential backoff before failing with a typed `AuthError`.
//!
//! The client secret lives only inside the `HttpTokenFetcher`; it is never
//! logged and never leaves this process.

use crate::normalization::scope::normalize_scope;
use crate::util::retry::{retry_with_backoff, RetryOutcome, RetryPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Tokens are treated as expired this many seconds before the upstream
/// expiry, so in-flight requests never ride a token that dies under them.
pub const EXPIRY_SAFETY_MARGIN_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct BearerToken {
    pub value: String,
    pub scope: String,
    /// Already includes the safety margin; the token is usable iff
    /// `Utc::now() < expires_at`.
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    pub fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Successful upstream grant, before expiry bookkeeping.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
}

/// One failed exchange attempt: upstream status (when the request got that
/// far) and response body.
#[derive(Debug, Clone)]
pub struct TokenFetchError {
    pub status: Option<u16>,
    pub body: String,
}

/// Token acquisition permanently failed after all retry attempts.
#[derive(Debug, Clone, thiserror::Error)]
#[error("token acquisition failed after {attempts} attempts (status {status:?}): {body}")]
pub struct AuthError {
    pub status: Option<u16>,
    pub body: String,
    pub attempts: u32,
}

/// Seam for the actual token exchange so tests can count and fake calls.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self, scope: &str) -> Result<TokenGrant, TokenFetchError>;
}

/// Real exchange against the Kroger OAuth endpoint using HTTP Basic auth.
pub struct HttpTokenFetcher {
    http: reqwest::Client,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl HttpTokenFetcher {
    pub fn new(
        auth_url: impl Into<String>,
        client_id: String,
        client_secret: String,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("grocer-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            auth_url: auth_url.into(),
            client_id,
            client_secret,
        })
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    async fn fetch(&self, scope: &str) -> Result<TokenGrant, TokenFetchError> {
        let resp = self
            .http
            .post(&self.auth_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Accept", "application/json")
            .form(&[("grant_type", "client_credentials"), ("scope", scope)])
            .send()
            .await
            .map_err(|e| TokenFetchError {
                status: None,
                body: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TokenFetchError {
                status: Some(status.as_u16()),
                body,
            });
        }

        resp.json::<TokenGrant>().await.map_err(|e| TokenFetchError {
            status: Some(status.as_u16()),
            body: format!("malformed token response: {e}"),
        })
    }
}

/// Direct client-credentials exchange with status/body passthrough, used by
/// the `/token` edge route. Unlike the broker this never caches: the caller
/// sees the upstream reply verbatim, success or error.
pub async fn exchange_passthrough(
    http: &reqwest::Client,
    auth_url: &str,
    client_id: &str,
    client_secret: &str,
    scope: &str,
) -> anyhow::Result<super::UpstreamResponse> {
    let scope = normalize_scope(scope);
    let resp = http
        .post(auth_url)
        .basic_auth(client_id, Some(client_secret))
        .header("Accept", "application/json")
        .form(&[("grant_type", "client_credentials"), ("scope", scope.as_str())])
        .send()
        .await?;
    Ok(super::read_upstream(resp).await)
}

type SharedFetch = Shared<BoxFuture<'static, Result<BearerToken, AuthError>>>;

struct BrokerState {
    tokens: HashMap<String, BearerToken>,
    pending: HashMap<String, SharedFetch>,
}

struct BrokerInner {
    fetcher: Arc<dyn TokenFetcher>,
    retry: RetryPolicy,
    state: Mutex<BrokerState>,
}

/// Scope-keyed token cache with singleflight refresh.
#[derive(Clone)]
pub struct TokenBroker {
    inner: Arc<BrokerInner>,
}

impl TokenBroker {
    pub fn new(fetcher: Arc<dyn TokenFetcher>, retry: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                fetcher,
                retry,
                state: Mutex::new(BrokerState {
                    tokens: HashMap::new(),
                    pending: HashMap::new(),
                }),
            }),
        }
    }

    /// Produce a valid bearer token for `scope`, hitting upstream only when
    /// the cache has nothing usable and no identical fetch is in flight.
    pub async fn get_token(&self, scope: &str) -> Result<BearerToken, AuthError> {
        let scope = normalize_scope(scope);

        let fetch = {
            let mut st = self.inner.state.lock().expect("token broker state poisoned");
            if let Some(tok) = st.tokens.get(&scope) {
                if tok.is_valid() {
                    return Ok(tok.clone());
                }
            }
            if let Some(pending) = st.pending.get(&scope) {
                debug!(scope = %scope, "token fetch already in flight; awaiting it");
                pending.clone()
            } else {
                let inner = self.inner.clone();
                let fetch_scope = scope.clone();
                let fut = async move { refresh(inner, fetch_scope).await }.boxed().shared();
                st.pending.insert(scope.clone(), fut.clone());
                fut
            }
        };

        fetch.await
    }

    /// Current number of cached (possibly expired) tokens; diagnostics only.
    pub fn cached_scopes(&self) -> usize {
        self.inner
            .state
            .lock()
            .map(|st| st.tokens.len())
            .unwrap_or(0)
    }
}

async fn refresh(inner: Arc<BrokerInner>, scope: String) -> Result<BearerToken, AuthError> {
    let fetcher = inner.fetcher.clone();
    let fetch_scope = scope.clone();
    let outcome =
        retry_with_backoff(&inner.retry, move || {
            let fetcher = fetcher.clone();
            let scope = fetch_scope.clone();
            async move { fetcher.fetch(&scope).await }
        })
        .await;

    let result = match outcome {
        RetryOutcome::Ok { value: grant, attempts } => {
            let expires_at = Utc::now()
                + ChronoDuration::seconds(grant.expires_in - EXPIRY_SAFETY_MARGIN_SECS);
            info!(
                scope = %scope,
                attempts,
                expires_in = grant.expires_in,
                "bearer token acquired"
            );
            Ok(BearerToken {
                value: grant.access_token,
                scope: scope.clone(),
                expires_at,
            })
        }
        RetryOutcome::Exhausted { last_error, attempts } => {
            warn!(
                scope = %scope,
                attempts,
                status = ?last_error.status,
                "token acquisition exhausted retries"
            );
            Err(AuthError {
                status: last_error.status,
                body: last_error.body,
                attempts,
            })
        }
    };

    // Settle bookkeeping happens here, inside the shared future, so every
    // coalesced waiter observes the same cleanup exactly once.
    let mut st = inner.state.lock().expect("token broker state poisoned");
    st.pending.remove(&scope);
    if let Ok(token) = &result {
        st.tokens.insert(scope, token.clone());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_jitter: Duration::ZERO,
        }
    }

    struct CountingFetcher {
        calls: AtomicU32,
        delay: Duration,
        expires_in: i64,
        fail: bool,
    }

    impl CountingFetcher {
        fn ok(delay: Duration) -> Self {
            Self {
                calls: AtomicU32::new(0),
                delay,
                expires_in: 1800,
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicU32::new(0),
                delay: Duration::ZERO,
                expires_in: 1800,
                fail: true,
            }
        }
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn fetch(&self, scope: &str) -> Result<TokenGrant, TokenFetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(TokenFetchError {
                    status: Some(401),
                    body: "access denied".into(),
                });
            }
            Ok(TokenGrant {
                access_token: format!("tok-for-{scope}"),
                expires_in: self.expires_in,
                token_type: "bearer".into(),
            })
        }
    }

    /// Fetcher that records the scope it was asked for.
    struct ScopeRecorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TokenFetcher for ScopeRecorder {
        async fn fetch(&self, scope: &str) -> Result<TokenGrant, TokenFetchError> {
            self.seen.lock().unwrap().push(scope.to_string());
            Ok(TokenGrant {
                access_token: "t".into(),
                expires_in: 1800,
                token_type: "bearer".into(),
            })
        }
    }

    #[tokio::test]
    async fn caches_token_per_scope() {
        let fetcher = Arc::new(CountingFetcher::ok(Duration::ZERO));
        let broker = TokenBroker::new(fetcher.clone(), fast_retry(5));

        let a = broker.get_token("product.compact").await.unwrap();
        let b = broker.get_token("product.compact").await.unwrap();
        assert_eq!(a.value, b.value);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(broker.cached_scopes(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let fetcher = Arc::new(CountingFetcher::ok(Duration::from_millis(50)));
        let broker = TokenBroker::new(fetcher.clone(), fast_retry(5));

        let (a, b) = tokio::join!(
            broker.get_token("product.compact"),
            broker.get_token("product.compact")
        );
        assert_eq!(a.unwrap().value, b.unwrap().value);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_triggers_refetch() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
            // Below the safety margin, so the issued token is already expired.
            expires_in: 10,
            fail: false,
        });
        let broker = TokenBroker::new(fetcher.clone(), fast_retry(5));

        let first = broker.get_token("product.compact").await.unwrap();
        assert!(!first.is_valid());
        let _second = broker.get_token("product.compact").await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausts_exactly_five_attempts_then_auth_error() {
        let fetcher = Arc::new(CountingFetcher::failing());
        let broker = TokenBroker::new(fetcher.clone(), fast_retry(5));

        let err = broker.get_token("product.compact").await.unwrap_err();
        assert_eq!(err.attempts, 5);
        assert_eq!(err.status, Some(401));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 5);

        // Pending marker must be gone so a later call can retry from scratch.
        let err2 = broker.get_token("product.compact").await.unwrap_err();
        assert_eq!(err2.attempts, 5);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn scope_typo_is_normalized_on_the_wire() {
        let fetcher = Arc::new(ScopeRecorder {
            seen: Mutex::new(Vec::new()),
        });
        let broker = TokenBroker::new(fetcher.clone(), fast_retry(5));

        broker.get_token("product.campact").await.unwrap();
        assert_eq!(
            fetcher.seen.lock().unwrap().as_slice(),
            &["product.compact".to_string()]
        );
    }

    #[tokio::test]
    async fn distinct_scopes_get_distinct_tokens() {
        let fetcher = Arc::new(CountingFetcher::ok(Duration::ZERO));
        let broker = TokenBroker::new(fetcher.clone(), fast_retry(5));

        let a = broker.get_token("product.compact").await.unwrap();
        let b = broker.get_token("cart.basic:write").await.unwrap();
        assert_ne!(a.value, b.value);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(broker.cached_scopes(), 2);
    }
}
