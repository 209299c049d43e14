//! Batched ingredient resolution: cache-first, then a bounded worker pool
//! with a per-request timeout and a global wall-clock deadline.
//!
//! Failures are data here. A term that times out or whose worker panics
//! still yields a structured result; only terms left unresolved when the
//! deadline fires are absent from the output, and their late results are
//! discarded rather than merged.

use super::cache::{CacheLookup, PriceCache};
use super::resolver::{shape_top_result, PricedProduct, ProductSource};
use crate::normalization::term::{clean_term, normalize_term};
use futures::FutureExt;
use indexmap::IndexMap;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct BatchJobResult {
    /// The original term as submitted, unnormalized.
    pub ingredient: String,
    pub product: Option<PricedProduct>,
    /// Upstream HTTP status, or a synthetic 504/500 for timeouts and worker
    /// failures.
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub concurrency: usize,
    pub per_request_timeout: Duration,
    pub deadline: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            per_request_timeout: Duration::from_millis(2500),
            deadline: Duration::from_millis(6500),
        }
    }
}

/// Terminal outcome for one distinct normalized term.
#[derive(Debug, Clone)]
struct TermOutcome {
    product: Option<PricedProduct>,
    status: u16,
    error: Option<String>,
    message: Option<String>,
}

pub struct BatchAggregator {
    source: Arc<dyn ProductSource>,
    cache: Arc<PriceCache>,
    cfg: BatchConfig,
}

impl BatchAggregator {
    pub fn new(source: Arc<dyn ProductSource>, cache: Arc<PriceCache>, cfg: BatchConfig) -> Self {
        let cfg = BatchConfig {
            concurrency: cfg.concurrency.clamp(1, 5),
            ..cfg
        };
        Self { source, cache, cfg }
    }

    /// Resolve many ingredient terms to priced products.
    ///
    /// Terms of length <= 1 are dropped. Terms sharing a normalized form
    /// share one upstream fetch and one cache entry, but every surviving
    /// original term gets its own result record.
    pub async fn resolve_many(
        &self,
        terms: &[String],
        location_id: Option<&str>,
        bearer: &str,
    ) -> Vec<BatchJobResult> {
        // Group originals by normalized form, remembering a trimmed variant
        // to use as the upstream search term.
        let mut groups: IndexMap<String, (String, Vec<String>)> = IndexMap::new();
        for raw in terms {
            let Some(trimmed) = clean_term(raw) else {
                continue;
            };
            let norm = normalize_term(&trimmed);
            groups
                .entry(norm)
                .or_insert_with(|| (trimmed, Vec::new()))
                .1
                .push(raw.clone());
        }

        let mut out = Vec::new();
        let mut misses: Vec<(String, String)> = Vec::new();
        for (norm, (fetch_term, originals)) in &groups {
            match self.cache.lookup(location_id, norm) {
                CacheLookup::Hit(product) => {
                    for original in originals {
                        out.push(BatchJobResult {
                            ingredient: original.clone(),
                            product: product.clone(),
                            status: 200,
                            error: None,
                            message: None,
                        });
                    }
                }
                CacheLookup::Miss => misses.push((norm.clone(), fetch_term.clone())),
            }
        }

        if misses.is_empty() {
            return out;
        }

        let resolved = self.run_pool(misses, location_id, bearer).await;

        for (norm, outcome) in resolved {
            if outcome.error.is_none() {
                // Only genuine upstream answers (including "no match") are
                // worth remembering; synthetic failures are not facts.
                self.cache.store(location_id, &norm, outcome.product.clone());
            }
            if let Some((_, originals)) = groups.get(&norm) {
                for original in originals {
                    out.push(BatchJobResult {
                        ingredient: original.clone(),
                        product: outcome.product.clone(),
                        status: outcome.status,
                        error: outcome.error.clone(),
                        message: outcome.message.clone(),
                    });
                }
            }
        }

        out
    }

    /// Semaphore-bounded fan-out over the distinct missing terms. Returns
    /// whatever has completed when either all terms settle or the deadline
    /// elapses; outstanding workers are aborted and their results dropped.
    async fn run_pool(
        &self,
        misses: Vec<(String, String)>,
        location_id: Option<&str>,
        bearer: &str,
    ) -> IndexMap<String, TermOutcome> {
        let total = misses.len();
        let semaphore = Arc::new(Semaphore::new(self.cfg.concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, TermOutcome)>();

        let mut handles = Vec::with_capacity(total);
        for (norm, fetch_term) in misses {
            let source = self.source.clone();
            let semaphore = semaphore.clone();
            let tx = tx.clone();
            let location = location_id.map(|s| s.to_string());
            let bearer = bearer.to_string();
            let per_request_timeout = self.cfg.per_request_timeout;

            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                let work = fetch_one(
                    source,
                    fetch_term,
                    location.as_deref(),
                    &bearer,
                    per_request_timeout,
                );
                let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => TermOutcome {
                        product: None,
                        status: 500,
                        error: Some("worker_error".into()),
                        message: Some(panic_message(panic)),
                    },
                };
                let _ = tx.send((norm, outcome));
            }));
        }
        drop(tx);

        let deadline = tokio::time::sleep(self.cfg.deadline);
        tokio::pin!(deadline);

        let mut resolved: IndexMap<String, TermOutcome> = IndexMap::new();
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some((norm, outcome)) => {
                        resolved.insert(norm, outcome);
                        if resolved.len() == total {
                            break;
                        }
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    warn!(
                        resolved = resolved.len(),
                        total,
                        "batch deadline elapsed; returning partial results"
                    );
                    break;
                }
            }
        }

        // Abandon whatever is still in flight; late results must not leak
        // into a result set that has already been returned.
        for handle in handles {
            handle.abort();
        }

        debug!(resolved = resolved.len(), total, "batch pool finished");
        resolved
    }
}

async fn fetch_one(
    source: Arc<dyn ProductSource>,
    term: String,
    location_id: Option<&str>,
    bearer: &str,
    per_request_timeout: Duration,
) -> TermOutcome {
    let search = source.search(&term, location_id, 1, bearer);
    match tokio::time::timeout(per_request_timeout, search).await {
        Ok(Ok(resp)) => TermOutcome {
            product: shape_top_result(&resp.body),
            status: resp.status,
            error: None,
            message: None,
        },
        Ok(Err(e)) => TermOutcome {
            product: None,
            status: 504,
            error: Some("timeout_or_fetch_error".into()),
            message: Some(e.to_string()),
        },
        Err(_) => TermOutcome {
            product: None,
            status: 504,
            error: Some("timeout_or_fetch_error".into()),
            message: Some(format!(
                "request exceeded {}ms",
                per_request_timeout.as_millis()
            )),
        },
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
