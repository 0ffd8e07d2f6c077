/// Price Oracle Client (C2).
///
/// Batches mint lookups against the idempotency store's price cache, falling
/// through to a single-flight-rate-limited, retried upstream HTTP call for
/// whatever isn't cached. A failed upstream batch degrades to "unknown"
/// (zero USD downstream) for the mints it couldn't resolve rather than
/// failing the caller.
use crate::errors::PipelineError;
use crate::logger::{self, LogTag};
use crate::rate_limiter::SingleFlightLimiter;
use crate::retry::{oracle_policy, retry_with_backoff};
use crate::store::IdempotencyStore;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(rename = "usdPrice")]
    usd_price: f64,
}

pub struct PriceOracleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    store: Arc<IdempotencyStore>,
    cache_ttl: Duration,
    limiter: SingleFlightLimiter,
}

impl PriceOracleClient {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        store: Arc<IdempotencyStore>,
        cache_ttl: Duration,
        min_request_interval: Duration,
        request_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint,
            api_key,
            store,
            cache_ttl,
            limiter: SingleFlightLimiter::new(min_request_interval),
        }
    }

    pub async fn get_price(&self, mint: &str) -> Option<f64> {
        self.get_prices(&[mint.to_string()]).await.remove(mint)
    }

    /// Resolves USD prices for every mint requested. Missing keys in the
    /// returned map mean "unknown"; callers should treat that as zero USD.
    pub async fn get_prices(&self, mints: &[String]) -> HashMap<String, f64> {
        let mut resolved = HashMap::new();
        let mut uncached = Vec::new();

        for mint in mints {
            match self.store.get_cached_price(mint).await {
                Ok(Some(price)) => {
                    resolved.insert(mint.clone(), price);
                }
                _ => uncached.push(mint.clone()),
            }
        }

        if uncached.is_empty() {
            return resolved;
        }

        match self.fetch_upstream(&uncached).await {
            Ok(fetched) => {
                for (mint, price) in &fetched {
                    if let Err(e) = self
                        .store
                        .set_cached_price(mint, *price, self.cache_ttl.as_secs())
                        .await
                    {
                        logger::warning(LogTag::Oracle, &format!("failed to cache price for {}: {}", mint, e));
                    }
                }
                resolved.extend(fetched);
            }
            Err(e) => {
                logger::warning(
                    LogTag::Oracle,
                    &format!("price batch fetch failed for {} mint(s): {}", uncached.len(), e),
                );
            }
        }

        resolved
    }

    /// Evicts a single mint's cached price so the next lookup misses and
    /// falls through to upstream, rather than reading back a stale `0.0`.
    pub async fn clear(&self, mint: &str) -> Result<(), PipelineError> {
        self.store.delete_cached_price(mint).await
    }

    /// Evicts every cached price.
    pub async fn clear_all(&self) -> Result<(), PipelineError> {
        self.store.delete_all_cached_prices().await
    }

    async fn fetch_upstream(&self, mints: &[String]) -> Result<HashMap<String, f64>, PipelineError> {
        let policy = oracle_policy();
        let ids = mints.join(",");

        self.limiter
            .run(|| async {
                retry_with_backoff(
                    policy,
                    |err: &PipelineError| matches!(err, PipelineError::Network(_) | PipelineError::Oracle(_)),
                    |_attempt| {
                        let ids = ids.clone();
                        async move {
                            let mut request = self.http.get(&self.endpoint).query(&[("ids", ids.as_str())]);
                            if let Some(key) = &self.api_key {
                                request = request.header("x-api-key", key);
                            }

                            let response = request.send().await?;
                            if !response.status().is_success() {
                                return Err(PipelineError::oracle(format!(
                                    "upstream returned status {}",
                                    response.status()
                                )));
                            }

                            let body: HashMap<String, PriceEntry> = response.json().await?;
                            Ok(body.into_iter().map(|(mint, entry)| (mint, entry.usd_price)).collect())
                        }
                    },
                )
                .await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_entry_deserializes_usd_price() {
        let json = r#"{"usdPrice": 1.23}"#;
        let entry: PriceEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.usd_price, 1.23);
    }
}
