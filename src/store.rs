/// Idempotency / Checkpoint Store (C8).
///
/// A thin wrapper around a Redis connection manager exposing exactly the
/// primitives the rest of the pipeline needs: `GET`/`SET` with optional TTL,
/// atomic `INCRBY`, and `EXISTS`. Every key is namespaced so the same Redis
/// instance can be shared with the out-of-scope query-cache consumer without
/// collision (`dln:cache:volume:...` is never touched by this pipeline).
use crate::errors::PipelineError;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const DEDUP_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone)]
pub struct IdempotencyStore {
    conn: ConnectionManager,
}

impl IdempotencyStore {
    pub async fn connect(url: &str) -> Result<Self, PipelineError> {
        let client = redis::Client::open(url).map_err(|e| PipelineError::store(e.to_string()))?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| PipelineError::store(e.to_string()))?;
        Ok(Self { conn })
    }

    fn last_slot_key(program_id: &str) -> String {
        format!("indexer:last_slot:{}", program_id)
    }

    fn indexed_key(signature: &str) -> String {
        format!("tx:indexed:{}", signature)
    }

    fn processed_count_key(program_id: &str) -> String {
        format!("worker:stats:{}:processed_count", program_id)
    }

    fn price_key(mint: &str) -> String {
        format!("price:{}", mint)
    }

    /// Returns the last-processed slot watermark for a program, if any.
    pub async fn get_last_slot(&self, program_id: &str) -> Result<Option<u64>, PipelineError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::last_slot_key(program_id))
            .await
            .map_err(|e| PipelineError::store(e.to_string()))?;
        Ok(raw.and_then(|v| v.parse().ok()))
    }

    /// Advances the watermark. Callers are responsible for only calling this
    /// with a monotonically increasing slot.
    pub async fn set_last_slot(&self, program_id: &str, slot: u64) -> Result<(), PipelineError> {
        let mut conn = self.conn.clone();
        conn.set(Self::last_slot_key(program_id), slot.to_string())
            .await
            .map_err(|e| PipelineError::store(e.to_string()))
    }

    /// True if this signature has already been indexed (dedup for the
    /// realtime path, see C5).
    pub async fn is_indexed(&self, signature: &str) -> Result<bool, PipelineError> {
        let mut conn = self.conn.clone();
        conn.exists(Self::indexed_key(signature))
            .await
            .map_err(|e| PipelineError::store(e.to_string()))
    }

    /// Marks a signature as indexed with a 7-day TTL.
    pub async fn mark_indexed(&self, signature: &str) -> Result<(), PipelineError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::indexed_key(signature), 1, DEDUP_TTL_SECS)
            .await
            .map_err(|e| PipelineError::store(e.to_string()))
    }

    /// Atomically increments the per-program processed-row counter and
    /// returns the new total.
    pub async fn incr_processed_count(&self, program_id: &str, by: i64) -> Result<i64, PipelineError> {
        let mut conn = self.conn.clone();
        conn.incr(Self::processed_count_key(program_id), by)
            .await
            .map_err(|e| PipelineError::store(e.to_string()))
    }

    pub async fn get_processed_count(&self, program_id: &str) -> Result<i64, PipelineError> {
        let mut conn = self.conn.clone();
        let raw: Option<i64> = conn
            .get(Self::processed_count_key(program_id))
            .await
            .map_err(|e| PipelineError::store(e.to_string()))?;
        Ok(raw.unwrap_or(0))
    }

    /// Cached USD price for a mint, if present and not expired (TTL is
    /// enforced by Redis itself via `set_cached_price`'s `EX`).
    pub async fn get_cached_price(&self, mint: &str) -> Result<Option<f64>, PipelineError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(Self::price_key(mint))
            .await
            .map_err(|e| PipelineError::store(e.to_string()))?;
        Ok(raw.and_then(|v| v.parse().ok()))
    }

    pub async fn set_cached_price(&self, mint: &str, price: f64, ttl_secs: u64) -> Result<(), PipelineError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(Self::price_key(mint), price.to_string(), ttl_secs)
            .await
            .map_err(|e| PipelineError::store(e.to_string()))
    }

    /// Evicts a single mint's cached price. A real `DEL`, not an overwrite,
    /// so the next lookup is a genuine cache miss rather than a `0.0` hit.
    pub async fn delete_cached_price(&self, mint: &str) -> Result<(), PipelineError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::price_key(mint))
            .await
            .map_err(|e| PipelineError::store(e.to_string()))
    }

    /// Evicts every cached price key at once.
    pub async fn delete_all_cached_prices(&self) -> Result<(), PipelineError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys("price:*")
            .await
            .map_err(|e| PipelineError::store(e.to_string()))?;
        if keys.is_empty() {
            return Ok(());
        }
        conn.del::<_, ()>(keys).await.map_err(|e| PipelineError::store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(
            IdempotencyStore::last_slot_key("Prog1111"),
            "indexer:last_slot:Prog1111"
        );
        assert_eq!(IdempotencyStore::indexed_key("sig1"), "tx:indexed:sig1");
        assert_eq!(
            IdempotencyStore::processed_count_key("Prog1111"),
            "worker:stats:Prog1111:processed_count"
        );
        assert_eq!(IdempotencyStore::price_key("Mint1"), "price:Mint1");
    }
}
