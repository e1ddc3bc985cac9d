//! Redis-backed session store.
//!
//! Keys: `session:<id>`, `url:<url>`, `variant:<hash>`, `asset:<hash>`.
//! Everything except sessions carries a 24h TTL so the dedup caches drain on
//! their own; the file janitor handles the artifacts themselves.

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Pool, Runtime};
use serde::{Deserialize, Serialize};

use super::store::{AssetEntry, SessionStore, StoreError};
use super::types::{AssetState, ConversionSession};

const CACHE_TTL_SECS: u64 = 24 * 60 * 60;

pub struct RedisStore {
    pool: Pool,
}

#[derive(Serialize, Deserialize)]
struct AssetPayload {
    source_path: String,
    state: AssetState,
}

impl RedisStore {
    /// Connect to `addr` (host:port). An empty password means no auth.
    pub fn new(addr: &str, password: &str, db: i64) -> Result<Self, StoreError> {
        let url = if password.is_empty() {
            format!("redis://{addr}/{db}")
        } else {
            format!("redis://:{password}@{addr}/{db}")
        };
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Round-trip a PING so startup can fall back to the in-memory store
    /// when Redis is unreachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = deadpool_redis::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool.get().await.map_err(backend_err)
    }

    fn session_key(id: &str) -> String {
        format!("session:{id}")
    }

    fn url_key(url: &str) -> String {
        format!("url:{url}")
    }

    fn variant_key(hash: &str) -> String {
        format!("variant:{hash}")
    }

    fn asset_key(hash: &str) -> String {
        format!("asset:{hash}")
    }
}

fn backend_err(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn create_session(&self, session: &ConversionSession) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let key = Self::session_key(&session.id);
        let exists: bool = conn.exists(&key).await.map_err(backend_err)?;
        if exists {
            return Err(StoreError::AlreadyExists(session.id.clone()));
        }
        let mut stored = session.clone();
        stored.created_at = Utc::now();
        stored.updated_at = stored.created_at;
        let body = serde_json::to_string(&stored).map_err(backend_err)?;
        conn.set::<_, _, ()>(&key, body).await.map_err(backend_err)
    }

    async fn update_session(&self, session: &ConversionSession) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let key = Self::session_key(&session.id);
        let exists: bool = conn.exists(&key).await.map_err(backend_err)?;
        if !exists {
            return Err(StoreError::NotFound(session.id.clone()));
        }
        let mut stored = session.clone();
        stored.updated_at = Utc::now();
        let body = serde_json::to_string(&stored).map_err(backend_err)?;
        conn.set::<_, _, ()>(&key, body).await.map_err(backend_err)
    }

    async fn get_session(&self, id: &str) -> Result<ConversionSession, StoreError> {
        let mut conn = self.conn().await?;
        let body: Option<String> = conn
            .get(Self::session_key(id))
            .await
            .map_err(backend_err)?;
        match body {
            Some(body) => serde_json::from_str(&body).map_err(backend_err),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        // Drop the URL mapping only when it still points at this session.
        if let Ok(session) = self.get_session(id).await {
            let mapped: Option<String> = conn
                .get(Self::url_key(&session.url))
                .await
                .map_err(backend_err)?;
            if mapped.as_deref() == Some(id) {
                conn.del::<_, ()>(Self::url_key(&session.url))
                    .await
                    .map_err(backend_err)?;
            }
        }
        conn.del::<_, ()>(Self::session_key(id))
            .await
            .map_err(backend_err)
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(Self::url_key(url)).await.map_err(backend_err)
    }

    async fn set_url_map(&self, url: &str, id: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(Self::url_key(url), id, CACHE_TTL_SECS)
            .await
            .map_err(backend_err)
    }

    async fn set_variant(&self, variant_hash: &str, output_path: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(Self::variant_key(variant_hash), output_path, CACHE_TTL_SECS)
            .await
            .map_err(backend_err)
    }

    async fn get_variant(&self, variant_hash: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        conn.get(Self::variant_key(variant_hash))
            .await
            .map_err(backend_err)
    }

    async fn set_asset(
        &self,
        asset_hash: &str,
        source_path: &str,
        state: AssetState,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(&AssetPayload {
            source_path: source_path.to_string(),
            state,
        })
        .map_err(backend_err)?;
        conn.set_ex::<_, _, ()>(Self::asset_key(asset_hash), body, CACHE_TTL_SECS)
            .await
            .map_err(backend_err)
    }

    async fn get_asset(&self, asset_hash: &str) -> Result<Option<AssetEntry>, StoreError> {
        let mut conn = self.conn().await?;
        let body: Option<String> = conn
            .get(Self::asset_key(asset_hash))
            .await
            .map_err(backend_err)?;
        match body {
            Some(body) => {
                let payload: AssetPayload = serde_json::from_str(&body).map_err(backend_err)?;
                Ok(Some(AssetEntry {
                    source_path: payload.source_path,
                    state: payload.state,
                }))
            }
            None => Ok(None),
        }
    }
}
