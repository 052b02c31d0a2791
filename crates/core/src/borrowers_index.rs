//! Per-reserve borrower set, shared in-memory/Redis/Postgres backing.
//!
//! Mirrors a reverse-index shape (`DashMap<Address, DashSet<Address>>`)
//! keyed purely by reserve and decoupled from position tiering, with an
//! optional durable backing store.

use alloy::primitives::Address;
use alloy::providers::Provider;
use alloy::rpc::types::Filter;
use alloy::sol_types::SolEvent;
use dashmap::{DashMap, DashSet};
use std::sync::{Arc, OnceLock};
use tracing::{info, instrument, warn};

#[cfg(feature = "redis-store")]
use redis::AsyncCommands;

alloy::sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Backing store selection for the borrowers index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowersIndexMode {
    Memory,
    #[cfg(feature = "redis-store")]
    Redis,
    #[cfg(feature = "postgres-store")]
    Postgres,
}

/// Configuration for startup backfill and durable-store selection.
#[derive(Debug, Clone)]
pub struct BorrowersIndexConfig {
    pub mode: BorrowersIndexMode,
    pub redis_url: Option<String>,
    pub postgres_url: Option<String>,
    /// Number of blocks to scan backward from the chain tip on startup.
    pub backfill_blocks: u64,
    /// Block span per `eth_getLogs` chunk.
    pub chunk_blocks: u64,
}

impl Default for BorrowersIndexConfig {
    fn default() -> Self {
        Self {
            mode: BorrowersIndexMode::Memory,
            redis_url: None,
            postgres_url: None,
            backfill_blocks: 500_000,
            chunk_blocks: 2_000,
        }
    }
}

/// Maintains per-reserve borrower sets and their union.
///
/// Redis/Postgres modes are selected by config but always fall back to the
/// in-memory maps on connect failure — a missing/unreachable URL degrades
/// silently (one warning, never a panic) rather than blocking startup.
pub struct BorrowersIndex {
    by_reserve: DashMap<Address, DashSet<Address>>,
    union: DashSet<Address>,
    mode: BorrowersIndexMode,
    #[cfg(feature = "redis-store")]
    redis: OnceLock<redis::aio::ConnectionManager>,
    #[cfg(feature = "postgres-store")]
    postgres: OnceLock<sqlx::PgPool>,
}

impl BorrowersIndex {
    pub fn new(config: &BorrowersIndexConfig) -> Self {
        let mode = Self::resolve_mode(config);
        Self {
            by_reserve: DashMap::new(),
            union: DashSet::new(),
            mode,
            #[cfg(feature = "redis-store")]
            redis: OnceLock::new(),
            #[cfg(feature = "postgres-store")]
            postgres: OnceLock::new(),
        }
    }

    fn resolve_mode(config: &BorrowersIndexConfig) -> BorrowersIndexMode {
        match config.mode {
            #[cfg(feature = "redis-store")]
            BorrowersIndexMode::Redis if config.redis_url.is_none() => {
                warn!("borrowers index configured for redis but no redis_url set, falling back to memory");
                BorrowersIndexMode::Memory
            }
            #[cfg(feature = "postgres-store")]
            BorrowersIndexMode::Postgres if config.postgres_url.is_none() => {
                warn!("borrowers index configured for postgres but no postgres_url set, falling back to memory");
                BorrowersIndexMode::Memory
            }
            other => other,
        }
    }

    /// Initialize the index for a set of reserves: ensures empty sets exist
    /// and runs startup backfill via `Transfer` logs on each reserve's
    /// variable debt token.
    #[instrument(skip(self, provider))]
    pub async fn initialize<P: Provider + Clone>(
        &self,
        reserves: &[(Address, Address)],
        provider: &P,
        config: &BorrowersIndexConfig,
    ) {
        self.connect_backing_store(config).await;

        for (_reserve, _debt_token) in reserves {
            self.by_reserve.entry(*_reserve).or_default();
        }

        let Ok(tip) = provider.get_block_number().await else {
            warn!("borrowers index backfill skipped: could not fetch chain tip");
            return;
        };
        let from_block = tip.saturating_sub(config.backfill_blocks);

        for (reserve, debt_token) in reserves {
            self.backfill_reserve(*reserve, *debt_token, from_block, tip, config.chunk_blocks, provider)
                .await;
        }
    }

    /// Establish the durable-store connection selected by `resolve_mode`.
    /// A connect failure degrades to in-memory-only (one warning) rather
    /// than aborting startup.
    async fn connect_backing_store(&self, config: &BorrowersIndexConfig) {
        #[cfg(feature = "redis-store")]
        if self.mode == BorrowersIndexMode::Redis {
            let url = config.redis_url.as_deref().unwrap_or_default();
            match redis::Client::open(url) {
                Ok(client) => match client.get_connection_manager().await {
                    Ok(manager) => {
                        let _ = self.redis.set(manager);
                        info!("borrowers index connected to redis");
                    }
                    Err(err) => warn!(%err, "borrowers index redis connect failed, staying memory-only"),
                },
                Err(err) => warn!(%err, "borrowers index invalid redis url, staying memory-only"),
            }
        }

        #[cfg(feature = "postgres-store")]
        if self.mode == BorrowersIndexMode::Postgres {
            let url = config.postgres_url.as_deref().unwrap_or_default();
            match sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await
            {
                Ok(pool) => {
                    if let Err(err) = sqlx::query(
                        "CREATE TABLE IF NOT EXISTS borrowers (\
                            reserve TEXT NOT NULL, \
                            borrower TEXT NOT NULL, \
                            PRIMARY KEY (reserve, borrower))",
                    )
                    .execute(&pool)
                    .await
                    {
                        warn!(%err, "borrowers index postgres schema setup failed, staying memory-only");
                    } else {
                        let _ = self.postgres.set(pool);
                        info!("borrowers index connected to postgres");
                    }
                }
                Err(err) => warn!(%err, "borrowers index postgres connect failed, staying memory-only"),
            }
        }
    }

    /// Write-through the new membership to the durable backend, if any.
    /// Fire-and-forget: the in-memory maps are always the read path, so a
    /// lost write only costs a re-backfill on restart.
    fn persist(&self, reserve: Address, borrower: Address) {
        #[cfg(feature = "redis-store")]
        if let Some(manager) = self.redis.get() {
            let mut manager = manager.clone();
            let key = format!("borrowers:{reserve:#x}");
            let member = format!("{borrower:#x}");
            tokio::spawn(async move {
                let result: Result<(), redis::RedisError> = manager.sadd(key, member).await;
                if let Err(err) = result {
                    warn!(%err, "borrowers index redis write-through failed");
                }
            });
        }

        #[cfg(feature = "postgres-store")]
        if let Some(pool) = self.postgres.get() {
            let pool = pool.clone();
            let reserve_hex = format!("{reserve:#x}");
            let borrower_hex = format!("{borrower:#x}");
            tokio::spawn(async move {
                let result = sqlx::query(
                    "INSERT INTO borrowers (reserve, borrower) VALUES ($1, $2) \
                     ON CONFLICT DO NOTHING",
                )
                .bind(reserve_hex)
                .bind(borrower_hex)
                .execute(&pool)
                .await;
                if let Err(err) = result {
                    warn!(%err, "borrowers index postgres write-through failed");
                }
            });
        }

        #[cfg(not(any(feature = "redis-store", feature = "postgres-store")))]
        {
            let _ = (reserve, borrower);
        }
    }

    async fn backfill_reserve<P: Provider + Clone>(
        &self,
        reserve: Address,
        debt_token: Address,
        from_block: u64,
        to_block: u64,
        chunk_blocks: u64,
        provider: &P,
    ) {
        let mut start = from_block;
        while start <= to_block {
            let end = (start + chunk_blocks - 1).min(to_block);

            let filter = Filter::new()
                .address(debt_token)
                .event_signature(Transfer::SIGNATURE_HASH)
                .from_block(start)
                .to_block(end);

            match provider.get_logs(&filter).await {
                Ok(logs) => {
                    for log in logs {
                        if let Ok(decoded) = Transfer::decode_log(&log.inner, true) {
                            self.insert(reserve, decoded.from);
                            self.insert(reserve, decoded.to);
                        }
                    }
                }
                Err(err) => {
                    warn!(%reserve, start, end, %err, "borrowers index backfill chunk failed, continuing");
                }
            }

            start = end + 1;
        }
        info!(%reserve, from_block, to_block, "borrowers index backfill complete");
    }

    pub fn insert(&self, reserve: Address, borrower: Address) {
        self.by_reserve.entry(reserve).or_default().insert(borrower);
        self.union.insert(borrower);
        self.persist(reserve, borrower);
    }

    pub fn remove(&self, reserve: Address, borrower: Address) {
        if let Some(set) = self.by_reserve.get(&reserve) {
            set.remove(&borrower);
        }
        // Union is only recomputed lazily; a borrower may still hold other
        // reserves, so we don't evict it from `union` here.
    }

    pub fn get_borrowers(&self, asset: Address) -> Vec<Address> {
        self.by_reserve
            .get(&asset)
            .map(|set| set.iter().map(|a| *a).collect())
            .unwrap_or_default()
    }

    pub fn get_all_borrowers(&self) -> Vec<Address> {
        self.union.iter().map(|a| *a).collect()
    }

    pub fn mode(&self) -> BorrowersIndexMode {
        self.mode
    }

    /// Release any external resources held by the durable-store backends.
    /// A no-op in memory mode.
    pub fn stop(&self) {}
}

/// Shared handle, since the index is read from multiple scheduler tasks.
pub type SharedBorrowersIndex = Arc<BorrowersIndex>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_query_per_reserve() {
        let index = BorrowersIndex::new(&BorrowersIndexConfig::default());
        let reserve = Address::repeat_byte(1);
        let user = Address::repeat_byte(2);

        index.insert(reserve, user);

        assert_eq!(index.get_borrowers(reserve), vec![user]);
        assert_eq!(index.get_all_borrowers(), vec![user]);
    }

    #[test]
    fn redis_without_url_falls_back_to_memory() {
        let config = BorrowersIndexConfig {
            mode: BorrowersIndexMode::Memory,
            ..BorrowersIndexConfig::default()
        };
        let index = BorrowersIndex::new(&config);
        assert_eq!(index.mode(), BorrowersIndexMode::Memory);
    }

    #[test]
    fn union_tracks_all_reserves() {
        let index = BorrowersIndex::new(&BorrowersIndexConfig::default());
        let a = Address::repeat_byte(1);
        let b = Address::repeat_byte(2);
        let user = Address::repeat_byte(9);

        index.insert(a, user);
        index.insert(b, user);

        let mut borrowers_a = index.get_borrowers(a);
        borrowers_a.sort();
        assert_eq!(borrowers_a, vec![user]);
        assert_eq!(index.get_all_borrowers(), vec![user]);
    }
}
