use crate::models::{Pop, RegionPopRow, VisitorPopRow};
use crate::auth::token::now_epoch_secs;
use crate::storage::trait_def::{amount_as_i64, stored_total};
use crate::storage::{PopTotals, Storage, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS visitor_pops (
                ip_address TEXT NOT NULL,
                region_code TEXT NOT NULL,
                count BIGINT NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL,
                PRIMARY KEY (ip_address, region_code)
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS region_pops (
                region_code TEXT PRIMARY KEY,
                count BIGINT NOT NULL DEFAULT 0,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_region_pops_count ON region_pops(count)")
            .execute(self.pool.as_ref())
            .await?;

        Ok(())
    }

    async fn add_pops(
        &self,
        ip_address: &str,
        region_code: &str,
        amount: u64,
    ) -> StorageResult<PopTotals> {
        let amount = amount_as_i64(amount)?;
        let now = now_epoch_secs();

        let mut tx = self.pool.begin().await?;

        let visitor_count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO visitor_pops (ip_address, region_code, count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (ip_address, region_code) DO UPDATE SET
                count = visitor_pops.count + EXCLUDED.count,
                updated_at = EXCLUDED.updated_at
            RETURNING count
            "#,
        )
        .bind(ip_address)
        .bind(region_code)
        .bind(amount)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let region_count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO region_pops (region_code, count, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (region_code) DO UPDATE SET
                count = region_pops.count + EXCLUDED.count,
                updated_at = EXCLUDED.updated_at
            RETURNING count
            "#,
        )
        .bind(region_code)
        .bind(amount)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(PopTotals {
            visitor_count: stored_total(visitor_count),
            region_count: stored_total(region_count),
        })
    }

    async fn get_visitor_pop(
        &self,
        ip_address: &str,
        region_code: &str,
    ) -> StorageResult<Option<Pop>> {
        let row = sqlx::query_as::<_, VisitorPopRow>(
            r#"
            SELECT ip_address, region_code, count, created_at, updated_at
            FROM visitor_pops
            WHERE ip_address = $1 AND region_code = $2
            "#,
        )
        .bind(ip_address)
        .bind(region_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Pop::from))
    }

    async fn get_region_pop(&self, region_code: &str) -> StorageResult<Option<Pop>> {
        let row = sqlx::query_as::<_, RegionPopRow>(
            r#"
            SELECT region_code, count, created_at, updated_at
            FROM region_pops
            WHERE region_code = $1
            "#,
        )
        .bind(region_code)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(Pop::from))
    }

    async fn list_region_pops(&self) -> StorageResult<Vec<Pop>> {
        let pops = sqlx::query_as::<_, RegionPopRow>(
            r#"
            SELECT region_code, count, created_at, updated_at
            FROM region_pops
            ORDER BY count DESC, region_code ASC
            "#,
        )
        .fetch_all(self.pool.as_ref())
        .await?
        .into_iter()
        .map(Pop::from)
        .collect();

        Ok(pops)
    }
}
