use super::models::{RecipientShare, ShareRow};
use crate::error::AppResult;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use sqlx::PgPool;
use tracing::info;

/// Source of the `(address, percentage)` snapshot for one distribution cycle.
/// Implementations are queried fresh every cycle; nothing is cached.
#[async_trait]
pub trait ShareProvider: Send + Sync {
    async fn fetch_shares(&self) -> AppResult<Vec<RecipientShare>>;
}

/// Replaces the whole snapshot at once. Readers never observe a partially
/// written list.
#[async_trait]
pub trait ShareStore: Send + Sync {
    async fn replace_shares(&self, shares: &[RecipientShare]) -> AppResult<()>;
}

/// Reads and writes the snapshot kept in the `recipient_shares` table
pub struct PgShareProvider {
    pool: PgPool,
}

impl PgShareProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShareProvider for PgShareProvider {
    async fn fetch_shares(&self) -> AppResult<Vec<RecipientShare>> {
        info!("📋 Fetching recipient shares...");

        let rows = sqlx::query_as::<_, ShareRow>(
            r#"
            SELECT address, percentage
            FROM recipient_shares
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let shares: Vec<RecipientShare> = rows.iter().filter_map(RecipientShare::from_row).collect();

        info!(
            "📋 Retrieved {} rows, {} valid recipients",
            rows.len(),
            shares.len()
        );
        Ok(shares)
    }
}

#[async_trait]
impl ShareStore for PgShareProvider {
    async fn replace_shares(&self, shares: &[RecipientShare]) -> AppResult<()> {
        let addresses: Vec<String> = shares.iter().map(|share| share.address.to_string()).collect();
        let percentages: Vec<f64> = shares
            .iter()
            .map(|share| share.percentage.to_f64().unwrap_or_default())
            .collect();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recipient_shares")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO recipient_shares (address, percentage)
            SELECT * FROM UNNEST($1::TEXT[], $2::DOUBLE PRECISION[])
            "#,
        )
        .bind(&addresses)
        .bind(&percentages)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("💾 Stored {} recipient shares", shares.len());
        Ok(())
    }
}

/// In-memory snapshot
#[cfg(test)]
pub struct InMemoryShares {
    shares: parking_lot::Mutex<Vec<RecipientShare>>,
}

#[cfg(test)]
impl InMemoryShares {
    pub fn new(shares: Vec<RecipientShare>) -> Self {
        Self {
            shares: parking_lot::Mutex::new(shares),
        }
    }

    pub fn snapshot(&self) -> Vec<RecipientShare> {
        self.shares.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl ShareProvider for InMemoryShares {
    async fn fetch_shares(&self) -> AppResult<Vec<RecipientShare>> {
        Ok(self.snapshot())
    }
}

#[cfg(test)]
#[async_trait]
impl ShareStore for InMemoryShares {
    async fn replace_shares(&self, shares: &[RecipientShare]) -> AppResult<()> {
        *self.shares.lock() = shares.to_vec();
        Ok(())
    }
}
