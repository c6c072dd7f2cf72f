// Accumulator Store
//
// Holds the settlement asset (SOL) converted from token proceeds that has not
// been paid out yet. Every mutation rewrites `{ "amount": <number> }` at a
// fixed path before returning, and the in-memory value only changes once the
// write succeeded, so memory and disk never disagree by more than the
// mutation currently holding the lock.

use crate::error::{AppError, AppResult, PersistenceError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug, Serialize, Deserialize)]
struct AccumulatorRecord {
    amount: Decimal,
}

pub struct AccumulatorStore {
    path: PathBuf,
    amount: Mutex<Decimal>,
}

impl AccumulatorStore {
    /// Open the store, seeding the in-memory value from the persisted record.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let amount = Self::load(&path).await;
        info!("💰 Loaded accumulated amount: {} SOL ({})", amount, path.display());

        Self {
            path,
            amount: Mutex::new(amount),
        }
    }

    /// Read the persisted amount. A missing record is zero; a corrupt one is
    /// logged and also treated as zero.
    pub async fn load(path: &Path) -> Decimal {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No accumulator record at {}, starting from zero", path.display());
                return Decimal::ZERO;
            }
            Err(e) => {
                error!(
                    "❌ {}",
                    PersistenceError::Read {
                        path: path.display().to_string(),
                        message: e.to_string(),
                    }
                );
                return Decimal::ZERO;
            }
        };

        match serde_json::from_str::<AccumulatorRecord>(&raw) {
            Ok(record) if record.amount.is_sign_negative() => {
                error!(
                    "❌ Accumulator record at {} holds a negative amount ({}), resetting to zero",
                    path.display(),
                    record.amount
                );
                Decimal::ZERO
            }
            Ok(record) => record.amount,
            Err(e) => {
                error!(
                    "❌ Corrupt accumulator record at {}: {}. Starting from zero",
                    path.display(),
                    e
                );
                Decimal::ZERO
            }
        }
    }

    /// Current in-memory balance.
    pub async fn balance(&self) -> Decimal {
        *self.amount.lock().await
    }

    /// Add converted proceeds. Returns the new total.
    pub async fn add(&self, delta: Decimal) -> AppResult<Decimal> {
        if delta.is_sign_negative() {
            return Err(AppError::InvalidInput(format!(
                "Accumulator increment must be non-negative, got {}",
                delta
            )));
        }

        let mut amount = self.amount.lock().await;
        let total = *amount + delta;
        self.persist(total).await?;
        *amount = total;

        info!("💰 Accumulated +{} SOL (total: {} SOL)", delta, total);
        Ok(total)
    }

    /// Hand the whole balance to a distribution cycle, leaving zero behind.
    pub async fn take_all(&self) -> AppResult<Decimal> {
        let mut amount = self.amount.lock().await;
        let taken = *amount;
        if taken.is_zero() {
            return Ok(Decimal::ZERO);
        }

        self.persist(Decimal::ZERO).await?;
        *amount = Decimal::ZERO;

        info!("📤 Took {} SOL from the accumulator for distribution", taken);
        Ok(taken)
    }

    /// Give back an amount taken by a cycle that failed before paying out.
    /// Additive, so increments made while the cycle was running are kept.
    pub async fn restore(&self, taken: Decimal) -> AppResult<Decimal> {
        if taken.is_sign_negative() {
            return Err(AppError::InvalidInput(format!(
                "Cannot restore a negative amount: {}",
                taken
            )));
        }

        let mut amount = self.amount.lock().await;
        let total = *amount + taken;
        self.persist(total).await?;
        *amount = total;

        warn!("↩️ Restored {} SOL to the accumulator (total: {} SOL)", taken, total);
        Ok(total)
    }

    async fn persist(&self, amount: Decimal) -> Result<(), PersistenceError> {
        let body = serde_json::to_string_pretty(&AccumulatorRecord { amount })
            .map_err(|e| PersistenceError::Encode(e.to_string()))?;

        // Write-then-rename so a crash mid-write never leaves a torn record
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        let write_error = |e: std::io::Error| PersistenceError::Write {
            path: self.path.display().to_string(),
            message: e.to_string(),
        };

        tokio::fs::write(&staging, body).await.map_err(write_error)?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(write_error)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use uuid::Uuid;

    fn temp_record_path() -> PathBuf {
        std::env::temp_dir().join(format!("accumulator-{}.json", Uuid::new_v4()))
    }

    async fn persisted(path: &Path) -> Decimal {
        let raw = tokio::fs::read_to_string(path).await.unwrap();
        let record: AccumulatorRecord = serde_json::from_str(&raw).unwrap();
        record.amount
    }

    #[tokio::test]
    async fn test_missing_record_loads_zero() {
        let store = AccumulatorStore::open(temp_record_path()).await;
        assert_eq!(store.balance().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_corrupt_record_loads_zero() {
        let path = temp_record_path();
        tokio::fs::write(&path, "{ not json").await.unwrap();

        assert_eq!(AccumulatorStore::load(&path).await, Decimal::ZERO);
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_reopen_seeds_from_disk() {
        let path = temp_record_path();
        tokio::fs::write(&path, r#"{ "amount": 2.5 }"#).await.unwrap();

        let store = AccumulatorStore::open(&path).await;
        assert_eq!(store.balance().await, dec!(2.5));

        store.add(dec!(1.25)).await.unwrap();
        drop(store);

        let reopened = AccumulatorStore::open(&path).await;
        assert_eq!(reopened.balance().await, dec!(3.75));
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_take_all_returns_sum_of_prior_adds() {
        let path = temp_record_path();
        let store = Arc::new(AccumulatorStore::open(&path).await);

        let mut handles = Vec::new();
        for _ in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.add(dec!(0.025)).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let taken = store.take_all().await.unwrap();
        assert_eq!(taken, dec!(1.000));
        assert_eq!(store.balance().await, Decimal::ZERO);
        assert_eq!(persisted(&path).await, Decimal::ZERO);
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_restore_after_take_all_leaves_exact_amount() {
        let path = temp_record_path();
        let store = AccumulatorStore::open(&path).await;
        store.add(dec!(7)).await.unwrap();

        let taken = store.take_all().await.unwrap();
        assert_eq!(taken, dec!(7));

        store.restore(dec!(3.3)).await.unwrap();
        assert_eq!(store.balance().await, dec!(3.3));
        assert_eq!(persisted(&path).await, dec!(3.3));
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_restore_keeps_increments_made_during_cycle() {
        let path = temp_record_path();
        let store = AccumulatorStore::open(&path).await;
        store.add(dec!(5)).await.unwrap();

        let taken = store.take_all().await.unwrap();
        store.add(dec!(0.5)).await.unwrap();
        store.restore(taken).await.unwrap();

        assert_eq!(store.balance().await, dec!(5.5));
        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_negative_increment_rejected() {
        let store = AccumulatorStore::open(temp_record_path()).await;
        assert!(store.add(dec!(-1)).await.is_err());
        assert_eq!(store.balance().await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back_increment() {
        let path = std::env::temp_dir()
            .join(format!("missing-{}", Uuid::new_v4()))
            .join("accumulated_sol.json");
        let store = AccumulatorStore::open(&path).await;

        let result = store.add(dec!(4)).await;
        assert!(matches!(result, Err(AppError::Persistence(_))));
        assert_eq!(store.balance().await, Decimal::ZERO);
    }
}
