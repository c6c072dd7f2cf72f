use crate::error::{AppError, AppResult};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::warn;

/// One payout recipient and its share of a cycle, in percent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipientShare {
    #[serde(serialize_with = "serialize_pubkey")]
    pub address: Pubkey,
    pub percentage: Decimal,
}

fn serialize_pubkey<S: serde::Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&key.to_string())
}

/// Raw row as stored by the share snapshot writer
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ShareRow {
    pub address: Option<String>,
    pub percentage: Option<f64>,
}

impl RecipientShare {
    pub fn new(address: Pubkey, percentage: Decimal) -> AppResult<Self> {
        if percentage <= Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
            return Err(AppError::InvalidInput(format!(
                "Share percentage must be within (0, 100], got {}",
                percentage
            )));
        }
        Ok(Self { address, percentage })
    }

    /// Validate a stored row. Malformed rows are logged and dropped rather
    /// than failing the whole snapshot.
    pub fn from_row(row: &ShareRow) -> Option<Self> {
        let Some(address) = row.address.as_deref() else {
            warn!("⚠️ Skipping share row without an address: {:?}", row);
            return None;
        };
        let Some(raw_percentage) = row.percentage else {
            warn!("⚠️ Skipping share row without a percentage: {:?}", row);
            return None;
        };

        let pubkey = match Pubkey::from_str(address.trim()) {
            Ok(pubkey) => pubkey,
            Err(e) => {
                warn!("⚠️ Failed to parse recipient address {}: {}", address, e);
                return None;
            }
        };

        let Some(percentage) = Decimal::from_f64(raw_percentage) else {
            warn!("⚠️ Invalid percentage {} for {}", raw_percentage, address);
            return None;
        };

        match Self::new(pubkey, percentage) {
            Ok(share) => Some(share),
            Err(e) => {
                warn!("⚠️ Skipping {}: {}", address, e);
                None
            }
        }
    }
}

/// Parse an `address:percent,address:percent` list.
pub fn parse_share_list(raw: &str) -> AppResult<Vec<RecipientShare>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (address, percentage) = entry.split_once(':').ok_or_else(|| {
                AppError::Config(format!("Expected address:percent, got '{}'", entry))
            })?;
            let address = Pubkey::from_str(address.trim())
                .map_err(|e| AppError::Config(format!("Invalid address '{}': {}", address, e)))?;
            let percentage = Decimal::from_str(percentage.trim())?;
            RecipientShare::new(address, percentage)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(address: Option<&str>, percentage: Option<f64>) -> ShareRow {
        ShareRow {
            address: address.map(str::to_string),
            percentage,
        }
    }

    #[test]
    fn test_from_row_accepts_valid_share() {
        let address = Pubkey::new_unique().to_string();
        let share = RecipientShare::from_row(&row(Some(&address), Some(12.5))).unwrap();

        assert_eq!(share.address.to_string(), address);
        assert_eq!(share.percentage, dec!(12.5));
    }

    #[test]
    fn test_from_row_drops_malformed_rows() {
        let address = Pubkey::new_unique().to_string();

        assert!(RecipientShare::from_row(&row(None, Some(10.0))).is_none());
        assert!(RecipientShare::from_row(&row(Some(&address), None)).is_none());
        assert!(RecipientShare::from_row(&row(Some("not-a-key"), Some(10.0))).is_none());
        assert!(RecipientShare::from_row(&row(Some(&address), Some(0.0))).is_none());
        assert!(RecipientShare::from_row(&row(Some(&address), Some(100.5))).is_none());
    }

    #[test]
    fn test_parse_share_list() {
        let a = Pubkey::new_unique();
        let b = Pubkey::new_unique();
        let shares = parse_share_list(&format!("{}:66, {}:34", a, b)).unwrap();

        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].address, a);
        assert_eq!(shares[0].percentage, dec!(66));
        assert_eq!(shares[1].address, b);
        assert_eq!(shares[1].percentage, dec!(34));

        assert!(parse_share_list("").unwrap().is_empty());
        assert!(parse_share_list("missing-separator").is_err());
    }
}
