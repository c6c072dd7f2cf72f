pub mod client;
pub mod instructions;
pub mod solana;

#[cfg(test)]
pub mod mock;

pub use client::{ConfirmationStatus, Lease, LedgerClient};
pub use solana::{explorer_url, load_keypair, SolanaConfig, SolanaLedger};
