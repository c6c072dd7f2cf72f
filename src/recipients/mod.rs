pub mod models;
pub mod provider;

pub use models::RecipientShare;
pub use provider::{PgShareProvider, ShareProvider, ShareStore};
#[cfg(test)]
pub use provider::InMemoryShares;
