pub mod jupiter;

#[cfg(test)]
pub mod mock;

pub use jupiter::{JupiterClient, SwapVenue, JUPITER_V6_API};
