// Durable record of settlement asset earned but not yet distributed
pub mod store;

pub use store::AccumulatorStore;
