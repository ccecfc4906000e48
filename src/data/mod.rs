pub mod dataset;
pub mod idx;

pub use dataset::{Batch, Batches, Dataset, Split};
