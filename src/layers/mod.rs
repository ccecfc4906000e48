pub mod dense;
pub mod parameter;

pub use dense::{Dense, LayerTrace};
pub use parameter::Parameter;
