use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every failure a training or capture run can surface to its caller.
#[derive(Debug, Error)]
pub enum Error {
    /// One or more configuration rules were violated. Always carries the full list.
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfiguration(Vec<String>),

    /// A loss or gradient became NaN or infinite.
    #[error("non-finite {quantity} during {context}")]
    NonFinite {
        quantity: &'static str,
        context: String,
    },

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn non_finite(quantity: &'static str, context: impl Into<String>) -> Self {
        Self::NonFinite {
            quantity,
            context: context.into(),
        }
    }

    pub fn shape_mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }
}
