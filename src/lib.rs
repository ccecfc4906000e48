pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod data;
pub mod train;
pub mod capture;
pub mod error;

// Convenience re-exports
pub use math::matrix::Matrix;
pub use activation::activation::ActivationFunction;
pub use layers::dense::Dense;
pub use network::network::Model;
pub use loss::cross_entropy::CrossEntropyLoss;
pub use optim::sgd::Sgd;
pub use data::dataset::Dataset;
pub use train::train_config::{TrainingConfiguration, TrainingPlan};
pub use train::loop_fn::{run_training, train_and_evaluate};
pub use capture::snapshot::ForwardPassData;
pub use capture::engine::{capture_from_dataset, capture_iterations};
pub use error::{Error, Result};
