pub mod engine;
pub mod snapshot;
pub mod verify;

pub use engine::{capture_from_dataset, capture_iterations, run_capture, CaptureSettings};
pub use snapshot::{ForwardPassData, IterationData, LayerSnapshot, LayerSnapshots};
pub use verify::{check_structure, check_update_rule};
