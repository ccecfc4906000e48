pub mod architecture;
pub mod network;

pub use architecture::{describe_architecture, parse_hidden_layers};
pub use network::{ForwardTrace, LayerStack, Mode, Model};
