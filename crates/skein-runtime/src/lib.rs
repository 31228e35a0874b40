pub mod element;
pub mod network;
pub mod position;
pub mod reflexive;

pub use element::{Collected, Content, ContentMode, Element, Value};
pub use network::{
    default_dedup, distinct_dedup, DedupFn, Network, NetworkConfig, NetworkError, Transitions,
};
pub use position::{PositionRegister, SharedPositions};
pub use reflexive::ReflexiveNetwork;
