//! Motor de contêineres simulado (estilo Docker) com rede virtual.

pub mod engine;
pub mod inspect;
pub mod network;
pub mod state;

pub use engine::{CleanReport, ContainerEngine, CreateOptions, ExecOutput};
pub use inspect::{
    format_duration, format_relative, format_timestamp, ContainerInspection, NetworkInspection,
};
pub use network::BridgeNetwork;
pub use state::{transition, ContainerEvent, Transition};
