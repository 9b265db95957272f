//! Kernel-Add simulado: gerenciador de pacotes, motor de contêineres,
//! filesystem com namespace oculto e drivers, sobre um store persistente.

pub mod config;
pub mod containers;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod packages;
pub mod state;
pub mod store;

pub use config::KernelConfig;
pub use error::{EntityKind, KernelError, Result};
pub use state::KernelState;
pub use store::{Gateway, MemoryStore, SqliteStore, Store};
