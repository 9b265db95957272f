//! Gerenciador de pacotes com rastreamento de dependências.

pub mod catalog;
pub mod manager;
pub mod resolver;

pub use catalog::{Catalog, CatalogEntry, MirrorSource, Search};
pub use manager::{MirrorStatus, PackageInfo, PackageManager};
pub use resolver::{InstallPlan, PlannedPackage};
