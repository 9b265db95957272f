use std::sync::Arc;
use tracing::{debug, info};

use crate::config::KernelConfig;
use crate::containers::ContainerEngine;
use crate::drivers::DriverRegistry;
use crate::error::Result;
use crate::fs::FilesystemFacade;
use crate::packages::manager::MIRROR_KEY;
use crate::packages::{Catalog, MirrorSource, PackageManager};
use crate::store::{MemoryStore, SqliteStore, Store};

pub const VERSION_KEY: &str = "version";
pub const ARCHITECTURE_KEY: &str = "architecture";

/// Estado compartilhado do kernel (store + subsistemas), passado explicitamente.
pub struct KernelState<S: Store = SqliteStore> {
    pub config: KernelConfig,
    pub store: Arc<S>,
    pub packages: PackageManager<S>,
    pub containers: ContainerEngine<S>,
    pub fs: FilesystemFacade<S>,
    pub drivers: DriverRegistry<S>,
}

impl KernelState<SqliteStore> {
    /// Abre (ou cria) o banco configurado e monta os subsistemas.
    pub fn open(config: KernelConfig) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(config.database_path())?);
        Self::with_store(config, store)
    }
}

impl KernelState<MemoryStore> {
    /// Estado sem persistência; o namespace regular continua em disco.
    pub fn in_memory(config: KernelConfig) -> Result<Self> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }
}

impl<S: Store> KernelState<S> {
    pub fn with_store(config: KernelConfig, store: Arc<S>) -> Result<Self> {
        config.validate()?;
        let mirror = config.mirror()?;
        seed_metadata(store.as_ref(), mirror)?;

        let mut catalog = Catalog::seed();
        if let Some(path) = config.catalog_path() {
            let extra = Catalog::load_file(&path)?;
            debug!(path = %path.display(), entries = extra.len(), "catálogo extra carregado");
            catalog.extend(extra);
        }

        let packages = PackageManager::new(Arc::clone(&store), catalog, mirror);
        let containers = ContainerEngine::new(Arc::clone(&store), config.bridge()?);
        let fs = FilesystemFacade::new(Arc::clone(&store), config.fs_root_path())?;
        let drivers = DriverRegistry::new(Arc::clone(&store));

        Ok(Self {
            config,
            store,
            packages,
            containers,
            fs,
            drivers,
        })
    }
}

/// Grava `version`, `architecture` e `mirror` na primeira abertura.
fn seed_metadata<S: Store>(store: &S, mirror: MirrorSource) -> Result<()> {
    let seeded = store.write(|gw| {
        let defaults = [
            (VERSION_KEY, env!("CARGO_PKG_VERSION")),
            (ARCHITECTURE_KEY, std::env::consts::ARCH),
            (MIRROR_KEY, mirror.name()),
        ];
        let mut seeded = Vec::new();
        for (key, value) in defaults {
            if gw.get_metadata(key)?.is_none() {
                gw.set_metadata(key, value)?;
                seeded.push(key);
            }
        }
        Ok(seeded)
    })?;

    if !seeded.is_empty() {
        info!(keys = ?seeded, "metadata inicial gravada");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_seeds_metadata_once() {
        let dir = tempdir().unwrap();
        let mut config = KernelConfig::for_data_dir(dir.path());
        config.packages.mirror = "ubuntu".to_string();

        let state = KernelState::open(config.clone()).unwrap();
        assert!(config.database_path().exists());
        assert!(config.fs_root_path().is_dir());
        let (version, arch) = state
            .store
            .read(|gw| Ok((gw.get_metadata(VERSION_KEY)?, gw.get_metadata(ARCHITECTURE_KEY)?)))
            .unwrap();
        assert_eq!(version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
        assert_eq!(arch.as_deref(), Some(std::env::consts::ARCH));
        assert_eq!(state.packages.preferred_mirror().unwrap(), MirrorSource::Ubuntu);

        state.packages.set_mirror("arch").unwrap();
        drop(state);

        // Reabrir não sobrescreve o que já está gravado
        let state = KernelState::open(config).unwrap();
        assert_eq!(state.packages.preferred_mirror().unwrap(), MirrorSource::Arch);
    }

    #[test]
    fn test_extra_catalog_is_merged() {
        let dir = tempdir().unwrap();
        let catalog = dir.path().join("extra.toml");
        std::fs::write(
            &catalog,
            r#"
[[package]]
name = "kadd-tools"
version = "0.3.0"
mirror = "alpine"
depends = ["bash"]
"#,
        )
        .unwrap();

        let mut config = KernelConfig::for_data_dir(dir.path());
        config.packages.catalog = Some(catalog);
        let state = KernelState::in_memory(config).unwrap();

        assert!(state.packages.catalog().contains("kadd-tools"));
        let plan = state.packages.install("kadd-tools", true).unwrap();
        assert!(plan.packages.iter().any(|p| p.entry.name == "bash"));
    }

    #[test]
    fn test_invalid_network_rejected() {
        let dir = tempdir().unwrap();
        let mut config = KernelConfig::for_data_dir(dir.path());
        config.network.subnet = "not-a-subnet".to_string();
        assert!(KernelState::in_memory(config).is_err());
    }
}
