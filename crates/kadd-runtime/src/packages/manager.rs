//! Superfície de comandos do gerenciador de pacotes (`install`, `remove`, ...).

use std::sync::Arc;
use tracing::{debug, info};

use super::catalog::{Catalog, CatalogEntry, MirrorSource, Search};
use super::resolver::{find_orphans, plan_install, InstallPlan};
use crate::error::{EntityKind, KernelError, Result};
use crate::store::model::{unix_timestamp, InstallReason, PackageRecord};
use crate::store::{Gateway, Store};

/// Chave de metadata com o mirror preferido.
pub const MIRROR_KEY: &str = "mirror";
/// Chave de metadata com o timestamp da última mutação de pacotes.
pub const LAST_UPDATE_KEY: &str = "last_update";

/// Visão de `info <pacote>`.
#[derive(Debug, Clone)]
pub struct PackageInfo {
    pub name: String,
    pub catalog: Option<CatalogEntry>,
    pub installed: Option<PackageRecord>,
    /// Dependências diretas (do store se instalado, senão do catálogo)
    pub dependencies: Vec<String>,
    /// Pacotes instalados que dependem diretamente deste
    pub dependents: Vec<String>,
}

/// Linha de `mirror list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorStatus {
    pub source: MirrorSource,
    pub active: bool,
}

/// Gerenciador de pacotes sobre um store compartilhado.
pub struct PackageManager<S: Store> {
    store: Arc<S>,
    catalog: Catalog,
    default_mirror: MirrorSource,
}

impl<S: Store> PackageManager<S> {
    pub fn new(store: Arc<S>, catalog: Catalog, default_mirror: MirrorSource) -> Self {
        Self {
            store,
            catalog,
            default_mirror,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Mirror preferido: o gravado por `mirror set`, senão o da configuração.
    pub fn preferred_mirror(&self) -> Result<MirrorSource> {
        self.store.read(|gw| self.preferred_in(gw))
    }

    fn preferred_in(&self, gw: &dyn Gateway) -> Result<MirrorSource> {
        match gw.get_metadata(MIRROR_KEY)? {
            Some(value) => value.parse(),
            None => Ok(self.default_mirror),
        }
    }

    /// Busca no catálogo (sem efeitos colaterais).
    pub fn search(&self, query: &str) -> Result<Search<'_>> {
        let preferred = self.preferred_mirror()?;
        Ok(self.catalog.search(query, Some(preferred)))
    }

    /// Calcula o plano de instalação sem gravar nada (`--dry-run`).
    pub fn plan_install(&self, name: &str, explicit: bool) -> Result<InstallPlan> {
        self.store.read(|gw| {
            let preferred = self.preferred_in(gw)?;
            plan_install(&self.catalog, Some(preferred), name, explicit, |pkg| {
                Ok(gw.get_package(pkg)?.map(|p| p.reason))
            })
        })
    }

    /// Instala `name` e seu fecho de dependências numa única transação.
    pub fn install(&self, name: &str, explicit: bool) -> Result<InstallPlan> {
        let plan = self.store.write(|gw| {
            let preferred = self.preferred_in(&*gw)?;
            let plan = {
                let view: &dyn Gateway = &*gw;
                plan_install(&self.catalog, Some(preferred), name, explicit, |pkg| {
                    Ok(view.get_package(pkg)?.map(|p| p.reason))
                })?
            };

            if plan.is_noop() {
                return Ok(plan);
            }

            let now = unix_timestamp();
            for planned in &plan.packages {
                gw.put_package(&PackageRecord {
                    name: planned.entry.name.clone(),
                    version: planned.entry.version.clone(),
                    size: planned.entry.size,
                    reason: planned.reason,
                    mirror: planned.entry.mirror.to_string(),
                    installed_at: now,
                })?;
            }
            for edge in &plan.edges {
                gw.put_dependency_edge(&edge.package, &edge.depends_on)?;
            }
            if plan.promote_target {
                if let Some(mut record) = gw.get_package(name)? {
                    record.reason = InstallReason::Explicit;
                    gw.put_package(&record)?;
                }
            }
            gw.set_metadata(LAST_UPDATE_KEY, &now.to_string())?;
            Ok(plan)
        })?;

        if plan.is_noop() {
            debug!(package = name, "já instalado");
        } else {
            info!(
                package = name,
                new = plan.packages.len(),
                promoted = plan.promote_target,
                "pacote instalado"
            );
        }
        Ok(plan)
    }

    /// Remove um pacote instalado que não tenha dependentes.
    pub fn remove(&self, name: &str) -> Result<PackageRecord> {
        let removed = self.store.write(|gw| {
            let record = gw
                .get_package(name)?
                .ok_or_else(|| KernelError::not_found(EntityKind::Package, name))?;

            let dependents = gw.list_dependents(name)?;
            if !dependents.is_empty() {
                return Err(KernelError::DependencyConflict {
                    package: name.to_string(),
                    dependents,
                });
            }

            gw.delete_dependency_edges(name)?;
            gw.delete_package(name)?;
            gw.set_metadata(LAST_UPDATE_KEY, &unix_timestamp().to_string())?;
            Ok(record)
        })?;

        info!(package = name, "pacote removido");
        Ok(removed)
    }

    /// Remove todos os pacotes `auto` não alcançáveis a partir de um `explicit`.
    pub fn autoremove(&self) -> Result<Vec<String>> {
        let removed = self.store.write(|gw| {
            let packages = gw.list_packages()?;
            let edges = gw.list_edges()?;
            let orphans = find_orphans(&packages, &edges);

            for name in &orphans {
                gw.delete_dependency_edges(name)?;
                gw.delete_package(name)?;
            }
            if !orphans.is_empty() {
                gw.set_metadata(LAST_UPDATE_KEY, &unix_timestamp().to_string())?;
            }
            Ok(orphans)
        })?;

        if !removed.is_empty() {
            info!(count = removed.len(), packages = ?removed, "órfãos removidos");
        }
        Ok(removed)
    }

    pub fn list(&self) -> Result<Vec<PackageRecord>> {
        self.store.read(|gw| gw.list_packages())
    }

    pub fn info(&self, name: &str) -> Result<PackageInfo> {
        self.store.read(|gw| {
            let preferred = self.preferred_in(gw)?;
            let catalog = self.catalog.resolve(name, Some(preferred)).cloned();
            let installed = gw.get_package(name)?;

            if catalog.is_none() && installed.is_none() {
                return Err(KernelError::not_found(EntityKind::Package, name));
            }

            let dependencies = match (&installed, &catalog) {
                (Some(_), _) => gw.dependencies_of(name)?,
                (None, Some(entry)) => entry.depends.clone(),
                (None, None) => Vec::new(),
            };
            let dependents = gw.list_dependents(name)?;

            Ok(PackageInfo {
                name: name.to_string(),
                catalog,
                installed,
                dependencies,
                dependents,
            })
        })
    }

    pub fn mirrors(&self) -> Result<Vec<MirrorStatus>> {
        let active = self.preferred_mirror()?;
        Ok(MirrorSource::ALL
            .iter()
            .map(|source| MirrorStatus {
                source: *source,
                active: *source == active,
            })
            .collect())
    }

    /// Persiste o mirror preferido (nome ou índice de `mirror list`).
    pub fn set_mirror(&self, selector: &str) -> Result<MirrorSource> {
        let source: MirrorSource = selector.parse()?;
        self.store
            .write(|gw| gw.set_metadata(MIRROR_KEY, source.name()))?;
        info!(mirror = %source, "mirror preferido alterado");
        Ok(source)
    }
}
