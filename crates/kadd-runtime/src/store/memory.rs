//! Store em memória: as sete tabelas em `BTreeMap`s atrás de um `RwLock`.

use parking_lot::{RwLock, RwLockReadGuard};
use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use super::model::{
    ContainerRecord, DependencyEdge, HiddenFileEntry, HiddenFileRecord, ImageRecord,
    PackageRecord, VolumeRecord,
};
use super::{Gateway, Store};
use crate::error::{KernelError, Result};

/// Conteúdo das tabelas mantido em memória.
#[derive(Debug, Clone, Default)]
struct Tables {
    packages: BTreeMap<String, PackageRecord>,
    dependencies: BTreeSet<(String, String)>,
    metadata: BTreeMap<String, String>,
    images: BTreeMap<String, ImageRecord>,
    containers: BTreeMap<String, ContainerRecord>,
    volumes: BTreeMap<String, VolumeRecord>,
    hidden_files: BTreeMap<String, HiddenFileRecord>,
}

/// Store em memória com a mesma semântica transacional do SQLite.
///
/// Cada `write` trabalha sobre uma cópia das tabelas e só a publica se o
/// closure terminar com `Ok`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> RwLockReadGuard<'_, Tables> {
        self.inner.read()
    }
}

impl Store for MemoryStore {
    fn read<R>(&self, f: impl FnOnce(&dyn Gateway) -> Result<R>) -> Result<R> {
        let tables = self.tables();
        f(&*tables)
    }

    fn write<R>(&self, f: impl FnOnce(&mut dyn Gateway) -> Result<R>) -> Result<R> {
        let mut guard = self.inner.write();
        let mut staged = guard.clone();
        let out = f(&mut staged)?;
        *guard = staged;
        Ok(out)
    }
}

fn sorted_containers<'a>(iter: impl Iterator<Item = &'a ContainerRecord>) -> Vec<ContainerRecord> {
    let mut list: Vec<ContainerRecord> = iter.cloned().collect();
    list.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
    list
}

impl Gateway for Tables {
    fn get_package(&self, name: &str) -> Result<Option<PackageRecord>> {
        Ok(self.packages.get(name).cloned())
    }

    fn put_package(&mut self, record: &PackageRecord) -> Result<()> {
        self.packages.insert(record.name.clone(), record.clone());
        Ok(())
    }

    fn delete_package(&mut self, name: &str) -> Result<bool> {
        Ok(self.packages.remove(name).is_some())
    }

    fn list_packages(&self) -> Result<Vec<PackageRecord>> {
        Ok(self.packages.values().cloned().collect())
    }

    fn put_dependency_edge(&mut self, package: &str, depends_on: &str) -> Result<()> {
        self.dependencies
            .insert((package.to_string(), depends_on.to_string()));
        Ok(())
    }

    fn delete_dependency_edges(&mut self, package: &str) -> Result<usize> {
        let before = self.dependencies.len();
        self.dependencies.retain(|(from, _)| from != package);
        Ok(before - self.dependencies.len())
    }

    fn dependencies_of(&self, package: &str) -> Result<Vec<String>> {
        Ok(self
            .dependencies
            .iter()
            .filter(|(from, _)| from == package)
            .map(|(_, to)| to.clone())
            .collect())
    }

    fn list_dependents(&self, package: &str) -> Result<Vec<String>> {
        let mut dependents: Vec<String> = self
            .dependencies
            .iter()
            .filter(|(_, to)| to == package)
            .map(|(from, _)| from.clone())
            .collect();
        dependents.sort();
        Ok(dependents)
    }

    fn list_edges(&self) -> Result<Vec<DependencyEdge>> {
        Ok(self
            .dependencies
            .iter()
            .map(|(package, depends_on)| DependencyEdge {
                package: package.clone(),
                depends_on: depends_on.clone(),
            })
            .collect())
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self.metadata.get(key).cloned())
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.metadata.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get_image(&self, name: &str, tag: &str) -> Result<Option<ImageRecord>> {
        Ok(self
            .images
            .values()
            .find(|img| img.name == name && img.tag == tag)
            .cloned())
    }

    fn get_image_by_id(&self, id: &str) -> Result<Option<ImageRecord>> {
        Ok(self.images.get(id).cloned())
    }

    fn put_image(&mut self, record: &ImageRecord) -> Result<()> {
        let clash = self
            .images
            .values()
            .any(|img| img.id != record.id && img.name == record.name && img.tag == record.tag);
        if clash {
            return Err(KernelError::Store(format!(
                "UNIQUE constraint failed: images.name, images.tag ({})",
                record.reference()
            )));
        }
        self.images.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete_image(&mut self, id: &str) -> Result<bool> {
        Ok(self.images.remove(id).is_some())
    }

    fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let mut list: Vec<ImageRecord> = self.images.values().cloned().collect();
        list.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.tag.cmp(&b.tag))
        });
        Ok(list)
    }

    fn get_container(&self, name_or_id: &str) -> Result<Option<ContainerRecord>> {
        let by_name = self.containers.values().find(|c| c.name == name_or_id);
        Ok(by_name
            .or_else(|| self.containers.get(name_or_id))
            .cloned())
    }

    fn put_container(&mut self, record: &ContainerRecord) -> Result<()> {
        for other in self.containers.values() {
            if other.id == record.id {
                continue;
            }
            if other.name == record.name {
                return Err(KernelError::Store(format!(
                    "UNIQUE constraint failed: containers.name ({})",
                    record.name
                )));
            }
            if other.ip == record.ip {
                return Err(KernelError::Store(format!(
                    "UNIQUE constraint failed: containers.ip_address ({})",
                    record.ip
                )));
            }
        }
        self.containers.insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn delete_container(&mut self, id: &str) -> Result<bool> {
        Ok(self.containers.remove(id).is_some())
    }

    fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        Ok(sorted_containers(self.containers.values()))
    }

    fn allocated_ips(&self) -> Result<BTreeSet<Ipv4Addr>> {
        Ok(self.containers.values().map(|c| c.ip).collect())
    }

    fn get_volume(&self, name: &str) -> Result<Option<VolumeRecord>> {
        Ok(self.volumes.get(name).cloned())
    }

    fn put_volume(&mut self, record: &VolumeRecord) -> Result<()> {
        self.volumes.insert(record.name.clone(), record.clone());
        Ok(())
    }

    fn delete_volume(&mut self, name: &str) -> Result<bool> {
        Ok(self.volumes.remove(name).is_some())
    }

    fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        Ok(self.volumes.values().cloned().collect())
    }

    fn get_hidden_file(&self, path: &str) -> Result<Option<HiddenFileRecord>> {
        Ok(self.hidden_files.get(path).cloned())
    }

    fn put_hidden_file(&mut self, record: &HiddenFileRecord) -> Result<()> {
        self.hidden_files.insert(record.path.clone(), record.clone());
        Ok(())
    }

    fn delete_hidden_file(&mut self, path: &str) -> Result<bool> {
        Ok(self.hidden_files.remove(path).is_some())
    }

    fn list_hidden_files(&self) -> Result<Vec<HiddenFileEntry>> {
        Ok(self.hidden_files.values().map(HiddenFileEntry::from).collect())
    }
}
