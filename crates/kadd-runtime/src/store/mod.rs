//! Gateway de persistência compartilhado pelos subsistemas.
//!
//! O contrato tem dois níveis:
//! - [`Store`] é dono do lock e do banco. `read` executa um closure com uma
//!   visão compartilhada; `write` executa o closure dentro de uma única
//!   transação exclusiva (commit em `Ok`, rollback em `Err`).
//! - [`Gateway`] é a superfície CRUD tipada usada dentro desses closures.
//!
//! Todas as verificações "check-then-act" (nomes únicos, alocação de IP,
//! dependentes de um pacote) acontecem dentro do mesmo `write`.

pub mod memory;
pub mod model;
pub mod sqlite;

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use crate::error::Result;
use model::{
    ContainerRecord, DependencyEdge, HiddenFileEntry, HiddenFileRecord, ImageRecord,
    PackageRecord, VolumeRecord,
};

pub use memory::MemoryStore;
pub use sqlite::{DiagnosticReport, RepairReport, SqliteStore};

/// Tabelas mantidas pelo gateway.
pub const TABLES: [&str; 7] = [
    "packages",
    "dependencies",
    "metadata",
    "hidden_files",
    "images",
    "containers",
    "volumes",
];

/// Operações tipadas sobre as sete tabelas. Sem regra de negócio.
pub trait Gateway {
    // Pacotes
    fn get_package(&self, name: &str) -> Result<Option<PackageRecord>>;
    fn put_package(&mut self, record: &PackageRecord) -> Result<()>;
    fn delete_package(&mut self, name: &str) -> Result<bool>;
    fn list_packages(&self) -> Result<Vec<PackageRecord>>;

    // Dependências
    fn put_dependency_edge(&mut self, package: &str, depends_on: &str) -> Result<()>;
    /// Remove as arestas de saída de `package`.
    fn delete_dependency_edges(&mut self, package: &str) -> Result<usize>;
    fn dependencies_of(&self, package: &str) -> Result<Vec<String>>;
    /// Pacotes que listam `package` como dependência direta.
    fn list_dependents(&self, package: &str) -> Result<Vec<String>>;
    fn list_edges(&self) -> Result<Vec<DependencyEdge>>;

    // Metadata
    fn get_metadata(&self, key: &str) -> Result<Option<String>>;
    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()>;

    // Imagens
    fn get_image(&self, name: &str, tag: &str) -> Result<Option<ImageRecord>>;
    fn get_image_by_id(&self, id: &str) -> Result<Option<ImageRecord>>;
    fn put_image(&mut self, record: &ImageRecord) -> Result<()>;
    fn delete_image(&mut self, id: &str) -> Result<bool>;
    fn list_images(&self) -> Result<Vec<ImageRecord>>;

    // Contêineres
    /// Busca por nome ou id (nome tem prioridade).
    fn get_container(&self, name_or_id: &str) -> Result<Option<ContainerRecord>>;
    fn put_container(&mut self, record: &ContainerRecord) -> Result<()>;
    fn delete_container(&mut self, id: &str) -> Result<bool>;
    fn list_containers(&self) -> Result<Vec<ContainerRecord>>;
    /// Endereços atualmente alugados na bridge.
    fn allocated_ips(&self) -> Result<BTreeSet<Ipv4Addr>>;

    // Volumes
    fn get_volume(&self, name: &str) -> Result<Option<VolumeRecord>>;
    fn put_volume(&mut self, record: &VolumeRecord) -> Result<()>;
    fn delete_volume(&mut self, name: &str) -> Result<bool>;
    fn list_volumes(&self) -> Result<Vec<VolumeRecord>>;

    // Arquivos ocultos
    fn get_hidden_file(&self, path: &str) -> Result<Option<HiddenFileRecord>>;
    fn put_hidden_file(&mut self, record: &HiddenFileRecord) -> Result<()>;
    fn delete_hidden_file(&mut self, path: &str) -> Result<bool>;
    fn list_hidden_files(&self) -> Result<Vec<HiddenFileEntry>>;
}

/// Handle do armazenamento persistente, passado explicitamente aos subsistemas.
pub trait Store: Send + Sync {
    /// Executa `f` com acesso somente leitura.
    fn read<R>(&self, f: impl FnOnce(&dyn Gateway) -> Result<R>) -> Result<R>;

    /// Executa `f` sob lock exclusivo, numa transação atômica.
    fn write<R>(&self, f: impl FnOnce(&mut dyn Gateway) -> Result<R>) -> Result<R>;
}
