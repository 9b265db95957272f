use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::KernelError;

/// Motivo de instalação de um pacote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallReason {
    /// Pedido diretamente pelo usuário
    Explicit,
    /// Puxado como dependência transitiva
    Auto,
}

impl InstallReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallReason::Explicit => "explicit",
            InstallReason::Auto => "auto",
        }
    }
}

impl fmt::Display for InstallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for InstallReason {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "explicit" => Ok(InstallReason::Explicit),
            "auto" => Ok(InstallReason::Auto),
            other => Err(KernelError::Store(format!(
                "motivo de instalação desconhecido: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub version: String,
    pub size: u64,
    pub reason: InstallReason,
    /// Mirror de onde a entrada do catálogo veio
    pub mirror: String,
    pub installed_at: u64,
}

/// Aresta `package -> depends_on` (dependência direta).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub package: String,
    pub depends_on: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub name: String,
    pub tag: String,
    pub base_image: Option<String>,
    pub layers: Vec<String>,
    pub size: u64,
    pub created_at: u64,
}

impl ImageRecord {
    /// Referência `nome:tag`
    pub fn reference(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }
}

/// Estado de um contêiner.
///
/// `Removed` é terminal e nunca é persistido: a linha é apagada na remoção.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Stopped,
    Removed,
}

impl ContainerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Stopped => "stopped",
            ContainerState::Removed => "removed",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ContainerState {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(ContainerState::Created),
            "running" => Ok(ContainerState::Running),
            "stopped" => Ok(ContainerState::Stopped),
            "removed" => Ok(ContainerState::Removed),
            other => Err(KernelError::Store(format!(
                "estado de contêiner desconhecido: {other}"
            ))),
        }
    }
}

/// Comando executado via `cexec`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecRecord {
    pub timestamp: u64,
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: String,
    pub name: String,
    pub image_id: String,
    /// Referência `nome:tag` da imagem no momento da criação
    pub image: String,
    pub state: ContainerState,
    pub ip: Ipv4Addr,
    pub pid: Option<u32>,
    pub command: String,
    pub command_log: Vec<ExecRecord>,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub created_at: u64,
    pub state_changed_at: u64,
    pub started_at: Option<u64>,
}

impl ContainerRecord {
    pub fn is_running(&self) -> bool {
        self.state == ContainerState::Running
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeRecord {
    pub name: String,
    pub mount_path: String,
    /// Id do contêiner dono (opcional)
    pub container: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenFileRecord {
    pub path: String,
    pub content: Vec<u8>,
    pub size: u64,
    pub created_at: u64,
    pub modified_at: u64,
}

/// Entrada de listagem do namespace oculto (sem o conteúdo).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenFileEntry {
    pub path: String,
    pub size: u64,
    pub modified_at: u64,
}

impl From<&HiddenFileRecord> for HiddenFileEntry {
    fn from(record: &HiddenFileRecord) -> Self {
        Self {
            path: record.path.clone(),
            size: record.size,
            modified_at: record.modified_at,
        }
    }
}

pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
