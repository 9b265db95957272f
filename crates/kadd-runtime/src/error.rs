//! Tipos de erro do kernel simulado (pacotes, contêineres, filesystem e store).

use std::fmt;
use std::path::PathBuf;

/// Alias de resultado usado em toda a crate.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Categoria do registro afetado por um erro `NotFound` / `DuplicateName`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Package,
    Container,
    Image,
    Volume,
    HiddenFile,
    File,
    Network,
    Driver,
    Mirror,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::Package => "pacote",
            EntityKind::Container => "contêiner",
            EntityKind::Image => "imagem",
            EntityKind::Volume => "volume",
            EntityKind::HiddenFile => "arquivo oculto",
            EntityKind::File => "arquivo",
            EntityKind::Network => "rede",
            EntityKind::Driver => "driver",
            EntityKind::Mirror => "mirror",
        };
        f.write_str(label)
    }
}

/// Erros retornados pelos subsistemas ao despachante de comandos.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    // =========================================================================
    // Erros de registro
    // =========================================================================
    /// Pacote, contêiner, imagem, arquivo oculto etc. inexistente.
    #[error("{kind} '{name}' não encontrado")]
    NotFound { kind: EntityKind, name: String },

    /// Chave única já ocupada.
    #[error("{kind} '{name}' já existe")]
    DuplicateName { kind: EntityKind, name: String },

    /// Remoção bloqueada por pacotes que ainda dependem do alvo.
    #[error("pacote '{package}' é dependência de: {}", dependents.join(", "))]
    DependencyConflict {
        package: String,
        dependents: Vec<String>,
    },

    // =========================================================================
    // Erros da máquina de estados de contêineres
    // =========================================================================
    /// Operação exige que o contêiner não esteja rodando.
    #[error("contêiner '{0}' está rodando (use force para remover)")]
    ContainerRunning(String),

    /// Operação exige que o contêiner esteja rodando.
    #[error("contêiner '{0}' não está rodando")]
    ContainerNotRunning(String),

    /// Driver existe mas não está carregado (`modprobe` antes).
    #[error("driver '{0}' não está carregado")]
    DriverNotLoaded(String),

    /// Sub-rede sem endereços livres.
    #[error("sem endereços IP livres na sub-rede {subnet}")]
    NetworkExhausted { subnet: String },

    // =========================================================================
    // Erros de persistência e ambiente
    // =========================================================================
    /// Falha do banco subjacente (corrupção, I/O). Recuperável só via `repair`.
    #[error("erro de armazenamento: {0}")]
    Store(String),

    /// Caminho inválido ou fora da raiz do filesystem.
    #[error("caminho inválido '{}': {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    /// Argumento de comando inválido.
    #[error("argumento inválido: {0}")]
    InvalidArgument(String),

    /// Configuração inválida.
    #[error("configuração inválida: {0}")]
    Config(String),

    /// Erro de I/O no filesystem regular.
    #[error("erro de I/O: {0}")]
    Io(#[from] std::io::Error),
}

impl KernelError {
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        KernelError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn duplicate(kind: EntityKind, name: impl Into<String>) -> Self {
        KernelError::DuplicateName {
            kind,
            name: name.into(),
        }
    }

    /// Nome curto do tipo de erro, exibido pelo CLI.
    pub fn kind(&self) -> &'static str {
        match self {
            KernelError::NotFound { .. } => "NotFound",
            KernelError::DuplicateName { .. } => "DuplicateName",
            KernelError::DependencyConflict { .. } => "DependencyConflict",
            KernelError::ContainerRunning(_) => "ContainerRunning",
            KernelError::ContainerNotRunning(_) => "ContainerNotRunning",
            KernelError::DriverNotLoaded(_) => "DriverNotLoaded",
            KernelError::NetworkExhausted { .. } => "NetworkExhausted",
            KernelError::Store(_) => "StoreError",
            KernelError::InvalidPath { .. } => "InvalidPath",
            KernelError::InvalidArgument(_) => "InvalidArgument",
            KernelError::Config(_) => "ConfigError",
            KernelError::Io(_) => "IoError",
        }
    }
}

impl From<rusqlite::Error> for KernelError {
    fn from(err: rusqlite::Error) -> Self {
        KernelError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        KernelError::Store(format!("registro corrompido: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_identifier() {
        let err = KernelError::not_found(EntityKind::Package, "python3");
        assert_eq!(err.to_string(), "pacote 'python3' não encontrado");
        assert_eq!(err.kind(), "NotFound");

        let err = KernelError::DependencyConflict {
            package: "libssl".into(),
            dependents: vec!["curl".into(), "python3".into()],
        };
        assert!(err.to_string().contains("curl, python3"));
        assert_eq!(err.kind(), "DependencyConflict");

        let err = KernelError::DriverNotLoaded("gpu".into());
        assert_eq!(err.to_string(), "driver 'gpu' não está carregado");
        assert_eq!(err.kind(), "DriverNotLoaded");
    }

    #[test]
    fn test_sqlite_errors_become_store_errors() {
        let err: KernelError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.kind(), "StoreError");
    }
}
