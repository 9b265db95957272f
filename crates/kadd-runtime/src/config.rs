//! Configuração do kernel (`<data_dir>/config.toml`), com padrões para tudo.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::containers::BridgeNetwork;
use crate::error::{KernelError, Result};
use crate::packages::MirrorSource;

/// Variável de ambiente que sobrescreve o diretório de dados.
pub const DATA_DIR_ENV: &str = "KADD_DATA_DIR";
pub const CONFIG_FILE: &str = "config.toml";

/// Diretório de dados padrão: `$KADD_DATA_DIR`, senão `~/.kernel-add`.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = env::var_os(DATA_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kernel-add")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub bridge: String,
    pub subnet: String,
    pub gateway: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bridge: "bridge0".to_string(),
            subnet: "172.17.0.0/16".to_string(),
            gateway: "172.17.0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagesConfig {
    /// Mirror preferido até que `mirror set` grave outro
    pub mirror: String,
    /// Catálogo TOML extra (`[[package]]`)
    pub catalog: Option<PathBuf>,
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            mirror: MirrorSource::Alpine.name().to_string(),
            catalog: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub data_dir: PathBuf,
    /// Padrão: `<data_dir>/var/lib/add/kernel.db`
    pub database: Option<PathBuf>,
    /// Raiz do namespace regular. Padrão: `<data_dir>/root`
    pub fs_root: Option<PathBuf>,
    pub network: NetworkConfig,
    pub packages: PackagesConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::for_data_dir(default_data_dir())
    }
}

impl KernelConfig {
    /// Configuração padrão enraizada em `data_dir`.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            database: None,
            fs_root: None,
            network: NetworkConfig::default(),
            packages: PackagesConfig::default(),
        }
    }

    /// Carrega a configuração.
    ///
    /// `data_dir` (flag `--data-dir`) tem prioridade sobre o arquivo. Sem
    /// `config_file`, usa `<data_dir>/config.toml` se existir.
    pub fn load(data_dir: Option<PathBuf>, config_file: Option<&Path>) -> Result<Self> {
        let base_dir = data_dir.clone().unwrap_or_else(default_data_dir);

        let path = match config_file {
            Some(path) if !path.exists() => {
                return Err(KernelError::Config(format!(
                    "arquivo de configuração '{}' não existe",
                    path.display()
                )))
            }
            Some(path) => Some(path.to_path_buf()),
            None => Some(base_dir.join(CONFIG_FILE)).filter(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                let text = fs::read_to_string(&path)?;
                let mut parsed: KernelConfig = toml::from_str(&text).map_err(|err| {
                    KernelError::Config(format!("'{}': {err}", path.display()))
                })?;
                // Sem data_dir explícito no arquivo, vale o diretório onde procuramos
                if !text.lines().any(|l| l.trim_start().starts_with("data_dir")) {
                    parsed.data_dir = base_dir.clone();
                }
                parsed
            }
            None => Self::for_data_dir(base_dir),
        };

        if let Some(dir) = data_dir {
            config.data_dir = dir;
        }
        config.validate()?;
        Ok(config)
    }

    fn under_data_dir(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }

    pub fn database_path(&self) -> PathBuf {
        match &self.database {
            Some(path) => self.under_data_dir(path),
            None => self.data_dir.join("var/lib/add/kernel.db"),
        }
    }

    pub fn fs_root_path(&self) -> PathBuf {
        match &self.fs_root {
            Some(path) => self.under_data_dir(path),
            None => self.data_dir.join("root"),
        }
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.packages
            .catalog
            .as_deref()
            .map(|path| self.under_data_dir(path))
    }

    pub fn bridge(&self) -> Result<BridgeNetwork> {
        BridgeNetwork::parse(
            &self.network.bridge,
            &self.network.subnet,
            &self.network.gateway,
        )
    }

    pub fn mirror(&self) -> Result<MirrorSource> {
        self.packages
            .mirror
            .parse()
            .map_err(|_| KernelError::Config(format!("mirror desconhecido: {}", self.packages.mirror)))
    }

    /// Rede parseável com gateway dentro da sub-rede, e mirror conhecido.
    pub fn validate(&self) -> Result<()> {
        if self.network.bridge.trim().is_empty() {
            return Err(KernelError::Config("nome da bridge vazio".to_string()));
        }
        self.bridge()?;
        self.mirror()?;
        Ok(())
    }
}
