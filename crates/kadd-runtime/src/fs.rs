//! Fachada de filesystem: namespace regular (disco) e namespace oculto (banco).
//!
//! Os dois lados não compartilham chaves nem código de listagem: `h*` só fala
//! com o store, `f*`/`cat` só falam com o disco sob `root`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{EntityKind, KernelError, Result};
use crate::store::model::{unix_timestamp, HiddenFileEntry, HiddenFileRecord};
use crate::store::Store;

/// Entrada de `fls`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
}

/// Normaliza um caminho virtual do namespace oculto.
///
/// Sempre começa com `/`; segmentos vazios e `.` somem; `..` remove o segmento
/// anterior e nunca sobe acima da raiz.
pub fn normalize_hidden_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

pub struct FilesystemFacade<S: Store> {
    store: Arc<S>,
    root: PathBuf,
}

impl<S: Store> FilesystemFacade<S> {
    /// Cria a fachada, garantindo que a raiz regular exista.
    pub fn new(store: Arc<S>, root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { store, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ===== NAMESPACE OCULTO =====

    fn hidden_key(path: &str) -> Result<String> {
        let key = normalize_hidden_path(path);
        if key == "/" {
            return Err(KernelError::InvalidPath {
                path: PathBuf::from(path),
                reason: "caminho vazio".to_string(),
            });
        }
        Ok(key)
    }

    /// Grava (ou sobrescreve) um arquivo oculto.
    pub fn hwrite(&self, path: &str, content: &[u8]) -> Result<HiddenFileEntry> {
        let key = Self::hidden_key(path)?;
        let record = self.store.write(|gw| {
            let now = unix_timestamp();
            let created_at = gw
                .get_hidden_file(&key)?
                .map(|existing| existing.created_at)
                .unwrap_or(now);
            let record = HiddenFileRecord {
                path: key.clone(),
                content: content.to_vec(),
                size: content.len() as u64,
                created_at,
                modified_at: now,
            };
            gw.put_hidden_file(&record)?;
            Ok(record)
        })?;

        info!(path = %record.path, size = record.size, "arquivo oculto gravado");
        Ok(HiddenFileEntry::from(&record))
    }

    pub fn hread(&self, path: &str) -> Result<Vec<u8>> {
        let key = Self::hidden_key(path)?;
        self.store
            .read(|gw| gw.get_hidden_file(&key))?
            .map(|record| record.content)
            .ok_or_else(|| KernelError::not_found(EntityKind::HiddenFile, key))
    }

    /// Lista arquivos ocultos, opcionalmente sob um prefixo de diretório.
    pub fn hls(&self, prefix: Option<&str>) -> Result<Vec<HiddenFileEntry>> {
        let prefix = prefix.map(normalize_hidden_path);
        let entries = self.store.read(|gw| gw.list_hidden_files())?;

        Ok(entries
            .into_iter()
            .filter(|entry| match prefix.as_deref() {
                None | Some("/") => true,
                Some(dir) => {
                    entry.path == dir
                        || entry
                            .path
                            .strip_prefix(dir)
                            .is_some_and(|rest| rest.starts_with('/'))
                }
            })
            .collect())
    }

    pub fn hrm(&self, path: &str) -> Result<()> {
        let key = Self::hidden_key(path)?;
        let deleted = self.store.write(|gw| gw.delete_hidden_file(&key))?;
        if !deleted {
            return Err(KernelError::not_found(EntityKind::HiddenFile, key));
        }
        info!(path = %key, "arquivo oculto removido");
        Ok(())
    }

    // ===== NAMESPACE REGULAR =====

    /// Resolve um caminho relativo à raiz regular, rejeitando fugas com `..`.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let mut segments: Vec<&str> = Vec::new();
        for segment in path.split(|c: char| c == '/' || c == '\\') {
            match segment {
                "" | "." => {}
                ".." => {
                    if segments.pop().is_none() {
                        return Err(KernelError::InvalidPath {
                            path: PathBuf::from(path),
                            reason: "sai da raiz do filesystem".to_string(),
                        });
                    }
                }
                other => segments.push(other),
            }
        }

        let mut resolved = self.root.clone();
        resolved.extend(segments);
        Ok(resolved)
    }

    /// Grava um arquivo regular, criando os diretórios pais.
    pub fn fwrite(&self, path: &str, content: &[u8]) -> Result<PathBuf> {
        let target = self.resolve(path)?;
        if target == self.root {
            return Err(KernelError::InvalidPath {
                path: PathBuf::from(path),
                reason: "caminho vazio".to_string(),
            });
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, content)?;

        info!(path = %target.display(), size = content.len(), "arquivo gravado");
        Ok(target)
    }

    pub fn cat(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        if !target.exists() {
            return Err(KernelError::not_found(EntityKind::File, path));
        }
        if target.is_dir() {
            return Err(KernelError::InvalidPath {
                path: PathBuf::from(path),
                reason: "é um diretório".to_string(),
            });
        }
        Ok(fs::read(&target)?)
    }

    /// Lista um diretório regular: diretórios primeiro, depois arquivos.
    pub fn fls(&self, path: Option<&str>) -> Result<Vec<FsEntry>> {
        let dir = self.resolve(path.unwrap_or("/"))?;
        if !dir.is_dir() {
            return Err(KernelError::not_found(EntityKind::File, path.unwrap_or("/")));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(FsEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
            });
        }
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));

        debug!(dir = %dir.display(), count = entries.len(), "fls");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tempfile::tempdir;

    fn facade(dir: &Path) -> FilesystemFacade<MemoryStore> {
        FilesystemFacade::new(Arc::new(MemoryStore::new()), dir.join("root")).unwrap()
    }

    #[test]
    fn test_normalize_hidden_path() {
        assert_eq!(normalize_hidden_path("secret.txt"), "/secret.txt");
        assert_eq!(normalize_hidden_path("//a/./b//c/"), "/a/b/c");
        assert_eq!(normalize_hidden_path("/a/b/../c"), "/a/c");
        assert_eq!(normalize_hidden_path("/../../etc"), "/etc");
        assert_eq!(normalize_hidden_path(""), "/");
    }

    #[test]
    fn test_hidden_round_trip_and_overwrite() {
        let dir = tempdir().unwrap();
        let fs = facade(dir.path());
        let data = vec![0u8, 159, 146, 150, 255];

        fs.hwrite("keys/id_rsa", &data).unwrap();
        assert_eq!(fs.hread("/keys/id_rsa").unwrap(), data);
        assert_eq!(fs.hread("/keys/./x/../id_rsa").unwrap(), data);

        let entry = fs.hwrite("/keys/id_rsa", b"novo").unwrap();
        assert_eq!(entry.size, 4);
        assert_eq!(fs.hread("/keys/id_rsa").unwrap(), b"novo");
        assert_eq!(fs.hls(None).unwrap().len(), 1);

        fs.hrm("/keys/id_rsa").unwrap();
        assert!(matches!(
            fs.hread("/keys/id_rsa"),
            Err(KernelError::NotFound { kind: EntityKind::HiddenFile, .. })
        ));
        assert!(fs.hrm("/keys/id_rsa").is_err());
        assert!(fs.hwrite("/", b"x").is_err());
    }

    #[test]
    fn test_hls_prefix() {
        let dir = tempdir().unwrap();
        let fs = facade(dir.path());
        fs.hwrite("/etc/passwd", b"root").unwrap();
        fs.hwrite("/etc/shadow", b"x").unwrap();
        fs.hwrite("/etcetera", b"y").unwrap();

        let paths: Vec<String> = fs
            .hls(Some("etc"))
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        assert_eq!(paths, vec!["/etc/passwd".to_string(), "/etc/shadow".to_string()]);
        assert_eq!(fs.hls(Some("/")).unwrap().len(), 3);
    }

    #[test]
    fn test_namespaces_are_disjoint() {
        let dir = tempdir().unwrap();
        let fs = facade(dir.path());

        fs.hwrite("/secret.txt", b"oculto").unwrap();
        fs.fwrite("notes.txt", b"visivel").unwrap();

        let regular: Vec<String> = fs.fls(None).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(regular, vec!["notes.txt".to_string()]);

        let hidden: Vec<String> = fs.hls(None).unwrap().into_iter().map(|e| e.path).collect();
        assert_eq!(hidden, vec!["/secret.txt".to_string()]);

        assert!(matches!(
            fs.cat("secret.txt"),
            Err(KernelError::NotFound { kind: EntityKind::File, .. })
        ));
        assert!(fs.hread("/notes.txt").is_err());
    }

    #[test]
    fn test_regular_files() {
        let dir = tempdir().unwrap();
        let fs = facade(dir.path());

        let written = fs.fwrite("/home/user/todo.md", b"- comprar pao").unwrap();
        assert!(written.starts_with(fs.root()));
        assert_eq!(fs.cat("home/user/todo.md").unwrap(), b"- comprar pao");

        fs.fwrite("home/readme", b"abc").unwrap();
        let listing = fs.fls(Some("home")).unwrap();
        assert_eq!(
            listing,
            vec![
                FsEntry {
                    name: "user".to_string(),
                    is_dir: true,
                    size: 0
                },
                FsEntry {
                    name: "readme".to_string(),
                    is_dir: false,
                    size: 3
                },
            ]
        );

        assert!(matches!(fs.cat("home"), Err(KernelError::InvalidPath { .. })));
        assert!(matches!(
            fs.fwrite("../escape.txt", b"x"),
            Err(KernelError::InvalidPath { .. })
        ));
        assert!(matches!(
            fs.fls(Some("nowhere")),
            Err(KernelError::NotFound { .. })
        ));
        // `..` dentro da raiz é permitido
        assert_eq!(fs.cat("home/user/../readme").unwrap(), b"abc");
    }
}
