//! Store persistente em SQLite (um arquivo com as sete tabelas).

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::model::{
    unix_timestamp, ContainerRecord, DependencyEdge, HiddenFileEntry, HiddenFileRecord,
    ImageRecord, PackageRecord, VolumeRecord,
};
use super::{Gateway, Store, TABLES};
use crate::error::{KernelError, Result};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS packages (
    name TEXT PRIMARY KEY,
    version TEXT NOT NULL,
    size INTEGER NOT NULL DEFAULT 0,
    reason TEXT NOT NULL,
    mirror TEXT NOT NULL DEFAULT '',
    installed_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS dependencies (
    package TEXT NOT NULL,
    depends_on TEXT NOT NULL,
    PRIMARY KEY (package, depends_on)
);
CREATE INDEX IF NOT EXISTS dependencies_by_target ON dependencies(depends_on);
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS hidden_files (
    path TEXT PRIMARY KEY,
    content BLOB NOT NULL,
    size INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    tag TEXT NOT NULL,
    base_image TEXT,
    layers TEXT NOT NULL,
    size INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (name, tag)
);
CREATE TABLE IF NOT EXISTS containers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    image_id TEXT NOT NULL,
    image TEXT NOT NULL,
    state TEXT NOT NULL,
    ip_address TEXT NOT NULL UNIQUE,
    pid INTEGER,
    command TEXT NOT NULL,
    command_log TEXT NOT NULL,
    env_vars TEXT NOT NULL,
    ports TEXT NOT NULL,
    volumes TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    state_changed_at INTEGER NOT NULL,
    started_at INTEGER
);
CREATE TABLE IF NOT EXISTS volumes (
    name TEXT PRIMARY KEY,
    mount_path TEXT NOT NULL,
    container TEXT,
    created_at INTEGER NOT NULL
);
"#;

const PACKAGE_COLUMNS: &str = "name, version, size, reason, mirror, installed_at";
const IMAGE_COLUMNS: &str = "id, name, tag, base_image, layers, size, created_at";
const CONTAINER_COLUMNS: &str = "id, name, image_id, image, state, ip_address, pid, command, \
     command_log, env_vars, ports, volumes, created_at, state_changed_at, started_at";

/// Resultado de um `repair`.
#[derive(Debug, Clone)]
pub struct RepairReport {
    /// Cópia do arquivo original, se existia
    pub backup: Option<PathBuf>,
    /// Linhas recuperadas por tabela
    pub recovered: Vec<(String, usize)>,
    /// Banco recriado do zero (nada legível no original)
    pub fresh: bool,
}

/// Resultado do diagnóstico (`dbfix`).
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    pub integrity: String,
    pub row_counts: Vec<(String, i64)>,
    /// Arestas de dependência apontando para pacotes inexistentes, removidas
    pub pruned_edges: usize,
}

impl DiagnosticReport {
    pub fn is_healthy(&self) -> bool {
        self.integrity == "ok"
    }
}

/// Store SQLite com um único escritor (conexão protegida por mutex).
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Abre (ou cria) o banco em `path`, garantindo o schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = open_connection(&path)?;
        info!(path = %path.display(), "banco do kernel aberto");

        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tenta recuperar um banco corrompido em `path`.
    ///
    /// Faz backup do arquivo, copia todas as linhas legíveis para um banco novo
    /// e o coloca no lugar do original. Pode ser executado várias vezes.
    pub fn repair_at(path: &Path) -> Result<RepairReport> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let backup = if path.exists() {
            let mut name = path.as_os_str().to_owned();
            name.push(format!(".backup.{}", unix_timestamp()));
            let backup = PathBuf::from(name);
            fs::copy(path, &backup)?;
            info!(backup = %backup.display(), "backup do banco criado");
            Some(backup)
        } else {
            None
        };

        let temp = path.with_extension("repair");
        if temp.exists() {
            fs::remove_file(&temp)?;
        }

        let mut recovered = Vec::new();
        let mut fresh = backup.is_none();
        {
            let conn = open_connection(&temp)?;
            if backup.is_some() {
                let source = path.to_string_lossy().into_owned();
                match conn.execute("ATTACH DATABASE ?1 AS damaged", params![source]) {
                    Ok(_) => {
                        for table in TABLES {
                            let sql = format!(
                                "INSERT OR IGNORE INTO main.{table} SELECT * FROM damaged.{table}"
                            );
                            match conn.execute(&sql, []) {
                                Ok(rows) => recovered.push((table.to_string(), rows)),
                                Err(err) => {
                                    warn!(table, %err, "tabela não recuperada");
                                    recovered.push((table.to_string(), 0));
                                }
                            }
                        }
                        if let Err(err) = conn.execute("DETACH DATABASE damaged", []) {
                            debug!(%err, "falha ao desanexar banco danificado");
                        }
                    }
                    Err(err) => {
                        warn!(%err, "banco original ilegível, recriando do zero");
                        fresh = true;
                    }
                }
            }
            conn.close().map_err(|(_, err)| KernelError::from(err))?;
        }

        fs::rename(&temp, path)?;
        // Garante que o resultado abre com o schema atual.
        drop(open_connection(path)?);

        info!(path = %path.display(), fresh, "reparo do banco concluído");
        Ok(RepairReport {
            backup,
            recovered,
            fresh,
        })
    }

    /// `PRAGMA integrity_check`, contagem por tabela e limpeza de arestas órfãs.
    pub fn diagnose(&self) -> Result<DiagnosticReport> {
        let mut conn = self.conn.lock();

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            warn!(%integrity, "integrity_check reportou problemas");
        }

        let mut row_counts = Vec::with_capacity(TABLES.len());
        for table in TABLES {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            row_counts.push((table.to_string(), count));
        }

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let pruned_edges = tx.execute(
            "DELETE FROM dependencies \
             WHERE package NOT IN (SELECT name FROM packages) \
                OR depends_on NOT IN (SELECT name FROM packages)",
            [],
        )?;
        tx.commit()?;
        if pruned_edges > 0 {
            warn!(pruned_edges, "arestas de dependência órfãs removidas");
        }

        Ok(DiagnosticReport {
            integrity,
            row_counts,
            pruned_edges,
        })
    }

    /// Apaga todas as linhas de todas as tabelas.
    pub fn reset(&self) -> Result<Vec<(String, usize)>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut deleted = Vec::with_capacity(TABLES.len());
        for table in TABLES {
            let rows = tx.execute(&format!("DELETE FROM {table}"), [])?;
            deleted.push((table.to_string(), rows));
        }
        tx.commit()?;
        warn!("todas as tabelas do kernel foram esvaziadas");
        Ok(deleted)
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

impl Store for SqliteStore {
    fn read<R>(&self, f: impl FnOnce(&dyn Gateway) -> Result<R>) -> Result<R> {
        let conn = self.conn.lock();
        let gateway = SqliteGateway { conn: &*conn };
        f(&gateway)
    }

    fn write<R>(&self, f: impl FnOnce(&mut dyn Gateway) -> Result<R>) -> Result<R> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = {
            let mut gateway = SqliteGateway { conn: &*tx };
            f(&mut gateway)?
        };
        tx.commit()?;
        Ok(out)
    }
}

struct SqliteGateway<'c> {
    conn: &'c Connection,
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn package_from_row(row: &Row<'_>) -> Result<PackageRecord> {
    let reason: String = row.get(3)?;
    Ok(PackageRecord {
        name: row.get(0)?,
        version: row.get(1)?,
        size: from_sql_int(row.get(2)?),
        reason: reason.parse()?,
        mirror: row.get(4)?,
        installed_at: from_sql_int(row.get(5)?),
    })
}

fn image_from_row(row: &Row<'_>) -> Result<ImageRecord> {
    let layers: String = row.get(4)?;
    Ok(ImageRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        tag: row.get(2)?,
        base_image: row.get(3)?,
        layers: serde_json::from_str(&layers)?,
        size: from_sql_int(row.get(5)?),
        created_at: from_sql_int(row.get(6)?),
    })
}

fn parse_ip(raw: &str) -> Result<Ipv4Addr> {
    raw.parse()
        .map_err(|_| KernelError::Store(format!("endereço IP inválido no banco: {raw}")))
}

fn container_from_row(row: &Row<'_>) -> Result<ContainerRecord> {
    let state: String = row.get(4)?;
    let ip: String = row.get(5)?;
    let pid: Option<i64> = row.get(6)?;
    let command_log: String = row.get(8)?;
    let env: String = row.get(9)?;
    let ports: String = row.get(10)?;
    let volumes: String = row.get(11)?;
    let started_at: Option<i64> = row.get(14)?;

    Ok(ContainerRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        image_id: row.get(2)?,
        image: row.get(3)?,
        state: state.parse()?,
        ip: parse_ip(&ip)?,
        pid: pid.and_then(|p| u32::try_from(p).ok()),
        command: row.get(7)?,
        command_log: serde_json::from_str(&command_log)?,
        env: serde_json::from_str(&env)?,
        ports: serde_json::from_str(&ports)?,
        volumes: serde_json::from_str(&volumes)?,
        created_at: from_sql_int(row.get(12)?),
        state_changed_at: from_sql_int(row.get(13)?),
        started_at: started_at.map(from_sql_int),
    })
}

fn volume_from_row(row: &Row<'_>) -> Result<VolumeRecord> {
    Ok(VolumeRecord {
        name: row.get(0)?,
        mount_path: row.get(1)?,
        container: row.get(2)?,
        created_at: from_sql_int(row.get(3)?),
    })
}

impl SqliteGateway<'_> {
    fn collect<T>(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
        map: impl Fn(&Row<'_>) -> Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(map(row)?);
        }
        Ok(out)
    }

    fn first<T>(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
        map: impl Fn(&Row<'_>) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(args)?;
        match rows.next()? {
            Some(row) => Ok(Some(map(row)?)),
            None => Ok(None),
        }
    }

    fn strings(&self, sql: &str, arg: &str) -> Result<Vec<String>> {
        self.collect(sql, params![arg], |row| Ok(row.get(0)?))
    }
}

impl Gateway for SqliteGateway<'_> {
    fn get_package(&self, name: &str) -> Result<Option<PackageRecord>> {
        self.first(
            &format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE name = ?1"),
            params![name],
            package_from_row,
        )
    }

    fn put_package(&mut self, record: &PackageRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO packages (name, version, size, reason, mirror, installed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(name) DO UPDATE SET version = excluded.version, size = excluded.size, \
             reason = excluded.reason, mirror = excluded.mirror, installed_at = excluded.installed_at",
            params![
                record.name,
                record.version,
                to_sql_int(record.size),
                record.reason.as_str(),
                record.mirror,
                to_sql_int(record.installed_at),
            ],
        )?;
        Ok(())
    }

    fn delete_package(&mut self, name: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM packages WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    fn list_packages(&self) -> Result<Vec<PackageRecord>> {
        self.collect(
            &format!("SELECT {PACKAGE_COLUMNS} FROM packages ORDER BY name"),
            [],
            package_from_row,
        )
    }

    fn put_dependency_edge(&mut self, package: &str, depends_on: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO dependencies (package, depends_on) VALUES (?1, ?2)",
            params![package, depends_on],
        )?;
        Ok(())
    }

    fn delete_dependency_edges(&mut self, package: &str) -> Result<usize> {
        Ok(self
            .conn
            .execute("DELETE FROM dependencies WHERE package = ?1", params![package])?)
    }

    fn dependencies_of(&self, package: &str) -> Result<Vec<String>> {
        self.strings(
            "SELECT depends_on FROM dependencies WHERE package = ?1 ORDER BY depends_on",
            package,
        )
    }

    fn list_dependents(&self, package: &str) -> Result<Vec<String>> {
        self.strings(
            "SELECT package FROM dependencies WHERE depends_on = ?1 ORDER BY package",
            package,
        )
    }

    fn list_edges(&self) -> Result<Vec<DependencyEdge>> {
        self.collect(
            "SELECT package, depends_on FROM dependencies ORDER BY package, depends_on",
            [],
            |row| {
                Ok(DependencyEdge {
                    package: row.get(0)?,
                    depends_on: row.get(1)?,
                })
            },
        )
    }

    fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO metadata (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn get_image(&self, name: &str, tag: &str) -> Result<Option<ImageRecord>> {
        self.first(
            &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE name = ?1 AND tag = ?2"),
            params![name, tag],
            image_from_row,
        )
    }

    fn get_image_by_id(&self, id: &str) -> Result<Option<ImageRecord>> {
        self.first(
            &format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?1"),
            params![id],
            image_from_row,
        )
    }

    fn put_image(&mut self, record: &ImageRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO images (id, name, tag, base_image, layers, size, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, tag = excluded.tag, \
             base_image = excluded.base_image, layers = excluded.layers, size = excluded.size",
            params![
                record.id,
                record.name,
                record.tag,
                record.base_image,
                serde_json::to_string(&record.layers)?,
                to_sql_int(record.size),
                to_sql_int(record.created_at),
            ],
        )?;
        Ok(())
    }

    fn delete_image(&mut self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM images WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn list_images(&self) -> Result<Vec<ImageRecord>> {
        self.collect(
            &format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY created_at DESC, name, tag"),
            [],
            image_from_row,
        )
    }

    fn get_container(&self, name_or_id: &str) -> Result<Option<ContainerRecord>> {
        self.first(
            &format!(
                "SELECT {CONTAINER_COLUMNS} FROM containers WHERE name = ?1 OR id = ?1 \
                 ORDER BY (name = ?1) DESC LIMIT 1"
            ),
            params![name_or_id],
            container_from_row,
        )
    }

    fn put_container(&mut self, record: &ContainerRecord) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO containers ({CONTAINER_COLUMNS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, image_id = excluded.image_id, \
                 image = excluded.image, state = excluded.state, ip_address = excluded.ip_address, \
                 pid = excluded.pid, command = excluded.command, command_log = excluded.command_log, \
                 env_vars = excluded.env_vars, ports = excluded.ports, volumes = excluded.volumes, \
                 state_changed_at = excluded.state_changed_at, started_at = excluded.started_at"
            ),
            params![
                record.id,
                record.name,
                record.image_id,
                record.image,
                record.state.as_str(),
                record.ip.to_string(),
                record.pid.map(i64::from),
                record.command,
                serde_json::to_string(&record.command_log)?,
                serde_json::to_string(&record.env)?,
                serde_json::to_string(&record.ports)?,
                serde_json::to_string(&record.volumes)?,
                to_sql_int(record.created_at),
                to_sql_int(record.state_changed_at),
                record.started_at.map(to_sql_int),
            ],
        )?;
        Ok(())
    }

    fn delete_container(&mut self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM containers WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn list_containers(&self) -> Result<Vec<ContainerRecord>> {
        self.collect(
            &format!("SELECT {CONTAINER_COLUMNS} FROM containers ORDER BY created_at DESC, name"),
            [],
            container_from_row,
        )
    }

    fn allocated_ips(&self) -> Result<BTreeSet<Ipv4Addr>> {
        let raw = self.collect("SELECT ip_address FROM containers", [], |row| {
            Ok(row.get::<_, String>(0)?)
        })?;
        raw.iter().map(|ip| parse_ip(ip)).collect()
    }

    fn get_volume(&self, name: &str) -> Result<Option<VolumeRecord>> {
        self.first(
            "SELECT name, mount_path, container, created_at FROM volumes WHERE name = ?1",
            params![name],
            volume_from_row,
        )
    }

    fn put_volume(&mut self, record: &VolumeRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO volumes (name, mount_path, container, created_at) VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(name) DO UPDATE SET mount_path = excluded.mount_path, \
             container = excluded.container",
            params![
                record.name,
                record.mount_path,
                record.container,
                to_sql_int(record.created_at),
            ],
        )?;
        Ok(())
    }

    fn delete_volume(&mut self, name: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM volumes WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        self.collect(
            "SELECT name, mount_path, container, created_at FROM volumes ORDER BY name",
            [],
            volume_from_row,
        )
    }

    fn get_hidden_file(&self, path: &str) -> Result<Option<HiddenFileRecord>> {
        self.first(
            "SELECT path, content, size, created_at, modified_at FROM hidden_files WHERE path = ?1",
            params![path],
            |row| {
                Ok(HiddenFileRecord {
                    path: row.get(0)?,
                    content: row.get(1)?,
                    size: from_sql_int(row.get(2)?),
                    created_at: from_sql_int(row.get(3)?),
                    modified_at: from_sql_int(row.get(4)?),
                })
            },
        )
    }

    fn put_hidden_file(&mut self, record: &HiddenFileRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO hidden_files (path, content, size, created_at, modified_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(path) DO UPDATE SET content = excluded.content, size = excluded.size, \
             modified_at = excluded.modified_at",
            params![
                record.path,
                record.content,
                to_sql_int(record.size),
                to_sql_int(record.created_at),
                to_sql_int(record.modified_at),
            ],
        )?;
        Ok(())
    }

    fn delete_hidden_file(&mut self, path: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM hidden_files WHERE path = ?1", params![path])?;
        Ok(rows > 0)
    }

    fn list_hidden_files(&self) -> Result<Vec<HiddenFileEntry>> {
        self.collect(
            "SELECT path, size, modified_at FROM hidden_files ORDER BY path",
            [],
            |row| {
                Ok(HiddenFileEntry {
                    path: row.get(0)?,
                    size: from_sql_int(row.get(1)?),
                    modified_at: from_sql_int(row.get(2)?),
                })
            },
        )
    }
}
