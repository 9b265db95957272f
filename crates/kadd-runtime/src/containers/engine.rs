//! Motor de contêineres: imagens, ciclo de vida, IPs e volumes.

use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::inspect::{ContainerInspection, NetworkInspection, NetworkLease};
use super::network::BridgeNetwork;
use super::state::{transition, ContainerEvent, Transition};
use crate::error::{EntityKind, KernelError, Result};
use crate::store::model::{
    unix_timestamp, ContainerRecord, ContainerState, ExecRecord, ImageRecord, VolumeRecord,
};
use crate::store::{Gateway, Store};

pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_COMMAND: &str = "/bin/sh";

const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LEN: usize = 12;
const IMAGE_LAYERS: [&str; 3] = ["layer_base", "layer_app", "layer_config"];
const IMAGE_SIZE: u64 = 100_000_000;
const VOLUME_ROOT: &str = "/var/lib/add/volumes";

/// Opções de `ccreate` / `crun`.
#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    /// Comando principal (padrão `/bin/sh`)
    pub command: Option<String>,
    pub env: BTreeMap<String, String>,
    /// Mapeamentos `host:container`
    pub ports: Vec<String>,
    /// Nomes de volumes (criados se não existirem)
    pub volumes: Vec<String>,
}

/// Saída simulada de `cexec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub container: String,
    pub command: String,
    pub output: String,
}

/// Quantos registros `cclean` apagou.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub containers: usize,
    pub images: usize,
    pub volumes: usize,
}

/// Gerenciador de contêineres sobre um store compartilhado.
pub struct ContainerEngine<S: Store> {
    store: Arc<S>,
    network: BridgeNetwork,
}

fn generate_id(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_LEN)
        .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
        .collect();
    format!("{prefix}{suffix}")
}

fn simulated_pid() -> u32 {
    rand::thread_rng().gen_range(1000..=9999)
}

fn validate_name(kind: &str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(KernelError::InvalidArgument(format!(
            "nome de {kind} inválido: '{name}'"
        )))
    }
}

/// Separa `nome[:tag]`.
fn split_reference(reference: &str) -> (&str, &str) {
    match reference.rsplit_once(':') {
        Some((name, tag)) if !name.is_empty() && !tag.is_empty() => (name, tag),
        _ => (reference, DEFAULT_TAG),
    }
}

/// Aplica um evento ao registro, atualizando pid e timestamps.
///
/// Retorna `true` se o estado mudou.
fn apply(record: &mut ContainerRecord, event: ContainerEvent) -> Result<bool> {
    let next = match transition(&record.name, record.state, event)? {
        Transition::Unchanged => return Ok(false),
        Transition::Changed(next) => next,
    };

    let now = unix_timestamp();
    match next {
        ContainerState::Running => {
            record.pid = Some(simulated_pid());
            record.started_at = Some(now);
        }
        ContainerState::Stopped | ContainerState::Removed => record.pid = None,
        ContainerState::Created => {}
    }
    debug!(container = %record.name, from = %record.state, to = %next, "transição");
    record.state = next;
    record.state_changed_at = now;
    Ok(true)
}

fn lookup(gw: &dyn Gateway, name_or_id: &str) -> Result<ContainerRecord> {
    gw.get_container(name_or_id)?
        .ok_or_else(|| KernelError::not_found(EntityKind::Container, name_or_id))
}

impl<S: Store> ContainerEngine<S> {
    pub fn new(store: Arc<S>, network: BridgeNetwork) -> Self {
        Self { store, network }
    }

    pub fn network(&self) -> &BridgeNetwork {
        &self.network
    }

    // ===== IMAGENS =====

    /// Cria a imagem `name:tag`; se já existir, devolve a existente.
    pub fn create_image(
        &self,
        name: &str,
        tag: Option<&str>,
        base_image: Option<&str>,
    ) -> Result<ImageRecord> {
        let tag = tag.unwrap_or(DEFAULT_TAG);
        validate_name("imagem", name)?;
        validate_name("tag", tag)?;

        let (image, created) = self.store.write(|gw| {
            if let Some(existing) = gw.get_image(name, tag)? {
                return Ok((existing, false));
            }

            let mut id = generate_id("img_");
            while gw.get_image_by_id(&id)?.is_some() {
                id = generate_id("img_");
            }

            let image = ImageRecord {
                id,
                name: name.to_string(),
                tag: tag.to_string(),
                base_image: base_image.map(str::to_string),
                layers: IMAGE_LAYERS.iter().map(|l| l.to_string()).collect(),
                size: IMAGE_SIZE,
                created_at: unix_timestamp(),
            };
            gw.put_image(&image)?;
            Ok((image, true))
        })?;

        if created {
            info!(image = %image.reference(), id = %image.id, "imagem criada");
        } else {
            debug!(image = %image.reference(), "imagem já existia");
        }
        Ok(image)
    }

    pub fn list_images(&self) -> Result<Vec<ImageRecord>> {
        self.store.read(|gw| gw.list_images())
    }

    /// Resolve `nome[:tag]` ou id de imagem.
    fn find_image(gw: &dyn Gateway, reference: &str) -> Result<ImageRecord> {
        if let Some(image) = gw.get_image_by_id(reference)? {
            return Ok(image);
        }
        let (name, tag) = split_reference(reference);
        gw.get_image(name, tag)?
            .ok_or_else(|| KernelError::not_found(EntityKind::Image, reference))
    }

    // ===== CONTÊINERES =====

    fn create_in(
        &self,
        gw: &mut dyn Gateway,
        name: &str,
        image: &str,
        options: &CreateOptions,
    ) -> Result<ContainerRecord> {
        let image = Self::find_image(&*gw, image)?;

        // Também conflita com o id de outro contêiner: a busca prioriza nomes
        if gw.get_container(name)?.is_some() {
            return Err(KernelError::duplicate(EntityKind::Container, name));
        }

        let ip = self.network.allocate(&gw.allocated_ips()?)?;

        let mut id = generate_id("ctr_");
        while gw.get_container(&id)?.is_some() {
            id = generate_id("ctr_");
        }

        let now = unix_timestamp();
        for volume in &options.volumes {
            let record = match gw.get_volume(volume)? {
                Some(existing) => {
                    if let Some(owner) = existing.container.as_deref().filter(|o| *o != id) {
                        let owner = gw
                            .get_container(owner)?
                            .map(|c| c.name)
                            .unwrap_or_else(|| owner.to_string());
                        return Err(KernelError::InvalidArgument(format!(
                            "volume '{volume}' já está em uso pelo contêiner '{owner}'"
                        )));
                    }
                    VolumeRecord {
                        container: Some(id.clone()),
                        ..existing
                    }
                }
                None => VolumeRecord {
                    name: volume.clone(),
                    mount_path: format!("{VOLUME_ROOT}/{volume}"),
                    container: Some(id.clone()),
                    created_at: now,
                },
            };
            gw.put_volume(&record)?;
        }

        let record = ContainerRecord {
            id,
            name: name.to_string(),
            image_id: image.id.clone(),
            image: image.reference(),
            state: ContainerState::Created,
            ip,
            pid: None,
            command: options
                .command
                .clone()
                .unwrap_or_else(|| DEFAULT_COMMAND.to_string()),
            command_log: Vec::new(),
            env: options.env.clone(),
            ports: options.ports.clone(),
            volumes: options.volumes.clone(),
            created_at: now,
            state_changed_at: now,
            started_at: None,
        };
        gw.put_container(&record)?;
        Ok(record)
    }

    fn validate_options(name: &str, options: &CreateOptions) -> Result<()> {
        validate_name("contêiner", name)?;
        for volume in &options.volumes {
            validate_name("volume", volume)?;
        }
        for port in &options.ports {
            let valid = port
                .split_once(':')
                .map(|(host, guest)| host.parse::<u16>().is_ok() && guest.parse::<u16>().is_ok())
                .unwrap_or(false);
            if !valid {
                return Err(KernelError::InvalidArgument(format!(
                    "mapeamento de porta inválido: '{port}' (use host:contêiner)"
                )));
            }
        }
        Ok(())
    }

    /// Cria um contêiner no estado `created`.
    pub fn create(&self, name: &str, image: &str, options: &CreateOptions) -> Result<ContainerRecord> {
        Self::validate_options(name, options)?;
        let record = self
            .store
            .write(|gw| self.create_in(gw, name, image, options))?;

        info!(container = %record.name, id = %record.id, ip = %record.ip, "contêiner criado");
        Ok(record)
    }

    /// Cria e inicia, numa única transação.
    pub fn run(&self, name: &str, image: &str, options: &CreateOptions) -> Result<ContainerRecord> {
        Self::validate_options(name, options)?;
        let record = self.store.write(|gw| {
            let mut record = self.create_in(gw, name, image, options)?;
            apply(&mut record, ContainerEvent::Start)?;
            gw.put_container(&record)?;
            Ok(record)
        })?;

        info!(container = %record.name, id = %record.id, ip = %record.ip, "contêiner rodando");
        Ok(record)
    }

    fn change_state(&self, name_or_id: &str, event: ContainerEvent) -> Result<ContainerRecord> {
        let (record, changed) = self.store.write(|gw| {
            let mut record = lookup(&*gw, name_or_id)?;
            let changed = apply(&mut record, event)?;
            if changed {
                gw.put_container(&record)?;
            }
            Ok((record, changed))
        })?;

        if changed {
            info!(container = %record.name, state = %record.state, "estado alterado");
        }
        Ok(record)
    }

    pub fn start(&self, name_or_id: &str) -> Result<ContainerRecord> {
        self.change_state(name_or_id, ContainerEvent::Start)
    }

    pub fn stop(&self, name_or_id: &str) -> Result<ContainerRecord> {
        self.change_state(name_or_id, ContainerEvent::Stop)
    }

    /// Executa (de forma simulada) um comando num contêiner rodando.
    pub fn exec(&self, name_or_id: &str, command: &str) -> Result<ExecOutput> {
        let command = command.trim();
        if command.is_empty() {
            return Err(KernelError::InvalidArgument("comando vazio".to_string()));
        }

        let name = self.store.write(|gw| {
            let mut record = lookup(&*gw, name_or_id)?;
            apply(&mut record, ContainerEvent::Exec)?;
            record.command_log.push(ExecRecord {
                timestamp: unix_timestamp(),
                command: command.to_string(),
            });
            gw.put_container(&record)?;
            Ok(record.name)
        })?;

        debug!(container = %name, command, "exec");
        Ok(ExecOutput {
            output: format!(
                "[{name}]$ {command}\nComando executado no contêiner {name}\n(saída simulada)"
            ),
            container: name,
            command: command.to_string(),
        })
    }

    /// Remove um contêiner; com `force`, para antes se estiver rodando.
    ///
    /// O IP volta para a bridge e os volumes ficam sem dono (não são apagados).
    pub fn remove(&self, name_or_id: &str, force: bool) -> Result<ContainerRecord> {
        let removed = self.store.write(|gw| {
            let mut record = lookup(&*gw, name_or_id)?;
            if force {
                apply(&mut record, ContainerEvent::Stop)?;
            }
            apply(&mut record, ContainerEvent::Remove { force })?;

            for volume in gw.list_volumes()? {
                if volume.container.as_deref() == Some(record.id.as_str()) {
                    gw.put_volume(&VolumeRecord {
                        container: None,
                        ..volume
                    })?;
                }
            }
            gw.delete_container(&record.id)?;
            Ok(record)
        })?;

        info!(container = %removed.name, ip = %removed.ip, "contêiner removido");
        Ok(removed)
    }

    pub fn inspect(&self, name_or_id: &str) -> Result<ContainerInspection> {
        let record = self.store.read(|gw| lookup(gw, name_or_id))?;
        Ok(ContainerInspection::from(&record))
    }

    /// `all = false`: só os rodando.
    pub fn list_containers(&self, all: bool) -> Result<Vec<ContainerRecord>> {
        let containers = self.store.read(|gw| gw.list_containers())?;
        Ok(containers
            .into_iter()
            .filter(|c| all || c.is_running())
            .collect())
    }

    pub fn list_volumes(&self) -> Result<Vec<VolumeRecord>> {
        self.store.read(|gw| gw.list_volumes())
    }

    /// Apaga todos os contêineres, imagens e volumes numa única transação.
    ///
    /// Os IPs voltam todos para a bridge. Pacotes e arquivos ocultos ficam.
    pub fn clean(&self) -> Result<CleanReport> {
        let report = self.store.write(|gw| {
            let mut report = CleanReport::default();
            for container in gw.list_containers()? {
                if gw.delete_container(&container.id)? {
                    report.containers += 1;
                }
            }
            for image in gw.list_images()? {
                if gw.delete_image(&image.id)? {
                    report.images += 1;
                }
            }
            for volume in gw.list_volumes()? {
                if gw.delete_volume(&volume.name)? {
                    report.volumes += 1;
                }
            }
            Ok(report)
        })?;

        info!(
            containers = report.containers,
            images = report.images,
            volumes = report.volumes,
            "dados de contêineres apagados"
        );
        Ok(report)
    }

    /// Estado da bridge; `None` usa a bridge configurada.
    pub fn network_inspect(&self, bridge: Option<&str>) -> Result<NetworkInspection> {
        let name = bridge.unwrap_or(self.network.name());
        if name != self.network.name() {
            return Err(KernelError::not_found(EntityKind::Network, name));
        }

        let mut leases: Vec<NetworkLease> = self
            .store
            .read(|gw| gw.list_containers())?
            .into_iter()
            .map(|c| NetworkLease {
                ip_address: c.ip,
                container_id: c.id,
                container_name: c.name,
                state: c.state,
            })
            .collect();
        leases.sort_by_key(|lease| lease.ip_address);

        Ok(NetworkInspection {
            name: self.network.name().to_string(),
            subnet: self.network.subnet().to_string(),
            gateway: self.network.gateway(),
            capacity: self.network.capacity(),
            leases,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, SqliteStore};
    use std::collections::BTreeSet;
    use std::net::Ipv4Addr;
    use tempfile::tempdir;

    fn engine() -> ContainerEngine<MemoryStore> {
        let network = BridgeNetwork::parse("bridge0", "172.17.0.0/16", "172.17.0.1").unwrap();
        ContainerEngine::new(Arc::new(MemoryStore::new()), network)
    }

    fn with_image(engine: &ContainerEngine<MemoryStore>) {
        engine.create_image("alpine", None, None).unwrap();
    }

    #[test]
    fn test_image_create_is_idempotent() {
        let engine = engine();
        let first = engine.create_image("alpine", Some("3.19"), Some("scratch")).unwrap();
        let second = engine.create_image("alpine", Some("3.19"), None).unwrap();

        assert_eq!(first.id, second.id);
        assert!(first.id.starts_with("img_"));
        assert_eq!(first.id.len(), 4 + ID_LEN);
        assert_eq!(first.layers.len(), 3);
        assert_eq!(engine.list_images().unwrap().len(), 1);
    }

    #[test]
    fn test_run_allocates_and_starts() {
        let engine = engine();
        with_image(&engine);

        let web = engine.run("web", "alpine", &CreateOptions::default()).unwrap();
        assert_eq!(web.state, ContainerState::Running);
        assert_eq!(web.ip, Ipv4Addr::new(172, 17, 0, 2));
        assert!(matches!(web.pid, Some(pid) if (1000..=9999).contains(&pid)));
        assert!(web.id.starts_with("ctr_"));
        assert_eq!(web.image, "alpine:latest");

        let db = engine.create("db", "alpine:latest", &CreateOptions::default()).unwrap();
        assert_eq!(db.state, ContainerState::Created);
        assert_eq!(db.ip, Ipv4Addr::new(172, 17, 0, 3));

        // Imagem também pode ser referenciada pelo id
        let image_id = engine.list_images().unwrap()[0].id.clone();
        engine.create("cache", &image_id, &CreateOptions::default()).unwrap();
    }

    #[test]
    fn test_create_errors() {
        let engine = engine();
        assert!(matches!(
            engine.run("web", "nginx", &CreateOptions::default()),
            Err(KernelError::NotFound { kind: EntityKind::Image, .. })
        ));

        with_image(&engine);
        engine.run("web", "alpine", &CreateOptions::default()).unwrap();
        assert!(matches!(
            engine.run("web", "alpine", &CreateOptions::default()),
            Err(KernelError::DuplicateName { .. })
        ));
        assert!(matches!(
            engine.create("bad name", "alpine", &CreateOptions::default()),
            Err(KernelError::InvalidArgument(_))
        ));

        let options = CreateOptions {
            ports: vec!["80".to_string()],
            ..CreateOptions::default()
        };
        assert!(engine.create("ports", "alpine", &options).is_err());
        assert_eq!(engine.list_containers(true).unwrap().len(), 1);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let engine = engine();
        with_image(&engine);
        engine.create("web", "alpine", &CreateOptions::default()).unwrap();

        assert!(matches!(
            engine.exec("web", "ls"),
            Err(KernelError::ContainerNotRunning(_))
        ));

        let started = engine.start("web").unwrap();
        assert_eq!(started.state, ContainerState::Running);
        let again = engine.start("web").unwrap();
        assert_eq!(again.pid, started.pid);

        let out = engine.exec("web", "echo oi").unwrap();
        assert!(out.output.contains("[web]$ echo oi"));

        let err = engine.remove("web", false).unwrap_err();
        assert_eq!(err.kind(), "ContainerRunning");
        let unchanged = engine.inspect("web").unwrap();
        assert_eq!(unchanged.state, ContainerState::Running);
        assert_eq!(unchanged.command_log.len(), 1);

        let stopped = engine.stop("web").unwrap();
        assert_eq!(stopped.state, ContainerState::Stopped);
        assert_eq!(stopped.pid, None);
        engine.stop("web").unwrap();

        engine.remove("web", false).unwrap();
        assert!(matches!(
            engine.start("web"),
            Err(KernelError::NotFound { .. })
        ));
    }

    #[test]
    fn test_force_remove_releases_ip() {
        let engine = engine();
        with_image(&engine);
        let first = engine.run("a", "alpine", &CreateOptions::default()).unwrap();
        engine.run("b", "alpine", &CreateOptions::default()).unwrap();

        let removed = engine.remove(&first.id, true).unwrap();
        assert_eq!(removed.state, ContainerState::Removed);

        let reused = engine.run("c", "alpine", &CreateOptions::default()).unwrap();
        assert_eq!(reused.ip, first.ip);
    }

    #[test]
    fn test_list_filters_running() {
        let engine = engine();
        with_image(&engine);
        engine.run("up", "alpine", &CreateOptions::default()).unwrap();
        engine.create("idle", "alpine", &CreateOptions::default()).unwrap();

        let running: Vec<String> = engine
            .list_containers(false)
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(running, vec!["up".to_string()]);
        assert_eq!(engine.list_containers(true).unwrap().len(), 2);
    }

    #[test]
    fn test_volumes_are_detached_not_deleted() {
        let engine = engine();
        with_image(&engine);
        let mut env = BTreeMap::new();
        env.insert("PGDATA".to_string(), "/data".to_string());
        let options = CreateOptions {
            command: Some("postgres".to_string()),
            env,
            ports: vec!["5432:5432".to_string()],
            volumes: vec!["pgdata".to_string()],
        };

        let db = engine.run("db", "alpine", &options).unwrap();
        let volumes = engine.list_volumes().unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].container.as_deref(), Some(db.id.as_str()));
        assert_eq!(volumes[0].mount_path, "/var/lib/add/volumes/pgdata");

        let inspection = engine.inspect("db").unwrap();
        assert_eq!(inspection.env.get("PGDATA").map(String::as_str), Some("/data"));
        assert_eq!(inspection.command, "postgres");

        engine.remove("db", true).unwrap();
        let volumes = engine.list_volumes().unwrap();
        assert_eq!(volumes.len(), 1);
        assert!(volumes[0].container.is_none());
    }

    #[test]
    fn test_owned_volume_cannot_be_shared() {
        let engine = engine();
        with_image(&engine);
        let options = CreateOptions {
            volumes: vec!["data".to_string()],
            ..CreateOptions::default()
        };

        let a = engine.create("a", "alpine", &options).unwrap();
        assert!(matches!(
            engine.create("b", "alpine", &options),
            Err(KernelError::InvalidArgument(msg)) if msg.contains("'a'")
        ));
        assert_eq!(engine.list_containers(true).unwrap().len(), 1);
        let volumes = engine.list_volumes().unwrap();
        assert_eq!(volumes[0].container.as_deref(), Some(a.id.as_str()));

        // Depois que o dono sai, o volume pode ser reaproveitado
        engine.remove("a", false).unwrap();
        let b = engine.create("b", "alpine", &options).unwrap();
        let volumes = engine.list_volumes().unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].container.as_deref(), Some(b.id.as_str()));
    }

    #[test]
    fn test_name_cannot_shadow_another_id() {
        let engine = engine();
        with_image(&engine);
        let a = engine.create("a", "alpine", &CreateOptions::default()).unwrap();

        assert!(matches!(
            engine.create(&a.id, "alpine", &CreateOptions::default()),
            Err(KernelError::DuplicateName { kind: EntityKind::Container, .. })
        ));
        assert_eq!(engine.inspect(&a.id).unwrap().name, "a");
        assert_eq!(engine.list_containers(true).unwrap().len(), 1);
    }

    #[test]
    fn test_clean_wipes_containers_images_and_volumes() {
        let engine = engine();
        with_image(&engine);
        engine.create_image("nginx", Some("1.24"), None).unwrap();
        let options = CreateOptions {
            volumes: vec!["logs".to_string()],
            ..CreateOptions::default()
        };
        let first = engine.run("web", "nginx:1.24", &options).unwrap();
        engine.create("idle", "alpine", &CreateOptions::default()).unwrap();

        let report = engine.clean().unwrap();
        assert_eq!(
            report,
            CleanReport {
                containers: 2,
                images: 2,
                volumes: 1
            }
        );
        assert!(engine.list_containers(true).unwrap().is_empty());
        assert!(engine.list_images().unwrap().is_empty());
        assert!(engine.list_volumes().unwrap().is_empty());
        assert!(engine.network_inspect(None).unwrap().leases.is_empty());

        assert_eq!(engine.clean().unwrap(), CleanReport::default());
        with_image(&engine);
        let fresh = engine.run("web", "alpine", &CreateOptions::default()).unwrap();
        assert_eq!(fresh.ip, first.ip);
    }

    #[test]
    fn test_exhausted_subnet_creates_nothing() {
        let network = BridgeNetwork::parse("tiny", "10.9.0.0/30", "10.9.0.1").unwrap();
        let engine = ContainerEngine::new(Arc::new(MemoryStore::new()), network);
        engine.create_image("alpine", None, None).unwrap();

        let only = engine.run("one", "alpine", &CreateOptions::default()).unwrap();
        assert_eq!(only.ip, Ipv4Addr::new(10, 9, 0, 2));

        let options = CreateOptions {
            volumes: vec!["orphan".to_string()],
            ..CreateOptions::default()
        };
        let err = engine.run("two", "alpine", &options).unwrap_err();
        assert_eq!(err.kind(), "NetworkExhausted");
        assert_eq!(engine.list_containers(true).unwrap().len(), 1);
        assert!(engine.list_volumes().unwrap().is_empty());
    }

    #[test]
    fn test_network_inspect() {
        let engine = engine();
        with_image(&engine);
        engine.run("b", "alpine", &CreateOptions::default()).unwrap();
        engine.create("a", "alpine", &CreateOptions::default()).unwrap();

        let net = engine.network_inspect(None).unwrap();
        assert_eq!(net.subnet, "172.17.0.0/16");
        assert_eq!(net.gateway, Ipv4Addr::new(172, 17, 0, 1));
        let names: Vec<&str> = net.leases.iter().map(|l| l.container_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);

        assert!(matches!(
            engine.network_inspect(Some("bridge9")),
            Err(KernelError::NotFound { kind: EntityKind::Network, .. })
        ));
    }

    #[test]
    fn test_concurrent_runs_get_distinct_ips() {
        let dir = tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("kernel.db")).unwrap());
        let network = BridgeNetwork::parse("bridge0", "172.17.0.0/16", "172.17.0.1").unwrap();
        let engine = ContainerEngine::new(store, network);
        engine.create_image("alpine", None, None).unwrap();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let engine = &engine;
                scope.spawn(move || {
                    for i in 0..5 {
                        let name = format!("w{worker}-{i}");
                        engine
                            .run(&name, "alpine", &CreateOptions::default())
                            .unwrap();
                    }
                });
            }
        });

        let containers = engine.list_containers(true).unwrap();
        assert_eq!(containers.len(), 20);
        let ips: BTreeSet<Ipv4Addr> = containers.iter().map(|c| c.ip).collect();
        assert_eq!(ips.len(), 20);
        assert_eq!(ips.iter().next(), Some(&Ipv4Addr::new(172, 17, 0, 2)));
        assert_eq!(ips.iter().last(), Some(&Ipv4Addr::new(172, 17, 0, 21)));
    }
}
