use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use kadd_runtime::containers::{format_duration, format_timestamp, CreateOptions};
use kadd_runtime::{KernelConfig, KernelError, KernelState, SqliteStore};

#[derive(Debug, Parser)]
#[command(
    name = "kadd",
    version,
    about = "Kernel-Add: pacotes, contêineres e filesystem oculto simulados"
)]
struct Args {
    /// Diretório de dados (padrão: $KADD_DATA_DIR ou ~/.kernel-add)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Arquivo de configuração (padrão: <data_dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Logs de depuração no stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Instala um pacote e suas dependências
    Install {
        package: String,
        /// Só mostra o plano, sem gravar
        #[arg(long)]
        dry_run: bool,
        /// Marca o pacote como dependência automática
        #[arg(long)]
        auto: bool,
    },
    /// Remove um pacote sem dependentes
    Remove { package: String },
    /// Remove dependências automáticas órfãs
    Autoremove,
    /// Busca pacotes no catálogo
    Search { query: String },
    /// Lista pacotes instalados
    List,
    /// Detalhes de um pacote
    Info { package: String },
    /// Mirrors de pacotes
    Mirror {
        #[command(subcommand)]
        action: MirrorCommand,
    },

    /// Imagens de contêiner
    Cimage {
        #[command(subcommand)]
        action: ImageCommand,
    },
    /// Cria um contêiner (sem iniciar)
    Ccreate(CreateArgs),
    /// Cria e inicia um contêiner
    Crun(CreateArgs),
    Cstart { container: String },
    Cstop { container: String },
    /// Remove um contêiner
    Crm {
        container: String,
        /// Para o contêiner antes se estiver rodando
        #[arg(short, long)]
        force: bool,
    },
    /// Lista contêineres (só os rodando, sem -a)
    Cps {
        #[arg(short, long)]
        all: bool,
    },
    /// Executa um comando num contêiner rodando
    Cexec {
        container: String,
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    Cinspect {
        container: String,
        /// Saída em JSON
        #[arg(long)]
        json: bool,
    },
    /// Estado da bridge e IPs alugados
    Cnetwork { bridge: Option<String> },
    /// Lista volumes
    Cvolumes,
    /// Apaga todos os contêineres, imagens e volumes
    Cclean {
        /// Confirma a operação
        #[arg(long)]
        yes: bool,
    },

    /// Grava um arquivo oculto (conteúdo do argumento ou do stdin)
    Hwrite { path: String, content: Option<String> },
    Hread { path: String },
    Hls { prefix: Option<String> },
    Hrm { path: String },
    /// Grava um arquivo regular (conteúdo do argumento ou do stdin)
    Fwrite { path: String, content: Option<String> },
    Cat { path: String },
    Fls { path: Option<String> },

    /// Recupera um banco corrompido (faz backup antes)
    Repair,
    /// Diagnóstico do banco e limpeza de arestas órfãs
    Dbfix,
    /// Apaga todos os dados do kernel
    Dbclean {
        /// Confirma a operação
        #[arg(long)]
        yes: bool,
    },

    Lsmod,
    Modprobe { driver: String },
    Rmmod { driver: String },
    Lsdev,
    /// Detalhes de um driver carregado
    Drvinfo { driver: String },
}

#[derive(Debug, Subcommand)]
enum MirrorCommand {
    /// Lista mirrors (o ativo é marcado com *)
    List,
    /// Define o mirror preferido (nome ou índice)
    Set { mirror: String },
}

#[derive(Debug, Subcommand)]
enum ImageCommand {
    /// Cria uma imagem (idempotente)
    Create {
        name: String,
        tag: Option<String>,
        /// Imagem base
        #[arg(long)]
        base: Option<String>,
    },
    Ls,
}

#[derive(Debug, ClapArgs)]
struct CreateArgs {
    name: String,
    /// Imagem: nome[:tag] ou id
    image: String,
    /// Variável de ambiente CHAVE=VALOR
    #[arg(short, long = "env", value_name = "CHAVE=VALOR")]
    env: Vec<String>,
    /// Mapeamento de porta host:contêiner
    #[arg(short, long = "publish", value_name = "HOST:CTR")]
    publish: Vec<String>,
    /// Volume nomeado
    #[arg(long = "volume", value_name = "NOME")]
    volume: Vec<String>,
    /// Comando principal (padrão /bin/sh)
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

impl CreateArgs {
    fn options(&self) -> anyhow::Result<CreateOptions> {
        let mut env = BTreeMap::new();
        for pair in &self.env {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                KernelError::InvalidArgument(format!("variável '{pair}' não está no formato CHAVE=VALOR"))
            })?;
            env.insert(key.to_string(), value.to_string());
        }
        Ok(CreateOptions {
            command: (!self.command.is_empty()).then(|| self.command.join(" ")),
            env,
            ports: self.publish.clone(),
            volumes: self.volume.clone(),
        })
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Conteúdo do argumento ou, na falta dele, do stdin.
fn read_content(content: Option<String>) -> anyhow::Result<Vec<u8>> {
    match content {
        Some(text) => Ok(text.into_bytes()),
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Falha ao ler conteúdo do stdin")?;
            Ok(buf)
        }
    }
}

fn write_raw(bytes: &[u8]) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(bytes)?;
    if !bytes.ends_with(b"\n") {
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

fn open_state(config: KernelConfig) -> anyhow::Result<KernelState> {
    let path = config.database_path();
    KernelState::open(config)
        .with_context(|| format!("Falha ao abrir o kernel em \"{}\"", path.display()))
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = KernelConfig::load(args.data_dir, args.config.as_deref())?;

    // Manutenção que não pode depender de um banco legível
    match &args.command {
        Command::Repair => {
            let report = SqliteStore::repair_at(&config.database_path())?;
            if let Some(backup) = &report.backup {
                println!("Backup salvo em \"{}\"", backup.display());
            }
            if report.fresh {
                println!("Nada legível no banco original; banco recriado do zero.");
            }
            for (table, rows) in &report.recovered {
                println!("  {table:<14} {rows} linha(s) recuperada(s)");
            }
            println!("Banco reparado: \"{}\"", config.database_path().display());
            return Ok(());
        }
        Command::Dbclean { yes: false } => {
            anyhow::bail!("dbclean apaga todos os dados; use --yes para confirmar");
        }
        Command::Cclean { yes: false } => {
            anyhow::bail!("cclean apaga todos os contêineres e imagens; use --yes para confirmar");
        }
        _ => {}
    }

    let state = open_state(config)?;

    match args.command {
        // ===== PACOTES =====
        Command::Install {
            package,
            dry_run,
            auto,
        } => {
            let explicit = !auto;
            let plan = if dry_run {
                state.packages.plan_install(&package, explicit)?
            } else {
                state.packages.install(&package, explicit)?
            };

            if plan.is_noop() {
                println!("{package} já está instalado.");
                return Ok(());
            }
            if plan.promote_target {
                println!("{package} marcado como instalado explicitamente.");
            }
            if !plan.packages.is_empty() {
                let verb = if dry_run { "Seriam instalados" } else { "Instalados" };
                println!("{verb} {} pacote(s):", plan.packages.len());
                for planned in &plan.packages {
                    println!(
                        "  {:<16} {:<10} {:<8} [{}] {}",
                        planned.entry.name,
                        planned.entry.version,
                        planned.reason,
                        planned.entry.mirror,
                        format_size(planned.entry.size)
                    );
                }
                println!("Total: {}", format_size(plan.total_size()));
            }
        }
        Command::Remove { package } => {
            let removed = state.packages.remove(&package)?;
            println!("{} {} removido.", removed.name, removed.version);
        }
        Command::Autoremove => {
            let removed = state.packages.autoremove()?;
            if removed.is_empty() {
                println!("Nenhuma dependência órfã.");
            } else {
                println!("Removidos {} pacote(s) órfão(s): {}", removed.len(), removed.join(", "));
            }
        }
        Command::Search { query } => {
            let installed: BTreeSet<String> =
                state.packages.list()?.into_iter().map(|p| p.name).collect();
            let mut found = 0;
            for entry in state.packages.search(&query)? {
                let marker = if installed.contains(&entry.name) {
                    "[instalado]"
                } else {
                    ""
                };
                println!(
                    "{:<16} {:<10} {:<7} {} {}",
                    entry.name, entry.version, entry.mirror, entry.description, marker
                );
                found += 1;
            }
            if found == 0 {
                println!("Nenhum pacote encontrado para \"{query}\".");
            }
        }
        Command::List => {
            let packages = state.packages.list()?;
            if packages.is_empty() {
                println!("Nenhum pacote instalado.");
            }
            for pkg in packages {
                println!(
                    "{:<16} {:<10} {:<8} {:<7} {}",
                    pkg.name,
                    pkg.version,
                    pkg.reason,
                    pkg.mirror,
                    format_size(pkg.size)
                );
            }
        }
        Command::Info { package } => {
            let info = state.packages.info(&package)?;
            println!("Pacote: {}", info.name);
            if let Some(entry) = &info.catalog {
                println!("Versão (catálogo): {} [{}]", entry.version, entry.mirror);
                println!("Descrição: {}", entry.description);
                println!("Tamanho: {}", format_size(entry.size));
            }
            match &info.installed {
                Some(record) => println!(
                    "Instalado: {} ({}), {}",
                    record.version,
                    record.reason,
                    format_timestamp(record.installed_at)
                ),
                None => println!("Instalado: não"),
            }
            println!("Dependências: {}", join_or_dash(&info.dependencies));
            println!("Dependentes: {}", join_or_dash(&info.dependents));
        }
        Command::Mirror { action } => match action {
            MirrorCommand::List => {
                for (index, status) in state.packages.mirrors()?.iter().enumerate() {
                    let marker = if status.active { "*" } else { " " };
                    println!(
                        "{marker} {}. {:<7} {}",
                        index + 1,
                        status.source,
                        status.source.url()
                    );
                }
            }
            MirrorCommand::Set { mirror } => {
                let source = state.packages.set_mirror(&mirror)?;
                println!("Mirror preferido: {} ({})", source, source.url());
            }
        },

        // ===== CONTÊINERES =====
        Command::Cimage { action } => match action {
            ImageCommand::Create { name, tag, base } => {
                let image = state
                    .containers
                    .create_image(&name, tag.as_deref(), base.as_deref())?;
                println!("Imagem {} ({})", image.reference(), image.id);
            }
            ImageCommand::Ls => {
                for image in state.containers.list_images()? {
                    println!(
                        "{:<16} {:<24} {:<10} {}",
                        image.id,
                        image.reference(),
                        format_size(image.size),
                        format_timestamp(image.created_at)
                    );
                }
            }
        },
        Command::Ccreate(create) => {
            let record = state
                .containers
                .create(&create.name, &create.image, &create.options()?)?;
            println!("Contêiner {} criado ({}, IP {})", record.name, record.id, record.ip);
        }
        Command::Crun(create) => {
            let record = state
                .containers
                .run(&create.name, &create.image, &create.options()?)?;
            println!(
                "Contêiner {} rodando ({}, IP {}, PID {})",
                record.name,
                record.id,
                record.ip,
                record.pid.map(|p| p.to_string()).unwrap_or_default()
            );
        }
        Command::Cstart { container } => {
            let record = state.containers.start(&container)?;
            println!("{}: {}", record.name, record.state);
        }
        Command::Cstop { container } => {
            let record = state.containers.stop(&container)?;
            println!("{}: {}", record.name, record.state);
        }
        Command::Crm { container, force } => {
            let record = state.containers.remove(&container, force)?;
            println!("Contêiner {} removido (IP {} liberado)", record.name, record.ip);
        }
        Command::Cps { all } => {
            println!(
                "{:<16} {:<16} {:<20} {:<8} {:<15} CRIADO",
                "ID", "NOME", "IMAGEM", "ESTADO", "IP"
            );
            for c in state.containers.list_containers(all)? {
                println!(
                    "{:<16} {:<16} {:<20} {:<8} {:<15} {}",
                    c.id,
                    c.name,
                    c.image,
                    c.state,
                    c.ip,
                    format_timestamp(c.created_at)
                );
            }
        }
        Command::Cexec { container, command } => {
            let output = state.containers.exec(&container, &command.join(" "))?;
            println!("{}", output.output);
        }
        Command::Cinspect { container, json } => {
            let inspection = state.containers.inspect(&container)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&inspection)?);
                return Ok(());
            }
            println!("ID: {}", inspection.id);
            println!("Nome: {}", inspection.name);
            println!("Imagem: {} ({})", inspection.image, inspection.image_id);
            println!("Estado: {}", inspection.state);
            println!("IP: {}", inspection.ip_address);
            if let Some(pid) = inspection.pid {
                println!("PID: {pid}");
            }
            println!("Comando: {}", inspection.command);
            println!(
                "Criado: {} ({})",
                inspection.created_at,
                format_timestamp(inspection.created_at)
            );
            if let Some(uptime) = inspection.uptime_secs {
                println!("Uptime: {}", format_duration(uptime));
            }
            if !inspection.env.is_empty() {
                println!("Ambiente:");
                for (key, value) in &inspection.env {
                    println!("  {key}={value}");
                }
            }
            println!("Portas: {}", join_or_dash(&inspection.ports));
            println!("Volumes: {}", join_or_dash(&inspection.volumes));
            if !inspection.command_log.is_empty() {
                println!("Histórico de exec:");
                for entry in &inspection.command_log {
                    println!("  [{}] {}", format_timestamp(entry.timestamp), entry.command);
                }
            }
        }
        Command::Cnetwork { bridge } => {
            let network = state.containers.network_inspect(bridge.as_deref())?;
            println!("Bridge: {}", network.name);
            println!("Sub-rede: {}", network.subnet);
            println!("Gateway: {}", network.gateway);
            println!(
                "Endereços: {} em uso de {}",
                network.leases.len(),
                network.capacity
            );
            for lease in network.leases {
                println!(
                    "  {:<15} {:<16} {:<16} {}",
                    lease.ip_address, lease.container_name, lease.container_id, lease.state
                );
            }
        }
        Command::Cvolumes => {
            for volume in state.containers.list_volumes()? {
                println!(
                    "{:<16} {:<36} {}",
                    volume.name,
                    volume.mount_path,
                    volume.container.as_deref().unwrap_or("-")
                );
            }
        }

        Command::Cclean { .. } => {
            let report = state.containers.clean()?;
            println!("Dados de contêineres apagados:");
            println!("  {} contêiner(es)", report.containers);
            println!("  {} imagem(ns)", report.images);
            println!("  {} volume(s)", report.volumes);
        }

        // ===== FILESYSTEM =====
        Command::Hwrite { path, content } => {
            let entry = state.fs.hwrite(&path, &read_content(content)?)?;
            println!("{} ({} bytes)", entry.path, entry.size);
        }
        Command::Hread { path } => write_raw(&state.fs.hread(&path)?)?,
        Command::Hls { prefix } => {
            for entry in state.fs.hls(prefix.as_deref())? {
                println!(
                    "{:<40} {:>10} {}",
                    entry.path,
                    entry.size,
                    format_timestamp(entry.modified_at)
                );
            }
        }
        Command::Hrm { path } => {
            state.fs.hrm(&path)?;
            println!("{path} removido.");
        }
        Command::Fwrite { path, content } => {
            let written = state.fs.fwrite(&path, &read_content(content)?)?;
            println!("Gravado em \"{}\"", written.display());
        }
        Command::Cat { path } => write_raw(&state.fs.cat(&path)?)?,
        Command::Fls { path } => {
            for entry in state.fs.fls(path.as_deref())? {
                if entry.is_dir {
                    println!("{}/", entry.name);
                } else {
                    println!("{:<32} {:>10}", entry.name, entry.size);
                }
            }
        }

        // ===== BANCO =====
        Command::Repair => {}
        Command::Dbfix => {
            let report = state.store.diagnose()?;
            println!("Integridade: {}", report.integrity);
            for (table, count) in &report.row_counts {
                println!("  {table:<14} {count}");
            }
            println!("Arestas órfãs removidas: {}", report.pruned_edges);
            if !report.is_healthy() {
                println!("O banco tem problemas; rode `kadd repair`.");
            }
        }
        Command::Dbclean { .. } => {
            let deleted = state.store.reset()?;
            let total: usize = deleted.iter().map(|(_, rows)| rows).sum();
            println!("{total} linha(s) apagada(s).");
        }

        // ===== DRIVERS =====
        Command::Lsmod => {
            for status in state.drivers.list()? {
                println!(
                    "{:<16} {:<28} {:<7} {}",
                    status.info.module,
                    status.info.full_name,
                    status.info.version,
                    if status.loaded { "carregado" } else { "-" }
                );
            }
        }
        Command::Modprobe { driver } => {
            let (kind, changed) = state.drivers.load(&driver)?;
            if changed {
                println!("{} carregado.", kind.info().module);
            } else {
                println!("{} já estava carregado.", kind.info().module);
            }
        }
        Command::Rmmod { driver } => {
            let (kind, changed) = state.drivers.unload(&driver)?;
            if changed {
                println!("{} descarregado.", kind.info().module);
            } else {
                println!("{} não estava carregado.", kind.info().module);
            }
        }
        Command::Lsdev => {
            let devices = state.drivers.devices()?;
            if devices.is_empty() {
                println!("Nenhum driver carregado (use modprobe).");
            }
            for (kind, list) in devices {
                println!("{}:", kind.info().full_name);
                for device in list {
                    println!("  {:<8} {:<14} {}", device.id, device.kind, device.description);
                }
            }
        }
        Command::Drvinfo { driver } => {
            let status = state.drivers.info(&driver)?;
            println!("Driver: {} ({})", status.info.full_name, status.info.module);
            println!("Versão: {}", status.info.version);
            println!("Dispositivos: {}", status.info.devices.len());
            for device in status.info.devices {
                println!("  {:<8} {:<14} {}", device.id, device.kind, device.description);
            }
        }
    }

    Ok(())
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<KernelError>() {
                Some(kernel) => eprintln!("erro [{}]: {kernel}", kernel.kind()),
                None => eprintln!("erro: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_commands() {
        let args = Args::try_parse_from([
            "kadd", "--data-dir", "/tmp/k", "crun", "web", "nginx:1.24", "-e", "A=1", "-p",
            "8080:80", "--volume", "data", "nginx", "-g", "daemon off;",
        ])
        .unwrap();
        assert_eq!(args.data_dir, Some(PathBuf::from("/tmp/k")));
        let Command::Crun(create) = args.command else {
            panic!("esperava crun");
        };
        let options = create.options().unwrap();
        assert_eq!(options.env.get("A").map(String::as_str), Some("1"));
        assert_eq!(options.ports, vec!["8080:80".to_string()]);
        assert_eq!(options.volumes, vec!["data".to_string()]);
        assert_eq!(options.command.as_deref(), Some("nginx -g daemon off;"));

        assert!(Args::try_parse_from(["kadd", "dbclean", "--yes"]).is_ok());
        assert!(matches!(
            Args::try_parse_from(["kadd", "cclean"]).unwrap().command,
            Command::Cclean { yes: false }
        ));
        assert!(Args::try_parse_from(["kadd", "drvinfo", "gpu"]).is_ok());
        assert!(Args::try_parse_from(["kadd", "mirror", "set", "2"]).is_ok());
        assert!(Args::try_parse_from(["kadd", "crm", "-f", "web"]).is_ok());
        assert!(Args::try_parse_from(["kadd", "cexec", "web"]).is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(15_000_000), "15.0 MB");
        assert_eq!(format_size(1_500), "1.5 KB");
    }

    #[test]
    fn test_bad_env_pair() {
        let args = Args::try_parse_from(["kadd", "ccreate", "web", "alpine", "-e", "SEMIGUAL"]).unwrap();
        let Command::Ccreate(create) = args.command else {
            panic!("esperava ccreate");
        };
        assert!(create.options().is_err());
    }
}
