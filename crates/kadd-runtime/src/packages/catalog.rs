//! Catálogo estático dos mirrors (universo de onde as instalações são resolvidas).

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{EntityKind, KernelError, Result};

/// Fontes de pacotes conhecidas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MirrorSource {
    Termux,
    Ubuntu,
    Rocky,
    #[default]
    Alpine,
    Arch,
}

impl MirrorSource {
    /// Ordem de listagem (`mirror list`).
    pub const ALL: [MirrorSource; 5] = [
        MirrorSource::Termux,
        MirrorSource::Ubuntu,
        MirrorSource::Rocky,
        MirrorSource::Alpine,
        MirrorSource::Arch,
    ];

    /// Desempate quando um nome existe em vários mirrors e nenhum é preferido.
    pub const PRECEDENCE: [MirrorSource; 5] = [
        MirrorSource::Alpine,
        MirrorSource::Termux,
        MirrorSource::Ubuntu,
        MirrorSource::Rocky,
        MirrorSource::Arch,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MirrorSource::Termux => "termux",
            MirrorSource::Ubuntu => "ubuntu",
            MirrorSource::Rocky => "rocky",
            MirrorSource::Alpine => "alpine",
            MirrorSource::Arch => "arch",
        }
    }

    pub fn url(&self) -> &'static str {
        match self {
            MirrorSource::Termux => "https://mirror.nevacloud.com/applications/termux/termux-main/",
            MirrorSource::Ubuntu => "https://mirror.twds.com.tw/ubuntu/",
            MirrorSource::Rocky => "https://mirror.jeonnam.school/rocky-linux/",
            MirrorSource::Alpine => "https://mirror.alpinelinux.org/alpine/",
            MirrorSource::Arch => "https://mirror.archlinux.tw/ArchLinux/",
        }
    }

    /// Posição no desempate: o preferido vem sempre primeiro.
    fn rank(&self, preferred: Option<MirrorSource>) -> usize {
        if preferred == Some(*self) {
            return 0;
        }
        1 + Self::PRECEDENCE
            .iter()
            .position(|m| m == self)
            .unwrap_or(Self::PRECEDENCE.len())
    }
}

impl fmt::Display for MirrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for MirrorSource {
    type Err = KernelError;

    /// Aceita o nome (`alpine`) ou o índice 1-based da listagem (`4`).
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        if let Ok(index) = wanted.parse::<usize>() {
            return index
                .checked_sub(1)
                .and_then(|i| Self::ALL.get(i).copied())
                .ok_or_else(|| KernelError::not_found(EntityKind::Mirror, s));
        }
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.name() == wanted)
            .ok_or_else(|| KernelError::not_found(EntityKind::Mirror, s))
    }
}

/// Entrada do catálogo de um mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Tamanho em bytes
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub mirror: MirrorSource,
}

/// Formato do arquivo TOML de catálogo extra.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default, rename = "package")]
    packages: Vec<CatalogEntry>,
}

type SeedRow = (&'static str, &'static str, &'static str, u64, &'static [&'static str]);

/// Índice de fallback (mirror Alpine).
const SEED_ALPINE: &[SeedRow] = &[
    ("python3", "3.11.6", "Python programming language interpreter", 15_000_000, &["libssl", "libreadline", "zlib", "libffi"]),
    ("curl", "8.5.0", "Command line tool for transferring data with URLs", 500_000, &["libcurl", "libssl", "zlib"]),
    ("git", "2.43.0", "Fast, scalable, distributed revision control system", 8_000_000, &["libcurl", "zlib", "pcre2", "libexpat"]),
    ("vim", "9.0.2121", "Vi IMproved - enhanced vi editor", 3_500_000, &["ncurses-libs"]),
    ("nodejs", "20.10.0", "JavaScript runtime built on Chrome V8 engine", 12_000_000, &["libssl", "zlib", "libstdcxx"]),
    ("nginx", "1.24.0", "HTTP and reverse proxy server", 1_200_000, &["pcre2", "libssl", "zlib"]),
    ("docker", "24.0.7", "Pack, ship and run any application as a container", 25_000_000, &["containerd", "iptables"]),
    ("postgresql", "16.1", "Sophisticated object-relational DBMS", 18_000_000, &["libssl", "libreadline", "zlib", "icu-libs"]),
    ("redis", "7.2.3", "Advanced key-value store", 2_500_000, &["libssl"]),
    ("gcc", "13.2.0", "GNU Compiler Collection", 45_000_000, &["binutils", "libstdcxx", "gmp", "mpfr"]),
    ("bash", "5.2.21", "GNU Bourne Again shell", 1_800_000, &["libreadline", "ncurses-libs"]),
    ("openssh", "9.6", "OpenSSH remote login client and server", 2_200_000, &["libssl", "zlib"]),
    ("libssl", "3.1.4", "SSL shared libraries", 450_000, &[]),
    ("libreadline", "8.2.1", "GNU readline library", 150_000, &["ncurses-libs"]),
    ("zlib", "1.3", "A compression/decompression library", 100_000, &[]),
    ("libffi", "3.4.4", "Portable foreign function interface library", 40_000, &[]),
    ("libcurl", "8.5.0", "The multiprotocol file transfer library", 350_000, &["libssl", "zlib", "nghttp2"]),
    ("nghttp2", "1.58.0", "HTTP/2 C library", 80_000, &[]),
    ("pcre2", "10.42", "Perl-compatible regular expression library", 300_000, &[]),
    ("libexpat", "2.5.0", "XML parser library", 75_000, &[]),
    ("ncurses-libs", "6.4", "Ncurses libraries", 250_000, &[]),
    ("libstdcxx", "13.2.0", "GNU C++ standard runtime library", 2_000_000, &[]),
    ("containerd", "1.7.11", "An open and reliable container runtime", 9_000_000, &["runc"]),
    ("runc", "1.1.10", "CLI tool for spawning and running containers", 3_000_000, &["libseccomp"]),
    ("libseccomp", "2.5.5", "Interface to the Linux kernel's syscall filtering mechanism", 60_000, &[]),
    ("iptables", "1.8.10", "Linux kernel firewall, NAT and packet mangling tools", 400_000, &[]),
    ("icu-libs", "74.1", "International Components for Unicode library", 11_000_000, &[]),
    ("binutils", "2.41", "Tools necessary to build programs", 6_000_000, &["zlib"]),
    ("gmp", "6.3.0", "Free library for arbitrary precision arithmetic", 500_000, &[]),
    ("mpfr", "4.2.1", "Multiple-precision floating-point library", 400_000, &["gmp"]),
];

/// Alguns pacotes também aparecem em outros mirrors, com versões próprias.
const SEED_OTHERS: &[(MirrorSource, SeedRow)] = &[
    (MirrorSource::Ubuntu, ("python3", "3.12.3", "Interactive high-level object-oriented language", 16_500_000, &["libssl", "libreadline", "zlib", "libffi"])),
    (MirrorSource::Termux, ("python3", "3.11.8", "Python 3 programming language intended to enable clear programs", 14_800_000, &["libssl", "libreadline", "zlib", "libffi"])),
    (MirrorSource::Arch, ("git", "2.44.0", "The fast distributed version control system", 8_400_000, &["libcurl", "zlib", "pcre2", "libexpat"])),
    (MirrorSource::Rocky, ("nginx", "1.22.1", "A high performance web server and reverse proxy server", 1_300_000, &["pcre2", "libssl", "zlib"])),
    (MirrorSource::Arch, ("htop", "3.3.0", "Interactive process viewer", 220_000, &["ncurses-libs"])),
];

fn seed_entry(mirror: MirrorSource, row: &SeedRow) -> CatalogEntry {
    let (name, version, description, size, depends) = row;
    CatalogEntry {
        name: name.to_string(),
        version: version.to_string(),
        description: description.to_string(),
        size: *size,
        depends: depends.iter().map(|d| d.to_string()).collect(),
        mirror,
    }
}

static SEED: Lazy<Vec<CatalogEntry>> = Lazy::new(|| {
    SEED_ALPINE
        .iter()
        .map(|row| seed_entry(MirrorSource::Alpine, row))
        .chain(SEED_OTHERS.iter().map(|(mirror, row)| seed_entry(*mirror, row)))
        .collect()
});

/// Catálogo indexado por nome; cada nome pode existir em vários mirrors.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, Vec<CatalogEntry>>,
}

impl Catalog {
    /// Catálogo vazio.
    pub fn new() -> Self {
        Self::default()
    }

    /// Índice de fallback embutido.
    pub fn seed() -> Self {
        Self::from_entries(SEED.iter().cloned())
    }

    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut catalog = Self::new();
        catalog.extend(entries);
        catalog
    }

    /// Carrega entradas extras de um arquivo TOML (`[[package]]`).
    pub fn load_file(path: &Path) -> Result<Vec<CatalogEntry>> {
        let text = fs::read_to_string(path)?;
        let file: CatalogFile = toml::from_str(&text).map_err(|err| {
            KernelError::Config(format!("catálogo '{}' inválido: {err}", path.display()))
        })?;
        Ok(file.packages)
    }

    /// Adiciona entradas; o mesmo nome no mesmo mirror é substituído.
    pub fn extend(&mut self, entries: impl IntoIterator<Item = CatalogEntry>) {
        for entry in entries {
            let slot = self.entries.entry(entry.name.clone()).or_default();
            match slot.iter_mut().find(|e| e.mirror == entry.mirror) {
                Some(existing) => *existing = entry,
                None => slot.push(entry),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Entrada vencedora para `name` segundo a precedência de mirrors.
    pub fn resolve(&self, name: &str, preferred: Option<MirrorSource>) -> Option<&CatalogEntry> {
        self.entries
            .get(name)
            .and_then(|candidates| pick(candidates, preferred))
    }

    /// Busca preguiçosa por substring do nome (sem diferenciar maiúsculas).
    ///
    /// O iterador é finito e pode ser clonado para recomeçar a busca.
    pub fn search(&self, query: &str, preferred: Option<MirrorSource>) -> Search<'_> {
        Search {
            names: self.entries.iter(),
            needle: query.to_lowercase(),
            preferred,
        }
    }
}

fn pick(candidates: &[CatalogEntry], preferred: Option<MirrorSource>) -> Option<&CatalogEntry> {
    candidates.iter().min_by_key(|e| e.mirror.rank(preferred))
}

/// Iterador retornado por [`Catalog::search`].
#[derive(Debug, Clone)]
pub struct Search<'a> {
    names: btree_map::Iter<'a, String, Vec<CatalogEntry>>,
    needle: String,
    preferred: Option<MirrorSource>,
}

impl<'a> Iterator for Search<'a> {
    type Item = &'a CatalogEntry;

    fn next(&mut self) -> Option<Self::Item> {
        for (name, candidates) in self.names.by_ref() {
            if name.to_lowercase().contains(&self.needle) {
                if let Some(entry) = pick(candidates, self.preferred) {
                    return Some(entry);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_seed_dependencies_resolve() {
        let catalog = Catalog::seed();
        for candidates in catalog.entries.values() {
            for entry in candidates {
                for dep in &entry.depends {
                    assert!(catalog.contains(dep), "{} depende de {}", entry.name, dep);
                }
            }
        }
    }

    #[test]
    fn test_mirror_precedence() {
        let catalog = Catalog::seed();

        let default = catalog.resolve("python3", None).unwrap();
        assert_eq!(default.mirror, MirrorSource::Alpine);

        let preferred = catalog
            .resolve("python3", Some(MirrorSource::Ubuntu))
            .unwrap();
        assert_eq!(preferred.version, "3.12.3");

        // Preferido sem o pacote: volta para a ordem fixa
        let fallback = catalog.resolve("vim", Some(MirrorSource::Ubuntu)).unwrap();
        assert_eq!(fallback.mirror, MirrorSource::Alpine);

        // Só existe no Arch
        let only = catalog.resolve("htop", None).unwrap();
        assert_eq!(only.mirror, MirrorSource::Arch);
    }

    #[test]
    fn test_search_is_case_insensitive_and_restartable() {
        let catalog = Catalog::seed();
        let search = catalog.search("LIB", None);

        let first: Vec<&str> = search.clone().map(|e| e.name.as_str()).collect();
        let second: Vec<&str> = search.map(|e| e.name.as_str()).collect();

        assert!(first.contains(&"libssl"));
        assert!(first.contains(&"ncurses-libs"));
        assert!(!first.contains(&"python3"));
        assert_eq!(first, second);

        assert_eq!(catalog.search("nada-disso", None).count(), 0);
    }

    #[test]
    fn test_mirror_from_str() {
        assert_eq!("Alpine".parse::<MirrorSource>().unwrap(), MirrorSource::Alpine);
        assert_eq!("1".parse::<MirrorSource>().unwrap(), MirrorSource::Termux);
        assert!(matches!(
            "0".parse::<MirrorSource>(),
            Err(KernelError::NotFound { .. })
        ));
        assert!("debian".parse::<MirrorSource>().is_err());
    }

    #[test]
    fn test_load_catalog_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("extra.toml");
        fs::write(
            &path,
            r#"
[[package]]
name = "htop"
version = "3.2.2"
depends = ["ncurses-libs"]

[[package]]
name = "jq"
version = "1.7"
description = "Command-line JSON processor"
size = 300000
mirror = "ubuntu"
"#,
        )
        .unwrap();

        let entries = Catalog::load_file(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].mirror, MirrorSource::Alpine);
        assert_eq!(entries[1].mirror, MirrorSource::Ubuntu);

        let mut catalog = Catalog::seed();
        catalog.extend(entries);
        // htop do arquivo entra no Alpine e passa na frente do Arch
        assert_eq!(catalog.resolve("htop", None).unwrap().version, "3.2.2");
        assert!(catalog.contains("jq"));
    }
}
