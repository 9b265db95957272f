//! Planejamento do fecho de instalação e detecção de órfãos.
//!
//! As duas travessias usam worklist explícita + conjunto de visitados, então
//! terminam mesmo com ciclos no catálogo e não dependem da profundidade da pilha.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use super::catalog::{Catalog, CatalogEntry, MirrorSource};
use crate::error::{EntityKind, KernelError, Result};
use crate::store::model::{DependencyEdge, InstallReason, PackageRecord};

/// Pacote que será gravado pela instalação.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPackage {
    pub entry: CatalogEntry,
    pub reason: InstallReason,
}

/// O que uma instalação faria.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallPlan {
    pub target: String,
    /// Novos pacotes, dependências antes dos dependentes
    pub packages: Vec<PlannedPackage>,
    pub edges: Vec<DependencyEdge>,
    /// Alvo já instalado como `auto` que passa a `explicit`
    pub promote_target: bool,
}

impl InstallPlan {
    /// Nada a gravar (alvo já instalado com o motivo pedido).
    pub fn is_noop(&self) -> bool {
        self.packages.is_empty() && !self.promote_target
    }

    pub fn total_size(&self) -> u64 {
        self.packages.iter().map(|p| p.entry.size).sum()
    }
}

/// Calcula o fecho de instalação de `target`.
///
/// `installed` devolve o motivo de instalação atual de um pacote, se houver.
/// Pacotes já instalados não são percorridos; qualquer dependência ausente do
/// catálogo aborta o plano inteiro com `NotFound`.
pub fn plan_install(
    catalog: &Catalog,
    preferred: Option<MirrorSource>,
    target: &str,
    explicit: bool,
    mut installed: impl FnMut(&str) -> Result<Option<InstallReason>>,
) -> Result<InstallPlan> {
    let mut plan = InstallPlan {
        target: target.to_string(),
        ..InstallPlan::default()
    };

    if catalog.resolve(target, preferred).is_none() {
        return Err(KernelError::not_found(EntityKind::Package, target));
    }

    match installed(target)? {
        Some(InstallReason::Auto) if explicit => {
            plan.promote_target = true;
            return Ok(plan);
        }
        Some(_) => return Ok(plan),
        None => {}
    }

    let mut visited: BTreeSet<String> = BTreeSet::new();
    // (nome, filhos já empilhados)
    let mut stack: Vec<(String, bool)> = vec![(target.to_string(), false)];

    while let Some((name, expanded)) = stack.pop() {
        if expanded {
            let entry = catalog
                .resolve(&name, preferred)
                .ok_or_else(|| KernelError::not_found(EntityKind::Package, &name))?;
            let reason = if name == target && explicit {
                InstallReason::Explicit
            } else {
                InstallReason::Auto
            };
            plan.packages.push(PlannedPackage {
                entry: entry.clone(),
                reason,
            });
            continue;
        }

        if !visited.insert(name.clone()) {
            continue;
        }

        let entry = catalog
            .resolve(&name, preferred)
            .ok_or_else(|| KernelError::not_found(EntityKind::Package, &name))?;
        debug!(package = %name, mirror = %entry.mirror, deps = entry.depends.len(), "resolvendo");

        stack.push((name.clone(), true));
        for dep in entry.depends.iter().rev() {
            if dep == &name {
                continue;
            }
            plan.edges.push(DependencyEdge {
                package: name.clone(),
                depends_on: dep.clone(),
            });
            if !visited.contains(dep) && installed(dep)?.is_none() {
                stack.push((dep.clone(), false));
            }
        }
    }

    plan.edges.sort();
    plan.edges.dedup();
    Ok(plan)
}

/// Pacotes `auto` que não são alcançáveis a partir de nenhum pacote `explicit`.
///
/// Arestas para pacotes não instalados são ignoradas. O resultado já é o ponto
/// fixo: remover todos de uma vez não deixa novos órfãos.
pub fn find_orphans(packages: &[PackageRecord], edges: &[DependencyEdge]) -> Vec<String> {
    let installed: BTreeMap<&str, InstallReason> = packages
        .iter()
        .map(|p| (p.name.as_str(), p.reason))
        .collect();

    let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in edges {
        adjacency
            .entry(edge.package.as_str())
            .or_default()
            .push(edge.depends_on.as_str());
    }

    let mut reachable: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<&str> = installed
        .iter()
        .filter(|(_, reason)| **reason == InstallReason::Explicit)
        .map(|(name, _)| *name)
        .collect();

    while let Some(name) = queue.pop_front() {
        if !reachable.insert(name) {
            continue;
        }
        for dep in adjacency.get(name).into_iter().flatten() {
            if installed.contains_key(dep) && !reachable.contains(dep) {
                queue.push_back(*dep);
            }
        }
    }

    installed
        .iter()
        .filter(|(name, reason)| **reason == InstallReason::Auto && !reachable.contains(*name))
        .map(|(name, _)| name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, depends: &[&str]) -> CatalogEntry {
        CatalogEntry {
            name: name.to_string(),
            version: "1.0".to_string(),
            description: String::new(),
            size: 100,
            depends: depends.iter().map(|d| d.to_string()).collect(),
            mirror: MirrorSource::Alpine,
        }
    }

    fn record(name: &str, reason: InstallReason) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            version: "1.0".to_string(),
            size: 100,
            reason,
            mirror: "alpine".to_string(),
            installed_at: 0,
        }
    }

    fn edge(package: &str, depends_on: &str) -> DependencyEdge {
        DependencyEdge {
            package: package.to_string(),
            depends_on: depends_on.to_string(),
        }
    }

    fn nothing_installed(_: &str) -> Result<Option<InstallReason>> {
        Ok(None)
    }

    #[test]
    fn test_plan_orders_dependencies_first() {
        let catalog = Catalog::from_entries([
            entry("app", &["lib-a", "lib-b"]),
            entry("lib-a", &["lib-c"]),
            entry("lib-b", &["lib-c"]),
            entry("lib-c", &[]),
        ]);

        let plan = plan_install(&catalog, None, "app", true, nothing_installed).unwrap();
        let order: Vec<&str> = plan.packages.iter().map(|p| p.entry.name.as_str()).collect();

        assert_eq!(order.len(), 4);
        assert_eq!(order.last(), Some(&"app"));
        let pos = |n: &str| order.iter().position(|x| *x == n).unwrap();
        assert!(pos("lib-c") < pos("lib-a"));
        assert!(pos("lib-c") < pos("lib-b"));

        assert_eq!(plan.packages.last().unwrap().reason, InstallReason::Explicit);
        assert!(plan.packages[..3]
            .iter()
            .all(|p| p.reason == InstallReason::Auto));
        assert_eq!(plan.edges.len(), 4);
    }

    #[test]
    fn test_plan_survives_cycles_and_self_loops() {
        let catalog = Catalog::from_entries([
            entry("a", &["b", "a"]),
            entry("b", &["c"]),
            entry("c", &["a"]),
        ]);

        let plan = plan_install(&catalog, None, "a", true, nothing_installed).unwrap();
        assert_eq!(plan.packages.len(), 3);
        assert!(plan.edges.iter().all(|e| e.package != e.depends_on));
        assert_eq!(
            plan.edges,
            vec![edge("a", "b"), edge("b", "c"), edge("c", "a")]
        );
    }

    #[test]
    fn test_plan_skips_installed_and_promotes() {
        let catalog = Catalog::from_entries([
            entry("python", &["libssl", "libreadline"]),
            entry("libssl", &[]),
            entry("libreadline", &[]),
        ]);

        let plan = plan_install(&catalog, None, "python", true, |name| {
            Ok((name == "libssl").then_some(InstallReason::Auto))
        })
        .unwrap();
        let names: Vec<&str> = plan.packages.iter().map(|p| p.entry.name.as_str()).collect();
        assert_eq!(names, vec!["libreadline", "python"]);
        // A aresta para a dependência já instalada continua sendo gravada
        assert!(plan.edges.contains(&edge("python", "libssl")));

        let promote = plan_install(&catalog, None, "libssl", true, |name| {
            Ok((name == "libssl").then_some(InstallReason::Auto))
        })
        .unwrap();
        assert!(promote.promote_target);
        assert!(promote.packages.is_empty());

        let noop = plan_install(&catalog, None, "libssl", true, |_| {
            Ok(Some(InstallReason::Explicit))
        })
        .unwrap();
        assert!(noop.is_noop());
    }

    #[test]
    fn test_plan_missing_dependency_fails() {
        let catalog = Catalog::from_entries([entry("app", &["ghost"])]);

        let err = plan_install(&catalog, None, "app", true, nothing_installed).unwrap_err();
        assert!(matches!(
            err,
            KernelError::NotFound { ref name, .. } if name == "ghost"
        ));

        let err = plan_install(&catalog, None, "nope", true, nothing_installed).unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn test_orphans_follow_reachability() {
        let packages = vec![
            record("python", InstallReason::Explicit),
            record("libssl", InstallReason::Auto),
            record("zlib", InstallReason::Auto),
            record("stale", InstallReason::Auto),
            record("stale-dep", InstallReason::Auto),
        ];
        let edges = vec![
            edge("python", "libssl"),
            edge("libssl", "zlib"),
            edge("stale", "stale-dep"),
            edge("stale-dep", "stale"),
        ];

        let orphans = find_orphans(&packages, &edges);
        assert_eq!(orphans, vec!["stale".to_string(), "stale-dep".to_string()]);

        let remaining: Vec<PackageRecord> = packages
            .into_iter()
            .filter(|p| !orphans.contains(&p.name))
            .collect();
        assert!(find_orphans(&remaining, &edges).is_empty());
    }
}
