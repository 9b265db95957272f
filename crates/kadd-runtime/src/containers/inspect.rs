//! Projeções somente leitura de contêineres e da bridge (`cinspect`, `cnetwork`).

use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use crate::store::model::{unix_timestamp, ContainerRecord, ContainerState, ExecRecord};

/// Informações completas de um contêiner
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInspection {
    pub id: String,
    pub name: String,
    pub image: String,
    pub image_id: String,
    pub state: ContainerState,
    pub ip_address: Ipv4Addr,
    pub pid: Option<u32>,
    pub command: String,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<String>,
    pub volumes: Vec<String>,
    pub command_log: Vec<ExecRecord>,
    pub created_at: u64,
    pub state_changed_at: u64,
    pub started_at: Option<u64>,
    /// Só quando rodando
    pub uptime_secs: Option<u64>,
}

impl From<&ContainerRecord> for ContainerInspection {
    fn from(record: &ContainerRecord) -> Self {
        Self::at(record, unix_timestamp())
    }
}

impl ContainerInspection {
    /// Projeção do registro com o uptime medido até `now`.
    pub fn at(record: &ContainerRecord, now: u64) -> Self {
        let uptime_secs = match (record.state, record.started_at) {
            (ContainerState::Running, Some(started)) => Some(now.saturating_sub(started)),
            _ => None,
        };

        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            image: record.image.clone(),
            image_id: record.image_id.clone(),
            state: record.state,
            ip_address: record.ip,
            pid: record.pid,
            command: record.command.clone(),
            env: record.env.clone(),
            ports: record.ports.clone(),
            volumes: record.volumes.clone(),
            command_log: record.command_log.clone(),
            created_at: record.created_at,
            state_changed_at: record.state_changed_at,
            started_at: record.started_at,
            uptime_secs,
        }
    }
}

/// Endereço alugado na bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkLease {
    pub ip_address: Ipv4Addr,
    pub container_id: String,
    pub container_name: String,
    pub state: ContainerState,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetworkInspection {
    pub name: String,
    pub subnet: String,
    pub gateway: Ipv4Addr,
    pub capacity: u64,
    /// Ordenado por endereço
    pub leases: Vec<NetworkLease>,
}

/// Tempo decorrido entre `ts` e `now`, por extenso ("5 minutos atrás").
///
/// Instantes no futuro não têm leitura relativa.
pub fn format_relative(ts: u64, now: u64) -> String {
    let Some(elapsed) = now.checked_sub(ts) else {
        return "data desconhecida".to_string();
    };
    let (unit, label) = match elapsed {
        0..=59 => (1, "segundos"),
        60..=3_599 => (60, "minutos"),
        3_600..=86_399 => (3_600, "horas"),
        86_400..=2_591_999 => (86_400, "dias"),
        _ => (2_592_000, "meses"),
    };
    format!("{} {label} atrás", elapsed / unit)
}

/// [`format_relative`] contra o relógio atual.
pub fn format_timestamp(ts: u64) -> String {
    format_relative(ts, unix_timestamp())
}

/// Duração compacta: as duas maiores unidades não nulas (`2h 1m`).
pub fn format_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    let seconds = secs % 60;
    match (days, hours, minutes) {
        (0, 0, 0) => format!("{seconds}s"),
        (0, 0, _) => format!("{minutes}m {seconds}s"),
        (0, _, _) => format!("{hours}h {minutes}m"),
        _ => format!("{days}d {hours}h"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_relative() {
        let now = 1_700_000_000;

        assert_eq!(format_relative(now, now), "0 segundos atrás");
        assert_eq!(format_relative(now - 30, now), "30 segundos atrás");
        assert_eq!(format_relative(now - 300, now), "5 minutos atrás");
        assert_eq!(format_relative(now - 7_200, now), "2 horas atrás");
        assert_eq!(format_relative(now - 3 * 86_400, now), "3 dias atrás");
        assert_eq!(format_relative(now - 70 * 86_400, now), "2 meses atrás");
        assert_eq!(format_relative(now + 3_600, now), "data desconhecida");
    }

    #[test]
    fn test_uptime_only_while_running() {
        let mut record = ContainerRecord {
            id: "ctr_abc123def456".to_string(),
            name: "web".to_string(),
            image_id: "img_abc123def456".to_string(),
            image: "alpine:latest".to_string(),
            state: ContainerState::Running,
            ip: Ipv4Addr::new(172, 17, 0, 2),
            pid: Some(4242),
            command: "/bin/sh".to_string(),
            command_log: Vec::new(),
            env: BTreeMap::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            created_at: 1_000,
            state_changed_at: 1_000,
            started_at: Some(1_000),
        };

        let running = ContainerInspection::at(&record, 1_125);
        assert_eq!(running.uptime_secs, Some(125));
        assert_eq!(format_duration(running.uptime_secs.unwrap_or_default()), "2m 5s");

        record.state = ContainerState::Stopped;
        assert_eq!(ContainerInspection::at(&record, 1_125).uptime_secs, None);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(42), "42s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(7260), "2h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(3_600), "1h 0m");
    }
}
