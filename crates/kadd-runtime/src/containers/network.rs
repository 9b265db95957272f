//! Bridge virtual e alocação de IPs.

use ipnetwork::Ipv4Network;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use tracing::debug;

use crate::error::{KernelError, Result};

/// Uma bridge com sub-rede e gateway fixos.
///
/// Não guarda estado de alocação: os IPs alugados vêm sempre do store, dentro
/// da mesma transação que grava o contêiner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeNetwork {
    name: String,
    subnet: Ipv4Network,
    gateway: Ipv4Addr,
}

impl BridgeNetwork {
    pub fn new(name: impl Into<String>, subnet: Ipv4Network, gateway: Ipv4Addr) -> Result<Self> {
        let name = name.into();
        if subnet.prefix() > 30 {
            return Err(KernelError::Config(format!(
                "sub-rede {subnet} pequena demais para a bridge '{name}'"
            )));
        }
        // Normaliza para o endereço de rede (ex.: 172.17.0.9/16 -> 172.17.0.0/16)
        let subnet = Ipv4Network::new(subnet.network(), subnet.prefix())
            .map_err(|err| KernelError::Config(err.to_string()))?;

        if !subnet.contains(gateway)
            || gateway == subnet.network()
            || gateway == subnet.broadcast()
        {
            return Err(KernelError::Config(format!(
                "gateway {gateway} fora dos hosts da sub-rede {subnet}"
            )));
        }

        Ok(Self {
            name,
            subnet,
            gateway,
        })
    }

    /// Constrói a partir das strings da configuração.
    pub fn parse(name: &str, subnet: &str, gateway: &str) -> Result<Self> {
        let subnet: Ipv4Network = subnet
            .parse()
            .map_err(|err| KernelError::Config(format!("sub-rede '{subnet}' inválida: {err}")))?;
        let gateway: Ipv4Addr = gateway
            .parse()
            .map_err(|err| KernelError::Config(format!("gateway '{gateway}' inválido: {err}")))?;
        Self::new(name, subnet, gateway)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subnet(&self) -> Ipv4Network {
        self.subnet
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    /// Quantos contêineres cabem na bridge (sem rede, broadcast e gateway).
    pub fn capacity(&self) -> u64 {
        let hosts = 1u64 << (32 - u32::from(self.subnet.prefix()));
        hosts - 3
    }

    /// Menor host livre da sub-rede.
    ///
    /// Precisa ser chamado dentro do mesmo `write` que persiste o contêiner,
    /// senão duas criações concorrentes podem receber o mesmo endereço.
    pub fn allocate(&self, leased: &BTreeSet<Ipv4Addr>) -> Result<Ipv4Addr> {
        let first = u32::from(self.subnet.network()) + 1;
        let last = u32::from(self.subnet.broadcast());
        let gateway = u32::from(self.gateway);

        for candidate in (first..last).filter(|c| *c != gateway) {
            let ip = Ipv4Addr::from(candidate);
            if !leased.contains(&ip) {
                debug!(bridge = %self.name, %ip, "IP alocado");
                return Ok(ip);
            }
        }

        Err(KernelError::NetworkExhausted {
            subnet: self.subnet.to_string(),
        })
    }
}
