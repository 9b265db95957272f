//! Registro de drivers simulados (`lsmod`, `modprobe`, `rmmod`, `lsdev`, `drvinfo`).
//!
//! Os quatro tipos são um conjunto fechado: um enum com tabela estática de
//! metadados. O único estado é carregado/descarregado, persistido em metadata.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

use crate::error::{EntityKind, KernelError, Result};
use crate::store::Store;

const KEY_PREFIX: &str = "driver.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DriverKind {
    Block,
    Network,
    Usb,
    Gpu,
}

/// Dispositivo detectado por um driver carregado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: &'static str,
    pub kind: &'static str,
    pub description: &'static str,
}

/// Metadados estáticos de um driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverInfo {
    pub module: &'static str,
    pub full_name: &'static str,
    pub version: &'static str,
    pub devices: &'static [DeviceInfo],
}

const fn device(id: &'static str, kind: &'static str, description: &'static str) -> DeviceInfo {
    DeviceInfo {
        id,
        kind,
        description,
    }
}

const BLOCK_DEVICES: &[DeviceInfo] = &[
    device("sda", "disk", "Virtual SATA Drive (500 GB)"),
    device("sdb", "disk", "Virtual NVMe Drive (1 TB)"),
    device("loop0", "loop", "Loop Device (10 MB)"),
];

const NETWORK_DEVICES: &[DeviceInfo] = &[
    device("eth0", "ethernet", "virtio_net 1000Mbps"),
    device("wlan0", "wireless", "ath9k 300Mbps"),
    device("lo", "loopback", "127.0.0.1"),
];

const USB_DEVICES: &[DeviceInfo] = &[
    device("usb-1-1", "HID", "Logitech USB Mouse"),
    device("usb-1-2", "Mass Storage", "Kingston DataTraveler 3.0"),
    device("usb-2-1", "Wireless", "Intel Bluetooth Controller"),
];

const GPU_DEVICES: &[DeviceInfo] = &[device("gpu0", "gpu", "NVIDIA GeForce RTX 4090 (24 GB)")];

impl DriverKind {
    pub const ALL: [DriverKind; 4] = [
        DriverKind::Block,
        DriverKind::Network,
        DriverKind::Usb,
        DriverKind::Gpu,
    ];

    /// Nome curto usado em `modprobe`/`rmmod`.
    pub fn name(&self) -> &'static str {
        match self {
            DriverKind::Block => "block",
            DriverKind::Network => "network",
            DriverKind::Usb => "usb",
            DriverKind::Gpu => "gpu",
        }
    }

    pub fn info(&self) -> DriverInfo {
        match self {
            DriverKind::Block => DriverInfo {
                module: "block_driver",
                full_name: "Block Device Driver",
                version: "1.0.0",
                devices: BLOCK_DEVICES,
            },
            DriverKind::Network => DriverInfo {
                module: "network_driver",
                full_name: "Network Interface Driver",
                version: "1.0.0",
                devices: NETWORK_DEVICES,
            },
            DriverKind::Usb => DriverInfo {
                module: "usb_driver",
                full_name: "USB Device Driver",
                version: "1.0.0",
                devices: USB_DEVICES,
            },
            DriverKind::Gpu => DriverInfo {
                module: "gpu_driver",
                full_name: "Graphics Processing Driver",
                version: "1.0.0",
                devices: GPU_DEVICES,
            },
        }
    }

    fn metadata_key(&self) -> String {
        format!("{KEY_PREFIX}{}", self.name())
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

impl FromStr for DriverKind {
    type Err = KernelError;

    /// Aceita o nome curto (`gpu`) ou o nome do módulo (`gpu_driver`).
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted || kind.info().module == wanted)
            .ok_or_else(|| KernelError::not_found(EntityKind::Driver, s))
    }
}

/// Linha de `lsmod`.
#[derive(Debug, Clone, Copy)]
pub struct DriverStatus {
    pub kind: DriverKind,
    pub info: DriverInfo,
    pub loaded: bool,
}

pub struct DriverRegistry<S: Store> {
    store: Arc<S>,
}

impl<S: Store> DriverRegistry<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn list(&self) -> Result<Vec<DriverStatus>> {
        self.store.read(|gw| {
            DriverKind::ALL
                .iter()
                .map(|kind| -> Result<DriverStatus> {
                    Ok(DriverStatus {
                        kind: *kind,
                        info: kind.info(),
                        loaded: gw.get_metadata(&kind.metadata_key())?.as_deref() == Some("loaded"),
                    })
                })
                .collect()
        })
    }

    fn set_loaded(&self, name: &str, loaded: bool) -> Result<(DriverKind, bool)> {
        let kind: DriverKind = name.parse()?;
        let wanted = if loaded { "loaded" } else { "unloaded" };

        let changed = self.store.write(|gw| {
            let key = kind.metadata_key();
            let current = gw.get_metadata(&key)?;
            let was_loaded = current.as_deref() == Some("loaded");
            if was_loaded == loaded {
                return Ok(false);
            }
            gw.set_metadata(&key, wanted)?;
            Ok(true)
        })?;

        if changed {
            info!(driver = %kind, state = wanted, "driver alterado");
        }
        Ok((kind, changed))
    }

    /// Carrega um driver; retorna `false` se já estava carregado.
    pub fn load(&self, name: &str) -> Result<(DriverKind, bool)> {
        self.set_loaded(name, true)
    }

    /// Descarrega um driver; retorna `false` se não estava carregado.
    pub fn unload(&self, name: &str) -> Result<(DriverKind, bool)> {
        self.set_loaded(name, false)
    }

    /// Detalhes de um driver carregado (`drvinfo`).
    pub fn info(&self, name: &str) -> Result<DriverStatus> {
        let kind: DriverKind = name.parse()?;
        let loaded = self
            .store
            .read(|gw| gw.get_metadata(&kind.metadata_key()))?
            .as_deref()
            == Some("loaded");
        if !loaded {
            return Err(KernelError::DriverNotLoaded(kind.name().to_string()));
        }
        Ok(DriverStatus {
            kind,
            info: kind.info(),
            loaded,
        })
    }

    /// Dispositivos de todos os drivers carregados.
    pub fn devices(&self) -> Result<Vec<(DriverKind, &'static [DeviceInfo])>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|status| status.loaded)
            .map(|status| (status.kind, status.info.devices))
            .collect())
    }
}
