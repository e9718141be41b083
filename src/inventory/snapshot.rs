//! JSON export of IPAM data, served as an [`Inventory`].
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{AddressFilter, Device, FhrpGroup, Inventory, IpAddress, VirtualMachine};

/// Document layout of an inventory export file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryExport {
    #[serde(default)]
    pub ip_addresses: Vec<IpAddress>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub virtual_machines: Vec<VirtualMachine>,
    #[serde(default)]
    pub fhrp_groups: Vec<FhrpGroup>,
}

#[async_trait]
impl Inventory for InventoryExport {
    async fn list_ip_addresses(&self, filter: &AddressFilter) -> anyhow::Result<Vec<IpAddress>> {
        Ok(self
            .ip_addresses
            .iter()
            .filter(|ip| filter.matches(ip))
            .cloned()
            .collect())
    }

    async fn list_devices(&self) -> anyhow::Result<Vec<Device>> {
        Ok(self.devices.clone())
    }

    async fn list_virtual_machines(&self) -> anyhow::Result<Vec<VirtualMachine>> {
        Ok(self.virtual_machines.clone())
    }

    async fn list_fhrp_groups(&self) -> anyhow::Result<Vec<FhrpGroup>> {
        Ok(self.fhrp_groups.clone())
    }
}

/// Re-reads the export file on every call so each sync sees current data.
/// [`Inventory::export`] parses the file once, so a snapshot never mixes
/// two versions of it.
#[derive(Debug, Clone)]
pub struct SnapshotInventory {
    path: PathBuf,
}

impl SnapshotInventory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> anyhow::Result<InventoryExport> {
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read inventory export {}", self.path.display()))?;
        serde_json::from_slice(&raw)
            .with_context(|| format!("invalid inventory export {}", self.path.display()))
    }
}

#[async_trait]
impl Inventory for SnapshotInventory {
    async fn list_ip_addresses(&self, filter: &AddressFilter) -> anyhow::Result<Vec<IpAddress>> {
        self.read().await?.list_ip_addresses(filter).await
    }

    async fn list_devices(&self) -> anyhow::Result<Vec<Device>> {
        Ok(self.read().await?.devices)
    }

    async fn list_virtual_machines(&self) -> anyhow::Result<Vec<VirtualMachine>> {
        Ok(self.read().await?.virtual_machines)
    }

    async fn list_fhrp_groups(&self) -> anyhow::Result<Vec<FhrpGroup>> {
        Ok(self.read().await?.fhrp_groups)
    }

    async fn export(&self, filter: &AddressFilter) -> anyhow::Result<InventoryExport> {
        let mut export = self.read().await?;
        export.ip_addresses.retain(|ip| filter.matches(ip));
        Ok(export)
    }
}
