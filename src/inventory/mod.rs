//! Read-only view of the IPAM inventory.
//!
//! Objects arrive as plain data from an [`Inventory`] source. An
//! [`InventorySnapshot`] indexes one consistent read of them so the sync
//! pipeline can resolve each address to its interface and parent object
//! without further I/O.
pub mod snapshot;

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use ipnet::IpNet;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use snapshot::{InventoryExport, SnapshotInventory};

pub type CustomFields = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interface {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub mgmt_only: bool,
}

/// What an IP address is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Assignment {
    DeviceInterface { device: i64, interface: Interface },
    VmInterface { virtual_machine: i64, interface: Interface },
    FhrpGroup { fhrp_group: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpAddress {
    pub id: i64,
    /// Host address; a `/len` suffix in the export is accepted and dropped.
    #[serde(serialize_with = "ser_address", deserialize_with = "de_address")]
    pub address: IpAddr,
    #[serde(default)]
    pub dns_name: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: CustomFields,
    #[serde(default)]
    pub assigned_object: Option<Assignment>,
}

fn ser_address<S: Serializer>(address: &IpAddr, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(address)
}

fn de_address<'de, D: Deserializer<'de>>(d: D) -> Result<IpAddr, D::Error> {
    let raw = String::deserialize(d)?;
    if let Ok(net) = raw.parse::<IpNet>() {
        return Ok(net.addr());
    }
    raw.parse::<IpAddr>().map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: CustomFields,
    #[serde(default)]
    pub primary_ip4: Option<i64>,
    #[serde(default)]
    pub primary_ip6: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: CustomFields,
    #[serde(default)]
    pub primary_ip4: Option<i64>,
    #[serde(default)]
    pub primary_ip6: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FhrpGroup {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    pub protocol: String, // "vrrp2", "hsrp", ...
    pub group_id: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub custom_fields: CustomFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    IpAddress,
    Device,
    VirtualMachine,
    FhrpGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef {
    pub kind: ObjectKind,
    pub id: i64,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ObjectKind::IpAddress => "ip-address",
            ObjectKind::Device => "device",
            ObjectKind::VirtualMachine => "virtual-machine",
            ObjectKind::FhrpGroup => "fhrp-group",
        };
        write!(f, "{kind}#{}", self.id)
    }
}

/// Any inventory object, with the accessors the matcher and namer share.
#[derive(Debug, Clone, PartialEq)]
pub enum InventoryObject {
    IpAddress(IpAddress),
    Device(Device),
    VirtualMachine(VirtualMachine),
    FhrpGroup(FhrpGroup),
}

impl InventoryObject {
    pub fn object_ref(&self) -> ObjectRef {
        let (kind, id) = match self {
            InventoryObject::IpAddress(o) => (ObjectKind::IpAddress, o.id),
            InventoryObject::Device(o) => (ObjectKind::Device, o.id),
            InventoryObject::VirtualMachine(o) => (ObjectKind::VirtualMachine, o.id),
            InventoryObject::FhrpGroup(o) => (ObjectKind::FhrpGroup, o.id),
        };
        ObjectRef { kind, id }
    }

    /// Name usable for zone matching and naming. IP addresses answer with
    /// their explicit DNS name.
    pub fn name(&self) -> Option<&str> {
        let name = match self {
            InventoryObject::IpAddress(o) => o.dns_name.as_deref(),
            InventoryObject::Device(o) => Some(o.name.as_str()),
            InventoryObject::VirtualMachine(o) => Some(o.name.as_str()),
            InventoryObject::FhrpGroup(o) => o.name.as_deref(),
        };
        name.map(str::trim).filter(|n| !n.is_empty())
    }

    pub fn tags(&self) -> &[String] {
        match self {
            InventoryObject::IpAddress(o) => &o.tags,
            InventoryObject::Device(o) => &o.tags,
            InventoryObject::VirtualMachine(o) => &o.tags,
            InventoryObject::FhrpGroup(o) => &o.tags,
        }
    }

    /// Device role or VM role.
    pub fn role(&self) -> Option<&str> {
        match self {
            InventoryObject::Device(o) => o.role.as_deref(),
            InventoryObject::VirtualMachine(o) => o.role.as_deref(),
            _ => None,
        }
    }

    /// Primary IPv4/IPv6 address ids of a host.
    pub fn primary_ips(&self) -> [Option<i64>; 2] {
        match self {
            InventoryObject::Device(o) => [o.primary_ip4, o.primary_ip6],
            InventoryObject::VirtualMachine(o) => [o.primary_ip4, o.primary_ip6],
            _ => [None, None],
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, InventoryObject::Device(_) | InventoryObject::VirtualMachine(_))
    }
}

/// Restricts which addresses an inventory read returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    pub within: Option<IpNet>,
}

impl AddressFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn within(net: IpNet) -> Self {
        Self { within: Some(net) }
    }

    pub fn matches(&self, ip: &IpAddress) -> bool {
        self.within.is_none_or(|net| net.contains(&ip.address))
    }
}

/// Read capability over the IPAM system.
#[async_trait]
pub trait Inventory: Send + Sync {
    async fn list_ip_addresses(&self, filter: &AddressFilter) -> anyhow::Result<Vec<IpAddress>>;
    async fn list_devices(&self) -> anyhow::Result<Vec<Device>>;
    async fn list_virtual_machines(&self) -> anyhow::Result<Vec<VirtualMachine>>;
    async fn list_fhrp_groups(&self) -> anyhow::Result<Vec<FhrpGroup>>;

    /// Everything a sync needs in one read. Sources that can read all
    /// objects at once override this so the lists share one state.
    async fn export(&self, filter: &AddressFilter) -> anyhow::Result<InventoryExport> {
        Ok(InventoryExport {
            ip_addresses: self.list_ip_addresses(filter).await?,
            devices: self.list_devices().await?,
            virtual_machines: self.list_virtual_machines().await?,
            fhrp_groups: self.list_fhrp_groups().await?,
        })
    }
}

/// An IP address together with the objects it hangs off.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedAddress<'a> {
    pub ip: &'a IpAddress,
    pub interface: Option<&'a Interface>,
    pub parent: Option<&'a InventoryObject>,
}

impl<'a> ResolvedAddress<'a> {
    /// Device or VM owning the interface.
    pub fn host(&self) -> Option<&'a InventoryObject> {
        self.parent.filter(|p| p.is_host())
    }

    pub fn fhrp_group(&self) -> Option<&'a FhrpGroup> {
        match self.parent {
            Some(InventoryObject::FhrpGroup(group)) => Some(group),
            _ => None,
        }
    }

    pub fn is_primary_for_host(&self) -> bool {
        self.host()
            .is_some_and(|h| h.primary_ips().contains(&Some(self.ip.id)))
    }

    pub fn is_mgmt_only(&self) -> bool {
        self.interface.is_some_and(|i| i.mgmt_only)
    }

    pub fn ip_custom_field(&self, field: &str) -> Option<&'a serde_json::Value> {
        self.ip.custom_fields.get(field).filter(|v| !v.is_null())
    }
}

/// One consistent read of the inventory, indexed for lookups.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    addresses: Vec<IpAddress>,
    parents: BTreeMap<ObjectRef, InventoryObject>,
}

impl InventorySnapshot {
    pub fn new(
        mut addresses: Vec<IpAddress>,
        devices: Vec<Device>,
        virtual_machines: Vec<VirtualMachine>,
        fhrp_groups: Vec<FhrpGroup>,
    ) -> Self {
        addresses.sort_by_key(|ip| ip.id);
        let parents = devices
            .into_iter()
            .map(InventoryObject::Device)
            .chain(virtual_machines.into_iter().map(InventoryObject::VirtualMachine))
            .chain(fhrp_groups.into_iter().map(InventoryObject::FhrpGroup))
            .map(|o| (o.object_ref(), o))
            .collect();
        Self { addresses, parents }
    }

    pub async fn load(inventory: &dyn Inventory, filter: &AddressFilter) -> anyhow::Result<Self> {
        let export = inventory.export(filter).await?;
        Ok(Self::new(
            export.ip_addresses,
            export.devices,
            export.virtual_machines,
            export.fhrp_groups,
        ))
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn get(&self, object: ObjectRef) -> Option<&InventoryObject> {
        self.parents.get(&object)
    }

    /// Addresses in id order, each resolved to its interface and parent.
    pub fn addresses(&self) -> impl Iterator<Item = ResolvedAddress<'_>> {
        self.addresses.iter().map(|ip| self.resolve(ip))
    }

    pub fn resolve<'a>(&'a self, ip: &'a IpAddress) -> ResolvedAddress<'a> {
        let (interface, parent) = match &ip.assigned_object {
            Some(Assignment::DeviceInterface { device, interface }) => (
                Some(interface),
                self.get(ObjectRef { kind: ObjectKind::Device, id: *device }),
            ),
            Some(Assignment::VmInterface { virtual_machine, interface }) => (
                Some(interface),
                self.get(ObjectRef { kind: ObjectKind::VirtualMachine, id: *virtual_machine }),
            ),
            Some(Assignment::FhrpGroup { fhrp_group }) => (
                None,
                self.get(ObjectRef { kind: ObjectKind::FhrpGroup, id: *fhrp_group }),
            ),
            None => (None, None),
        };
        ResolvedAddress { ip, interface, parent }
    }
}
