//! Hostname generation from inventory data.
//!
//! A zone's [`NamingPolicy`] expands into an ordered chain of
//! [`NamingMethod`]s. The first method producing a usable name wins; if
//! none does, the address simply gets no record.
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::inventory::ResolvedAddress;
use crate::sync::record::canonical_name;
use crate::validation::{make_dns_label, make_dns_name};
use crate::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IpNamingMethod {
    /// `10.0.0.5` becomes `10-0-0-5`; IPv6 uses all eight groups.
    IpDashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceNamingMethod {
    /// Device or VM name.
    Device,
    /// Device or VM name, prefixed with the interface name unless the
    /// address is the host's primary address.
    DeviceInterface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FhrpNamingMethod {
    GroupName,
    /// `vrrp2-10` from protocol and group id.
    ProtocolGroupId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingPolicy {
    #[serde(default)]
    pub ip_method: Option<IpNamingMethod>,
    #[serde(default)]
    pub device_method: Option<DeviceNamingMethod>,
    #[serde(default)]
    pub fhrp_group_method: Option<FhrpNamingMethod>,
    /// Prepended to the host label of device/VM names.
    #[serde(default)]
    pub label_prefix: String,
    /// Appended to the host label of device/VM names.
    #[serde(default)]
    pub label_suffix: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingMethod {
    ExplicitDnsName,
    Ip(IpNamingMethod),
    Device(DeviceNamingMethod),
    FhrpGroup(FhrpNamingMethod),
}

impl NamingPolicy {
    /// Explicit DNS name first, then IP, device and FHRP-group methods.
    pub fn chain(&self) -> Vec<NamingMethod> {
        let mut chain = vec![NamingMethod::ExplicitDnsName];
        chain.extend(self.ip_method.map(NamingMethod::Ip));
        chain.extend(self.device_method.map(NamingMethod::Device));
        chain.extend(self.fhrp_group_method.map(NamingMethod::FhrpGroup));
        chain
    }
}

/// Fully qualify `name` inside `zone`.
pub fn qualify(name: &str, zone: &Zone) -> String {
    if zone.contains_name(name) {
        canonical_name(name)
    } else {
        canonical_name(&format!("{}.{}", name.trim_end_matches('.'), zone.root()))
    }
}

fn dashed(address: &IpAddr) -> String {
    match address {
        IpAddr::V4(v4) => v4
            .octets()
            .iter()
            .map(u8::to_string)
            .collect::<Vec<_>>()
            .join("-"),
        IpAddr::V6(v6) => v6
            .segments()
            .iter()
            .map(|s| format!("{s:04x}"))
            .collect::<Vec<_>>()
            .join("-"),
    }
}

fn with_affixes(host: &str, policy: &NamingPolicy) -> String {
    let mut labels = host.split('.');
    let first = labels.next().unwrap_or_default();
    let decorated = make_dns_label(&format!(
        "{}{}{}",
        policy.label_prefix, first, policy.label_suffix
    ));
    std::iter::once(decorated)
        .chain(labels.map(str::to_string))
        .collect::<Vec<_>>()
        .join(".")
}

/// Apply one naming method. Returns a relative or absolute name, not yet
/// qualified.
pub fn generate(addr: &ResolvedAddress<'_>, method: NamingMethod, zone: &Zone) -> Option<String> {
    let name = match method {
        NamingMethod::ExplicitDnsName => {
            let explicit = make_dns_name(addr.ip.dns_name.as_deref()?);
            // A multi-label name outside the zone belongs to another zone.
            if explicit.contains('.') && !zone.contains_name(&explicit) {
                return None;
            }
            explicit
        }
        NamingMethod::Ip(IpNamingMethod::IpDashed) => dashed(&addr.ip.address),
        NamingMethod::Device(device_method) => {
            let host = make_dns_name(addr.host()?.name()?);
            if host.is_empty() {
                return None;
            }
            let host = with_affixes(&host, &zone.naming);
            match (device_method, addr.interface) {
                (DeviceNamingMethod::DeviceInterface, Some(interface)) if !addr.is_primary_for_host() => {
                    let label = make_dns_label(&interface.name);
                    if label.is_empty() {
                        host
                    } else {
                        format!("{label}.{host}")
                    }
                }
                _ => host,
            }
        }
        NamingMethod::FhrpGroup(FhrpNamingMethod::GroupName) => {
            make_dns_name(addr.fhrp_group()?.name.as_deref()?)
        }
        NamingMethod::FhrpGroup(FhrpNamingMethod::ProtocolGroupId) => {
            let group = addr.fhrp_group()?;
            make_dns_label(&format!("{}-{}", group.protocol, group.group_id))
        }
    };
    Some(name).filter(|n| !n.is_empty())
}

/// Run the zone's naming chain and qualify the first result.
pub fn generate_fqdn(addr: &ResolvedAddress<'_>, zone: &Zone) -> Option<String> {
    zone.naming
        .chain()
        .into_iter()
        .find_map(|method| generate(addr, method, zone))
        .map(|name| qualify(&name, zone))
}
