//! Zone and API server configuration as operators define it.
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use serde::{Deserialize, Serialize};

use crate::config::OwnershipPolicy;
use crate::powerdns::client::PowerDnsClient;
use crate::sync::naming::NamingPolicy;

fn default_true() -> bool {
    true
}

fn default_server_id() -> String {
    "localhost".to_string()
}

/// A PowerDNS API endpoint zones can be synced to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiServer {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub api_url: String, // e.g. "http://127.0.0.1:8081/api/v1"
    /// Write-only; an update without one keeps the stored token.
    #[serde(default, skip_serializing)]
    pub api_token: String,
    #[serde(default = "default_server_id")]
    pub server_id: String,
}

impl ApiServer {
    pub fn new(
        id: i64,
        name: impl Into<String>,
        api_url: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            enabled: true,
            api_url: api_url.into(),
            api_token: api_token.into(),
            server_id: default_server_id(),
        }
    }

    /// Open a fresh client session for one sync run.
    pub fn connect(&self) -> PowerDnsClient {
        PowerDnsClient::new(
            self.name.clone(),
            self.api_url.trim_end_matches('/'),
            &self.api_token,
            &self.server_id,
        )
    }
}

impl fmt::Display for ApiServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default)]
    pub id: i64,
    /// Canonical zone name with trailing dot, e.g. `example.com.`
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub is_default: bool,
    /// Lower values win ties between otherwise equal matches.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub default_ttl: Option<u32>,
    /// When false, every A/AAAA/PTR record in this zone counts as managed.
    #[serde(default = "default_true")]
    pub check_ownership: bool,
    #[serde(default)]
    pub match_ipaddress_tags: Vec<String>,
    #[serde(default)]
    pub match_interface_tags: Vec<String>,
    #[serde(default)]
    pub match_device_tags: Vec<String>,
    #[serde(default)]
    pub match_fhrpgroup_tags: Vec<String>,
    #[serde(default)]
    pub match_device_roles: Vec<String>,
    #[serde(default)]
    pub match_interface_mgmt_only: bool,
    #[serde(default)]
    pub naming: NamingPolicy,
    #[serde(default)]
    pub api_servers: Vec<i64>,
    /// `None` means manual syncs only.
    #[serde(default)]
    pub sync_interval_minutes: Option<u32>,
}

impl Zone {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            enabled: true,
            is_default: false,
            priority: 0,
            default_ttl: None,
            check_ownership: true,
            match_ipaddress_tags: Vec::new(),
            match_interface_tags: Vec::new(),
            match_device_tags: Vec::new(),
            match_fhrpgroup_tags: Vec::new(),
            match_device_roles: Vec::new(),
            match_interface_mgmt_only: false,
            naming: NamingPolicy::default(),
            api_servers: Vec::new(),
            sync_interval_minutes: None,
        }
    }

    /// Lowercased zone name without trailing dot.
    pub fn root(&self) -> String {
        self.name.trim_end_matches('.').to_ascii_lowercase()
    }

    pub fn is_reverse(&self) -> bool {
        let root = self.root();
        root == "in-addr.arpa"
            || root == "ip6.arpa"
            || root.ends_with(".in-addr.arpa")
            || root.ends_with(".ip6.arpa")
    }

    /// Whether `name` is the zone apex or lies below it, label-aligned.
    pub fn contains_name(&self, name: &str) -> bool {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        let root = self.root();
        name == root || name.ends_with(&format!(".{root}"))
    }

    /// Number of labels in the zone name; more labels is more specific.
    pub fn depth(&self) -> usize {
        self.root().split('.').filter(|l| !l.is_empty()).count()
    }

    /// Network covered by a reverse zone, if it is one and it is octet
    /// or nibble aligned.
    pub fn reverse_network(&self) -> Option<IpNet> {
        let root = self.root();
        if let Some(rest) = root.strip_suffix("in-addr.arpa") {
            let labels: Vec<&str> = rest.trim_end_matches('.').split('.').filter(|l| !l.is_empty()).collect();
            if labels.is_empty() || labels.len() > 4 {
                return None;
            }
            let mut octets = [0u8; 4];
            for (i, label) in labels.iter().rev().enumerate() {
                octets[i] = label.parse().ok()?;
            }
            let prefix = (labels.len() * 8) as u8;
            return Ipv4Net::new(Ipv4Addr::from(octets), prefix).ok().map(IpNet::V4);
        }
        if let Some(rest) = root.strip_suffix("ip6.arpa") {
            let nibbles: Vec<&str> = rest.trim_end_matches('.').split('.').filter(|l| !l.is_empty()).collect();
            if nibbles.is_empty() || nibbles.len() > 32 {
                return None;
            }
            let mut bits: u128 = 0;
            for (i, nibble) in nibbles.iter().rev().enumerate() {
                if nibble.len() != 1 {
                    return None;
                }
                let value = u128::from_str_radix(nibble, 16).ok()?;
                bits |= value << (124 - 4 * i);
            }
            let prefix = (nibbles.len() * 4) as u8;
            return Ipv6Net::new(Ipv6Addr::from(bits), prefix).ok().map(IpNet::V6);
        }
        None
    }

    pub fn covers_address(&self, address: IpAddr) -> bool {
        self.reverse_network().is_some_and(|net| net.contains(&address))
    }

    /// Ownership rule for this zone's records under the global policy.
    pub fn ownership(&self, global: &OwnershipPolicy) -> OwnershipPolicy {
        if self.check_ownership {
            global.clone()
        } else {
            OwnershipPolicy::ManageAllRecords
        }
    }

    /// Deterministic priority order: priority, then id.
    pub fn priority_key(&self) -> (i32, i64) {
        (self.priority, self.id)
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
