use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::inventory::ObjectRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "PTR")]
    Ptr,
}

impl RecordType {
    pub fn for_address(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => RecordType::A,
            IpAddr::V6(_) => RecordType::Aaaa,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Ptr => "PTR",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ();

    /// Only the types this system manages parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::Aaaa),
            "PTR" => Ok(RecordType::Ptr),
            _ => Err(()),
        }
    }
}

/// Lowercased, trimmed, dot-terminated.
pub fn canonical_name(name: &str) -> String {
    let trimmed = name.trim().trim_end_matches('.').to_ascii_lowercase();
    format!("{trimmed}.")
}

/// Reverse lookup name for an address, e.g. `5.0.0.10.in-addr.arpa.`
pub fn reverse_name(address: &IpAddr) -> String {
    match address {
        IpAddr::V4(v4) => {
            let o = v4.octets();
            format!("{}.{}.{}.{}.in-addr.arpa.", o[3], o[2], o[1], o[0])
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(*v6);
            let mut out = String::with_capacity(72);
            for i in 0..32 {
                let nibble = (bits >> (4 * i)) & 0xf;
                out.push_str(&format!("{nibble:x}."));
            }
            out.push_str("ip6.arpa.");
            out
        }
    }
}

/// Normalised key a diff matches records on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    pub zone: String,
    pub name: String,
    pub rtype: RecordType,
}

/// One record on either side of a diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsRecordState {
    pub zone: String,
    pub server: String,
    pub name: String,
    pub rtype: RecordType,
    pub value: String,
    pub ttl: u32,
    /// Comments on the rrset as read from the server.
    #[serde(default)]
    pub comments: Vec<String>,
    /// Inventory object a desired record was planned from.
    #[serde(skip)]
    pub origin: Option<ObjectRef>,
}

impl DnsRecordState {
    pub fn new(
        zone: impl Into<String>,
        server: impl Into<String>,
        name: impl Into<String>,
        rtype: RecordType,
        value: impl Into<String>,
        ttl: u32,
    ) -> Self {
        Self {
            zone: zone.into(),
            server: server.into(),
            name: name.into(),
            rtype,
            value: value.into(),
            ttl,
            comments: Vec::new(),
            origin: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comments.push(comment.into());
        self
    }

    pub fn on_server(&self, server: &str) -> Self {
        Self {
            server: server.to_string(),
            ..self.clone()
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            zone: canonical_name(&self.zone),
            name: canonical_name(&self.name),
            rtype: self.rtype,
        }
    }

    /// Value in a form where equal data compares equal, whatever case,
    /// trailing dot or address notation the server used.
    pub fn normalized_value(&self) -> String {
        match self.rtype {
            RecordType::A | RecordType::Aaaa => match self.value.trim().parse::<IpAddr>() {
                Ok(address) => address.to_string(),
                Err(_) => self.value.trim().to_ascii_lowercase(),
            },
            RecordType::Ptr => canonical_name(&self.value),
        }
    }

    pub fn same_content(&self, other: &DnsRecordState) -> bool {
        self.key() == other.key()
            && self.ttl == other.ttl
            && self.normalized_value() == other.normalized_value()
    }
}

impl fmt::Display for DnsRecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} IN {} {}",
            canonical_name(&self.name),
            self.ttl,
            self.rtype,
            self.value
        )
    }
}

/// A record the planner considers for one inventory address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRecord {
    pub object: ObjectRef,
    pub rtype: RecordType,
    /// Fully qualified, dot-terminated host name.
    pub hostname: String,
    pub address: IpAddr,
    pub ttl: u32,
    /// Zone id the matcher assigned, if any.
    pub zone: Option<i64>,
}

impl CandidateRecord {
    pub fn record_name(&self) -> String {
        match self.rtype {
            RecordType::Ptr => reverse_name(&self.address),
            _ => self.hostname.clone(),
        }
    }

    pub fn record_value(&self) -> String {
        match self.rtype {
            RecordType::Ptr => self.hostname.clone(),
            _ => self.address.to_string(),
        }
    }

    /// Desired-side state for this candidate; the server is filled in
    /// when records are replicated per API server.
    pub fn to_state(&self, zone_name: &str) -> DnsRecordState {
        DnsRecordState {
            origin: Some(self.object),
            ..DnsRecordState::new(
                zone_name,
                "",
                self.record_name(),
                self.rtype,
                self.record_value(),
                self.ttl,
            )
        }
    }
}
