use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct PdnsZone {
    pub id: String,   // "/api/.../zones/example.com."
    pub name: String, // "example.com."
    #[serde(rename = "type", default)]
    pub zone_type: Option<String>, // "Zone"
    #[serde(default)]
    pub kind: String, // "Native", etc.
    pub rrsets: Option<Vec<PdnsRrset>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdnsRrset {
    pub name: String, // "www.example.com."
    #[serde(rename = "type")]
    pub rrtype: String, // "A", "PTR", ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>, // absent on DELETE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changetype: Option<String>, // "REPLACE" / "DELETE" when patching
    #[serde(default)]
    pub records: Vec<PdnsRecord>,
    #[serde(default)]
    pub comments: Vec<PdnsComment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdnsRecord {
    pub content: String, // "192.0.2.1" or "host.example.com."
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdnsComment {
    pub content: String,
    #[serde(default)]
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_at: Option<i64>, // unix time, set by the server
}

/// Error body PowerDNS returns alongside non-2xx statuses.
#[derive(Debug, Deserialize)]
pub struct PdnsError {
    pub error: String,
}
