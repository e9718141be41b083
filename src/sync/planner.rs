//! Desired record set computation.
use std::collections::HashMap;

use tracing::debug;

use crate::config::SyncConfig;
use crate::inventory::{InventorySnapshot, ObjectKind, ObjectRef, ResolvedAddress};
use crate::sync::matcher::ZoneMatcher;
use crate::sync::naming::generate_fqdn;
use crate::sync::record::{canonical_name, CandidateRecord, DnsRecordState, RecordKey, RecordType};
use crate::zone::Zone;

/// An address that produced no record, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exclusion {
    pub object: ObjectRef,
    pub reason: String,
}

/// Two objects claiming the same (zone, name, type) with different data.
#[derive(Debug, Clone)]
pub struct PlanConflict {
    pub key: RecordKey,
    pub kept: DnsRecordState,
    pub skipped: DnsRecordState,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub candidates: Vec<CandidateRecord>,
    pub excluded: Vec<Exclusion>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Plan {
    /// Desired records for the zone, in planning order, not yet bound to
    /// a server.
    pub records: Vec<DnsRecordState>,
    pub conflicts: Vec<PlanConflict>,
    pub excluded: Vec<Exclusion>,
    pub warnings: Vec<String>,
}

pub struct RecordPlanner<'a> {
    config: &'a SyncConfig,
    matcher: ZoneMatcher<'a>,
}

impl<'a> RecordPlanner<'a> {
    pub fn new(zones: &'a [Zone], config: &'a SyncConfig) -> Self {
        Self {
            config,
            matcher: ZoneMatcher::new(zones, config),
        }
    }

    fn custom_ttl(&self, addr: &ResolvedAddress<'_>, warnings: &mut Vec<String>) -> Option<u32> {
        let field = self.config.ttl_custom_field.as_deref()?;
        let value = addr.ip_custom_field(field)?;
        let ttl = value
            .as_u64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0);
        if ttl.is_none() {
            warnings.push(format!(
                "ignoring invalid TTL {value} in custom field '{field}' of IP {}",
                addr.ip.address
            ));
        }
        ttl
    }

    fn custom_domain<'s>(&self, addr: &ResolvedAddress<'s>) -> Option<&'s str> {
        let field = self.config.custom_domain_field.as_deref()?;
        addr.ip_custom_field(field)?
            .as_str()
            .map(|d| d.trim().trim_end_matches('.'))
            .filter(|d| !d.is_empty())
    }

    /// PTR target for an address. A custom domain replaces the forward
    /// zone of the generated name: `web01.example.com.` under `lab.example`
    /// becomes `web01.lab.example.`.
    fn ptr_target(&self, addr: &ResolvedAddress<'_>, forward: Option<&Zone>, fqdn: Option<&str>) -> Option<String> {
        let Some(fqdn) = fqdn else {
            return self.config.default_rdns.as_deref().map(canonical_name);
        };
        let Some(domain) = self.custom_domain(addr) else {
            return Some(fqdn.to_string());
        };
        let name = fqdn.trim_end_matches('.');
        let domain = domain.to_ascii_lowercase();
        if name == domain || name.ends_with(&format!(".{domain}")) {
            return Some(canonical_name(name));
        }
        let host = forward
            .and_then(|zone| name.strip_suffix(&format!(".{}", zone.root())))
            .unwrap_or(name);
        Some(canonical_name(&format!("{host}.{domain}")))
    }

    fn zone_ttl(&self, custom: Option<u32>, zone: &Zone) -> u32 {
        custom
            .or(zone.default_ttl)
            .unwrap_or(self.config.default_ttl)
    }

    /// Every record the inventory implies, across all zones.
    pub fn candidates(&self, snapshot: &InventorySnapshot) -> CandidateSet {
        let mut set = CandidateSet::default();

        for addr in snapshot.addresses() {
            let object = ObjectRef { kind: ObjectKind::IpAddress, id: addr.ip.id };
            let custom_ttl = self.custom_ttl(&addr, &mut set.warnings);

            let forward = self.matcher.match_forward(&addr);
            let fqdn = forward.and_then(|m| generate_fqdn(&addr, m.zone));

            match (forward, &fqdn) {
                (Some(m), Some(hostname)) => {
                    debug!("{} matched zone {} by {}", addr.ip.address, m.zone, m.rule);
                    set.candidates.push(CandidateRecord {
                        object,
                        rtype: RecordType::for_address(&addr.ip.address),
                        hostname: hostname.clone(),
                        address: addr.ip.address,
                        ttl: self.zone_ttl(custom_ttl, m.zone),
                        zone: Some(m.zone.id),
                    });
                }
                (Some(m), None) => set.excluded.push(Exclusion {
                    object,
                    reason: format!("no hostname could be determined for IP {} (zone {})", addr.ip.address, m.zone),
                }),
                (None, _) => set.excluded.push(Exclusion {
                    object,
                    reason: format!("no matching forward zone for IP {}", addr.ip.address),
                }),
            }

            let target = self.ptr_target(&addr, forward.map(|m| m.zone), fqdn.as_deref());
            let Some(target) = target else {
                continue;
            };
            let reverse = self.matcher.match_reverse(&addr);
            if reverse.is_none() {
                set.excluded.push(Exclusion {
                    object,
                    reason: format!("no matching reverse zone for IP {} ({target})", addr.ip.address),
                });
            }
            set.candidates.push(CandidateRecord {
                object,
                rtype: RecordType::Ptr,
                hostname: target,
                address: addr.ip.address,
                ttl: match reverse {
                    Some(zone) => self.zone_ttl(custom_ttl, zone),
                    None => custom_ttl.unwrap_or(self.config.default_ttl),
                },
                zone: reverse.map(|z| z.id),
            });
        }

        set
    }

    /// Desired records belonging to `zone`.
    pub fn plan(&self, zone: &Zone, snapshot: &InventorySnapshot) -> Plan {
        let set = self.candidates(snapshot);
        let mut plan = Plan {
            warnings: set.warnings,
            excluded: set.excluded,
            ..Plan::default()
        };
        let mut seen: HashMap<RecordKey, usize> = HashMap::new();

        for candidate in set.candidates.iter().filter(|c| c.zone == Some(zone.id)) {
            let state = candidate.to_state(&zone.name);
            let key = state.key();
            match seen.get(&key) {
                Some(&index) => {
                    let kept = &plan.records[index];
                    if kept.normalized_value() != state.normalized_value() {
                        plan.conflicts.push(PlanConflict {
                            key,
                            kept: kept.clone(),
                            skipped: state,
                        });
                    }
                }
                None => {
                    seen.insert(key, plan.records.len());
                    plan.records.push(state);
                }
            }
        }

        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Assignment, CustomFields, Device, Interface, IpAddress};
    use crate::sync::naming::{DeviceNamingMethod, NamingPolicy};

    fn ip(id: i64, address: &str, device: i64) -> IpAddress {
        IpAddress {
            id,
            address: address.parse().unwrap(),
            dns_name: None,
            tags: vec![],
            custom_fields: CustomFields::new(),
            assigned_object: Some(Assignment::DeviceInterface {
                device,
                interface: Interface { id: id * 10, name: "eth0".into(), tags: vec![], mgmt_only: false },
            }),
        }
    }

    fn device(id: i64, name: &str) -> Device {
        Device {
            id,
            name: name.into(),
            role: None,
            tags: vec![],
            custom_fields: CustomFields::new(),
            primary_ip4: None,
            primary_ip6: None,
        }
    }

    fn zones() -> Vec<Zone> {
        let mut forward = Zone::new(1, "example.com.");
        forward.default_ttl = Some(3600);
        forward.naming = NamingPolicy {
            device_method: Some(DeviceNamingMethod::Device),
            ..NamingPolicy::default()
        };
        let reverse = Zone::new(2, "0.0.10.in-addr.arpa.");
        vec![forward, reverse]
    }

    #[test]
    fn device_suffix_yields_forward_and_ptr() {
        let zones = zones();
        let config = SyncConfig::default();
        let planner = RecordPlanner::new(&zones, &config);
        let snapshot = InventorySnapshot::new(vec![ip(1, "10.0.0.5/24", 1)], vec![device(1, "web01.example.com")], vec![], vec![]);

        let forward = planner.plan(&zones[0], &snapshot);
        assert_eq!(forward.records.len(), 1);
        assert_eq!(forward.records[0].to_string(), "web01.example.com. 3600 IN A 10.0.0.5");

        let reverse = planner.plan(&zones[1], &snapshot);
        assert_eq!(reverse.records.len(), 1);
        let ptr = &reverse.records[0];
        assert_eq!(ptr.name, "5.0.0.10.in-addr.arpa.");
        assert_eq!(ptr.value, "web01.example.com.");
        assert_eq!(ptr.ttl, config.default_ttl);
        assert!(reverse.conflicts.is_empty());
    }

    #[test]
    fn custom_ttl_overrides_zone_default() {
        let zones = zones();
        let config = SyncConfig {
            ttl_custom_field: Some("dns_ttl".into()),
            ..SyncConfig::default()
        };
        let planner = RecordPlanner::new(&zones, &config);
        let mut custom = ip(1, "10.0.0.5", 1);
        custom.custom_fields.insert("dns_ttl".into(), serde_json::json!(300));
        let plain = ip(2, "10.0.0.6", 2);
        let snapshot = InventorySnapshot::new(
            vec![custom, plain],
            vec![device(1, "web01.example.com"), device(2, "web02.example.com")],
            vec![],
            vec![],
        );

        let plan = planner.plan(&zones[0], &snapshot);
        let ttls: Vec<_> = plan.records.iter().map(|r| (r.name.as_str(), r.ttl)).collect();
        assert_eq!(ttls, vec![("web01.example.com.", 300), ("web02.example.com.", 3600)]);
    }

    #[test]
    fn invalid_custom_ttl_is_reported_and_ignored() {
        let zones = zones();
        let config = SyncConfig {
            ttl_custom_field: Some("dns_ttl".into()),
            ..SyncConfig::default()
        };
        let planner = RecordPlanner::new(&zones, &config);
        let mut bad = ip(1, "10.0.0.5", 1);
        bad.custom_fields.insert("dns_ttl".into(), serde_json::json!("soon"));
        let snapshot = InventorySnapshot::new(vec![bad], vec![device(1, "web01.example.com")], vec![], vec![]);
        let plan = planner.plan(&zones[0], &snapshot);
        assert_eq!(plan.records[0].ttl, 3600);
        assert_eq!(plan.warnings.len(), 1);
    }

    #[test]
    fn duplicate_names_keep_first_and_report() {
        let zones = zones();
        let config = SyncConfig::default();
        let planner = RecordPlanner::new(&zones, &config);
        // Input order is reversed on purpose; planning follows object id.
        let snapshot = InventorySnapshot::new(
            vec![ip(2, "10.0.0.6", 1), ip(1, "10.0.0.5", 1)],
            vec![device(1, "web01.example.com")],
            vec![],
            vec![],
        );
        let plan = planner.plan(&zones[0], &snapshot);
        assert_eq!(plan.records.len(), 1);
        assert_eq!(plan.records[0].value, "10.0.0.5");
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.conflicts[0].skipped.value, "10.0.0.6");
    }

    #[test]
    fn unmatched_addresses_are_excluded() {
        let zones = zones();
        let config = SyncConfig::default();
        let planner = RecordPlanner::new(&zones, &config);
        let snapshot = InventorySnapshot::new(vec![ip(1, "192.0.2.1", 9)], vec![], vec![], vec![]);
        let set = planner.candidates(&snapshot);
        assert!(set.candidates.is_empty());
        assert_eq!(set.excluded.len(), 1);
    }

    #[test]
    fn custom_domain_moves_ptr_target() {
        let zones = zones();
        let config = SyncConfig {
            custom_domain_field: Some("dns_domain".into()),
            ..SyncConfig::default()
        };
        let planner = RecordPlanner::new(&zones, &config);
        let mut lab = ip(1, "10.0.0.5", 1);
        lab.custom_fields.insert("dns_domain".into(), serde_json::json!("Lab.Example."));
        let mut same = ip(2, "10.0.0.6", 2);
        same.custom_fields.insert("dns_domain".into(), serde_json::json!("example.com"));
        let plain = ip(3, "10.0.0.7", 3);
        let snapshot = InventorySnapshot::new(
            vec![lab, same, plain],
            vec![
                device(1, "web01.example.com"),
                device(2, "web02.example.com"),
                device(3, "web03.example.com"),
            ],
            vec![],
            vec![],
        );

        let reverse = planner.plan(&zones[1], &snapshot);
        let targets: Vec<_> = reverse.records.iter().map(|r| r.value.as_str()).collect();
        assert_eq!(targets, vec!["web01.lab.example.", "web02.example.com.", "web03.example.com."]);

        let forward = planner.plan(&zones[0], &snapshot);
        assert_eq!(forward.records[0].name, "web01.example.com.");
    }

    #[test]
    fn default_rdns_fills_ptr_without_hostname() {
        let zones = zones();
        let config = SyncConfig {
            default_rdns: Some("unassigned.example.com".into()),
            ..SyncConfig::default()
        };
        let planner = RecordPlanner::new(&zones, &config);
        let snapshot = InventorySnapshot::new(vec![ip(1, "10.0.0.9", 9)], vec![], vec![], vec![]);
        let plan = planner.plan(&zones[1], &snapshot);
        assert_eq!(plan.records.len(), 1);
        assert_eq!(plan.records[0].value, "unassigned.example.com.");
    }
}
