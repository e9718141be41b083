//! Zone assignment for inventory addresses.
//!
//! Forward zones are chosen by walking [`FORWARD_RULES`] in order; the
//! first rule that yields a zone wins. Zones restricted to management-only
//! interfaces are removed from the candidate set up front, so they can
//! never be reached through any rule for a regular interface.
use std::cmp::Reverse;
use std::fmt;

use crate::config::SyncConfig;
use crate::inventory::ResolvedAddress;
use crate::sync::record::reverse_name;
use crate::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    DnsName,
    HostName,
    FhrpGroupName,
    IpAddressTag,
    InterfaceTag,
    HostTag,
    FhrpGroupTag,
    HostRole,
    CustomDomain,
    DefaultZone,
}

/// Evaluation order for forward zones.
pub const FORWARD_RULES: [MatchRule; 10] = [
    MatchRule::DnsName,
    MatchRule::HostName,
    MatchRule::FhrpGroupName,
    MatchRule::IpAddressTag,
    MatchRule::InterfaceTag,
    MatchRule::HostTag,
    MatchRule::FhrpGroupTag,
    MatchRule::HostRole,
    MatchRule::CustomDomain,
    MatchRule::DefaultZone,
];

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchRule::DnsName => "dns name",
            MatchRule::HostName => "device/vm name",
            MatchRule::FhrpGroupName => "fhrp group name",
            MatchRule::IpAddressTag => "ip address tag",
            MatchRule::InterfaceTag => "interface tag",
            MatchRule::HostTag => "device/vm tag",
            MatchRule::FhrpGroupTag => "fhrp group tag",
            MatchRule::HostRole => "device/vm role",
            MatchRule::CustomDomain => "custom domain",
            MatchRule::DefaultZone => "default zone",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ZoneMatch<'z> {
    pub zone: &'z Zone,
    pub rule: MatchRule,
}

fn intersects(have: &[String], want: &[String]) -> bool {
    have.iter()
        .any(|h| want.iter().any(|w| w.eq_ignore_ascii_case(h)))
}

pub struct ZoneMatcher<'z> {
    /// Enabled zones in priority order.
    zones: Vec<&'z Zone>,
    custom_domain_field: Option<String>,
}

impl<'z> ZoneMatcher<'z> {
    pub fn new(zones: &'z [Zone], config: &SyncConfig) -> Self {
        let mut zones: Vec<&Zone> = zones.iter().filter(|z| z.enabled).collect();
        zones.sort_by_key(|z| z.priority_key());
        Self {
            zones,
            custom_domain_field: config.custom_domain_field.clone(),
        }
    }

    fn eligible(&self, addr: &ResolvedAddress<'_>, reverse: bool) -> Vec<&'z Zone> {
        self.zones
            .iter()
            .copied()
            .filter(|z| z.is_reverse() == reverse)
            .filter(|z| !z.match_interface_mgmt_only || addr.is_mgmt_only())
            .collect()
    }

    /// Most specific zone containing `name`, priority order on ties.
    fn best_by_suffix(name: &str, eligible: &[&'z Zone]) -> Option<&'z Zone> {
        eligible
            .iter()
            .copied()
            .filter(|z| z.contains_name(name))
            .min_by_key(|z| (Reverse(z.depth()), z.priority_key()))
    }

    fn first_tagged(
        eligible: &[&'z Zone],
        have: &[String],
        want: fn(&Zone) -> &[String],
    ) -> Option<&'z Zone> {
        if have.is_empty() {
            return None;
        }
        eligible.iter().copied().find(|z| intersects(have, want(z)))
    }

    fn apply(&self, rule: MatchRule, addr: &ResolvedAddress<'_>, eligible: &[&'z Zone]) -> Option<&'z Zone> {
        match rule {
            MatchRule::DnsName => Self::best_by_suffix(addr.ip.dns_name.as_deref()?, eligible),
            MatchRule::HostName => Self::best_by_suffix(addr.host()?.name()?, eligible),
            MatchRule::FhrpGroupName => {
                Self::best_by_suffix(addr.fhrp_group()?.name.as_deref()?, eligible)
            }
            MatchRule::IpAddressTag => {
                Self::first_tagged(eligible, &addr.ip.tags, |z| z.match_ipaddress_tags.as_slice())
            }
            MatchRule::InterfaceTag => {
                Self::first_tagged(eligible, &addr.interface?.tags, |z| z.match_interface_tags.as_slice())
            }
            MatchRule::HostTag => {
                Self::first_tagged(eligible, addr.host()?.tags(), |z| z.match_device_tags.as_slice())
            }
            MatchRule::FhrpGroupTag => {
                Self::first_tagged(eligible, &addr.fhrp_group()?.tags, |z| z.match_fhrpgroup_tags.as_slice())
            }
            MatchRule::HostRole => {
                let role = addr.host()?.role()?;
                eligible
                    .iter()
                    .copied()
                    .find(|z| z.match_device_roles.iter().any(|r| r.eq_ignore_ascii_case(role)))
            }
            MatchRule::CustomDomain => {
                let field = self.custom_domain_field.as_deref()?;
                let domain = addr.ip_custom_field(field)?.as_str()?;
                Self::best_by_suffix(domain, eligible)
            }
            MatchRule::DefaultZone => eligible.iter().copied().find(|z| z.is_default),
        }
    }

    /// Forward zone for an address, with the rule that selected it.
    pub fn match_forward(&self, addr: &ResolvedAddress<'_>) -> Option<ZoneMatch<'z>> {
        let eligible = self.eligible(addr, false);
        if eligible.is_empty() {
            return None;
        }
        FORWARD_RULES.iter().find_map(|&rule| {
            self.apply(rule, addr, &eligible)
                .map(|zone| ZoneMatch { zone, rule })
        })
    }

    /// Most specific reverse zone holding the address's PTR name.
    pub fn match_reverse(&self, addr: &ResolvedAddress<'_>) -> Option<&'z Zone> {
        let eligible = self.eligible(addr, true);
        Self::best_by_suffix(&reverse_name(&addr.ip.address), &eligible)
    }
}
