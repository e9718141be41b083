//! Global sync settings, threaded explicitly into every component.
use std::fmt;
use std::time::Duration;

use crate::error::SyncError;
use crate::sync::record::DnsRecordState;

pub const DEFAULT_OWNERSHIP_COMMENT: &str = "netbox-powerdns-sync";
pub const DEFAULT_TTL: u32 = 3600;
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Decides which records on a DNS server this system may modify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipPolicy {
    /// Only rrsets carrying this comment are owned.
    Comment(String),
    /// Every A/AAAA/PTR record in a synced zone is owned, including ones
    /// created by hand or by other tools. Stale ones get deleted.
    ManageAllRecords,
}

impl OwnershipPolicy {
    pub fn is_owned(&self, record: &DnsRecordState) -> bool {
        match self {
            OwnershipPolicy::Comment(marker) => record.comments.iter().any(|c| c == marker),
            OwnershipPolicy::ManageAllRecords => true,
        }
    }

    /// Comment written onto records this system creates or updates.
    pub fn marker(&self) -> Option<&str> {
        match self {
            OwnershipPolicy::Comment(marker) => Some(marker),
            OwnershipPolicy::ManageAllRecords => None,
        }
    }

    pub fn is_dangerous(&self) -> bool {
        matches!(self, OwnershipPolicy::ManageAllRecords)
    }
}

impl Default for OwnershipPolicy {
    fn default() -> Self {
        OwnershipPolicy::Comment(DEFAULT_OWNERSHIP_COMMENT.to_string())
    }
}

impl fmt::Display for OwnershipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnershipPolicy::Comment(marker) => write!(f, "comment '{marker}'"),
            OwnershipPolicy::ManageAllRecords => f.write_str("manage-all-records (ownership check disabled)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub ownership: OwnershipPolicy,
    /// Custom field on IP addresses holding a TTL override.
    pub ttl_custom_field: Option<String>,
    /// Custom field on IP addresses holding a domain. It places PTR targets
    /// under that domain and is a zone-matching rule of its own.
    pub custom_domain_field: Option<String>,
    pub default_ttl: u32,
    /// PTR target for addresses in a reverse zone that yield no hostname.
    pub default_rdns: Option<String>,
    pub sync_on_save: bool,
    pub job_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ownership: OwnershipPolicy::default(),
            ttl_custom_field: None,
            custom_domain_field: None,
            default_ttl: DEFAULT_TTL,
            default_rdns: None,
            sync_on_save: false,
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), SyncError> {
        if let OwnershipPolicy::Comment(marker) = &self.ownership {
            if marker.trim().is_empty() {
                return Err(SyncError::configuration(
                    "ownership comment must not be empty; use the manage-all-records mode to disable the check",
                ));
            }
        }
        for (what, field) in [
            ("ttl custom field", &self.ttl_custom_field),
            ("custom domain field", &self.custom_domain_field),
        ] {
            if field.as_deref().is_some_and(|f| f.trim().is_empty()) {
                return Err(SyncError::configuration(format!("{what} name must not be empty")));
            }
        }
        if self.job_timeout.is_zero() {
            return Err(SyncError::configuration("job timeout must be greater than zero"));
        }
        if self.default_ttl == 0 {
            return Err(SyncError::configuration("default TTL must be greater than zero"));
        }
        if let Some(rdns) = &self.default_rdns {
            crate::validation::validate_fqdn(rdns)
                .map_err(|e| SyncError::configuration(format!("invalid default rDNS name '{rdns}': {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SyncConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_field_names_are_rejected() {
        let config = SyncConfig {
            ttl_custom_field: Some("  ".into()),
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(SyncError::Configuration(_))));

        let config = SyncConfig {
            ownership: OwnershipPolicy::Comment(String::new()),
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_job_timeout_is_rejected() {
        let config = SyncConfig {
            job_timeout: Duration::ZERO,
            ..SyncConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("job timeout"));
    }

    #[test]
    fn manage_all_owns_everything() {
        let record = DnsRecordState::new(
            "example.com.",
            "pdns1",
            "host.example.com.",
            crate::sync::record::RecordType::A,
            "192.0.2.1",
            300,
        );
        assert!(!OwnershipPolicy::default().is_owned(&record));
        assert!(OwnershipPolicy::ManageAllRecords.is_owned(&record));
        assert!(OwnershipPolicy::ManageAllRecords.marker().is_none());
    }
}
