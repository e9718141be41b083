pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::DnsApiError;
use crate::sync::record::DnsRecordState;

/// Record-level capability over one authoritative DNS server.
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Operator-facing name used in job output.
    fn server_name(&self) -> &str;

    /// A/AAAA/PTR records of a zone, with their rrset comments.
    async fn list_records(&self, zone: &str) -> Result<Vec<DnsRecordState>, DnsApiError>;

    /// Replace the rrset at the record's name and type with this record,
    /// carrying the record's comments.
    async fn upsert_record(&self, zone: &str, record: &DnsRecordState) -> Result<(), DnsApiError>;

    async fn delete_record(&self, zone: &str, record: &DnsRecordState) -> Result<(), DnsApiError>;
}
