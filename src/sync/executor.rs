//! Applies an operation list against the DNS API, in list order.
use serde::Serialize;

use crate::config::OwnershipPolicy;
use crate::jobs::{JobLog, JobStatus, OutputEntry};
use crate::powerdns::DnsApi;
use crate::sync::diff::{Action, Operation, OperationList};
use crate::sync::record::DnsRecordState;
use crate::zone::Zone;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub status: JobStatus,
    pub applied: usize,
    pub failed: usize,
    pub not_attempted: usize,
}

impl SyncResult {
    pub fn completed() -> Self {
        Self {
            status: JobStatus::Completed,
            applied: 0,
            failed: 0,
            not_attempted: 0,
        }
    }

    pub fn failed() -> Self {
        Self {
            status: JobStatus::Failed,
            ..Self::completed()
        }
    }
}

pub struct SyncExecutor<'a> {
    clients: &'a [Box<dyn DnsApi>],
    ownership: &'a OwnershipPolicy,
}

impl<'a> SyncExecutor<'a> {
    pub fn new(clients: &'a [Box<dyn DnsApi>], ownership: &'a OwnershipPolicy) -> Self {
        Self { clients, ownership }
    }

    fn client_for(&self, server: &str) -> Option<&dyn DnsApi> {
        self.clients
            .iter()
            .find(|c| c.server_name().eq_ignore_ascii_case(server))
            .map(|c| c.as_ref())
    }

    /// The record as written: comments are replaced by the ownership
    /// marker, or cleared when ownership checking is off.
    fn outgoing(&self, op: &Operation) -> DnsRecordState {
        DnsRecordState {
            comments: self.ownership.marker().map(str::to_string).into_iter().collect(),
            ..op.record.clone()
        }
    }

    pub async fn execute(&self, zone: &Zone, ops: &OperationList, log: &mut JobLog) -> SyncResult {
        let mut result = SyncResult::completed();

        for (index, op) in ops.iter().enumerate() {
            let server = op.record.server.as_str();
            let Some(client) = self.client_for(server) else {
                log.error(format!(
                    "{} {} ({}) failed: no API client for server {server}",
                    op.action, op.record, op.attribution
                ));
                result.failed += 1;
                continue;
            };

            let record = self.outgoing(op);
            let outcome = match op.action {
                Action::Create | Action::Update => client.upsert_record(&zone.name, &record).await,
                Action::Delete => client.delete_record(&zone.name, &record).await,
            };

            match outcome {
                Ok(()) => {
                    log.info(format!("{} {record} on {server} ({})", op.action, op.attribution));
                    log.output(OutputEntry {
                        action: op.action,
                        zone: zone.name.clone(),
                        server: client.server_name().to_string(),
                        rr: record.to_string(),
                    });
                    result.applied += 1;
                }
                Err(err) if err.is_fatal() => {
                    log.fatal(format!(
                        "aborting sync of zone {zone}: {} {record} on {server} ({}) failed: {err}",
                        op.action, op.attribution
                    ));
                    for rest in &ops[index + 1..] {
                        log.warning(format!("not attempted: {rest}"));
                        result.not_attempted += 1;
                    }
                    result.status = JobStatus::Failed;
                    return result;
                }
                Err(err) => {
                    log.error(format!(
                        "{} {record} on {server} ({}) failed: {err}",
                        op.action, op.attribution
                    ));
                    result.failed += 1;
                }
            }
        }

        result
    }
}
