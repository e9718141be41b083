//! The reconciliation engine: inventory in, DNS operations out.
pub mod diff;
pub mod executor;
pub mod matcher;
pub mod naming;
pub mod planner;
pub mod record;

use crate::config::SyncConfig;
use crate::inventory::{AddressFilter, Inventory, InventorySnapshot};
use crate::jobs::{JobLog, JobStatus};
use crate::powerdns::DnsApi;
use crate::sync::executor::{SyncExecutor, SyncResult};
use crate::sync::planner::RecordPlanner;
use crate::zone::Zone;

/// Everything one zone sync reads.
pub struct SyncContext<'a> {
    pub config: &'a SyncConfig,
    pub zone: &'a Zone,
    /// All configured zones; matching is global even when one zone syncs.
    pub zones: &'a [Zone],
    pub inventory: &'a dyn Inventory,
    /// One session per enabled API server of the zone.
    pub clients: &'a [Box<dyn DnsApi>],
}

pub async fn sync_zone(ctx: &SyncContext<'_>, log: &mut JobLog) -> SyncResult {
    let zone = ctx.zone;
    if !zone.enabled {
        log.warning(format!("zone {zone} is disabled, nothing to do"));
        return SyncResult::completed();
    }
    let ownership = zone.ownership(&ctx.config.ownership);
    if ownership.is_dangerous() {
        log.warning(format!(
            "ownership check disabled: every A/AAAA/PTR record in {zone} is managed and may be deleted"
        ));
    }
    if ctx.clients.is_empty() {
        log.fatal(format!("no valid servers found for zone {zone}"));
        return SyncResult::failed();
    }

    let filter = zone
        .reverse_network()
        .map(AddressFilter::within)
        .unwrap_or_else(AddressFilter::all);
    let snapshot = match InventorySnapshot::load(ctx.inventory, &filter).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            log.fatal(format!("failed to load inventory: {err:#}"));
            return SyncResult::failed();
        }
    };
    log.info(format!("loaded {} inventory objects for zone {zone}", snapshot.len()));

    let plan = RecordPlanner::new(ctx.zones, ctx.config).plan(zone, &snapshot);
    for excluded in &plan.excluded {
        log.debug(format!("{}: {}", excluded.object, excluded.reason));
    }
    for warning in &plan.warnings {
        log.warning(warning.clone());
    }
    for conflict in &plan.conflicts {
        let origin = |r: &record::DnsRecordState| {
            r.origin.map(|o| o.to_string()).unwrap_or_else(|| "unknown".into())
        };
        log.warning(format!(
            "duplicate record {} {}: keeping {} from {}, skipped {} from {}",
            conflict.key.name,
            conflict.key.rtype,
            conflict.kept.value,
            origin(&conflict.kept),
            conflict.skipped.value,
            origin(&conflict.skipped),
        ));
    }

    let mut desired = Vec::with_capacity(plan.records.len() * ctx.clients.len());
    let mut actual = Vec::new();
    for client in ctx.clients {
        let server = client.server_name();
        desired.extend(plan.records.iter().map(|r| r.on_server(server)));
        match client.list_records(&zone.name).await {
            Ok(records) => actual.extend(records),
            Err(err) => {
                log.fatal(format!("failed to read zone {zone} from {server}: {err}"));
                return SyncResult::failed();
            }
        }
    }

    let diff = diff::diff(&desired, &actual, &ownership);
    for blocked in &diff.blocked {
        log.warning(format!(
            "not touching {blocked} on {}: a record not owned by this system exists with the same name and type",
            blocked.server
        ));
    }
    if diff.unmanaged > 0 {
        log.info(format!("{} unmanaged records left untouched", diff.unmanaged));
    }
    log.info(format!(
        "{} planned records, {} operations, {} unchanged",
        plan.records.len(),
        diff.operations.len(),
        diff.unchanged
    ));

    let result = SyncExecutor::new(ctx.clients, &ctx.config.ownership)
        .execute(zone, &diff.operations, log)
        .await;
    if result.status == JobStatus::Completed {
        log.info(format!(
            "finished zone {zone}: {} applied, {} failed",
            result.applied, result.failed
        ));
    }
    result
}
