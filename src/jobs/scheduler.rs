//! Runs sync jobs: at most one in flight per zone, any number of zones
//! in parallel.
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::db::{job_repo, server_repo, zone_repo, Db};
use crate::error::SyncError;
use crate::inventory::Inventory;
use crate::jobs::{JobLog, JobStatus, SyncJob};
use crate::powerdns::DnsApi;
use crate::sync::{sync_zone, SyncContext};
use crate::validation::validate_syncable;

enum Outcome {
    Finished(JobStatus),
    Cancelled,
    TimedOut,
}

pub struct Scheduler {
    db: Db,
    config: Arc<SyncConfig>,
    inventory: Arc<dyn Inventory>,
    zone_locks: StdMutex<HashMap<i64, Arc<Mutex<()>>>>,
    /// Cancellation handles of spawned jobs, by job id.
    tokens: StdMutex<HashMap<i64, CancellationToken>>,
}

impl Scheduler {
    pub fn new(db: Db, config: Arc<SyncConfig>, inventory: Arc<dyn Inventory>) -> Arc<Self> {
        Arc::new(Self {
            db,
            config,
            inventory,
            zone_locks: StdMutex::new(HashMap::new()),
            tokens: StdMutex::new(HashMap::new()),
        })
    }

    fn zone_lock(&self, zone_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.zone_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(zone_id).or_default().clone()
    }

    fn register(&self, job_id: i64) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id, token.clone());
        token
    }

    fn unregister(&self, job_id: i64) {
        self.tokens.lock().unwrap_or_else(|e| e.into_inner()).remove(&job_id);
    }

    /// Validate the zone and create its job, without running it. The job
    /// is cancellable from the moment its row exists.
    async fn enqueue(
        &self,
        zone_id: i64,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<(SyncJob, CancellationToken), SyncError> {
        self.config.validate()?;
        let zone = zone_repo::find(&self.db, zone_id)
            .await?
            .ok_or(SyncError::ZoneNotFound(zone_id))?;
        if zone.enabled {
            let servers = server_repo::list_for_zone(&self.db, zone_id).await?;
            validate_syncable(&zone, &servers)?;
        }
        let mut job = SyncJob::new(zone.id, scheduled_at, zone.sync_interval_minutes);
        job.id = job_repo::insert(&self.db, &job).await?;
        let token = self.register(job.id);
        info!("created sync job {} for zone {} ({})", job.id, zone, job.status);
        Ok((job, token))
    }

    /// Create a job for the zone and dispatch it, now or at `scheduled_at`.
    pub async fn trigger_sync(
        self: &Arc<Self>,
        zone_id: i64,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<SyncJob, SyncError> {
        let (job, token) = self.enqueue(zone_id, scheduled_at).await?;
        self.spawn(job.clone(), token);
        Ok(job)
    }

    /// Run one sync to completion in the caller's task. No rescheduling.
    pub async fn run_now(&self, zone_id: i64) -> Result<SyncJob, SyncError> {
        let (job, token) = self.enqueue(zone_id, None).await?;
        self.execute(job, token).await
    }

    fn spawn(self: &Arc<Self>, job: SyncJob, token: CancellationToken) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let job_id = job.id;
            match this.execute(job, token).await {
                Ok(job) => {
                    if let Err(err) = this.reschedule(&job).await {
                        warn!("could not reschedule zone {} after job {job_id}: {err}", job.zone_id);
                    }
                }
                Err(err) => error!("sync job {job_id} failed to run: {err}"),
            }
        });
    }

    fn token(&self, job_id: i64) -> Option<CancellationToken> {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned()
    }

    /// Cancel a job. A running job stops at its next suspension point;
    /// operations it already applied stay applied.
    pub async fn cancel(&self, job_id: i64) -> Result<SyncJob, SyncError> {
        let mut job = job_repo::find(&self.db, job_id)
            .await?
            .ok_or(SyncError::JobNotFound(job_id))?;
        if job.status.is_terminal() {
            return Err(SyncError::JobFinished(job_id));
        }
        if let Some(token) = self.token(job_id) {
            info!("cancelling sync job {job_id}");
            token.cancel();
            return Ok(job);
        }

        let mut log = JobLog::new();
        log.warning("cancelled before it was dispatched");
        job.finish(JobStatus::Failed, log.into_result())?;
        if job_repo::update_if_waiting(&self.db, &job).await? {
            return Ok(job);
        }
        // Dispatched while we looked; its token is in place by now.
        match self.token(job_id) {
            Some(token) => {
                info!("cancelling sync job {job_id}");
                token.cancel();
                job_repo::find(&self.db, job_id)
                    .await?
                    .ok_or(SyncError::JobNotFound(job_id))
            }
            None => Err(SyncError::JobFinished(job_id)),
        }
    }

    async fn wait_turn(&self, job: &SyncJob, token: &CancellationToken) -> Option<OwnedMutexGuard<()>> {
        if let Some(at) = job.scheduled {
            let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => return None,
            }
        }
        let lock = self.zone_lock(job.zone_id);
        tokio::select! {
            guard = lock.lock_owned() => Some(guard),
            _ = token.cancelled() => None,
        }
    }

    async fn execute(&self, mut job: SyncJob, token: CancellationToken) -> Result<SyncJob, SyncError> {
        let result = self.execute_inner(&mut job, &token).await;
        self.unregister(job.id);
        result.map(|()| job)
    }

    async fn execute_inner(&self, job: &mut SyncJob, token: &CancellationToken) -> Result<(), SyncError> {
        let Some(_guard) = self.wait_turn(job, token).await else {
            let mut log = JobLog::new();
            log.warning("cancelled before it started");
            job.finish(JobStatus::Failed, log.into_result())?;
            job_repo::update(&self.db, job).await?;
            return Ok(());
        };

        job.start()?;
        if !job_repo::update_if_waiting(&self.db, job).await? {
            if let Some(stored) = job_repo::find(&self.db, job.id).await? {
                *job = stored;
            }
            info!("sync job {} was finished elsewhere ({}), not running it", job.id, job.status);
            return Ok(());
        }
        let mut log = JobLog::new();

        let zones = zone_repo::list(&self.db).await?;
        let Some(zone) = zones.iter().find(|z| z.id == job.zone_id) else {
            log.fatal(format!("zone {} no longer exists", job.zone_id));
            job.finish(JobStatus::Failed, log.into_result())?;
            job_repo::update(&self.db, job).await?;
            return Ok(());
        };
        let clients: Vec<Box<dyn DnsApi>> = server_repo::list_for_zone(&self.db, zone.id)
            .await?
            .iter()
            .filter(|s| s.enabled)
            .map(|s| Box::new(s.connect()) as Box<dyn DnsApi>)
            .collect();

        let ctx = SyncContext {
            config: &self.config,
            zone,
            zones: &zones,
            inventory: self.inventory.as_ref(),
            clients: &clients,
        };
        let timeout = self.config.job_timeout;
        let outcome = tokio::select! {
            result = sync_zone(&ctx, &mut log) => Outcome::Finished(result.status),
            _ = token.cancelled() => Outcome::Cancelled,
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
        };
        let status = match outcome {
            Outcome::Finished(status) => status,
            Outcome::Cancelled => {
                log.error("sync cancelled; operations applied before this point remain in place");
                JobStatus::Failed
            }
            Outcome::TimedOut => {
                log.error(format!(
                    "sync timed out after {timeout:?}; operations applied before this point remain in place"
                ));
                JobStatus::Failed
            }
        };

        job.finish(status, log.into_result())?;
        job_repo::update(&self.db, job).await?;
        info!("sync job {} for zone {} {}", job.id, zone, job.status);
        Ok(())
    }

    /// Queue the next run of an interval zone, whatever the outcome of
    /// the finished one.
    async fn reschedule(self: &Arc<Self>, finished: &SyncJob) -> Result<(), SyncError> {
        let Some(zone) = zone_repo::find(&self.db, finished.zone_id).await? else {
            return Ok(());
        };
        let Some(minutes) = zone.sync_interval_minutes else {
            return Ok(());
        };
        if job_repo::has_pending(&self.db, zone.id).await? {
            return Ok(());
        }
        let interval = chrono::Duration::minutes(i64::from(minutes));
        let now = Utc::now();
        let base = finished.scheduled.or(finished.started).unwrap_or(now);
        let next = if base + interval > now { base + interval } else { now + interval };
        self.trigger_sync(zone.id, Some(next)).await?;
        Ok(())
    }

    /// Pick up persisted state after a restart. Returns the number of
    /// jobs dispatched.
    pub async fn resume(self: &Arc<Self>) -> Result<usize, SyncError> {
        for mut job in job_repo::list_by_status(&self.db, &[JobStatus::Running]).await? {
            let mut log = JobLog::new();
            log.error("interrupted by restart");
            job.finish(JobStatus::Failed, log.into_result())?;
            job_repo::update(&self.db, &job).await?;
        }

        let mut dispatched = 0;
        let waiting = job_repo::list_by_status(&self.db, &[JobStatus::Pending, JobStatus::Scheduled]).await?;
        for job in waiting {
            let token = self.register(job.id);
            self.spawn(job, token);
            dispatched += 1;
        }

        for zone in zone_repo::list(&self.db).await? {
            if zone.sync_interval_minutes.is_none() || job_repo::has_pending(&self.db, zone.id).await? {
                continue;
            }
            match self.trigger_sync(zone.id, Some(Utc::now())).await {
                Ok(_) => dispatched += 1,
                Err(err) => warn!("not scheduling zone {zone}: {err}"),
            }
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::db::init_memory_db;
    use crate::inventory::snapshot::InventoryExport;
    use crate::jobs::LogLevel;
    use crate::zone::{ApiServer, Zone};

    async fn scheduler_with(
        zone: Zone,
        servers: &[ApiServer],
        config: SyncConfig,
        inventory: InventoryExport,
    ) -> (Arc<Scheduler>, i64) {
        let db = init_memory_db().await.unwrap();
        let mut zone = zone;
        for server in servers {
            zone.api_servers.push(server_repo::insert(&db, server).await.unwrap());
        }
        let zone_id = zone_repo::insert(&db, &zone).await.unwrap();
        let scheduler = Scheduler::new(db, Arc::new(config), Arc::new(inventory));
        (scheduler, zone_id)
    }

    async fn scheduler_with_zone(zone: Zone, servers: &[ApiServer]) -> (Arc<Scheduler>, i64) {
        scheduler_with(zone, servers, SyncConfig::default(), InventoryExport::default()).await
    }

    /// `n` addresses with explicit names, one CREATE each.
    fn hosts(n: i64) -> InventoryExport {
        let addresses: Vec<_> = (1..=n)
            .map(|i| json!({"id": i, "address": format!("10.0.0.{i}"), "dns_name": format!("host{i}.example.com")}))
            .collect();
        serde_json::from_value(json!({ "ip_addresses": addresses })).unwrap()
    }

    /// Empty `example.com.` zone. Reads take `read_delay`, the first write
    /// is immediate and later writes take `write_delay`.
    async fn slow_pdns(read_delay: Duration, write_delay: Duration) -> MockServer {
        let pdns = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "example.com.", "name": "example.com.", "kind": "Native", "rrsets": []}))
                    .set_delay(read_delay),
            )
            .mount(&pdns)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(204))
            .up_to_n_times(1)
            .mount(&pdns)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(204).set_delay(write_delay))
            .mount(&pdns)
            .await;
        pdns
    }

    fn server_for(pdns: &MockServer) -> ApiServer {
        ApiServer::new(0, "pdns1", format!("{}/api/v1", pdns.uri()), "secret")
    }

    async fn requests(pdns: &MockServer, verb: &str) -> usize {
        pdns.received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.method.as_str() == verb)
            .count()
    }

    async fn finished(scheduler: &Scheduler, job_id: i64) -> SyncJob {
        for _ in 0..250 {
            let job = job_repo::find(&scheduler.db, job_id).await.unwrap().unwrap();
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {job_id} never finished");
    }

    #[tokio::test]
    async fn zone_without_servers_is_rejected_before_a_job_exists() {
        let (scheduler, zone_id) = scheduler_with_zone(Zone::new(0, "example.com."), &[]).await;
        let err = scheduler.trigger_sync(zone_id, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
        assert!(job_repo::list_for_zone(&scheduler.db, zone_id).await.unwrap().is_empty());
        assert!(matches!(scheduler.trigger_sync(99, None).await, Err(SyncError::ZoneNotFound(99))));
    }

    #[tokio::test]
    async fn scheduled_job_can_be_cancelled_before_it_runs() {
        let server = ApiServer::new(0, "pdns1", "http://127.0.0.1:1/api/v1", "secret");
        let (scheduler, zone_id) = scheduler_with_zone(Zone::new(0, "example.com."), &[server]).await;

        let later = Utc::now() + chrono::Duration::hours(1);
        let job = scheduler.trigger_sync(zone_id, Some(later)).await.unwrap();
        assert_eq!(job.status, JobStatus::Scheduled);

        scheduler.cancel(job.id).await.unwrap();
        let stored = finished(&scheduler, job.id).await;
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.started.is_none());
        assert!(matches!(scheduler.cancel(job.id).await, Err(SyncError::JobFinished(_))));
    }

    #[tokio::test]
    async fn job_cancelled_right_after_trigger_never_completes() {
        let pdns = slow_pdns(Duration::from_millis(500), Duration::ZERO).await;
        let (scheduler, zone_id) =
            scheduler_with_zone(Zone::new(0, "example.com."), &[server_for(&pdns)]).await;

        let job = scheduler.trigger_sync(zone_id, None).await.unwrap();
        scheduler.cancel(job.id).await.unwrap();
        let stored = finished(&scheduler, job.id).await;
        assert_eq!(stored.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn job_failed_by_a_direct_cancel_is_not_run_later() {
        let pdns = slow_pdns(Duration::ZERO, Duration::ZERO).await;
        let (scheduler, zone_id) =
            scheduler_with(Zone::new(0, "example.com."), &[server_for(&pdns)], SyncConfig::default(), hosts(1)).await;

        // Cancel lands between creating the row and handing out its token.
        let (job, token) = scheduler.enqueue(zone_id, None).await.unwrap();
        scheduler.unregister(job.id);
        let cancelled = scheduler.cancel(job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Failed);

        let ran = scheduler.execute(job, token).await.unwrap();
        assert_eq!(ran.status, JobStatus::Failed);
        assert!(ran.started.is_none());
        assert_eq!(ran.result.log[0].message, "cancelled before it was dispatched");
        assert!(pdns.received_requests().await.unwrap().is_empty());
        let stored = job_repo::find(&scheduler.db, ran.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn running_job_times_out_and_keeps_applied_operations() {
        let pdns = slow_pdns(Duration::ZERO, Duration::from_secs(10)).await;
        let config = SyncConfig {
            job_timeout: Duration::from_millis(300),
            ..SyncConfig::default()
        };
        let (scheduler, zone_id) =
            scheduler_with(Zone::new(0, "example.com."), &[server_for(&pdns)], config, hosts(2)).await;

        let job = scheduler.run_now(zone_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.result.output.len(), 1);
        assert_eq!(job.result.output[0].rr, "host1.example.com. 3600 IN A 10.0.0.1");
        let last = job.result.log.last().unwrap();
        assert_eq!(last.status, LogLevel::Error);
        assert!(last.message.contains("timed out after 300ms"));
        assert_eq!(requests(&pdns, "PATCH").await, 2);
    }

    #[tokio::test]
    async fn running_job_can_be_cancelled() {
        let pdns = slow_pdns(Duration::ZERO, Duration::from_secs(10)).await;
        let (scheduler, zone_id) =
            scheduler_with(Zone::new(0, "example.com."), &[server_for(&pdns)], SyncConfig::default(), hosts(2)).await;

        let job = scheduler.trigger_sync(zone_id, None).await.unwrap();
        for _ in 0..250 {
            if requests(&pdns, "PATCH").await == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(requests(&pdns, "PATCH").await, 2, "second write never started");

        scheduler.cancel(job.id).await.unwrap();
        let stored = finished(&scheduler, job.id).await;
        assert_eq!(stored.status, JobStatus::Failed);
        assert!(stored.started.is_some());
        assert_eq!(stored.result.output.len(), 1);
        let last = stored.result.log.last().unwrap();
        assert_eq!(last.status, LogLevel::Error);
        assert!(last.message.starts_with("sync cancelled"));
    }

    #[tokio::test]
    async fn interval_zone_is_rescheduled_one_interval_after_its_trigger() {
        let pdns = slow_pdns(Duration::ZERO, Duration::ZERO).await;
        let mut zone = Zone::new(0, "example.com.");
        zone.sync_interval_minutes = Some(5);
        let (scheduler, zone_id) = scheduler_with_zone(zone, &[server_for(&pdns)]).await;

        let at = Utc::now() - chrono::Duration::minutes(1);
        let first = scheduler.trigger_sync(zone_id, Some(at)).await.unwrap();
        assert_eq!(first.status, JobStatus::Pending);

        let mut jobs = Vec::new();
        for _ in 0..250 {
            jobs = job_repo::list_for_zone(&scheduler.db, zone_id).await.unwrap();
            if jobs.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(jobs.len(), 2);
        let (next, done) = (&jobs[0], &jobs[1]);
        assert_eq!(done.id, first.id);
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(next.status, JobStatus::Scheduled);
        assert_eq!(next.interval_minutes, Some(5));
        let expected = at + chrono::Duration::minutes(5);
        let drift = (next.scheduled.unwrap() - expected).num_milliseconds().abs();
        assert!(drift < 1000, "next run at {:?}, expected {expected}", next.scheduled);
    }

    #[tokio::test]
    async fn jobs_for_one_zone_run_one_after_another() {
        let pdns = slow_pdns(Duration::from_millis(200), Duration::ZERO).await;
        let (scheduler, zone_id) =
            scheduler_with_zone(Zone::new(0, "example.com."), &[server_for(&pdns)]).await;

        let a = scheduler.trigger_sync(zone_id, None).await.unwrap();
        let b = scheduler.trigger_sync(zone_id, None).await.unwrap();
        let mut done = vec![finished(&scheduler, a.id).await, finished(&scheduler, b.id).await];
        assert!(done.iter().all(|j| j.status == JobStatus::Completed));

        done.sort_by_key(|j| j.started);
        assert!(done[0].completed.unwrap() <= done[1].started.unwrap());
        assert_eq!(requests(&pdns, "GET").await, 2);
    }

    #[tokio::test]
    async fn unreachable_server_fails_the_job() {
        let server = ApiServer::new(0, "down", "http://127.0.0.1:1/api/v1", "secret");
        let (scheduler, zone_id) = scheduler_with_zone(Zone::new(0, "example.com."), &[server]).await;

        let job = scheduler.run_now(zone_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let last = job.result.log.last().unwrap();
        assert_eq!(last.status, LogLevel::Fatal);
        assert!(last.message.contains("down"));
    }

    #[tokio::test]
    async fn resume_fails_interrupted_jobs() {
        let mut zone = Zone::new(0, "example.com.");
        zone.enabled = false;
        let (scheduler, zone_id) = scheduler_with_zone(zone, &[]).await;

        let mut stale = SyncJob::new(zone_id, None, None);
        stale.id = job_repo::insert(&scheduler.db, &stale).await.unwrap();
        stale.start().unwrap();
        job_repo::update(&scheduler.db, &stale).await.unwrap();

        assert_eq!(scheduler.resume().await.unwrap(), 0);
        let stored = job_repo::find(&scheduler.db, stale.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.result.log[0].message, "interrupted by restart");
    }
}
