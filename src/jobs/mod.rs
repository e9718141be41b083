//! Sync job records and their result payload.
//!
//! The `{ log: [{status, message}], output: [{action, zone, server, rr}] }`
//! shape of [`JobResult`] is what gets persisted and displayed.
pub mod scheduler;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::sync::diff::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    /// Pending with a trigger time in the future.
    Scheduled,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// `pending|scheduled -> running -> completed|failed`; a job that never
    /// started may fail directly (cancelled, interrupted).
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Scheduled, Pending)
                | (Pending | Scheduled, Running)
                | (Pending | Scheduled, Failed)
                | (Running, Completed | Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "scheduled" => Ok(JobStatus::Scheduled),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub status: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEntry {
    pub action: Action,
    pub zone: String,
    pub server: String,
    pub rr: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(default)]
    pub log: Vec<LogEntry>,
    #[serde(default)]
    pub output: Vec<OutputEntry>,
}

/// Accumulates a job's result, mirroring every entry to `tracing`.
#[derive(Debug, Default)]
pub struct JobLog {
    result: JobResult,
}

impl JobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, status: LogLevel, msg: impl Into<String>) {
        let message = msg.into();
        match status {
            LogLevel::Debug => tracing::debug!("{message}"),
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error | LogLevel::Fatal => tracing::error!("{message}"),
        }
        self.result.log.push(LogEntry { status, message });
    }

    pub fn debug(&mut self, msg: impl Into<String>) {
        self.push(LogLevel::Debug, msg);
    }

    pub fn info(&mut self, msg: impl Into<String>) {
        self.push(LogLevel::Info, msg);
    }

    pub fn warning(&mut self, msg: impl Into<String>) {
        self.push(LogLevel::Warning, msg);
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.push(LogLevel::Error, msg);
    }

    pub fn fatal(&mut self, msg: impl Into<String>) {
        self.push(LogLevel::Fatal, msg);
    }

    pub fn output(&mut self, entry: OutputEntry) {
        self.result.output.push(entry);
    }

    pub fn result(&self) -> &JobResult {
        &self.result
    }

    pub fn into_result(self) -> JobResult {
        self.result
    }
}

/// One execution of a zone sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: i64,
    pub zone_id: i64,
    pub status: JobStatus,
    pub created: DateTime<Utc>,
    pub scheduled: Option<DateTime<Utc>>,
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    /// Reschedule interval carried over from the zone when enqueued.
    pub interval_minutes: Option<u32>,
    pub result: JobResult,
}

impl SyncJob {
    pub fn new(zone_id: i64, scheduled: Option<DateTime<Utc>>, interval_minutes: Option<u32>) -> Self {
        let now = Utc::now();
        let status = match scheduled {
            Some(at) if at > now => JobStatus::Scheduled,
            _ => JobStatus::Pending,
        };
        Self {
            id: 0,
            zone_id,
            status,
            created: now,
            scheduled,
            started: None,
            completed: None,
            interval_minutes,
            result: JobResult::default(),
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), SyncError> {
        if self.status.is_terminal() {
            return Err(SyncError::JobFinished(self.id));
        }
        if !self.status.can_transition_to(next) {
            return Err(SyncError::InvalidTransition {
                job: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), SyncError> {
        self.transition(JobStatus::Running)?;
        self.started = Some(Utc::now());
        Ok(())
    }

    /// Enter a terminal state. An empty log gets a line so no job ends
    /// without explanation.
    pub fn finish(&mut self, status: JobStatus, mut result: JobResult) -> Result<(), SyncError> {
        if !status.is_terminal() {
            return Err(SyncError::InvalidTransition {
                job: self.id,
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;
        if result.log.is_empty() {
            result.log.push(LogEntry {
                status: if status == JobStatus::Completed { LogLevel::Info } else { LogLevel::Error },
                message: format!("job {status} without further detail"),
            });
        }
        self.result = result;
        self.completed = Some(Utc::now());
        Ok(())
    }
}
