//! Administrative repair jobs that walk the whole timeline in small
//! batches.
//!
//! This module provides a minimal job registry: starting a job snapshots
//! the identities it should visit, and the caller then drives it forward
//! one batch at a time, observing progress between calls. Cancellation is
//! cooperative and takes effect before the next batch.
//!
//! The goal is to keep the repair bookkeeping here without invasive
//! changes to the engine; the actual fixes are single-target operations on
//! the database.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{LifespanError, Result};
use crate::timeline::{Database, SpanState, SpanType};

/// The repairs that can be run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Give every named, non-placeholder span the slug it is missing.
    RepairSlugs,
    /// Realign every connection span's access level with its endpoints.
    RepairAccess,
}
impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobKind::RepairSlugs => f.write_str("repair_slugs"),
            JobKind::RepairAccess => f.write_str("repair_access"),
        }
    }
}

/// Opaque job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub u64);

/// Progress so far. `processed` and `changed` are cumulative over the life
/// of the job, and a cancelled job reports itself done.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub changed: usize,
    pub remaining: usize,
    pub total: usize,
    pub done: bool,
}

struct Job {
    kind: JobKind,
    targets: Vec<u64>,
    cursor: usize,
    changed: usize,
    cancelled: bool,
}
impl Job {
    fn report(&self) -> BatchReport {
        BatchReport {
            processed: self.cursor,
            changed: self.changed,
            remaining: self.targets.len() - self.cursor,
            total: self.targets.len(),
            done: self.cancelled || self.cursor >= self.targets.len(),
        }
    }
}

/// Registry managing repair job lifecycles.
pub struct JobRunner {
    db: Arc<Database>,
    next_id: Mutex<u64>,
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobRunner {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            next_id: Mutex::new(0),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn allocate_id(&self) -> JobId {
        let mut g = self.next_id.lock().unwrap();
        *g += 1;
        JobId(*g)
    }

    /// Start a job by snapshotting the identities it should visit, in
    /// ascending order so batches are deterministic. Targets that vanish
    /// before their batch comes up are simply skipped.
    pub fn start(&self, kind: JobKind) -> JobId {
        let targets = match kind {
            JobKind::RepairSlugs => {
                let keeper = self.db.span_keeper.lock().unwrap();
                let mut targets: Vec<u64> = keeper
                    .iter()
                    .filter(|span| {
                        span.slug().is_none()
                            && span.state() != SpanState::Placeholder
                            && span.span_type() != SpanType::Connection
                            && !span.name().trim().is_empty()
                    })
                    .map(|span| span.id())
                    .collect();
                targets.sort_unstable();
                targets
            }
            JobKind::RepairAccess => {
                let keeper = self.db.connection_keeper.lock().unwrap();
                let mut targets: Vec<u64> =
                    keeper.iter().map(|connection| connection.id()).collect();
                targets.sort_unstable();
                targets
            }
        };
        let id = self.allocate_id();
        self.jobs.lock().unwrap().insert(
            id,
            Job {
                kind,
                targets,
                cursor: 0,
                changed: 0,
                cancelled: false,
            },
        );
        id
    }

    /// Advance the job by at most `batch_size` targets and report where it
    /// stands afterwards. Processing a finished or cancelled job does no
    /// further work.
    pub fn process(&self, id: JobId, batch_size: usize) -> Result<BatchReport> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs.get_mut(&id).ok_or(LifespanError::NotFound {
            kind: "job",
            id: id.0.to_string(),
        })?;
        if job.cancelled {
            return Ok(job.report());
        }
        let upper = (job.cursor + batch_size.max(1)).min(job.targets.len());
        while job.cursor < upper {
            let target = job.targets[job.cursor];
            let changed = match job.kind {
                JobKind::RepairSlugs => self.db.assign_missing_slug(target)?,
                JobKind::RepairAccess => self.db.align_connection_access(target)?,
            };
            if changed {
                job.changed += 1;
            }
            job.cursor += 1;
        }
        Ok(job.report())
    }

    pub fn status(&self, id: JobId) -> Result<BatchReport> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs.get(&id).ok_or(LifespanError::NotFound {
            kind: "job",
            id: id.0.to_string(),
        })?;
        Ok(job.report())
    }

    /// Request cancellation. Returns whether the job was known.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.jobs.lock().unwrap().get_mut(&id) {
            Some(job) => {
                job.cancelled = true;
                true
            }
            None => false,
        }
    }
}
