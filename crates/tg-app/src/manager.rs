use std::time::Duration;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use crate::error::{JobError, LifecycleError};
use crate::events::JobEvent;
use crate::gateway::{Gateway, RemoteStatus};
use crate::import::{ImportRequest, Importer};
use crate::job::{JobRecord, JobRequest, JobStatus};
use crate::scene::ObjectHandle;

/// Whether the recurring poll callback is registered with the host timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSchedule {
    Idle,
    Scheduled,
}

enum Step {
    Pending(RemoteStatus),
    Completed(ObjectHandle),
}

/// Tracks generation jobs from submission until their result is in the scene.
///
/// Everything runs on the caller's thread. The host calls [`JobManager::tick`]
/// every poll interval while [`JobManager::is_poll_scheduled`] holds.
pub struct JobManager<G, I> {
    gateway: G,
    importer: I,
    jobs: Vec<JobRecord>,
    poll: PollSchedule,
    poll_interval: Duration,
    events: Vec<JobEvent>,
}

impl<G: Gateway, I: Importer> JobManager<G, I> {
    pub fn new(gateway: G, importer: I, poll_interval: Duration) -> Self {
        Self {
            gateway,
            importer,
            jobs: Vec::new(),
            poll: PollSchedule::Idle,
            poll_interval,
            events: Vec::new(),
        }
    }

    pub fn jobs(&self) -> &[JobRecord] {
        &self.jobs
    }

    pub fn get(&self, id: &str) -> Option<&JobRecord> {
        self.jobs.iter().find(|j| j.id() == id)
    }

    pub fn importer(&self) -> &I {
        &self.importer
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn is_poll_scheduled(&self) -> bool {
        self.poll == PollSchedule::Scheduled
    }

    pub fn has_active(&self) -> bool {
        self.jobs.iter().any(|j| j.status().is_active())
    }

    /// Events since the last call, oldest first
    pub fn drain_events(&mut self) -> Vec<JobEvent> {
        std::mem::take(&mut self.events)
    }

    /// Submits a new job and returns its id; a failed submission leaves a failed job behind
    pub fn add(&mut self, request: JobRequest, replace_target: Option<ObjectHandle>) -> String {
        self.add_at(request, replace_target, Utc::now())
    }

    pub fn add_at(&mut self, request: JobRequest, replace_target: Option<ObjectHandle>, now: DateTime<Utc>) -> String {
        let job = JobRecord::new(request, replace_target, now);
        info!("Job {}: submitting {}", job.id(), job.request().input.summary());

        self.jobs.push(job);
        let index = self.jobs.len() - 1;
        self.submit(index, now);

        self.jobs[index].id().to_string()
    }

    /// Resubmits a failed job with the request it was created with
    pub fn restart(&mut self, id: &str) -> Result<(), JobError> {
        self.restart_at(id, Utc::now())
    }

    pub fn restart_at(&mut self, id: &str, now: DateTime<Utc>) -> Result<(), JobError> {
        let index = self.index_of(id)?;
        let status = self.jobs[index].status();
        if status != JobStatus::Failed {
            return Err(JobError::NotRestartable { id: id.to_string(), status });
        }

        info!("Job {}: restarting", id);
        self.submit(index, now);
        Ok(())
    }

    /// Stops tracking a job. The remote task is left alone and so is any object it would have replaced.
    pub fn remove(&mut self, id: &str) -> Option<JobRecord> {
        let index = self.index_of(id).ok()?;
        let job = self.jobs.remove(index);

        if let Some(target) = job.replace_target() {
            debug!("Job {}: dropping replace target {}", id, target);
        }
        info!("Job {}: removed ({:?})", id, job.status());

        self.events.push(JobEvent::Removed { id: id.to_string() });
        Some(job)
    }

    /// One poll pass over the active jobs. Returns the delay until the next
    /// pass, or `None` once nothing is left to poll.
    pub fn tick(&mut self) -> Option<Duration> {
        self.tick_at(Utc::now())
    }

    pub fn tick_at(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        let mut index = 0;
        while index < self.jobs.len() {
            if !self.jobs[index].status().is_active() {
                index += 1;
                continue;
            }

            match self.step(index, now) {
                Ok(Step::Pending(status)) => {
                    let id = self.jobs[index].id().to_string();
                    debug!("Job {}: {:?}", id, status);
                    self.events.push(JobEvent::Progress { id, status });
                    index += 1;
                }
                Ok(Step::Completed(object)) => {
                    let job = self.jobs.remove(index);
                    info!("Job {}: completed as {}", job.id(), object);
                    self.events.push(JobEvent::Completed { id: job.id().to_string(), object });
                }
                Err(e) => {
                    self.fail(index, e);
                    index += 1;
                }
            }
        }

        if self.has_active() {
            Some(self.poll_interval)
        } else {
            if self.poll == PollSchedule::Scheduled {
                debug!("No active jobs, poll callback deregistered");
            }
            self.poll = PollSchedule::Idle;
            None
        }
    }

    fn step(&mut self, index: usize, now: DateTime<Utc>) -> Result<Step, LifecycleError> {
        let job = &mut self.jobs[index];
        if job.is_timed_out(now, self.gateway.timeout()) {
            return Err(LifecycleError::TimedOut);
        }
        if job.status() == JobStatus::Waiting {
            return Ok(Step::Pending(RemoteStatus::NoResult));
        }

        let response = self.gateway.poll(job.id())?;
        match response.status {
            RemoteStatus::Success => {
                let payload = self.gateway.fetch(job.id())?;
                let object = self.importer.import(ImportRequest {
                    task_id: job.id(),
                    payload: &payload,
                    params: &job.request().params,
                    replace_target: job.replace_target(),
                })?;

                job.take_replace_target();
                job.complete();
                Ok(Step::Completed(object))
            }
            RemoteStatus::Failure => Err(LifecycleError::Remote(
                response.reason.filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| "generation failed".to_string()),
            )),
            status @ (RemoteStatus::NoResult | RemoteStatus::PartialResult) => Ok(Step::Pending(status)),
        }
    }

    fn submit(&mut self, index: usize, now: DateTime<Utc>) {
        let job = &mut self.jobs[index];
        let placeholder = job.id().to_string();

        match self.gateway.submit(job.request()) {
            Ok(task_id) => {
                if job.start(task_id, now) {
                    info!("Job {}: running as remote task {}", placeholder, job.id());
                    self.events.push(JobEvent::Submitted { id: job.id().to_string(), placeholder });
                    self.ensure_scheduled();
                }
            }
            Err(e) => self.fail(index, LifecycleError::Gateway(e)),
        }
    }

    fn fail(&mut self, index: usize, error: LifecycleError) {
        let job = &mut self.jobs[index];
        let reason = error.to_string();
        warn!("Job {}: failed: {}", job.id(), reason);

        job.fail(reason.clone());
        self.events.push(JobEvent::Failed { id: job.id().to_string(), reason });
    }

    fn ensure_scheduled(&mut self) {
        if self.poll == PollSchedule::Idle {
            debug!("Poll callback registered every {:?}", self.poll_interval);
            self.poll = PollSchedule::Scheduled;
        }
    }

    fn index_of(&self, id: &str) -> Result<usize, JobError> {
        self.jobs
            .iter()
            .position(|j| j.id() == id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}
