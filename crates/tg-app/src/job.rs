use std::path::PathBuf;
use std::time::Duration;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tg_core::ObjectKind;
use crate::scene::ObjectHandle;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Waiting,
    Running,
    Failed,
    Completed,
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Waiting | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Completed)
    }

    /// Allowed moves: active to terminal, and failed back to running on restart
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (Self::Waiting, Self::Running) => true,
            (Self::Waiting | Self::Running, Self::Failed | Self::Completed) => true,
            (Self::Failed, Self::Running) => true,
            _ => false,
        }
    }

    pub fn icon(&self) -> &str {
        match self {
            Self::Waiting => "⏳",
            Self::Running => "⚡",
            Self::Failed => "❌",
            Self::Completed => "✅",
        }
    }
}

/// What the service generates from: a prompt or an image on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum JobInput {
    Text(String),
    Image(PathBuf),
}

impl JobInput {
    pub fn summary(&self) -> String {
        match self {
            Self::Text(prompt) => prompt.clone(),
            Self::Image(path) => format!("image {}", path.display()),
        }
    }
}

/// Settings for turning an imported splat into a mesh
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MeshSettings {
    pub voxel_size: f32,
    pub adaptivity: f32,
    pub angle_limit: f32,
    pub island_margin: f32,
    pub texture_size: u32,
    pub ray_distance: f32,
    pub cage_extrusion: f32,
    /// Keep the source splat next to the mesh instead of deleting it
    pub keep_original: bool,
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self {
            voxel_size: 0.005,
            adaptivity: 0.0,
            angle_limit: 1.0,
            island_margin: 0.0,
            texture_size: 4096,
            ray_distance: 0.04,
            cage_extrusion: 0.02,
            keep_original: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationParams {
    pub kind: ObjectKind,
    pub seed: u32,
    pub mesh: MeshSettings,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            kind: ObjectKind::default(),
            seed: 1,
            mesh: MeshSettings::default(),
        }
    }
}

/// Everything needed to (re)submit a job; never changes after creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobRequest {
    pub input: JobInput,
    pub params: GenerationParams,
}

impl JobRequest {
    pub fn text(prompt: impl Into<String>, params: GenerationParams) -> Self {
        Self { input: JobInput::Text(prompt.into()), params }
    }

    pub fn image(path: impl Into<PathBuf>, params: GenerationParams) -> Self {
        Self { input: JobInput::Image(path.into()), params }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    id: String,
    request: JobRequest,
    status: JobStatus,
    reason: Option<String>,
    created_at: DateTime<Utc>,
    replace_target: Option<ObjectHandle>,
}

impl JobRecord {
    /// New record under a local placeholder id, before anything reaches the network
    pub fn new(request: JobRequest, replace_target: Option<ObjectHandle>, now: DateTime<Utc>) -> Self {
        Self {
            id: format!("local-{}", uuid::Uuid::new_v4()),
            request,
            status: JobStatus::Waiting,
            reason: None,
            created_at: now,
            replace_target,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn request(&self) -> &JobRequest {
        &self.request
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Failure explanation, empty unless the job failed
    pub fn reason(&self) -> &str {
        self.reason.as_deref().unwrap_or_default()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn replace_target(&self) -> Option<&ObjectHandle> {
        self.replace_target.as_ref()
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> TimeDelta {
        now.signed_duration_since(self.created_at)
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        let limit = TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX);
        self.elapsed(now) > limit
    }

    /// The service accepted the request as task `task_id`
    pub(crate) fn start(&mut self, task_id: String, now: DateTime<Utc>) -> bool {
        if !self.transition(JobStatus::Running) {
            return false;
        }
        self.id = task_id;
        self.created_at = now;
        self.reason = None;
        true
    }

    /// Records a failure; a failed job keeps its status and takes the newer reason
    pub(crate) fn fail(&mut self, reason: impl Into<String>) {
        if self.status == JobStatus::Failed || self.transition(JobStatus::Failed) {
            self.reason = Some(reason.into());
        }
    }

    pub(crate) fn complete(&mut self) -> bool {
        self.transition(JobStatus::Completed)
    }

    /// Hands over the object to replace; it can only be taken once
    pub(crate) fn take_replace_target(&mut self) -> Option<ObjectHandle> {
        self.replace_target.take()
    }

    fn transition(&mut self, next: JobStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::warn!("Job {}: ignoring transition {:?} -> {:?}", self.id, self.status, next);
            return false;
        }
        self.status = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> JobRecord {
        JobRecord::new(
            JobRequest::text("a red chair", GenerationParams::default()),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn test_transitions() {
        use JobStatus::*;

        assert!(Waiting.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Running));

        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Waiting));
    }

    #[test]
    fn test_placeholder_id() {
        let job = record();
        assert!(job.id().starts_with("local-"));
        assert_eq!(job.status(), JobStatus::Waiting);
        assert_eq!(job.reason(), "");
    }

    #[test]
    fn test_start_replaces_id() {
        let mut job = record();
        let later = job.created_at() + TimeDelta::seconds(3);

        assert!(job.start("abc123".into(), later));
        assert_eq!(job.id(), "abc123");
        assert_eq!(job.created_at(), later);
        assert_eq!(job.status(), JobStatus::Running);
    }

    #[test]
    fn test_failed_job_keeps_latest_reason() {
        let mut job = record();
        job.fail("first");
        job.fail("second");

        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.reason(), "second");
        assert!(!job.complete());
    }

    #[test]
    fn test_timeout() {
        let job = record();
        let limit = Duration::from_secs(600);

        assert!(!job.is_timed_out(job.created_at() + TimeDelta::seconds(600), limit));
        assert!(job.is_timed_out(job.created_at() + TimeDelta::seconds(601), limit));
    }

    #[test]
    fn test_replace_target_taken_once() {
        let mut job = JobRecord::new(
            JobRequest::text("a lamp", GenerationParams::default()),
            Some(ObjectHandle::new("Lamp")),
            Utc::now(),
        );

        assert_eq!(job.take_replace_target(), Some(ObjectHandle::new("Lamp")));
        assert_eq!(job.take_replace_target(), None);
    }
}
