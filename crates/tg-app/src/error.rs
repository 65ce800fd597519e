use thiserror::Error;
use crate::job::JobStatus;

/// Failures talking to the generation service
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("generation service is rate limiting requests (HTTP 429), try again in a moment")]
    RateLimited,

    #[error("failed to submit task: {0}")]
    Submit(String),

    #[error("failed to get task status: {0}")]
    Poll(String),

    #[error("failed to get task result: {0}")]
    Fetch(String),

    #[error("task result has no attachment")]
    NoAttachment,

    #[error("failed to set up HTTP client: {0}")]
    Client(String),
}

#[derive(Error, Debug)]
#[error("failed to decode result: {0}")]
pub struct DecodeError(pub String);

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("no object named `{0}` in the scene")]
    ObjectNotFound(String),

    #[error("cannot read scene object: {0}")]
    Ply(#[from] tg_core::error::Error),

    #[error("scene storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write scene manifest: {0}")]
    Manifest(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("result is not a valid point cloud: {0}")]
    Ply(#[from] tg_core::error::Error),

    #[error("scene backend error: {0}")]
    Scene(#[from] SceneError),
}

/// Anything that ends a job's run; its message becomes the job's failure reason
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("connection timed out")]
    TimedOut,

    #[error("{0}")]
    Remote(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Import(#[from] ImportError),
}

/// Rejected user actions on a job
#[derive(Error, Debug, PartialEq)]
pub enum JobError {
    #[error("no job with id `{0}`")]
    NotFound(String),

    #[error("job `{id}` is {status:?}, only failed jobs can be restarted")]
    NotRestartable { id: String, status: JobStatus },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
