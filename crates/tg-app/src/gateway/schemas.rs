use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextTaskRequest {
    pub prompt: String,
    pub seed: u32,
    pub object_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskCreateResponse {
    pub id: String,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// Where the service is with a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RemoteStatus {
    NoResult,
    PartialResult,
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusResponse {
    pub status: RemoteStatus,
    /// Set when the status is not `Success`
    #[serde(default)]
    pub reason: Option<String>,
}

impl TaskStatusResponse {
    pub fn new(status: RemoteStatus) -> Self {
        Self { status, reason: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        let resp: TaskStatusResponse =
            serde_json::from_str(r#"{"status": "PartialResult", "reason": null}"#).unwrap();
        assert_eq!(resp.status, RemoteStatus::PartialResult);

        let resp: TaskStatusResponse = serde_json::from_str(r#"{"status": "Failure"}"#).unwrap();
        assert_eq!(resp, TaskStatusResponse::new(RemoteStatus::Failure));
    }
}
