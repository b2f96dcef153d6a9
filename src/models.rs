use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a [`TaskRecord`]. `Unset` is stored as NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Unset,
    Pending,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn as_db_str(self) -> Option<&'static str> {
        match self {
            TaskStatus::Unset => None,
            TaskStatus::Pending => Some("pending"),
            TaskStatus::Success => Some("success"),
            TaskStatus::Failure => Some("failure"),
        }
    }

    pub fn from_db_str(value: Option<&str>) -> Option<Self> {
        match value {
            None => Some(TaskStatus::Unset),
            Some("pending") => Some(TaskStatus::Pending),
            Some("success") => Some(TaskStatus::Success),
            Some("failure") => Some(TaskStatus::Failure),
            Some(_) => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str().unwrap_or("unset"))
    }
}

/// Opaque bearer token for the source-hosting API. Never printed.
#[derive(Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Identifier minted for one enqueued Review Task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueTaskId(String);

impl QueueTaskId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for QueueTaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for QueueTaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for QueueTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Analysis payload returned by the model. The shape is not fixed, so it is
/// stored as serialized text and parsed on read; text that no longer parses
/// is kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisResult {
    Parsed(Value),
    Raw(String),
}

impl AnalysisResult {
    pub fn from_stored(text: String) -> Self {
        match serde_json::from_str(&text) {
            Ok(value) => AnalysisResult::Parsed(value),
            Err(_) => AnalysisResult::Raw(text),
        }
    }

    pub fn to_stored(&self) -> String {
        match self {
            AnalysisResult::Parsed(value) => value.to_string(),
            AnalysisResult::Raw(text) => text.clone(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            AnalysisResult::Parsed(value) => value.clone(),
            AnalysisResult::Raw(text) => Value::String(text.clone()),
        }
    }
}

impl From<Value> for AnalysisResult {
    fn from(value: Value) -> Self {
        AnalysisResult::Parsed(value)
    }
}

#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub id: i64,
    pub repo_url: String,
    pub pr_number: u64,
    pub credential: Credential,
    pub diff_blob: String,
    pub queue_task_id: Option<QueueTaskId>,
    pub status: TaskStatus,
    pub analysis_result: Option<AnalysisResult>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTaskRecord {
    pub repo_url: String,
    pub pr_number: u64,
    pub credential: Credential,
    pub diff_blob: String,
}

/// Body of `POST /analyze-pr`. Every field defaults so that missing input is
/// reported as a validation error rather than a decoding failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub repo_url: String,
    #[serde(default)]
    pub pr_number: u64,
    #[serde(default, alias = "github_token")]
    pub credential: Credential,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub task_id: QueueTaskId,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: String,
    pub result: Option<Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResultsResponse {
    pub task_id: QueueTaskId,
    pub status: TaskStatus,
    pub results: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_is_redacted() {
        let credential = Credential::new("ghp_secret");
        assert!(!format!("{:?}", credential).contains("ghp_secret"));
    }

    #[test]
    fn status_db_mapping() {
        for status in [
            TaskStatus::Unset,
            TaskStatus::Pending,
            TaskStatus::Success,
            TaskStatus::Failure,
        ] {
            assert_eq!(TaskStatus::from_db_str(status.as_db_str()), Some(status));
        }
        assert_eq!(TaskStatus::from_db_str(Some("running")), None);
    }

    #[test]
    fn unparseable_stored_analysis_is_kept_raw() {
        let stored = AnalysisResult::from_stored("not json".into());
        assert_eq!(stored, AnalysisResult::Raw("not json".into()));
        assert_eq!(stored.to_value(), Value::String("not json".into()));

        let parsed = AnalysisResult::from_stored(r#"{"bugs":[]}"#.into());
        assert_eq!(parsed.to_value(), serde_json::json!({"bugs": []}));
    }

    #[test]
    fn analyze_request_accepts_github_token_alias() {
        let req: AnalyzeRequest = serde_json::from_str(
            r#"{"repo_url":"https://github.com/o/r","pr_number":3,"github_token":"t"}"#,
        )
        .unwrap();
        assert_eq!(req.credential.expose(), "t");

        let empty: AnalyzeRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.credential.is_empty());
        assert_eq!(empty.pr_number, 0);
    }
}
