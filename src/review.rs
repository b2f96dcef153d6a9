use std::sync::Arc;

use serde_json::Value;

use crate::error::ReviewError;
use crate::inference::Inference;
use crate::models::{AnalysisResult, QueueTaskId};
use crate::store::TaskStore;

const INSTRUCTION_TEMPLATE: &str = r#"You are reviewing a GitHub pull request.
Analyze the following code changes for:
1. Code style and formatting issues
2. Potential bugs or errors
3. Performance improvements
4. Best practices

Respond with a single JSON object and nothing else, shaped as:
{
  "style": [{"file": "<path>", "line": <number or null>, "issue": "<text>", "suggestion": "<text>"}],
  "bugs": [...same shape...],
  "performance": [...same shape...],
  "best_practices": [...same shape...]
}
Use an empty array for a category with no findings.

Code changes:
{diff}
"#;

pub fn build_instruction(diff_blob: &str) -> String {
    INSTRUCTION_TEMPLATE.replace("{diff}", diff_blob)
}

/// Background unit of work: asks the model to review a diff and records the
/// parsed analysis on the linked task record.
#[derive(Clone)]
pub struct ReviewTask {
    inference: Arc<dyn Inference>,
    store: Arc<dyn TaskStore>,
}

impl ReviewTask {
    pub fn new(inference: Arc<dyn Inference>, store: Arc<dyn TaskStore>) -> Self {
        Self { inference, store }
    }

    pub async fn run(
        &self,
        queue_task_id: &QueueTaskId,
        diff_blob: &str,
    ) -> Result<Value, ReviewError> {
        let raw = self.inference.generate(&build_instruction(diff_blob)).await?;
        let analysis: Value = serde_json::from_str(raw.trim())
            .map_err(|e| ReviewError::MalformedResponse(e.to_string()))?;

        let record = self.store.find_by_queue_task_id(queue_task_id).await?;
        let record = self.store.ensure_started(&record).await?;
        self.store
            .set_analysis_result(&record, AnalysisResult::Parsed(analysis.clone()))
            .await?;
        tracing::info!(task_id = %queue_task_id, "analysis stored");

        Ok(analysis)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{Credential, NewTaskRecord, TaskStatus};
    use crate::store::MemoryTaskStore;
    use async_trait::async_trait;

    pub(crate) struct CannedInference(pub Result<String, String>);

    #[async_trait]
    impl Inference for CannedInference {
        async fn generate(&self, prompt: &str) -> Result<String, ReviewError> {
            assert!(prompt.contains("Code changes:"));
            self.0.clone().map_err(ReviewError::Inference)
        }
    }

    async fn linked_pending_record(store: &MemoryTaskStore, id: &QueueTaskId) {
        let record = store
            .create(NewTaskRecord {
                repo_url: "https://github.com/octo/hello".into(),
                pr_number: 1,
                credential: Credential::new("t"),
                diff_blob: "File: a.rs".into(),
            })
            .await
            .unwrap();
        let record = store.set_queue_task_id(&record, id).await.unwrap();
        store.update_status(&record, TaskStatus::Pending).await.unwrap();
    }

    #[test]
    fn instruction_embeds_diff_and_asks_for_json() {
        let prompt = build_instruction("File: x.rs\n+let a = 1;");
        assert!(prompt.contains("File: x.rs\n+let a = 1;"));
        assert!(prompt.contains("single JSON object"));
        assert!(!prompt.contains("{diff}"));
    }

    #[tokio::test]
    async fn stores_parsed_analysis() {
        let store = Arc::new(MemoryTaskStore::new());
        let id = QueueTaskId::from("q-ok");
        linked_pending_record(&store, &id).await;

        let task = ReviewTask::new(
            Arc::new(CannedInference(Ok(r#" {"bugs": [], "style": []} "#.into()))),
            store.clone(),
        );
        let value = task.run(&id, "File: a.rs").await.unwrap();

        assert_eq!(value, serde_json::json!({"bugs": [], "style": []}));
        let record = store.find_by_queue_task_id(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert_eq!(record.analysis_result, Some(AnalysisResult::Parsed(value)));
    }

    #[tokio::test]
    async fn stores_analysis_when_pre_run_hook_never_landed() {
        let store = Arc::new(MemoryTaskStore::new());
        let id = QueueTaskId::from("q-unset");
        let record = store
            .create(NewTaskRecord {
                repo_url: "https://github.com/octo/hello".into(),
                pr_number: 1,
                credential: Credential::new("t"),
                diff_blob: "File: a.rs".into(),
            })
            .await
            .unwrap();
        store.set_queue_task_id(&record, &id).await.unwrap();

        let task = ReviewTask::new(
            Arc::new(CannedInference(Ok(r#"{"bugs": []}"#.into()))),
            store.clone(),
        );
        task.run(&id, "File: a.rs").await.unwrap();

        let record = store.find_by_queue_task_id(&id).await.unwrap();
        assert_eq!(record.status, TaskStatus::Success);
        assert!(record.analysis_result.is_some());
    }

    #[tokio::test]
    async fn non_json_response_is_malformed() {
        let store = Arc::new(MemoryTaskStore::new());
        let id = QueueTaskId::from("q-bad");
        linked_pending_record(&store, &id).await;

        let task = ReviewTask::new(
            Arc::new(CannedInference(Ok("Looks good to me!".into()))),
            store.clone(),
        );
        let err = task.run(&id, "diff").await.unwrap_err();

        assert!(matches!(err, ReviewError::MalformedResponse(_)));
        let record = store.find_by_queue_task_id(&id).await.unwrap();
        assert!(record.analysis_result.is_none());
    }

    #[tokio::test]
    async fn missing_record_is_not_found() {
        let task = ReviewTask::new(
            Arc::new(CannedInference(Ok("{}".into()))),
            Arc::new(MemoryTaskStore::new()),
        );
        let err = task.run(&QueueTaskId::from("nope"), "diff").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
