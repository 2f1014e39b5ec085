use crate::retry::RetryPolicy;
use crate::types::{CaseDraft, CaseUpdate, RemoteCaseRecord};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

const ALL_CASE_IDS_SOQL: &str = "SELECT Id FROM Case";
const RETAG_CASES_SOQL: &str = "SELECT Id, Description, Subject, Type, Priority FROM Case";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    /// Connection failures, timeouts and 5xx responses.
    #[error("transport error: {0}")]
    Transport(String),
    /// The service refused the request; retrying will not help.
    #[error("rejected by service ({status}): {message}")]
    Rejected { status: u16, message: String },
    /// The service accepted the request but its response could not be
    /// read, so the write may already have been applied.
    #[error("unreadable response: {0}")]
    Malformed(String),
    #[error("{operation} failed after {attempts} attempts: {last}")]
    Exhausted {
        operation: String,
        attempts: u32,
        last: String,
    },
}

impl RecordError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RecordError::Transport(_))
    }
}

/// Case operations of the remote case-tracking service.
#[async_trait]
pub trait CaseStore: Send + Sync {
    /// Every matching record, across all result pages.
    async fn query_all(&self, soql: &str) -> Result<Vec<RemoteCaseRecord>, RecordError>;
    /// The first result page only.
    async fn query(&self, soql: &str) -> Result<Vec<RemoteCaseRecord>, RecordError>;
    async fn create(&self, draft: &CaseDraft) -> Result<String, RecordError>;
    async fn update(&self, id: &str, update: &CaseUpdate) -> Result<(), RecordError>;
    async fn delete(&self, id: &str) -> Result<(), RecordError>;
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy runs out of attempts.
pub async fn retry_transport<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, RecordError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RecordError>>,
{
    let mut last = String::new();
    for attempt in 1..=policy.attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                if attempt < policy.attempts {
                    warn!(
                        attempt,
                        attempts = policy.attempts,
                        "{operation} attempt {attempt} failed due to {err}. retrying in {:?}",
                        policy.delay
                    );
                    tokio::time::sleep(policy.delay).await;
                } else {
                    warn!(
                        attempt,
                        attempts = policy.attempts,
                        "{operation} attempt {attempt} failed due to {err}"
                    );
                }
                last = err.to_string();
            }
            Err(err) => return Err(err),
        }
    }
    error!(operation, attempts = policy.attempts, "max retries reached");
    Err(RecordError::Exhausted {
        operation: operation.to_string(),
        attempts: policy.attempts,
        last,
    })
}

/// Retry-wrapped access to a [`CaseStore`].
#[derive(Clone)]
pub struct RecordAdapter {
    store: Arc<dyn CaseStore>,
    policy: RetryPolicy,
}

impl RecordAdapter {
    pub fn new(store: Arc<dyn CaseStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn query_all(&self, soql: &str) -> Result<Vec<RemoteCaseRecord>, RecordError> {
        retry_transport(self.policy, "query_all", move || self.store.query_all(soql)).await
    }

    pub async fn query(&self, soql: &str) -> Result<Vec<RemoteCaseRecord>, RecordError> {
        retry_transport(self.policy, "query", move || self.store.query(soql)).await
    }

    pub async fn create(&self, draft: &CaseDraft) -> Result<String, RecordError> {
        retry_transport(self.policy, "create", move || self.store.create(draft)).await
    }

    pub async fn update(&self, id: &str, update: &CaseUpdate) -> Result<(), RecordError> {
        retry_transport(self.policy, "update", move || self.store.update(id, update)).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), RecordError> {
        retry_transport(self.policy, "delete", move || self.store.delete(id)).await
    }

    pub async fn all_case_ids(&self) -> Result<Vec<String>, RecordError> {
        let records = self.query_all(ALL_CASE_IDS_SOQL).await?;
        Ok(records.into_iter().map(|r| r.id).collect())
    }

    pub async fn cases_for_retag(&self) -> Result<Vec<RemoteCaseRecord>, RecordError> {
        self.query(RETAG_CASES_SOQL).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, StoreOp};
    use std::time::Duration;
    use tokio::time::Instant;

    fn adapter(store: Arc<MemoryStore>) -> RecordAdapter {
        RecordAdapter::new(store, RetryPolicy::new(3, Duration::from_secs(5)))
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failures_are_retried() {
        let store = Arc::new(MemoryStore::with_cases(&["500A", "500B"]));
        store.fail_next(StoreOp::QueryAll, 2, RecordError::Transport("reset".into()));
        let adapter = adapter(store.clone());

        let start = Instant::now();
        let ids = adapter.all_case_ids().await.unwrap();
        assert_eq!(ids, vec!["500A".to_string(), "500B".to_string()]);
        assert_eq!(store.calls(StoreOp::QueryAll), 3);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_are_not_retried() {
        let store = Arc::new(MemoryStore::with_cases(&["500A"]));
        let rejected = RecordError::Rejected {
            status: 400,
            message: "INVALID_FIELD".into(),
        };
        store.fail_id(StoreOp::Update, "500A", rejected.clone());
        let adapter = adapter(store.clone());

        let update = CaseUpdate {
            subject: "s".into(),
            category: crate::types::CaseCategory::Bug,
            priority: crate::types::Priority::Low,
        };
        assert_eq!(adapter.update("500A", &update).await, Err(rejected));
        assert_eq!(store.calls(StoreOp::Update), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_create_response_is_not_resent() {
        let store = Arc::new(MemoryStore::new());
        let unreadable = RecordError::Malformed("failed to parse response".into());
        store.fail_next(StoreOp::Create, 1, unreadable.clone());
        let adapter = adapter(store.clone());

        let draft = CaseDraft {
            subject: "s".into(),
            description: "d".into(),
        };
        assert_eq!(adapter.create(&draft).await, Err(unreadable));
        assert_eq!(store.calls(StoreOp::Create), 1);
        assert!(!RecordError::Malformed(String::new()).is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_is_reported_with_attempt_count() {
        let store = Arc::new(MemoryStore::with_cases(&["500A"]));
        store.fail_id(StoreOp::Delete, "500A", RecordError::Transport("timeout".into()));
        let adapter = adapter(store.clone());

        let err = adapter.delete("500A").await.unwrap_err();
        match err {
            RecordError::Exhausted {
                operation,
                attempts,
                last,
            } => {
                assert_eq!(operation, "delete");
                assert_eq!(attempts, 3);
                assert!(last.contains("timeout"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.calls(StoreOp::Delete), 3);
    }
}
