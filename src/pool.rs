use futures::StreamExt;
use futures::stream;
use std::future::Future;
use tracing::error;

/// Runs `job(0..count)` with at most `limit` jobs in flight.
///
/// Each job gets its own task, spawned only once a slot frees up. Outcomes
/// come back in completion order; a panicking job is reported as a failure
/// and never disturbs its siblings.
pub async fn run_bounded<T, F, Fut>(count: usize, limit: usize, job: F) -> Vec<Result<T, String>>
where
    T: Send + 'static,
    F: Fn(usize) -> Fut,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
{
    stream::iter(0..count)
        .map(|index| {
            let handle = tokio::spawn(job(index));
            async move {
                match handle.await {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        error!(index, "worker task failed: {err}");
                        Err(format!("worker {index} failed: {err}"))
                    }
                }
            }
        })
        .buffer_unordered(limit.max(1))
        .collect()
        .await
}

/// Best-effort batch summary.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchReport<T> {
    pub succeeded: Vec<T>,
    pub failures: Vec<String>,
}

impl<T> BatchReport<T> {
    pub fn empty() -> Self {
        Self {
            succeeded: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: Result<T, String>) {
        match outcome {
            Ok(value) => self.succeeded.push(value),
            Err(failure) => self.failures.push(failure),
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }
}

impl<T> FromIterator<Result<T, String>> for BatchReport<T> {
    fn from_iter<I: IntoIterator<Item = Result<T, String>>>(iter: I) -> Self {
        let mut report = Self::empty();
        for outcome in iter {
            report.record(outcome);
        }
        report
    }
}
