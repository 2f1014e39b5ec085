use crate::completion::TextGenerator;
use crate::types::{GenerationFailure, GenerationRequest, GenerationResult};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Runs one generation call under a hard wall-clock deadline.
///
/// The call executes on its own detached task and reports through a oneshot
/// channel. When the deadline passes first the receiver is dropped and the
/// task is left to finish on its own; its send then fails and the late
/// result is discarded.
#[derive(Clone)]
pub struct DeadlineInvoker {
    generator: Arc<dyn TextGenerator>,
}

impl DeadlineInvoker {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    pub async fn invoke(&self, request: GenerationRequest) -> GenerationResult {
        let deadline = request.timeout;
        let (tx, rx) = oneshot::channel();
        let generator = Arc::clone(&self.generator);

        tokio::spawn(async move {
            let result = generator.complete(&request).await;
            let _ = tx.send(result);
        });

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(GenerationFailure::Transport(
                "generation task ended without a result".to_string(),
            )),
            Err(_) => {
                debug!(?deadline, "abandoning generation call past its deadline");
                Err(GenerationFailure::Timeout(deadline))
            }
        }
    }
}
