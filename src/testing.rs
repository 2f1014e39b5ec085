use crate::completion::TextGenerator;
use crate::records::{CaseStore, RecordError};
use crate::types::{
    CaseDraft, CaseUpdate, GenerationFailure, GenerationRequest, GenerationResult,
    RemoteCaseRecord,
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

struct Route {
    key: String,
    queued: VecDeque<GenerationResult>,
    repeat: GenerationResult,
}

/// Answers generation requests by matching a substring of the user prompt.
///
/// A sequence is replayed in order and its last entry repeats.
#[derive(Default)]
pub struct ScriptedGenerator {
    routes: Mutex<Vec<Route>>,
    delay: Duration,
    calls: AtomicUsize,
    completed: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn respond(&self, key: &str, result: GenerationResult) {
        self.respond_sequence(key, vec![result]);
    }

    pub fn respond_sequence(&self, key: &str, mut results: Vec<GenerationResult>) {
        let repeat = results
            .pop()
            .unwrap_or_else(|| Err(GenerationFailure::Transport("empty script".into())));
        self.routes.lock().unwrap().push(Route {
            key: key.to_string(),
            queued: results.into(),
            repeat,
        });
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn next_result(&self, prompt: &str) -> GenerationResult {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|r| prompt.contains(&r.key)) {
            Some(route) => route
                .queued
                .pop_front()
                .unwrap_or_else(|| route.repeat.clone()),
            None => Err(GenerationFailure::Remote {
                status: None,
                message: format!("no scripted response for: {prompt}"),
            }),
        }
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &GenerationRequest) -> GenerationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.next_result(request.prompt());
        self.completed.fetch_add(1, Ordering::SeqCst);
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    QueryAll,
    Query,
    Create,
    Update,
    Delete,
}

#[derive(Default)]
struct StoreState {
    cases: Vec<RemoteCaseRecord>,
    created: Vec<CaseDraft>,
    updated: Vec<(String, CaseUpdate)>,
    deleted: Vec<String>,
    next_failures: HashMap<StoreOp, (usize, RecordError)>,
    id_failures: HashMap<(StoreOp, String), RecordError>,
    calls: HashMap<StoreOp, usize>,
    next_id: usize,
}

/// In-memory case store with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cases(ids: &[&str]) -> Self {
        let store = Self::new();
        for id in ids {
            store.insert(RemoteCaseRecord {
                id: id.to_string(),
                subject: Some(format!("old subject {id}")),
                description: Some(format!("description for {id}")),
                category: None,
                priority: None,
            });
        }
        store
    }

    pub fn insert(&self, record: RemoteCaseRecord) {
        self.state.lock().unwrap().cases.push(record);
    }

    /// The next `count` calls of `op` fail with `err`.
    pub fn fail_next(&self, op: StoreOp, count: usize, err: RecordError) {
        self.state
            .lock()
            .unwrap()
            .next_failures
            .insert(op, (count, err));
    }

    /// Every call of `op` against `id` fails with `err`.
    pub fn fail_id(&self, op: StoreOp, id: &str, err: RecordError) {
        self.state
            .lock()
            .unwrap()
            .id_failures
            .insert((op, id.to_string()), err);
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    pub fn created(&self) -> Vec<CaseDraft> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn updated(&self) -> Vec<(String, CaseUpdate)> {
        self.state.lock().unwrap().updated.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    fn begin(&self, op: StoreOp, id: Option<&str>) -> Result<(), RecordError> {
        let mut state = self.state.lock().unwrap();
        *state.calls.entry(op).or_insert(0) += 1;
        if let Some((remaining, err)) = state.next_failures.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(err.clone());
            }
        }
        if let Some(id) = id {
            if let Some(err) = state.id_failures.get(&(op, id.to_string())) {
                return Err(err.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn query_all(&self, _soql: &str) -> Result<Vec<RemoteCaseRecord>, RecordError> {
        self.begin(StoreOp::QueryAll, None)?;
        Ok(self.state.lock().unwrap().cases.clone())
    }

    async fn query(&self, _soql: &str) -> Result<Vec<RemoteCaseRecord>, RecordError> {
        self.begin(StoreOp::Query, None)?;
        Ok(self.state.lock().unwrap().cases.clone())
    }

    async fn create(&self, draft: &CaseDraft) -> Result<String, RecordError> {
        self.begin(StoreOp::Create, None)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("500NEW{}", state.next_id);
        state.created.push(draft.clone());
        state.cases.push(RemoteCaseRecord {
            id: id.clone(),
            subject: Some(draft.subject.clone()),
            description: Some(draft.description.clone()),
            category: None,
            priority: None,
        });
        Ok(id)
    }

    async fn update(&self, id: &str, update: &CaseUpdate) -> Result<(), RecordError> {
        self.begin(StoreOp::Update, Some(id))?;
        let mut state = self.state.lock().unwrap();
        state.updated.push((id.to_string(), update.clone()));
        if let Some(case) = state.cases.iter_mut().find(|c| c.id == id) {
            case.subject = Some(update.subject.clone());
            case.category = Some(update.category.label().to_string());
            case.priority = Some(update.priority.label().to_string());
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RecordError> {
        self.begin(StoreOp::Delete, Some(id))?;
        let mut state = self.state.lock().unwrap();
        state.cases.retain(|c| c.id != id);
        state.deleted.push(id.to_string());
        Ok(())
    }
}
