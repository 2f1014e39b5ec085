use crate::config::Config;
use crate::prompts;
use crate::records::{RecordAdapter, RecordError};
use crate::retry::{RetryingCaller, exponential_delay};
use crate::types::{
    CaseCategory, CaseDraft, CaseUpdate, Priority, RemoteCaseRecord, SUBJECT_MAX_CHARS,
};
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info, instrument, warn};

const WRAPPERS: [char; 4] = ['"', '[', ']', '.'];

/// Removes one leading and one trailing wrapper character when both ends
/// carry one of `"`, `[`, `]`, `.`.
pub fn strip_chars(text: &str) -> &str {
    let mut chars = text.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if WRAPPERS.contains(&first) && WRAPPERS.contains(&last) => {
            chars.as_str()
        }
        (Some(only), None) if WRAPPERS.contains(&only) => "",
        _ => text,
    }
}

/// Drops everything up to and including the first `": "`.
pub fn drop_preamble(text: &str) -> &str {
    match text.find(": ") {
        Some(idx) => &text[idx + 2..],
        None => text,
    }
}

/// Subject clean-up for retagging: surrounding quotes, surrounding
/// brackets, a trailing period, then any preamble.
pub fn clean_subject(text: &str) -> &str {
    let mut subject = text;
    if let Some(inner) = strip_pair(subject, &['"', '\''], &['"', '\'']) {
        subject = inner;
    }
    if let Some(inner) = strip_pair(subject, &['['], &[']']) {
        subject = inner;
    }
    if let Some(inner) = subject.strip_suffix('.') {
        subject = inner;
    }
    drop_preamble(subject)
}

fn strip_pair<'a>(text: &'a str, open: &[char], close: &[char]) -> Option<&'a str> {
    let inner = text.strip_prefix(open)?;
    inner.strip_suffix(close)
}

pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisSettings {
    pub timeout: Duration,
    pub body_timeout: Duration,
    pub case_attempts: u32,
    pub backoff_base: u32,
    pub backoff_unit: Duration,
}

impl SynthesisSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            timeout: cfg.generation.timeout(),
            body_timeout: cfg.generation.body_timeout(),
            case_attempts: cfg.pool.case_attempts,
            backoff_base: cfg.pool.backoff_base,
            backoff_unit: cfg.pool.backoff_unit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedCase {
    pub id: String,
    pub subject: String,
}

fn create_outcome_unknown(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<RecordError>(),
        Some(RecordError::Malformed(_))
    )
}

#[derive(Debug)]
enum RetagError {
    /// A field could not be generated; the whole record is retried.
    Missing(&'static str),
    Record(RecordError),
}

/// Per-record workflows: synthesizing new cases and retagging existing ones.
#[derive(Clone)]
pub struct CaseSynthesizer {
    caller: RetryingCaller,
    records: RecordAdapter,
    settings: SynthesisSettings,
}

impl CaseSynthesizer {
    pub fn new(caller: RetryingCaller, records: RecordAdapter, settings: SynthesisSettings) -> Self {
        Self {
            caller,
            records,
            settings,
        }
    }

    pub fn records(&self) -> &RecordAdapter {
        &self.records
    }

    /// Creates one case, retrying the whole workflow with exponential
    /// backoff. Exhaustion is returned as a description, never raised.
    #[instrument(skip(self))]
    pub async fn synthesize(&self, case_num: usize) -> Result<CreatedCase, String> {
        let attempts = self.settings.case_attempts;
        for attempt in 1..=attempts {
            match self.synthesize_once().await {
                Ok(created) => {
                    info!(
                        case_num,
                        id = %created.id,
                        "case {case_num} created with subject: {}",
                        created.subject
                    );
                    return Ok(created);
                }
                Err(err) if create_outcome_unknown(&err) => {
                    error!(case_num, "case {case_num} may already exist, not retrying: {err:#}");
                    return Err(format!(
                        "case {case_num} was submitted but its creation could not be confirmed: {err:#}"
                    ));
                }
                Err(err) => {
                    warn!(case_num, attempt, "case {case_num} encountered an error: {err:#}");
                    if attempt < attempts {
                        let delay = exponential_delay(
                            self.settings.backoff_unit,
                            self.settings.backoff_base,
                            attempt,
                        );
                        warn!(case_num, "retrying... ({attempt}/{attempts}) in {delay:?}");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
        Err(format!(
            "case {case_num} failed to create a case after {attempts} attempts"
        ))
    }

    async fn synthesize_once(&self) -> Result<CreatedCase> {
        let body_request = {
            let mut rng = rand::thread_rng();
            prompts::case_body(&mut rng, self.settings.body_timeout)
        };
        let body = self
            .caller
            .call(body_request)
            .await
            .context("no case body generated")?;

        let raw_subject = self
            .caller
            .call(prompts::vague_subject(&body, self.settings.timeout))
            .await
            .context("no subject generated")?;
        let subject = truncate_chars(
            drop_preamble(strip_chars(&raw_subject)),
            SUBJECT_MAX_CHARS,
        )
        .to_string();

        let draft = CaseDraft {
            subject,
            description: body,
        };
        let id = self
            .records
            .create(&draft)
            .await
            .context("failed to create case")?;
        Ok(CreatedCase {
            id,
            subject: draft.subject,
        })
    }

    /// Regenerates subject, category and priority for one existing case and
    /// applies them in a single update.
    ///
    /// Missing generated fields retry the record with the fixed record
    /// delay. A rejected or exhausted update skips the record.
    #[instrument(skip_all, fields(case_id = %record.id))]
    pub async fn retag(&self, record: &RemoteCaseRecord) -> Result<CaseUpdate, String> {
        let id = record.id.as_str();
        let description = record.description.as_deref().unwrap_or_default();
        let policy = self.records.policy();

        for attempt in 1..=policy.attempts {
            match self.retag_once(id, description).await {
                Ok(update) => return Ok(update),
                Err(RetagError::Record(err)) => {
                    error!(case_id = id, "update for case {id} failed: {err}. skipping");
                    return Err(format!("case {id}: {err}"));
                }
                Err(RetagError::Missing(field)) => {
                    warn!(
                        case_id = id,
                        attempt,
                        "update attempt {attempt} for case {id} failed: no {field} generated"
                    );
                    if attempt < policy.attempts {
                        tokio::time::sleep(policy.delay).await;
                    }
                }
            }
        }
        error!(case_id = id, "max update retries reached for case {id}. skipping");
        Err(format!(
            "case {id}: max update retries reached after {} attempts",
            policy.attempts
        ))
    }

    async fn retag_once(&self, id: &str, description: &str) -> Result<CaseUpdate, RetagError> {
        let update = self.derive_update(description).await?;
        self.records
            .update(id, &update)
            .await
            .map_err(RetagError::Record)?;
        Ok(update)
    }

    async fn derive_update(&self, description: &str) -> Result<CaseUpdate, RetagError> {
        let timeout = self.settings.timeout;

        let subject = self
            .caller
            .call(prompts::detailed_subject(description, timeout))
            .await
            .ok_or(RetagError::Missing("subject"))?;
        let category = self
            .caller
            .call(prompts::category(description, timeout))
            .await
            .ok_or(RetagError::Missing("category"))?;
        let priority = self
            .caller
            .call(prompts::priority(description, timeout))
            .await
            .ok_or(RetagError::Missing("priority"))?;

        let subject = clean_subject(&subject);
        Ok(CaseUpdate {
            subject: truncate_chars(subject, SUBJECT_MAX_CHARS).to_string(),
            category: CaseCategory::from_label(&category),
            priority: Priority::from_generated(clean_subject(&priority)),
        })
    }
}
