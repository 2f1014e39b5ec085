use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Salesforce rejects longer Case subjects.
pub const SUBJECT_MAX_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// One call to the text-generation service.
///
/// `timeout` is the hard wall-clock deadline enforced by the invoker, not the
/// transport's own request timeout.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout: Duration,
    /// Short name of the generation step, carried into retry logs.
    pub step: &'static str,
}

impl GenerationRequest {
    pub const DEFAULT_MAX_TOKENS: u32 = 50;
    pub const DEFAULT_TEMPERATURE: f32 = 0.8;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            temperature: Self::DEFAULT_TEMPERATURE,
            timeout: Self::DEFAULT_TIMEOUT,
            step: "generation",
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_step(mut self, step: &'static str) -> Self {
        self.step = step;
        self
    }

    /// Content of the last user message, used to route scripted responses
    /// and for log context.
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("service error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Remote {
        status: Option<u16>,
        message: String,
    },
}

pub type GenerationResult = Result<String, GenerationFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CaseCategory {
    #[serde(rename = "Login Help")]
    LoginHelp,
    #[serde(rename = "Payment Question")]
    PaymentQuestion,
    #[serde(rename = "Bank Deposit")]
    BankDeposit,
    Technical,
    #[serde(rename = "Invoice Balance")]
    InvoiceBalance,
    Reconciliation,
    #[serde(rename = "Feature Request")]
    FeatureRequest,
    Bug,
    #[serde(rename = "SSO")]
    Sso,
    #[serde(rename = "Bill Image / PDF")]
    BillImage,
    #[serde(rename = "File Import")]
    FileImport,
    #[serde(rename = "Data Request")]
    DataRequest,
    Training,
    #[serde(rename = "Web Service")]
    WebService,
    Documentation,
    Other,
}

impl CaseCategory {
    pub const ALL: [CaseCategory; 16] = [
        CaseCategory::LoginHelp,
        CaseCategory::PaymentQuestion,
        CaseCategory::BankDeposit,
        CaseCategory::Technical,
        CaseCategory::InvoiceBalance,
        CaseCategory::Reconciliation,
        CaseCategory::FeatureRequest,
        CaseCategory::Bug,
        CaseCategory::Sso,
        CaseCategory::BillImage,
        CaseCategory::FileImport,
        CaseCategory::DataRequest,
        CaseCategory::Training,
        CaseCategory::WebService,
        CaseCategory::Documentation,
        CaseCategory::Other,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CaseCategory::LoginHelp => "Login Help",
            CaseCategory::PaymentQuestion => "Payment Question",
            CaseCategory::BankDeposit => "Bank Deposit",
            CaseCategory::Technical => "Technical",
            CaseCategory::InvoiceBalance => "Invoice Balance",
            CaseCategory::Reconciliation => "Reconciliation",
            CaseCategory::FeatureRequest => "Feature Request",
            CaseCategory::Bug => "Bug",
            CaseCategory::Sso => "SSO",
            CaseCategory::BillImage => "Bill Image / PDF",
            CaseCategory::FileImport => "File Import",
            CaseCategory::DataRequest => "Data Request",
            CaseCategory::Training => "Training",
            CaseCategory::WebService => "Web Service",
            CaseCategory::Documentation => "Documentation",
            CaseCategory::Other => "Other",
        }
    }

    /// Exact label match; anything else is `Other`.
    pub fn from_label(text: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|c| c.label() == text)
            .unwrap_or(CaseCategory::Other)
    }
}

impl fmt::Display for CaseCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }

    /// Case-insensitive; unrecognised text falls back to `Medium`.
    pub fn from_generated(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Medium,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fields for a new Case, complete before it is handed to the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseDraft {
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Description")]
    pub description: String,
}

/// Combined retag update for an existing Case.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaseUpdate {
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Type")]
    pub category: CaseCategory,
    #[serde(rename = "Priority")]
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteCaseRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Subject", default)]
    pub subject: Option<String>,
    #[serde(rename = "Description", default)]
    pub description: Option<String>,
    #[serde(rename = "Type", default)]
    pub category: Option<String>,
    #[serde(rename = "Priority", default)]
    pub priority: Option<String>,
}
