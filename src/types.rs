//! Core types for dlhub

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::TaskError;

/// Unique identifier for a task (typically the source URL)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Create a new TaskId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied task options, opaque to the core
pub type TaskOptions = serde_json::Map<String, serde_json::Value>;

/// One unit of submitted work
///
/// Immutable once handed to the orchestrator: workers only ever borrow it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// Options forwarded untouched to the work unit
    #[serde(default)]
    #[schema(value_type = Object)]
    pub options: TaskOptions,
}

impl Task {
    /// Create a task with no options
    pub fn new(id: impl Into<TaskId>) -> Self {
        Self {
            id: id.into(),
            options: TaskOptions::new(),
        }
    }

    /// Attach an option value
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }
}

/// Recorded outcome of one task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TaskResult {
    /// Task identifier
    pub id: TaskId,
    /// Failure, if the task did not succeed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    /// Classified severity (0 = success, always >= 1 when `error` is set)
    pub severity: i32,
}

impl TaskResult {
    /// Build a successful result
    pub fn success(id: TaskId) -> Self {
        Self {
            id,
            error: None,
            severity: 0,
        }
    }

    /// Build a failed result
    ///
    /// Severities below 1 are raised to 1 so that a failed result can never
    /// report a success exit code.
    pub fn failure(id: TaskId, error: TaskError, severity: i32) -> Self {
        Self {
            id,
            error: Some(error),
            severity: severity.max(1),
        }
    }

    /// Whether the task succeeded
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated outcome of one batch run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BatchOutcome {
    /// Collected results, in completion order
    pub results: Vec<TaskResult>,
    /// Process-level exit status (0, 130, or the worst severity)
    pub exit_code: i32,
}

impl BatchOutcome {
    /// Whether the batch was cut short by cancellation
    pub fn is_interrupted(&self) -> bool {
        self.exit_code == crate::orchestrator::EXIT_INTERRUPTED
    }
}

/// Lifecycle status carried by progress events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// Waiting for a worker
    Queued,
    /// Transfer in progress
    Downloading,
    /// Post-transfer work (merging, converting)
    Processing,
    /// Completed successfully
    Finished,
    /// Failed
    Failed,
}

impl ProgressStatus {
    /// Whether no further progress is expected for the task
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressStatus::Finished | ProgressStatus::Failed)
    }
}

/// Progress payload for one task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProgressPayload {
    /// Task identifier
    pub id: TaskId,
    /// Output filename, once known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Completion percentage (0.0 to 100.0)
    pub percent: f64,
    /// Current status
    pub status: ProgressStatus,
    /// Human-readable time remaining
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

impl ProgressPayload {
    /// Create a progress payload, clamping `percent` into [0, 100]
    pub fn new(id: TaskId, percent: f64, status: ProgressStatus) -> Self {
        Self {
            id,
            filename: None,
            percent: clamp_percent(percent),
            status,
            eta: None,
        }
    }

    /// Bring a hand-filled payload back into range (NaN becomes 0)
    pub fn normalized(mut self) -> Self {
        self.percent = clamp_percent(self.percent);
        self
    }

    /// Attach a filename
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Attach an ETA string
    pub fn with_eta(mut self, eta: impl Into<String>) -> Self {
        self.eta = Some(eta.into());
        self
    }
}

fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

/// Error payload for one task
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ErrorPayload {
    /// Task identifier
    pub id: TaskId,
    /// Error message
    pub message: String,
    /// Severity code
    pub code: i32,
}

/// Message streamed to subscribers
///
/// Serialized as the envelope `{"type": ..., "payload": {...}}`. Envelopes
/// with an unrecognized `type` deserialize into [`Event::Other`] and are
/// forwarded untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Envelope", into = "Envelope")]
pub enum Event {
    /// Task progress update
    Progress(ProgressPayload),
    /// Task failure
    Error(ErrorPayload),
    /// Any other event type, carried opaquely
    Other {
        /// Envelope type tag
        kind: String,
        /// Raw payload
        payload: serde_json::Value,
    },
}

impl Event {
    /// Envelope type tag for this event
    pub fn kind(&self) -> &str {
        match self {
            Event::Progress(_) => "progress",
            Event::Error(_) => "error",
            Event::Other { kind, .. } => kind,
        }
    }

    /// Task this event belongs to, if known
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Event::Progress(p) => Some(&p.id),
            Event::Error(e) => Some(&e.id),
            Event::Other { .. } => None,
        }
    }

    /// Shorthand for a progress event
    pub fn progress(id: impl Into<TaskId>, percent: f64, status: ProgressStatus) -> Self {
        Event::Progress(ProgressPayload::new(id.into(), percent, status))
    }

    /// Shorthand for an error event
    pub fn error(id: impl Into<TaskId>, message: impl Into<String>, code: i32) -> Self {
        Event::Error(ErrorPayload {
            id: id.into(),
            message: message.into(),
            code,
        })
    }
}

/// Wire envelope shared by every event type
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct Envelope {
    /// Event type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

impl TryFrom<Envelope> for Event {
    type Error = serde_json::Error;

    fn try_from(envelope: Envelope) -> Result<Self, serde_json::Error> {
        match envelope.kind.as_str() {
            "progress" => {
                let payload: ProgressPayload = serde_json::from_value(envelope.payload)?;
                Ok(Event::Progress(payload.normalized()))
            }
            "error" => Ok(Event::Error(serde_json::from_value(envelope.payload)?)),
            _ => Ok(Event::Other {
                kind: envelope.kind,
                payload: envelope.payload,
            }),
        }
    }
}

impl From<Event> for Envelope {
    fn from(event: Event) -> Self {
        // Payload structs only hold strings, numbers and enums, so to_value cannot fail
        let (kind, payload) = match event {
            Event::Progress(p) => (
                "progress".to_string(),
                serde_json::to_value(p).unwrap_or(serde_json::Value::Null),
            ),
            Event::Error(e) => (
                "error".to_string(),
                serde_json::to_value(e).unwrap_or(serde_json::Value::Null),
            ),
            Event::Other { kind, payload } => (kind, payload),
        };
        Envelope { kind, payload }
    }
}
