//! Progress events emitted while a generation job runs.
//!
//! Events for one job are delivered in production order. On the wire each
//! event is one `data: {json}` line followed by a blank line.

use serde::{Deserialize, Serialize};

use crate::scenario::Scenario;

/// One entry of a job's progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Progress { text: String },
    Scenario { scenario: Box<Scenario> },
    Complete { message: String },
    Error { message: String },
}

impl JobEvent {
    pub fn progress(text: impl Into<String>) -> Self {
        JobEvent::Progress { text: text.into() }
    }

    pub fn scenario(scenario: Scenario) -> Self {
        JobEvent::Scenario {
            scenario: Box::new(scenario),
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        JobEvent::Complete {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        JobEvent::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Progress { .. } => "progress",
            JobEvent::Scenario { .. } => "scenario",
            JobEvent::Complete { .. } => "complete",
            JobEvent::Error { .. } => "error",
        }
    }

    /// Ends the stream for its job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Complete { .. } | JobEvent::Error { .. })
    }

    /// Encodes the event as a server-sent-events data line.
    pub fn to_sse_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", serde_json::to_string(self)?))
    }
}
