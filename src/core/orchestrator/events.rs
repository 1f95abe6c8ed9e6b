//! Job events and the publisher that delivers them to one consumer.
//!
//! The publisher is the only way a job talks to the outside. Once the
//! consumer goes away (receiver dropped) or the job is canceled, every
//! further publish is a no-op.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::types::{FinalReport, SectionResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    Status {
        message: String,
        timestamp: DateTime<Utc>,
    },
    Log {
        message: String,
        timestamp: DateTime<Utc>,
    },
    Section {
        section_name: String,
        analysis: String,
        recommendations: Vec<String>,
        pitfalls: Vec<String>,
        supported_points: Vec<String>,
        score: u8,
        sources: Vec<String>,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },
    FinalReport {
        content: String,
        aggregate_score: u8,
        timestamp: DateTime<Utc>,
    },
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn status(message: impl Into<String>) -> Self {
        JobEvent::Status {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn log(message: impl Into<String>) -> Self {
        JobEvent::Log {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        JobEvent::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn section(result: &SectionResult) -> Self {
        JobEvent::Section {
            section_name: result.name.clone(),
            analysis: result.analysis.clone(),
            recommendations: result.recommendations.clone(),
            pitfalls: result.pitfalls.clone(),
            supported_points: result.supported_points.clone(),
            score: result.score,
            sources: result.sources.clone(),
            degraded: result.degraded,
            timestamp: Utc::now(),
        }
    }

    pub fn final_report(report: &FinalReport) -> Self {
        JobEvent::FinalReport {
            content: report.content.clone(),
            aggregate_score: report.aggregate_score,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Status { .. } => "status",
            JobEvent::Log { .. } => "log",
            JobEvent::Section { .. } => "section",
            JobEvent::FinalReport { .. } => "final_report",
            JobEvent::Error { .. } => "error",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::Status { timestamp, .. }
            | JobEvent::Log { timestamp, .. }
            | JobEvent::Section { timestamp, .. }
            | JobEvent::FinalReport { timestamp, .. }
            | JobEvent::Error { timestamp, .. } => *timestamp,
        }
    }

    /// Terminal events end the stream.
    #[cfg(test)]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::FinalReport { .. } | JobEvent::Error { .. })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            serde_json::json!({
                "type": "error",
                "message": format!("failed to encode event: {}", e),
                "timestamp": Utc::now(),
            })
            .to_string()
        })
    }
}

#[derive(Clone)]
pub struct EventPublisher {
    job_id: Arc<str>,
    tx: mpsc::UnboundedSender<JobEvent>,
    cancel: CancellationToken,
}

impl EventPublisher {
    pub fn channel(job_id: &str) -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                job_id: Arc::from(job_id),
                tx,
                cancel: CancellationToken::new(),
            },
            rx,
        )
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the consumer has dropped its receiver.
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Returns false when nothing was delivered. A closed consumer cancels the job.
    pub fn publish(&self, event: JobEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        debug!(job_id = %self.job_id, kind = event.kind(), "event");
        if self.tx.send(event).is_err() {
            info!(job_id = %self.job_id, "Event consumer went away; canceling job");
            self.cancel.cancel();
            return false;
        }
        true
    }

    pub fn status(&self, message: impl Into<String>) -> bool {
        self.publish(JobEvent::status(message))
    }

    pub fn log(&self, message: impl Into<String>) -> bool {
        self.publish(JobEvent::log(message))
    }
}

/// Log lines produced by one task. Lines stream out live and are kept so the
/// orchestrator can fold them into the job when the task is merged.
pub struct TaskLog {
    publisher: Option<EventPublisher>,
    entries: Vec<String>,
}

impl TaskLog {
    pub fn new(publisher: EventPublisher) -> Self {
        Self {
            publisher: Some(publisher),
            entries: Vec::new(),
        }
    }

    /// Collects lines without streaming them.
    pub fn detached() -> Self {
        Self {
            publisher: None,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        match &self.publisher {
            Some(p) => {
                info!(job_id = %p.job_id(), "{}", message);
                p.log(message.clone());
            }
            None => debug!("{}", message),
        }
        self.entries.push(message);
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }
}
