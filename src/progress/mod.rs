//! Progress reporting
//!
//! Progress is advisory: the scheduler hands events to a `ProgressSink` from
//! inside the step loop, so `report` must return promptly and never fail.
//! Sinks that forward somewhere slow buffer or drop.

use crate::task::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventType {
    TaskStart,
    StepStart,
    StepComplete,
    StepFailed,
    StepSkipped,
    CorrectionAttempt,
    TaskComplete,
    TaskFailed,
    TaskCancelled,
}

impl ProgressEventType {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProgressEventType::TaskComplete
                | ProgressEventType::TaskFailed
                | ProgressEventType::TaskCancelled
        )
    }
}

/// Coarse progress of one task: step index out of total plus a description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub task_id: TaskId,
    pub timestamp: DateTime<Utc>,
    pub event_type: ProgressEventType,
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(
        task_id: TaskId,
        event_type: ProgressEventType,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            timestamp: Utc::now(),
            event_type,
            current,
            total,
            message: message.into(),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    /// Must not block
    fn report(&self, event: ProgressEvent);
}

pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Writes every event to the tracing subscriber
pub struct LoggingProgress;

impl ProgressSink for LoggingProgress {
    fn report(&self, event: ProgressEvent) {
        info!(
            task_id = %event.task_id,
            event = ?event.event_type,
            current = event.current,
            total = event.total,
            "{}",
            event.message
        );
    }
}

/// Forwards events over a bounded channel, dropping them when the receiver lags
pub struct ChannelProgress {
    sender: mpsc::Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        if let Err(e) = self.sender.try_send(event) {
            debug!(error = %e, "Dropped progress event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: ProgressEventType) -> ProgressEvent {
        ProgressEvent::new(TaskId::new(), event_type, 1, 5, "Analyze current codebase")
    }

    #[tokio::test]
    async fn test_channel_progress_delivers_events() {
        let (sink, mut receiver) = ChannelProgress::new(4);
        sink.report(event(ProgressEventType::StepStart));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type, ProgressEventType::StepStart);
        assert_eq!((received.current, received.total), (1, 5));
    }

    #[tokio::test]
    async fn test_full_channel_drops_instead_of_blocking() {
        let (sink, mut receiver) = ChannelProgress::new(1);
        sink.report(event(ProgressEventType::StepStart));
        sink.report(event(ProgressEventType::StepComplete));

        assert_eq!(
            receiver.recv().await.unwrap().event_type,
            ProgressEventType::StepStart
        );
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_closed_channel_is_ignored() {
        let (sink, receiver) = ChannelProgress::new(1);
        drop(receiver);
        sink.report(event(ProgressEventType::TaskComplete));
    }

    #[test]
    fn test_terminal_events() {
        assert!(ProgressEventType::TaskCancelled.is_terminal());
        assert!(!ProgressEventType::StepFailed.is_terminal());
    }
}
