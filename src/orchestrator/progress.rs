//! Progress reporting seam
//!
//! The orchestrator emits events through a ProgressSink instead of knowing
//! about any particular frontend. Callers plug in a sink; the default
//! discards everything.

use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

/// Orchestration lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    TaskStarted {
        task_id: String,
        subtask_count: usize,
    },
    SubtaskStarted {
        task_id: String,
        subtask_id: String,
        worker: String,
    },
    SubtaskCompleted {
        task_id: String,
        subtask_id: String,
        success: bool,
        duration_secs: f64,
    },
    SubtaskSkipped {
        task_id: String,
        subtask_id: String,
        reason: String,
    },
    MergeFinished {
        task_id: String,
        subtask_id: String,
        merged: bool,
        conflict_files: Vec<String>,
    },
    TaskFinished {
        task_id: String,
        completed: usize,
        failed: usize,
        skipped: usize,
    },
}

/// Receives orchestration progress events
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards all events
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events to an mpsc channel; drops them once the receiver is gone
pub struct ChannelSink {
    tx: Sender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            log::debug!("[ChannelSink] Receiver dropped, discarding event");
        }
    }
}

/// Logs each event at info level
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: ProgressEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => log::info!("[Progress] {}", json),
            Err(e) => log::warn!("[Progress] Failed to serialize event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_channel_sink_forwards_events() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);

        sink.emit(ProgressEvent::TaskStarted {
            task_id: "task-1".to_string(),
            subtask_count: 3,
        });

        match rx.recv().unwrap() {
            ProgressEvent::TaskStarted {
                task_id,
                subtask_count,
            } => {
                assert_eq!(task_id, "task-1");
                assert_eq!(subtask_count, 3);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        let sink = ChannelSink::new(tx);
        sink.emit(ProgressEvent::TaskStarted {
            task_id: "task-1".to_string(),
            subtask_count: 1,
        });
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ProgressEvent::SubtaskSkipped {
            task_id: "t".to_string(),
            subtask_id: "s".to_string(),
            reason: "dependency failed".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"subtask_skipped\""));
    }
}
