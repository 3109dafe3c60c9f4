use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Pipeline stages reported through progress updates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initializing,
    Processing,
    Fusing,
    Complete,
    Error,
}

/// A snapshot of orchestration progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingProgress {
    pub stage: Stage,
    pub total_sources: usize,
    pub completed_sources: usize,
    pub current_source: Option<String>,
}

impl Default for ProcessingProgress {
    fn default() -> Self {
        Self {
            stage: Stage::Initializing,
            total_sources: 0,
            completed_sources: 0,
            current_source: None,
        }
    }
}

/// Last-write-wins progress holder backed by a watch channel.
///
/// Updates never block; subscribers observe the latest value and may miss
/// intermediate states.
pub struct ProgressTracker {
    tx: watch::Sender<ProcessingProgress>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProcessingProgress::default());
        Self { tx }
    }

    /// Replace the current progress snapshot. Fire-and-forget.
    pub fn update(&self, progress: ProcessingProgress) {
        self.tx.send_replace(progress);
    }

    /// Current snapshot.
    pub fn get(&self) -> ProcessingProgress {
        self.tx.borrow().clone()
    }

    /// Subscribe to future updates.
    pub fn subscribe(&self) -> watch::Receiver<ProcessingProgress> {
        self.tx.subscribe()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let tracker = ProgressTracker::new();
        tracker.update(ProcessingProgress {
            stage: Stage::Processing,
            total_sources: 3,
            completed_sources: 1,
            current_source: Some("text".to_string()),
        });
        tracker.update(ProcessingProgress {
            stage: Stage::Fusing,
            total_sources: 3,
            completed_sources: 3,
            current_source: None,
        });

        let snapshot = tracker.get();
        assert_eq!(snapshot.stage, Stage::Fusing);
        assert_eq!(snapshot.completed_sources, 3);
    }

    #[tokio::test]
    async fn test_subscriber_sees_latest() {
        let tracker = ProgressTracker::new();
        let mut rx = tracker.subscribe();

        tracker.update(ProcessingProgress {
            stage: Stage::Complete,
            total_sources: 1,
            completed_sources: 1,
            current_source: None,
        });

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().stage, Stage::Complete);
    }
}
