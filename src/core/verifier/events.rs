//! Stage event emission.
//!
//! The verifier narrates its progress through an optional [`EventSink`].
//! Emission is non-blocking and failures are swallowed at the emission
//! site; a broken sink must never disturb verification.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

/// Verification stage tags carried by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStage {
    Start,
    BasicVerification,
    PlanningStart,
    PlanningChunk,
    DimensionsPlanned,
    DimensionSearchStart,
    DimensionSearchResult,
    EnhancementStart,
    EnhancementChunk,
    EnhancementComplete,
    Complete,
}

impl VerifyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::BasicVerification => "basic_verification",
            Self::PlanningStart => "planning_start",
            Self::PlanningChunk => "planning_chunk",
            Self::DimensionsPlanned => "dimensions_planned",
            Self::DimensionSearchStart => "dimension_search_start",
            Self::DimensionSearchResult => "dimension_search_result",
            Self::EnhancementStart => "enhancement_start",
            Self::EnhancementChunk => "enhancement_chunk",
            Self::EnhancementComplete => "enhancement_complete",
            Self::Complete => "complete",
        }
    }
}

/// One structured progress event.
#[derive(Debug, Clone, Serialize)]
pub struct StageEvent {
    pub stage: VerifyStage,
    pub content: String,
    pub metadata: Value,
    pub timestamp: DateTime<Utc>,
}

impl StageEvent {
    pub fn new(stage: VerifyStage, content: impl Into<String>, metadata: Value) -> Self {
        Self {
            stage,
            content: content.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }
}

/// The receiving end has gone away.
#[derive(Debug, thiserror::Error)]
#[error("event sink closed")]
pub struct SinkClosed;

/// Narrow event-delivery capability. `send` must not block.
pub trait EventSink: Send + Sync {
    fn send(&self, event: StageEvent) -> Result<(), SinkClosed>;
}

/// Unbounded-channel sink; sends never block the verifier.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StageEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: StageEvent) -> Result<(), SinkClosed> {
        self.tx.send(event).map_err(|_| SinkClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_sink_delivers_events() {
        let (sink, mut rx) = ChannelSink::new();
        sink.send(StageEvent::new(VerifyStage::Start, "go", json!({})))
            .unwrap();
        let event = rx.try_recv().unwrap();
        assert_eq!(event.stage, VerifyStage::Start);
        assert_eq!(event.content, "go");
    }

    #[test]
    fn dropped_receiver_surfaces_sink_closed() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        assert!(
            sink.send(StageEvent::new(VerifyStage::Complete, "done", json!({})))
                .is_err()
        );
    }
}
