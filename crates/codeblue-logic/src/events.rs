//! Timestamped audit log emitted by the kernel.
//!
//! Each record serializes flat as `{ "timestamp_ms", "type", "data" }`.
//! The log is the only thing downstream debrief tooling reads; nothing
//! here knows about that consumer.

use serde::{Deserialize, Serialize};

use crate::intervention::{InterventionOutcome, InterventionType};
use crate::patient::{Rhythm, TransientEffect};

/// One entry in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalEvent {
    pub timestamp_ms: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    InterventionExecuted {
        intervention: InterventionType,
        dose: Option<f64>,
        outcome: InterventionOutcome,
        /// What the operator said, kept verbatim for playback.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spoken: Option<String>,
    },
    InterventionNotExecuted {
        intervention: InterventionType,
        outcome: InterventionOutcome,
        reason: String,
    },
    RhythmChange {
        from: Rhythm,
        to: Rhythm,
    },
    TransientStart {
        effect: TransientEffect,
        duration_ms: u64,
    },
    TransientEnd {
        effect: TransientEffect,
        converted: bool,
    },
    AccessEstablished {
        intervention: InterventionType,
    },
}

impl ClinicalEvent {
    pub fn new(timestamp_ms: u64, kind: EventKind) -> Self {
        Self { timestamp_ms, kind }
    }
}
