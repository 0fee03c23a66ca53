//! Progress reporting
//!
//! A one-way notification channel. The pipeline reports the start of each
//! step and never looks at what the sink does with it.

use serde::{Deserialize, Serialize};

/// Number of conceptual steps in a transfer
pub const TOTAL_STEPS: u8 = 6;

/// Snapshot of pipeline progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub step: u8,
    pub total_steps: u8,
    pub message: String,
}

/// Pipeline steps, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStep {
    Initialize,
    Discover,
    BuildInstructions,
    EstimateFee,
    Sign,
    Submit,
    /// Second half of the submit step
    AwaitConfirmation,
}

impl TransferStep {
    /// 1-based step index (confirmation shares the submit step)
    pub fn index(self) -> u8 {
        match self {
            Self::Initialize => 1,
            Self::Discover => 2,
            Self::BuildInstructions => 3,
            Self::EstimateFee => 4,
            Self::Sign => 5,
            Self::Submit | Self::AwaitConfirmation => 6,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Initialize => "Initializing clients...",
            Self::Discover => "Getting relay signer info...",
            Self::BuildInstructions => "Creating transfer instruction...",
            Self::EstimateFee => "Estimating fee and getting payment instruction...",
            Self::Sign => "Building and signing transaction...",
            Self::Submit => "Submitting transaction...",
            Self::AwaitConfirmation => "Awaiting confirmation...",
        }
    }

    pub fn event(self) -> ProgressEvent {
        ProgressEvent {
            step: self.index(),
            total_steps: TOTAL_STEPS,
            message: self.message().to_string(),
        }
    }
}

/// Observer invoked synchronously at each step
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Sink that discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}
