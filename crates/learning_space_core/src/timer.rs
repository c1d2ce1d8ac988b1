//! crates/learning_space_core/src/timer.rs
//!
//! Tracks how long a generation request has been pending and classifies it.

use serde::{Deserialize, Serialize};

/// Elapsed seconds at which a request counts as long-running.
pub const LONG_RUNNING_AFTER_SECS: u64 = 25;
/// Elapsed seconds at which the user is offered a manual retry.
pub const RETRY_ELIGIBLE_AFTER_SECS: u64 = 45;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Normal,
    LongRunning,
    RetryEligible,
}

impl GenerationStatus {
    /// Pure classification of an elapsed time.
    pub fn classify(elapsed_secs: u64) -> Self {
        if elapsed_secs >= RETRY_ELIGIBLE_AFTER_SECS {
            GenerationStatus::RetryEligible
        } else if elapsed_secs >= LONG_RUNNING_AFTER_SECS {
            GenerationStatus::LongRunning
        } else {
            GenerationStatus::Normal
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            GenerationStatus::Normal => "Usually takes ~15-20 seconds",
            GenerationStatus::LongRunning => "Taking longer than usual... still working!",
            GenerationStatus::RetryEligible => "Stuck? You can try triggering it again.",
        }
    }
}

/// A one-second tick counter for a single in-flight request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationTimer {
    elapsed_secs: u64,
    running: bool,
}

impl GenerationTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting from zero. Restarting a running timer resets it.
    pub fn start(&mut self) {
        self.elapsed_secs = 0;
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.elapsed_secs = 0;
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn status(&self) -> GenerationStatus {
        GenerationStatus::classify(self.elapsed_secs)
    }

    /// Advances one second. Returns the new status only when a threshold is crossed.
    pub fn tick(&mut self) -> Option<GenerationStatus> {
        if !self.running {
            return None;
        }
        self.elapsed_secs += 1;
        match self.elapsed_secs {
            LONG_RUNNING_AFTER_SECS | RETRY_ELIGIBLE_AFTER_SECS => Some(self.status()),
            _ => None,
        }
    }

    /// `m:ss`, as shown next to a pending widget.
    pub fn display(&self) -> String {
        format!("{}:{:02}", self.elapsed_secs / 60, self.elapsed_secs % 60)
    }
}
