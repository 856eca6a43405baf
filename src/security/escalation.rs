//! Violation counting with a blocking threshold.
//!
//! Shared by the admission gates (suspicion score per identity) and the
//! anomaly inspector (content violations per address). The caller owns the
//! counter; this type only knows how it moves and when it crosses.

/// Threshold-based escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Escalation {
    threshold: u32,
}

impl Escalation {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record one violation. Returns true once the score has reached the threshold.
    pub fn record(&self, score: &mut u32) -> bool {
        *score = score.saturating_add(1);
        self.is_over(*score)
    }

    /// Relax the score by one step, floored at zero.
    pub fn decay(&self, score: &mut u32) {
        *score = score.saturating_sub(1);
    }

    pub fn is_over(&self, score: u32) -> bool {
        score >= self.threshold
    }
}
