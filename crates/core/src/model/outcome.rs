use serde::{Deserialize, Serialize};

use crate::model::{Achievement, AttemptId, SessionVariant};
use crate::policy::{MandatoryTally, Verdict};

/// Terminal summary of a finished session, as shown to the user.
///
/// Built from the local [`Verdict`] plus whatever the outcome sink returned. When the sink
/// could not be reached the outcome is `degraded`: the score is still complete, only the
/// achievement list and attempt id are missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    verdict: Verdict,
    unlocked: Vec<Achievement>,
    attempt_id: Option<AttemptId>,
    degraded: bool,
}

impl Outcome {
    #[must_use]
    pub fn new(verdict: Verdict, unlocked: Vec<Achievement>, attempt_id: Option<AttemptId>) -> Self {
        Self {
            verdict,
            unlocked,
            attempt_id,
            degraded: false,
        }
    }

    /// Outcome built without a sink response.
    #[must_use]
    pub fn degraded(verdict: Verdict) -> Self {
        Self {
            verdict,
            unlocked: Vec::new(),
            attempt_id: None,
            degraded: true,
        }
    }

    #[must_use]
    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }

    #[must_use]
    pub fn variant(&self) -> SessionVariant {
        self.verdict.variant
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.verdict.correct_count
    }

    #[must_use]
    pub fn total_count(&self) -> u32 {
        self.verdict.total_count
    }

    #[must_use]
    pub fn lives_lost(&self) -> Option<u32> {
        self.verdict.lives_lost
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }

    /// Every question correct. Implies `passed`.
    #[must_use]
    pub fn is_perfect(&self) -> bool {
        self.verdict.perfect
    }

    #[must_use]
    pub fn experience_awarded(&self) -> u32 {
        self.verdict.experience
    }

    #[must_use]
    pub fn mandatory(&self) -> Option<MandatoryTally> {
        self.verdict.mandatory
    }

    #[must_use]
    pub fn unlocked_achievements(&self) -> &[Achievement] {
        &self.unlocked
    }

    #[must_use]
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.attempt_id
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }
}
