//! Scoring and pass/fail rules for a finished session.

use serde::{Deserialize, Serialize};

use crate::model::{AchievementEvent, SessionSettings, SessionVariant};
use crate::session::{FinishReason, Session};

/// How the user did on the mandatory topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MandatoryTally {
    pub correct: u32,
    pub total: u32,
}

impl MandatoryTally {
    /// With no mandatory questions in the session the condition holds vacuously.
    #[must_use]
    pub fn satisfied(&self) -> bool {
        self.correct == self.total
    }
}

/// Locally computed result of a session, before the outcome sink has responded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub variant: SessionVariant,
    pub correct_count: u32,
    pub total_count: u32,
    pub lives_lost: Option<u32>,
    pub required_correct: u32,
    pub mandatory: Option<MandatoryTally>,
    pub passed: bool,
    pub perfect: bool,
    pub experience: u32,
    pub elapsed_secs: u32,
    pub finish_reason: Option<FinishReason>,
}

impl Verdict {
    /// Facts for achievement evaluation once the user's new experience total is known.
    #[must_use]
    pub fn achievement_event(&self, total_experience: u64) -> AchievementEvent {
        AchievementEvent {
            variant: self.variant,
            passed: self.passed,
            correct_count: self.correct_count,
            total_count: self.total_count,
            total_experience,
        }
    }
}

/// Score `session` against `settings`.
///
/// Unanswered questions count against the user: a timed-out exam is judged on the full
/// question list, not on the questions reached.
#[must_use]
pub fn evaluate(session: &Session, settings: &SessionSettings) -> Verdict {
    let correct_count = session.score();
    let total_count = u32::try_from(session.questions().len()).unwrap_or(u32::MAX);
    let required_correct = settings.pass_threshold().required_for(total_count);

    let mandatory = settings
        .mandatory_topic()
        .map(|topic| mandatory_tally(session, topic));

    let standard_pass = correct_count >= required_correct;
    let passed = standard_pass && mandatory.is_none_or(|tally| tally.satisfied());
    let perfect = total_count > 0 && correct_count == total_count;

    Verdict {
        variant: settings.variant(),
        correct_count,
        total_count,
        lives_lost: session.lives_lost(),
        required_correct,
        mandatory,
        passed,
        perfect,
        experience: correct_count.saturating_mul(settings.reward_per_correct()),
        elapsed_secs: session.elapsed_secs(),
        finish_reason: session.finish_reason(),
    }
}

fn mandatory_tally(session: &Session, topic: &str) -> MandatoryTally {
    let total = session
        .questions()
        .iter()
        .filter(|q| q.has_topic(topic))
        .count();
    let correct = session
        .answers()
        .iter()
        .filter(|a| a.correct)
        .filter(|a| {
            session
                .question(a.question_id)
                .is_some_and(|q| q.has_topic(topic))
        })
        .count();

    MandatoryTally {
        correct: u32::try_from(correct).unwrap_or(u32::MAX),
        total: u32::try_from(total).unwrap_or(u32::MAX),
    }
}
