use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::settings::SessionVariant;

/// Cumulative experience needed for [`AchievementKind::Experience1000`].
pub const EXPERIENCE_MILESTONE: u64 = 1_000;

/// Badges a user can unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementKind {
    FirstSession,
    FirstPass,
    PerfectScore,
    MockExamPassed,
    MistakeCrusher,
    Experience1000,
}

impl AchievementKind {
    pub const ALL: [AchievementKind; 6] = [
        AchievementKind::FirstSession,
        AchievementKind::FirstPass,
        AchievementKind::PerfectScore,
        AchievementKind::MockExamPassed,
        AchievementKind::MistakeCrusher,
        AchievementKind::Experience1000,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AchievementKind::FirstSession => "first_session",
            AchievementKind::FirstPass => "first_pass",
            AchievementKind::PerfectScore => "perfect_score",
            AchievementKind::MockExamPassed => "mock_exam_passed",
            AchievementKind::MistakeCrusher => "mistake_crusher",
            AchievementKind::Experience1000 => "experience_1000",
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            AchievementKind::FirstSession => "First Steps",
            AchievementKind::FirstPass => "Passed!",
            AchievementKind::PerfectScore => "Flawless",
            AchievementKind::MockExamPassed => "Test Ready",
            AchievementKind::MistakeCrusher => "Mistake Crusher",
            AchievementKind::Experience1000 => "Dedicated Learner",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            AchievementKind::FirstSession => "Finish your first session",
            AchievementKind::FirstPass => "Pass any session",
            AchievementKind::PerfectScore => "Answer every question in a session correctly",
            AchievementKind::MockExamPassed => "Pass a mock citizenship test",
            AchievementKind::MistakeCrusher => "Clear a mistake review without a single error",
            AchievementKind::Experience1000 => "Earn 1,000 experience points",
        }
    }

    #[must_use]
    pub fn achievement(self) -> Achievement {
        Achievement { kind: self }
    }
}

impl fmt::Display for AchievementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AchievementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown achievement: {s}"))
    }
}

/// An unlocked badge, ready for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Achievement {
    pub kind: AchievementKind,
}

impl Achievement {
    #[must_use]
    pub fn title(&self) -> &'static str {
        self.kind.title()
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        self.kind.description()
    }
}

/// Facts about a finished session handed to achievement evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementEvent {
    pub variant: SessionVariant,
    pub passed: bool,
    pub correct_count: u32,
    pub total_count: u32,
    /// User's experience total after this session was credited.
    pub total_experience: u64,
}

/// Every badge the event qualifies for, whether or not it was already unlocked.
///
/// Backends subtract what the user already owns.
#[must_use]
pub fn qualifying(event: &AchievementEvent) -> Vec<AchievementKind> {
    let perfect = event.total_count > 0 && event.correct_count == event.total_count;
    let mut kinds = vec![AchievementKind::FirstSession];
    if event.passed {
        kinds.push(AchievementKind::FirstPass);
    }
    if perfect {
        kinds.push(AchievementKind::PerfectScore);
    }
    if event.passed && event.variant == SessionVariant::MockExam {
        kinds.push(AchievementKind::MockExamPassed);
    }
    if perfect && event.variant == SessionVariant::MistakeReview {
        kinds.push(AchievementKind::MistakeCrusher);
    }
    if event.total_experience >= EXPERIENCE_MILESTONE {
        kinds.push(AchievementKind::Experience1000);
    }
    kinds
}
