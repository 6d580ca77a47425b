use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Mandatory topic for the mock exam: every question from it must be answered correctly.
pub const DEFAULT_MANDATORY_TOPIC: &str = "Democratic beliefs, rights and liberties";

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SettingsError {
    #[error("life budget must be > 0 when lives are enabled")]
    InvalidLifeBudget,

    #[error("time limit must be > 0 seconds when the timer is enabled")]
    InvalidTimeLimit,

    #[error("question count must be > 0")]
    InvalidQuestionCount,

    #[error("pass threshold must be in (0, 1], got {provided}")]
    InvalidPassFraction { provided: String },

    #[error("pass threshold must be between 1 and 100 percent, got {provided}")]
    InvalidPassPercent { provided: u8 },

    #[error("mandatory topic cannot be blank")]
    BlankMandatoryTopic,

    #[error("unknown session variant: {0}")]
    UnknownVariant(String),
}

//
// ─── VARIANT ───────────────────────────────────────────────────────────────────
//

/// Which flavour of assessment a session runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionVariant {
    /// Casual quiz with a heart budget.
    Practice,
    /// Timed exam with the mandatory-topic rule.
    MockExam,
    /// Drill over the user's outstanding mistakes.
    MistakeReview,
}

impl SessionVariant {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionVariant::Practice => "practice",
            SessionVariant::MockExam => "mock_exam",
            SessionVariant::MistakeReview => "mistake_review",
        }
    }
}

impl fmt::Display for SessionVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionVariant {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "practice" => Ok(Self::Practice),
            "mock_exam" => Ok(Self::MockExam),
            "mistake_review" => Ok(Self::MistakeReview),
            other => Err(SettingsError::UnknownVariant(other.to_owned())),
        }
    }
}

//
// ─── PASS THRESHOLD ────────────────────────────────────────────────────────────
//

/// Fraction of questions that must be correct to pass, held as whole percent.
///
/// Integer percent keeps `ceil(total * threshold)` exact: `0.6` as a float times 5 is
/// slightly above 3 and would otherwise round up to 4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PassThreshold(u8);

impl PassThreshold {
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidPassPercent` unless `1 <= percent <= 100`.
    pub fn from_percent(percent: u8) -> Result<Self, SettingsError> {
        if !(1..=100).contains(&percent) {
            return Err(SettingsError::InvalidPassPercent { provided: percent });
        }
        Ok(Self(percent))
    }

    /// Build from a fraction in `(0, 1]`, rounded to the nearest percent.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError::InvalidPassFraction` for non-finite or out-of-range values.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_fraction(fraction: f32) -> Result<Self, SettingsError> {
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(SettingsError::InvalidPassFraction {
                provided: fraction.to_string(),
            });
        }
        let percent = (fraction * 100.0).round().clamp(1.0, 100.0) as u8;
        Self::from_percent(percent)
    }

    #[must_use]
    pub fn percent(self) -> u8 {
        self.0
    }

    /// Minimum number of correct answers needed out of `total`.
    #[must_use]
    pub fn required_for(self, total: u32) -> u32 {
        let scaled = u64::from(total) * u64::from(self.0);
        u32::try_from(scaled.div_ceil(100)).unwrap_or(u32::MAX)
    }
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Configuration for one session variant.
///
/// A single engine runs every variant; these settings decide whether hearts and the
/// countdown are in play, how passing is judged and how much experience a correct answer
/// is worth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    variant: SessionVariant,
    life_budget: Option<u32>,
    time_limit_secs: Option<u32>,
    pass_threshold: PassThreshold,
    mandatory_topic: Option<String>,
    reward_per_correct: u32,
    question_count: u32,
}

impl SessionSettings {
    /// Creates custom settings.
    ///
    /// # Errors
    ///
    /// Returns `SettingsError` if an enabled budget/limit is zero, the question count is
    /// zero, or the mandatory topic is blank.
    pub fn new(
        variant: SessionVariant,
        life_budget: Option<u32>,
        time_limit_secs: Option<u32>,
        pass_threshold: PassThreshold,
        mandatory_topic: Option<String>,
        reward_per_correct: u32,
        question_count: u32,
    ) -> Result<Self, SettingsError> {
        if life_budget == Some(0) {
            return Err(SettingsError::InvalidLifeBudget);
        }
        if time_limit_secs == Some(0) {
            return Err(SettingsError::InvalidTimeLimit);
        }
        if question_count == 0 {
            return Err(SettingsError::InvalidQuestionCount);
        }
        let mandatory_topic = match mandatory_topic {
            Some(topic) if topic.trim().is_empty() => {
                return Err(SettingsError::BlankMandatoryTopic);
            }
            Some(topic) => Some(topic.trim().to_owned()),
            None => None,
        };

        Ok(Self {
            variant,
            life_budget,
            time_limit_secs,
            pass_threshold,
            mandatory_topic,
            reward_per_correct,
            question_count,
        })
    }

    /// Practice quiz: 5 hearts, untimed, 60% to pass, 10 XP per correct answer.
    #[must_use]
    pub fn practice() -> Self {
        Self {
            variant: SessionVariant::Practice,
            life_budget: Some(5),
            time_limit_secs: None,
            pass_threshold: PassThreshold(60),
            mandatory_topic: None,
            reward_per_correct: 10,
            question_count: 10,
        }
    }

    /// Mock exam: 20 questions in 45 minutes, 75% to pass, all mandatory-topic
    /// questions correct, 20 XP per correct answer.
    #[must_use]
    pub fn mock_exam() -> Self {
        Self {
            variant: SessionVariant::MockExam,
            life_budget: None,
            time_limit_secs: Some(45 * 60),
            pass_threshold: PassThreshold(75),
            mandatory_topic: Some(DEFAULT_MANDATORY_TOPIC.to_owned()),
            reward_per_correct: 20,
            question_count: 20,
        }
    }

    /// Mistake review: untimed, no hearts, 5 XP per correct answer.
    #[must_use]
    pub fn mistake_review() -> Self {
        Self {
            variant: SessionVariant::MistakeReview,
            life_budget: None,
            time_limit_secs: None,
            pass_threshold: PassThreshold(60),
            mandatory_topic: None,
            reward_per_correct: 5,
            question_count: 20,
        }
    }

    /// Preset settings for a variant.
    #[must_use]
    pub fn for_variant(variant: SessionVariant) -> Self {
        match variant {
            SessionVariant::Practice => Self::practice(),
            SessionVariant::MockExam => Self::mock_exam(),
            SessionVariant::MistakeReview => Self::mistake_review(),
        }
    }

    /// # Errors
    ///
    /// Returns `SettingsError::InvalidLifeBudget` for `Some(0)`.
    pub fn with_life_budget(mut self, life_budget: Option<u32>) -> Result<Self, SettingsError> {
        if life_budget == Some(0) {
            return Err(SettingsError::InvalidLifeBudget);
        }
        self.life_budget = life_budget;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `SettingsError::InvalidTimeLimit` for `Some(0)`.
    pub fn with_time_limit(mut self, secs: Option<u32>) -> Result<Self, SettingsError> {
        if secs == Some(0) {
            return Err(SettingsError::InvalidTimeLimit);
        }
        self.time_limit_secs = secs;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `SettingsError::InvalidQuestionCount` for zero.
    pub fn with_question_count(mut self, count: u32) -> Result<Self, SettingsError> {
        if count == 0 {
            return Err(SettingsError::InvalidQuestionCount);
        }
        self.question_count = count;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns `SettingsError::BlankMandatoryTopic` for a blank label.
    pub fn with_mandatory_topic(mut self, topic: Option<String>) -> Result<Self, SettingsError> {
        self.mandatory_topic = match topic {
            Some(t) if t.trim().is_empty() => return Err(SettingsError::BlankMandatoryTopic),
            Some(t) => Some(t.trim().to_owned()),
            None => None,
        };
        Ok(self)
    }

    #[must_use]
    pub fn with_pass_threshold(mut self, threshold: PassThreshold) -> Self {
        self.pass_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_reward_per_correct(mut self, reward: u32) -> Self {
        self.reward_per_correct = reward;
        self
    }

    #[must_use]
    pub fn variant(&self) -> SessionVariant {
        self.variant
    }

    #[must_use]
    pub fn life_budget(&self) -> Option<u32> {
        self.life_budget
    }

    #[must_use]
    pub fn has_lives(&self) -> bool {
        self.life_budget.is_some()
    }

    #[must_use]
    pub fn time_limit_secs(&self) -> Option<u32> {
        self.time_limit_secs
    }

    #[must_use]
    pub fn has_timer(&self) -> bool {
        self.time_limit_secs.is_some()
    }

    #[must_use]
    pub fn pass_threshold(&self) -> PassThreshold {
        self.pass_threshold
    }

    #[must_use]
    pub fn mandatory_topic(&self) -> Option<&str> {
        self.mandatory_topic.as_deref()
    }

    #[must_use]
    pub fn reward_per_correct(&self) -> u32 {
        self.reward_per_correct
    }

    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.question_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_only_in_configuration() {
        let practice = SessionSettings::practice();
        assert_eq!(practice.life_budget(), Some(5));
        assert!(!practice.has_timer());

        let mock = SessionSettings::mock_exam();
        assert!(!mock.has_lives());
        assert_eq!(mock.time_limit_secs(), Some(2700));
        assert_eq!(mock.mandatory_topic(), Some(DEFAULT_MANDATORY_TOPIC));
        assert!(mock.reward_per_correct() > practice.reward_per_correct());
    }

    #[test]
    fn required_correct_is_exact_ceiling() {
        let sixty = PassThreshold::from_fraction(0.6).unwrap();
        assert_eq!(sixty.required_for(5), 3);
        assert_eq!(sixty.required_for(10), 6);
        assert_eq!(sixty.required_for(7), 5);

        let seventy_five = PassThreshold::from_percent(75).unwrap();
        assert_eq!(seventy_five.required_for(20), 15);
        assert_eq!(seventy_five.required_for(0), 0);
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        assert!(PassThreshold::from_fraction(0.0).is_err());
        assert!(PassThreshold::from_fraction(1.5).is_err());
        assert!(PassThreshold::from_fraction(f32::NAN).is_err());
        assert!(PassThreshold::from_percent(0).is_err());
        assert!(PassThreshold::from_percent(101).is_err());
    }

    #[test]
    fn rejects_zero_budgets() {
        let threshold = PassThreshold::from_percent(50).unwrap();
        let err = SessionSettings::new(
            SessionVariant::Practice,
            Some(0),
            None,
            threshold,
            None,
            10,
            5,
        )
        .unwrap_err();
        assert_eq!(err, SettingsError::InvalidLifeBudget);

        assert_eq!(
            SessionSettings::mock_exam().with_time_limit(Some(0)).unwrap_err(),
            SettingsError::InvalidTimeLimit
        );
        assert_eq!(
            SessionSettings::practice().with_question_count(0).unwrap_err(),
            SettingsError::InvalidQuestionCount
        );
        assert_eq!(
            SessionSettings::mock_exam()
                .with_mandatory_topic(Some("  ".into()))
                .unwrap_err(),
            SettingsError::BlankMandatoryTopic
        );
    }

    #[test]
    fn variant_slug_round_trips() {
        for variant in [
            SessionVariant::Practice,
            SessionVariant::MockExam,
            SessionVariant::MistakeReview,
        ] {
            assert_eq!(variant.as_str().parse::<SessionVariant>().unwrap(), variant);
        }
        assert!("exam".parse::<SessionVariant>().is_err());
    }
}
