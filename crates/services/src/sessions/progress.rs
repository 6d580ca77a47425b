use std::sync::Arc;

use chrono::{DateTime, Utc};
use passmate_core::model::{Achievement, AttemptId, HeartRefill, SessionVariant, UserId};
use storage::repository::{
    AchievementRepository, AttemptRecord, MistakeRepository, OutcomeRepository,
    ProfileRepository, QuestionRepository,
};

use crate::Clock;
use crate::error::SessionError;

/// Presentation-agnostic row for a stored attempt.
///
/// No pre-formatted strings; the front-end formats timestamps and percentages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptListItem {
    pub id: AttemptId,
    pub variant: SessionVariant,
    pub topic: Option<String>,
    pub correct: u32,
    pub total: u32,
    pub passed: bool,
    pub experience: u32,
    pub finished_at: DateTime<Utc>,
}

impl AttemptListItem {
    #[must_use]
    pub fn from_record(record: &AttemptRecord) -> Self {
        let outcome = &record.outcome;
        Self {
            id: record.id,
            variant: outcome.variant,
            topic: outcome.topic.clone(),
            correct: outcome.correct_count,
            total: outcome.total_count,
            passed: outcome.passed,
            experience: outcome.experience,
            finished_at: outcome.finished_at,
        }
    }
}

/// Dashboard facts for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub user_id: UserId,
    pub total_experience: u64,
    /// Regenerated balance; `None` until a life-limited session has been finished.
    pub hearts: Option<u32>,
    /// Set while the balance is below the regeneration cap.
    pub next_heart_at: Option<DateTime<Utc>>,
    pub outstanding_mistakes: usize,
    pub achievements: Vec<Achievement>,
    pub recent: Vec<AttemptListItem>,
}

/// Read-only facade over progress data.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    refill: HeartRefill,
    questions: Arc<dyn QuestionRepository>,
    mistakes: Arc<dyn MistakeRepository>,
    outcomes: Arc<dyn OutcomeRepository>,
    achievements: Arc<dyn AchievementRepository>,
    profiles: Arc<dyn ProfileRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionRepository>,
        mistakes: Arc<dyn MistakeRepository>,
        outcomes: Arc<dyn OutcomeRepository>,
        achievements: Arc<dyn AchievementRepository>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        Self {
            clock,
            refill: HeartRefill::standard(),
            questions,
            mistakes,
            outcomes,
            achievements,
            profiles,
        }
    }

    /// Must match the rule the session loop applies.
    #[must_use]
    pub fn with_heart_refill(mut self, refill: HeartRefill) -> Self {
        self.refill = refill;
        self
    }

    /// Collect the dashboard for `user_id`, with up to `recent_limit` attempts.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on repository failures.
    pub async fn snapshot(
        &self,
        user_id: UserId,
        recent_limit: u32,
    ) -> Result<ProgressSnapshot, SessionError> {
        let total_experience = self.profiles.total_experience(user_id).await?;
        let now = self.clock.now();
        let balance = self.profiles.hearts(user_id).await?;
        let hearts = balance.map(|b| self.refill.available(&b, now));
        let next_heart_at = balance.and_then(|b| self.refill.next_heart_at(&b, now));
        let outstanding_mistakes = self.mistakes.outstanding_mistakes(user_id).await?.len();
        let achievements = self.achievements.list_unlocked(user_id).await?;
        let recent = self
            .outcomes
            .list_attempts(user_id, recent_limit)
            .await?
            .iter()
            .map(AttemptListItem::from_record)
            .collect();

        Ok(ProgressSnapshot {
            user_id,
            total_experience,
            hearts,
            next_heart_at,
            outstanding_mistakes,
            achievements,
            recent,
        })
    }

    /// Look up one attempt, e.g. to render a mock-exam certificate.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` (including `NotFound`) on repository failures.
    pub async fn attempt(&self, id: AttemptId) -> Result<AttemptListItem, SessionError> {
        let record = self.outcomes.get_attempt(id).await?;
        Ok(AttemptListItem::from_record(&record))
    }

    /// Topics available for a topic-filtered practice quiz.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on repository failures.
    pub async fn topics(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.questions.list_topics().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use passmate_core::time::{fixed_clock, fixed_now};
    use storage::repository::{InMemoryRepository, OutcomeRecord, Storage};

    use crate::AppServices;

    #[tokio::test]
    async fn empty_profile_has_zeroed_snapshot() {
        let svc = AppServices::from_storage(&Storage::in_memory(), fixed_clock()).progress();
        let snap = svc.snapshot(UserId::new(1), 5).await.unwrap();
        assert_eq!(snap.total_experience, 0);
        assert_eq!(snap.hearts, None);
        assert_eq!(snap.next_heart_at, None);
        assert_eq!(snap.outstanding_mistakes, 0);
        assert!(snap.achievements.is_empty());
        assert!(snap.recent.is_empty());
    }

    #[tokio::test]
    async fn snapshot_reflects_persisted_attempts() {
        let repo = Arc::new(InMemoryRepository::new());
        let mut clock = fixed_clock();
        clock.advance(Duration::minutes(45));
        let svc = ProgressService::new(
            clock,
            repo.clone(),
            repo.clone(),
            repo.clone(),
            repo.clone(),
            repo.clone(),
        );
        let user = UserId::new(4);
        let record = OutcomeRecord {
            user_id: user,
            variant: SessionVariant::Practice,
            topic: Some("history".into()),
            experience: 30,
            correct_count: 3,
            total_count: 5,
            lives_lost: Some(2),
            hearts_remaining: Some(3),
            passed: true,
            started_at: fixed_now(),
            finished_at: fixed_now(),
        };
        let persisted = repo.persist_outcome(&record).await.unwrap();
        repo.record_mistake(user, passmate_core::model::QuestionId::new(8), fixed_now())
            .await
            .unwrap();

        let snap = svc.snapshot(user, 5).await.unwrap();
        assert_eq!(snap.total_experience, 30);
        // One heart regenerated 30 minutes after the session finished.
        assert_eq!(snap.hearts, Some(4));
        assert_eq!(snap.next_heart_at, Some(fixed_now() + Duration::minutes(60)));
        assert_eq!(snap.outstanding_mistakes, 1);
        assert_eq!(snap.achievements.len(), 2);
        assert_eq!(snap.recent.len(), 1);
        assert_eq!(snap.recent[0].topic.as_deref(), Some("history"));

        let item = svc.attempt(persisted.attempt_id).await.unwrap();
        assert_eq!(item.correct, 3);
        assert!(item.passed);
    }
}
