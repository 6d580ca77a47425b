use async_trait::async_trait;
use chrono::{DateTime, Utc};
use passmate_core::model::{
    Achievement, AchievementEvent, AchievementKind, AttemptId, HeartBalance, MistakeId,
    Question, QuestionId, SessionVariant, UserId, qualifying,
};
use passmate_core::policy::Verdict;
use rand::seq::SliceRandom;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// Which questions a session should be built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionCriteria {
    /// Uniform random sample of up to `count` questions.
    Random { count: u32 },
    /// Random sample of up to `count` questions from one topic.
    Topic { topic: String, count: u32 },
    /// Exactly these questions, in this order. Unknown ids are skipped.
    Ids(Vec<QuestionId>),
}

/// One logged wrong answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MistakeRecord {
    pub id: MistakeId,
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub recorded_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl MistakeRecord {
    #[must_use]
    pub fn is_outstanding(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// What the outcome sink stores for a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeRecord {
    pub user_id: UserId,
    pub variant: SessionVariant,
    pub topic: Option<String>,
    pub experience: u32,
    pub correct_count: u32,
    pub total_count: u32,
    pub lives_lost: Option<u32>,
    /// Hearts left at the end of a life-limited session, written back to the profile.
    pub hearts_remaining: Option<u32>,
    pub passed: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OutcomeRecord {
    #[must_use]
    pub fn from_verdict(
        user_id: UserId,
        verdict: &Verdict,
        topic: Option<String>,
        hearts_remaining: Option<u32>,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            variant: verdict.variant,
            topic,
            experience: verdict.experience,
            correct_count: verdict.correct_count,
            total_count: verdict.total_count,
            lives_lost: verdict.lives_lost,
            hearts_remaining,
            passed: verdict.passed,
            started_at,
            finished_at,
        }
    }

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

/// A stored attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub id: AttemptId,
    pub outcome: OutcomeRecord,
}

/// Sink response for a persisted outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedOutcome {
    pub attempt_id: AttemptId,
    pub unlocked: Vec<Achievement>,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Insert or replace a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Fetch questions for a new session. No match is `Ok(vec![])`, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn fetch_questions(
        &self,
        criteria: &QuestionCriteria,
    ) -> Result<Vec<Question>, StorageError>;

    /// Distinct topics in the bank, sorted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_topics(&self) -> Result<Vec<String>, StorageError>;
}

#[async_trait]
pub trait MistakeRepository: Send + Sync {
    /// Log a wrong answer. An outstanding record for the same user and question is reused.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn record_mistake(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        at: DateTime<Utc>,
    ) -> Result<MistakeId, StorageError>;

    /// Mark a mistake as resolved. Resolving twice is accepted.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown id.
    async fn resolve_mistake(&self, id: MistakeId, at: DateTime<Utc>) -> Result<(), StorageError>;

    /// Unresolved mistakes for a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn outstanding_mistakes(&self, user_id: UserId)
    -> Result<Vec<MistakeRecord>, StorageError>;
}

/// The outcome sink: one call per finished session.
#[async_trait]
pub trait OutcomeRepository: Send + Sync {
    /// Store the attempt, credit experience, write back hearts, and report newly unlocked
    /// achievements.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn persist_outcome(
        &self,
        outcome: &OutcomeRecord,
    ) -> Result<PersistedOutcome, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for an unknown attempt.
    async fn get_attempt(&self, id: AttemptId) -> Result<AttemptRecord, StorageError>;

    /// Latest attempts first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<AttemptRecord>, StorageError>;
}

#[async_trait]
pub trait AchievementRepository: Send + Sync {
    /// Unlock what the event qualifies for and return only the new badges.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn evaluate_achievements(
        &self,
        user_id: UserId,
        event: &AchievementEvent,
        at: DateTime<Utc>,
    ) -> Result<Vec<Achievement>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_unlocked(&self, user_id: UserId) -> Result<Vec<Achievement>, StorageError>;
}

/// Per-user counters shared across sessions.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Stored heart balance and when it was written, `None` if never written.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn hearts(&self, user_id: UserId) -> Result<Option<HeartBalance>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn set_hearts(
        &self,
        user_id: UserId,
        hearts: u32,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn total_experience(&self, user_id: UserId) -> Result<u64, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, Default)]
struct Profile {
    hearts: Option<HeartBalance>,
    experience: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Arc<Mutex<BTreeMap<QuestionId, Question>>>,
    mistakes: Arc<Mutex<Vec<MistakeRecord>>>,
    attempts: Arc<Mutex<Vec<AttemptRecord>>>,
    unlocked: Arc<Mutex<HashMap<UserId, BTreeSet<AchievementKind>>>>,
    profiles: Arc<Mutex<HashMap<UserId, Profile>>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn unlock(
        &self,
        user_id: UserId,
        event: &AchievementEvent,
    ) -> Result<Vec<Achievement>, StorageError> {
        let mut guard = self.unlocked.lock().map_err(poisoned)?;
        let owned = guard.entry(user_id).or_default();
        Ok(qualifying(event)
            .into_iter()
            .filter(|kind| owned.insert(*kind))
            .map(AchievementKind::achievement)
            .collect())
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(poisoned)?;
        guard.insert(question.id(), question.clone());
        Ok(())
    }

    async fn fetch_questions(
        &self,
        criteria: &QuestionCriteria,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(poisoned)?;
        let (mut pool, count): (Vec<Question>, u32) = match criteria {
            QuestionCriteria::Ids(ids) => {
                return Ok(ids.iter().filter_map(|id| guard.get(id).cloned()).collect());
            }
            QuestionCriteria::Random { count } => (guard.values().cloned().collect(), *count),
            QuestionCriteria::Topic { topic, count } => (
                guard
                    .values()
                    .filter(|q| q.has_topic(topic))
                    .cloned()
                    .collect(),
                *count,
            ),
        };
        drop(guard);

        pool.shuffle(&mut rand::rng());
        pool.truncate(usize::try_from(count).unwrap_or(usize::MAX));
        Ok(pool)
    }

    async fn list_topics(&self) -> Result<Vec<String>, StorageError> {
        let guard = self.questions.lock().map_err(poisoned)?;
        let topics: BTreeSet<String> = guard.values().map(|q| q.topic().to_owned()).collect();
        Ok(topics.into_iter().collect())
    }
}

#[async_trait]
impl MistakeRepository for InMemoryRepository {
    async fn record_mistake(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        at: DateTime<Utc>,
    ) -> Result<MistakeId, StorageError> {
        let mut guard = self.mistakes.lock().map_err(poisoned)?;
        if let Some(existing) = guard
            .iter()
            .find(|m| m.user_id == user_id && m.question_id == question_id && m.is_outstanding())
        {
            return Ok(existing.id);
        }
        let id = MistakeId::new(guard.len() as u64 + 1);
        guard.push(MistakeRecord {
            id,
            user_id,
            question_id,
            recorded_at: at,
            resolved_at: None,
        });
        Ok(id)
    }

    async fn resolve_mistake(&self, id: MistakeId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut guard = self.mistakes.lock().map_err(poisoned)?;
        let record = guard
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(StorageError::NotFound)?;
        if record.resolved_at.is_none() {
            record.resolved_at = Some(at);
        }
        Ok(())
    }

    async fn outstanding_mistakes(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MistakeRecord>, StorageError> {
        let guard = self.mistakes.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|m| m.user_id == user_id && m.is_outstanding())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutcomeRepository for InMemoryRepository {
    async fn persist_outcome(
        &self,
        outcome: &OutcomeRecord,
    ) -> Result<PersistedOutcome, StorageError> {
        let attempt_id = AttemptId::generate();
        self.attempts
            .lock()
            .map_err(poisoned)?
            .push(AttemptRecord {
                id: attempt_id,
                outcome: outcome.clone(),
            });

        let total_experience = {
            let mut guard = self.profiles.lock().map_err(poisoned)?;
            let profile = guard.entry(outcome.user_id).or_default();
            profile.experience = profile
                .experience
                .saturating_add(u64::from(outcome.experience));
            if let Some(hearts) = outcome.hearts_remaining {
                profile.hearts = Some(HeartBalance::new(hearts, outcome.finished_at));
            }
            profile.experience
        };

        let unlocked = self.unlock(outcome.user_id, &outcome.achievement_event(total_experience))?;
        Ok(PersistedOutcome {
            attempt_id,
            unlocked,
        })
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<AttemptRecord, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        guard
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let guard = self.attempts.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .rev()
            .filter(|a| a.outcome.user_id == user_id)
            .take(usize::try_from(limit).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl AchievementRepository for InMemoryRepository {
    async fn evaluate_achievements(
        &self,
        user_id: UserId,
        event: &AchievementEvent,
        _at: DateTime<Utc>,
    ) -> Result<Vec<Achievement>, StorageError> {
        self.unlock(user_id, event)
    }

    async fn list_unlocked(&self, user_id: UserId) -> Result<Vec<Achievement>, StorageError> {
        let guard = self.unlocked.lock().map_err(poisoned)?;
        Ok(guard
            .get(&user_id)
            .map(|kinds| kinds.iter().map(|k| k.achievement()).collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryRepository {
    async fn hearts(&self, user_id: UserId) -> Result<Option<HeartBalance>, StorageError> {
        let guard = self.profiles.lock().map_err(poisoned)?;
        Ok(guard.get(&user_id).and_then(|p| p.hearts))
    }

    async fn set_hearts(
        &self,
        user_id: UserId,
        hearts: u32,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let mut guard = self.profiles.lock().map_err(poisoned)?;
        guard.entry(user_id).or_default().hearts = Some(HeartBalance::new(hearts, at));
        Ok(())
    }

    async fn total_experience(&self, user_id: UserId) -> Result<u64, StorageError> {
        let guard = self.profiles.lock().map_err(poisoned)?;
        Ok(guard.get(&user_id).map_or(0, |p| p.experience))
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub mistakes: Arc<dyn MistakeRepository>,
    pub outcomes: Arc<dyn OutcomeRepository>,
    pub achievements: Arc<dyn AchievementRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Use one repository value for every contract.
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: QuestionRepository
            + MistakeRepository
            + OutcomeRepository
            + AchievementRepository
            + ProfileRepository
            + Clone
            + 'static,
    {
        Self {
            questions: Arc::new(repo.clone()),
            mistakes: Arc::new(repo.clone()),
            outcomes: Arc::new(repo.clone()),
            achievements: Arc::new(repo.clone()),
            profiles: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passmate_core::time::fixed_now;

    fn question(id: u64, topic: &str) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Q{id}"),
            vec!["a".into(), "b".into()],
            0,
            "",
            topic,
        )
        .unwrap()
    }

    async fn seeded() -> InMemoryRepository {
        let repo = InMemoryRepository::new();
        for id in 1..=6 {
            let topic = if id % 2 == 0 { "even" } else { "odd" };
            repo.upsert_question(&question(id, topic)).await.unwrap();
        }
        repo
    }

    fn record(user: UserId, experience: u32, passed: bool) -> OutcomeRecord {
        OutcomeRecord {
            user_id: user,
            variant: SessionVariant::Practice,
            topic: None,
            experience,
            correct_count: 4,
            total_count: 5,
            lives_lost: Some(1),
            hearts_remaining: Some(4),
            passed,
            started_at: fixed_now(),
            finished_at: fixed_now(),
        }
    }

    #[tokio::test]
    async fn fetch_respects_criteria() {
        let repo = seeded().await;

        let random = repo
            .fetch_questions(&QuestionCriteria::Random { count: 4 })
            .await
            .unwrap();
        assert_eq!(random.len(), 4);

        let topic = repo
            .fetch_questions(&QuestionCriteria::Topic {
                topic: "even".into(),
                count: 10,
            })
            .await
            .unwrap();
        assert_eq!(topic.len(), 3);
        assert!(topic.iter().all(|q| q.has_topic("even")));

        let ids = repo
            .fetch_questions(&QuestionCriteria::Ids(vec![
                QuestionId::new(5),
                QuestionId::new(99),
                QuestionId::new(2),
            ]))
            .await
            .unwrap();
        let ids: Vec<_> = ids.iter().map(Question::id).collect();
        assert_eq!(ids, vec![QuestionId::new(5), QuestionId::new(2)]);

        let none = repo
            .fetch_questions(&QuestionCriteria::Topic {
                topic: "missing".into(),
                count: 10,
            })
            .await
            .unwrap();
        assert!(none.is_empty());

        assert_eq!(repo.list_topics().await.unwrap(), vec!["even", "odd"]);
    }

    #[tokio::test]
    async fn mistakes_are_reused_until_resolved() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(1);
        let q = QuestionId::new(3);

        let first = repo.record_mistake(user, q, fixed_now()).await.unwrap();
        let again = repo.record_mistake(user, q, fixed_now()).await.unwrap();
        assert_eq!(first, again);
        assert_eq!(repo.outstanding_mistakes(user).await.unwrap().len(), 1);

        repo.resolve_mistake(first, fixed_now()).await.unwrap();
        repo.resolve_mistake(first, fixed_now()).await.unwrap();
        assert!(repo.outstanding_mistakes(user).await.unwrap().is_empty());

        let fresh = repo.record_mistake(user, q, fixed_now()).await.unwrap();
        assert_ne!(fresh, first);

        let err = repo
            .resolve_mistake(MistakeId::new(404), fixed_now())
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn persisting_credits_experience_and_unlocks_once() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(9);

        let first = repo.persist_outcome(&record(user, 40, true)).await.unwrap();
        let kinds: Vec<_> = first.unlocked.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AchievementKind::FirstSession, AchievementKind::FirstPass]
        );

        let second = repo.persist_outcome(&record(user, 40, true)).await.unwrap();
        assert!(second.unlocked.is_empty());

        assert_eq!(repo.total_experience(user).await.unwrap(), 80);
        assert_eq!(
            repo.hearts(user).await.unwrap(),
            Some(HeartBalance::new(4, fixed_now()))
        );
        assert_eq!(repo.list_unlocked(user).await.unwrap().len(), 2);

        let attempts = repo.list_attempts(user, 10).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].id, second.attempt_id);
        assert_eq!(
            repo.get_attempt(first.attempt_id).await.unwrap().outcome.experience,
            40
        );
    }

    #[tokio::test]
    async fn evaluate_achievements_skips_owned_badges() {
        let repo = InMemoryRepository::new();
        let user = UserId::new(2);
        let event = record(user, 10, false).achievement_event(1_200);

        let first = repo
            .evaluate_achievements(user, &event, fixed_now())
            .await
            .unwrap();
        let kinds: Vec<_> = first.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AchievementKind::FirstSession, AchievementKind::Experience1000]
        );

        let again = repo
            .evaluate_achievements(user, &event, fixed_now())
            .await
            .unwrap();
        assert!(again.is_empty());
        assert_eq!(repo.list_unlocked(user).await.unwrap().len(), 2);
    }
}
