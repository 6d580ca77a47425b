use std::sync::Arc;

use chrono::{DateTime, Utc};
use passmate_core::model::{
    HeartRefill, MistakeId, Outcome, QuestionId, SessionSettings, SessionVariant, UserId,
};
use passmate_core::policy::Verdict;
use passmate_core::session::{Effect, Rejection, Session, SessionEvent};
use storage::repository::{
    MistakeRepository, OutcomeRecord, OutcomeRepository, ProfileRepository, QuestionCriteria,
    QuestionRepository,
};

use crate::Clock;
use crate::error::SessionError;

/// Immediate feedback for a checked answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerFeedback {
    pub question_id: QuestionId,
    pub selected: usize,
    pub correct: bool,
    pub correct_index: usize,
    pub explanation: String,
    pub lives_remaining: Option<u32>,
    /// The check ended the session (last heart lost).
    pub finished: bool,
}

/// A running session plus what the service needs to report on it.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    user_id: UserId,
    topic: Option<String>,
    started_at: DateTime<Utc>,
    session: Session,
    outcome: Option<Outcome>,
    unsaved: Option<OutcomeRecord>,
}

impl ActiveSession {
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn variant(&self) -> SessionVariant {
        self.session.settings().variant()
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Read-only view of the engine.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    /// Terminal outcome, available once the session finished.
    #[must_use]
    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    /// `true` while a finished session's outcome has not reached storage.
    #[must_use]
    pub fn needs_finalize(&self) -> bool {
        self.unsaved.is_some()
    }
}

/// Starts sessions from storage and runs the engine's effects against the repositories.
#[derive(Clone)]
pub struct SessionLoopService {
    clock: Clock,
    refill: HeartRefill,
    questions: Arc<dyn QuestionRepository>,
    mistakes: Arc<dyn MistakeRepository>,
    outcomes: Arc<dyn OutcomeRepository>,
    profiles: Arc<dyn ProfileRepository>,
}

impl SessionLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionRepository>,
        mistakes: Arc<dyn MistakeRepository>,
        outcomes: Arc<dyn OutcomeRepository>,
        profiles: Arc<dyn ProfileRepository>,
    ) -> Self {
        Self {
            clock,
            refill: HeartRefill::standard(),
            questions,
            mistakes,
            outcomes,
            profiles,
        }
    }

    /// Replace the standard heart regeneration rule.
    #[must_use]
    pub fn with_heart_refill(mut self, refill: HeartRefill) -> Self {
        self.refill = refill;
        self
    }

    //
    // ─── STARTING ──────────────────────────────────────────────────────────────
    //

    /// Start a practice quiz, optionally limited to one topic.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` when nothing matches, `SessionError::NoHearts` when the
    /// heart balance is still zero after regeneration, and `SessionError::Storage` if questions cannot be loaded.
    pub async fn start_practice(
        &self,
        user_id: UserId,
        topic: Option<String>,
    ) -> Result<ActiveSession, SessionError> {
        let settings = SessionSettings::practice();
        let count = settings.question_count();
        let criteria = match &topic {
            Some(topic) => QuestionCriteria::Topic {
                topic: topic.clone(),
                count,
            },
            None => QuestionCriteria::Random { count },
        };
        let mut active = self.start_with_settings(user_id, criteria, settings).await?;
        active.topic = topic;
        Ok(active)
    }

    /// Start the timed mock exam.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` or `SessionError::Storage` as for practice.
    pub async fn start_mock_exam(&self, user_id: UserId) -> Result<ActiveSession, SessionError> {
        let settings = SessionSettings::mock_exam();
        let criteria = QuestionCriteria::Random {
            count: settings.question_count(),
        };
        self.start_with_settings(user_id, criteria, settings).await
    }

    /// Start a drill over the user's outstanding mistakes, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` when there is nothing to review, and
    /// `SessionError::Storage` if the mistake list or questions cannot be loaded.
    pub async fn start_mistake_review(
        &self,
        user_id: UserId,
    ) -> Result<ActiveSession, SessionError> {
        let settings = SessionSettings::mistake_review();
        let limit = usize::try_from(settings.question_count()).unwrap_or(usize::MAX);
        let records: Vec<(QuestionId, MistakeId)> = self
            .mistakes
            .outstanding_mistakes(user_id)
            .await?
            .into_iter()
            .take(limit)
            .map(|m| (m.question_id, m.id))
            .collect();
        if records.is_empty() {
            return Err(SessionError::Empty);
        }

        let criteria = QuestionCriteria::Ids(records.iter().map(|(q, _)| *q).collect());
        let mut active = self.start_with_settings(user_id, criteria, settings).await?;
        active.session = active.session.with_mistake_records(records);
        Ok(active)
    }

    /// Start a session from explicit criteria and settings.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on fetch failure, `SessionError::Empty` for an empty
    /// result, and `SessionError::NoHearts` for a life-limited session with no hearts left.
    pub async fn start_with_settings(
        &self,
        user_id: UserId,
        criteria: QuestionCriteria,
        settings: SessionSettings,
    ) -> Result<ActiveSession, SessionError> {
        let questions = self.questions.fetch_questions(&criteria).await?;
        if questions.is_empty() {
            tracing::info!(user = %user_id, ?criteria, "no questions for session");
            return Err(SessionError::Empty);
        }

        let settings = self.apply_stored_hearts(user_id, settings).await?;
        let count = questions.len();
        let mut session = Session::new(questions, settings);
        session.start()?;

        tracing::info!(
            user = %user_id,
            variant = %session.settings().variant(),
            questions = count,
            lives = ?session.lives_remaining(),
            "session started"
        );

        Ok(ActiveSession {
            user_id,
            topic: None,
            started_at: self.clock.now(),
            session,
            outcome: None,
            unsaved: None,
        })
    }

    /// Hearts are read once, here, with regeneration applied; the balance is written back
    /// with the outcome.
    async fn apply_stored_hearts(
        &self,
        user_id: UserId,
        settings: SessionSettings,
    ) -> Result<SessionSettings, SessionError> {
        if !settings.has_lives() {
            return Ok(settings);
        }
        let balance = match self.profiles.hearts(user_id).await {
            Ok(Some(balance)) => balance,
            Ok(None) => return Ok(settings),
            Err(err) => {
                tracing::warn!(user = %user_id, error = %err, "heart balance unavailable, using default budget");
                return Ok(settings);
            }
        };

        let now = self.clock.now();
        let hearts = self.refill.available(&balance, now);
        if hearts == 0 {
            let next_heart_at = self
                .refill
                .next_heart_at(&balance, now)
                .unwrap_or_else(|| now + self.refill.interval());
            return Err(SessionError::NoHearts { next_heart_at });
        }
        if hearts > balance.hearts {
            tracing::debug!(user = %user_id, stored = balance.hearts, hearts, "hearts regenerated");
        }
        Ok(settings.with_life_budget(Some(hearts))?)
    }

    //
    // ─── DRIVING ───────────────────────────────────────────────────────────────
    //

    /// Apply one event and run whatever it emits.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Rejected` when the engine refuses the event; state is unchanged.
    pub async fn apply(
        &self,
        active: &mut ActiveSession,
        event: SessionEvent,
    ) -> Result<(), SessionError> {
        let effects = active.session.apply(event)?;
        self.run_effects(active, effects).await;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`SessionLoopService::apply`].
    pub async fn select(
        &self,
        active: &mut ActiveSession,
        option: usize,
    ) -> Result<(), SessionError> {
        self.apply(active, SessionEvent::Select(option)).await
    }

    /// Grade the selected option and report the result.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Rejected` without a selection or on a repeated check.
    pub async fn check(&self, active: &mut ActiveSession) -> Result<AnswerFeedback, SessionError> {
        self.apply(active, SessionEvent::Check).await?;

        let session = &active.session;
        let answer = session
            .last_answer()
            .copied()
            .ok_or(SessionError::Rejected(Rejection::NotAnswered))?;
        let question = session
            .question(answer.question_id)
            .ok_or(SessionError::Rejected(Rejection::NotAnswered))?;

        Ok(AnswerFeedback {
            question_id: answer.question_id,
            selected: answer.selected,
            correct: answer.correct,
            correct_index: question.correct_index(),
            explanation: question.explanation().to_owned(),
            lives_remaining: session.lives_remaining(),
            finished: session.is_finished(),
        })
    }

    /// # Errors
    ///
    /// Returns `SessionError::Rejected` before the current question is checked.
    pub async fn advance(&self, active: &mut ActiveSession) -> Result<(), SessionError> {
        self.apply(active, SessionEvent::Continue).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Rejected` once the session is finished.
    pub async fn tick(&self, active: &mut ActiveSession) -> Result<(), SessionError> {
        self.apply(active, SessionEvent::Tick).await
    }

    /// # Errors
    ///
    /// Returns `SessionError::Rejected` for untimed or finished sessions.
    pub async fn expire(&self, active: &mut ActiveSession) -> Result<(), SessionError> {
        self.apply(active, SessionEvent::Expire).await
    }

    /// Retry persisting a finished session whose outcome could not be stored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotFinished` for a running session and
    /// `SessionError::Storage` if the retry fails too.
    pub async fn finalize_outcome(
        &self,
        active: &mut ActiveSession,
    ) -> Result<Outcome, SessionError> {
        let Some(current) = active.outcome.clone() else {
            return Err(SessionError::NotFinished);
        };
        let Some(record) = active.unsaved.clone() else {
            return Ok(current);
        };

        let persisted = self.outcomes.persist_outcome(&record).await?;
        let outcome = Outcome::new(
            current.verdict().clone(),
            persisted.unlocked,
            Some(persisted.attempt_id),
        );
        tracing::info!(user = %active.user_id, attempt = %persisted.attempt_id, "outcome finalized on retry");
        active.outcome = Some(outcome.clone());
        active.unsaved = None;
        Ok(outcome)
    }

    //
    // ─── EFFECTS ───────────────────────────────────────────────────────────────
    //

    async fn run_effects(&self, active: &mut ActiveSession, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RecordMistake(question) => {
                    match self
                        .mistakes
                        .record_mistake(active.user_id, question, self.clock.now())
                        .await
                    {
                        Ok(id) => tracing::debug!(%question, mistake = %id, "mistake recorded"),
                        Err(err) => {
                            tracing::warn!(%question, error = %err, "failed to record mistake");
                        }
                    }
                }
                Effect::ResolveMistake { question, mistake } => {
                    match self.mistakes.resolve_mistake(mistake, self.clock.now()).await {
                        Ok(()) => tracing::debug!(%question, %mistake, "mistake resolved"),
                        Err(err) => {
                            tracing::warn!(%question, %mistake, error = %err, "failed to resolve mistake");
                        }
                    }
                }
                Effect::Finish(verdict) => self.finish(active, verdict).await,
            }
        }
    }

    async fn finish(&self, active: &mut ActiveSession, verdict: Verdict) {
        let hearts_remaining = active.session.lives_remaining();
        let record = OutcomeRecord::from_verdict(
            active.user_id,
            &verdict,
            active.topic.clone(),
            hearts_remaining,
            active.started_at,
            self.clock.now(),
        );

        let outcome = match self.outcomes.persist_outcome(&record).await {
            Ok(persisted) => {
                active.unsaved = None;
                Outcome::new(verdict, persisted.unlocked, Some(persisted.attempt_id))
            }
            Err(err) => {
                tracing::warn!(user = %active.user_id, error = %err, "failed to persist outcome; showing local result");
                active.unsaved = Some(record);
                Outcome::degraded(verdict)
            }
        };

        tracing::info!(
            user = %active.user_id,
            variant = %outcome.variant(),
            correct = outcome.correct_count(),
            total = outcome.total_count(),
            passed = outcome.passed(),
            unlocked = outcome.unlocked_achievements().len(),
            degraded = outcome.is_degraded(),
            "session finished"
        );
        active.outcome = Some(outcome);
    }
}
