//! Assessment session engine.
//!
//! One engine drives every quiz flavour; [`SessionSettings`] switches hearts and the
//! countdown on or off. The engine never performs I/O. Each transition returns the side
//! effects the caller should run (log a mistake, resolve a mistake, persist the outcome).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::model::{MistakeId, Question, QuestionId, SessionSettings};
use crate::policy::{self, Verdict};

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    NotStarted,
    InProgress,
    Finished,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Completed,
    OutOfLives,
    TimeExpired,
}

/// A checked answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub selected: usize,
    pub correct: bool,
}

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub remaining: usize,
    pub is_complete: bool,
}

//
// ─── EVENTS, EFFECTS, REJECTIONS ───────────────────────────────────────────────
//

/// Input to [`Session::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Start,
    Select(usize),
    Check,
    Continue,
    /// One real-time second elapsed.
    Tick,
    /// The countdown ran out.
    Expire,
}

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Log an incorrect answer against the user's mistake list.
    RecordMistake(QuestionId),
    /// A review question that was previously a mistake is now answered correctly.
    ResolveMistake {
        question: QuestionId,
        mistake: MistakeId,
    },
    /// The session just finished; emitted exactly once.
    Finish(Verdict),
}

/// Transition refused by a guard. State is left untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Rejection {
    #[error("no questions available")]
    NoQuestions,
    #[error("session has not started")]
    NotStarted,
    #[error("session already started")]
    AlreadyStarted,
    #[error("session is finished")]
    Finished,
    #[error("no option selected")]
    NoSelection,
    #[error("question already answered")]
    AlreadyAnswered,
    #[error("question not answered yet")]
    NotAnswered,
    #[error("option {index} is out of range")]
    OptionOutOfRange { index: usize },
    #[error("session has no timer")]
    NoTimer,
}

pub type Transition = Result<Vec<Effect>, Rejection>;

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory assessment over a fixed list of questions.
#[derive(Clone)]
pub struct Session {
    settings: SessionSettings,
    questions: Vec<Question>,
    mistake_records: HashMap<QuestionId, MistakeId>,
    phase: SessionPhase,
    current: usize,
    selected: Option<usize>,
    answered: bool,
    lives_remaining: Option<u32>,
    remaining_secs: Option<u32>,
    elapsed_secs: u32,
    score: u32,
    mistakes: Vec<QuestionId>,
    answers: Vec<AnswerRecord>,
    finish_reason: Option<FinishReason>,
}

impl Session {
    /// Create a session that has not started yet.
    ///
    /// An empty question list is accepted here; [`Session::start`] refuses it.
    #[must_use]
    pub fn new(questions: Vec<Question>, settings: SessionSettings) -> Self {
        Self {
            settings,
            questions,
            mistake_records: HashMap::new(),
            phase: SessionPhase::NotStarted,
            current: 0,
            selected: None,
            answered: false,
            lives_remaining: None,
            remaining_secs: None,
            elapsed_secs: 0,
            score: 0,
            mistakes: Vec::new(),
            answers: Vec::new(),
            finish_reason: None,
        }
    }

    /// Attach the mistake record behind each review question.
    #[must_use]
    pub fn with_mistake_records(
        mut self,
        records: impl IntoIterator<Item = (QuestionId, MistakeId)>,
    ) -> Self {
        self.mistake_records.extend(records);
        self
    }

    /// Dispatch an event to the matching transition.
    ///
    /// # Errors
    ///
    /// Returns the `Rejection` of the underlying transition.
    pub fn apply(&mut self, event: SessionEvent) -> Transition {
        match event {
            SessionEvent::Start => self.start(),
            SessionEvent::Select(option) => self.select(option),
            SessionEvent::Check => self.check(),
            SessionEvent::Continue => self.advance(),
            SessionEvent::Tick => self.tick(),
            SessionEvent::Expire => self.expire(),
        }
    }

    /// Begin the session at the first question.
    ///
    /// # Errors
    ///
    /// `NoQuestions` for an empty list, `AlreadyStarted`/`Finished` when not fresh.
    pub fn start(&mut self) -> Transition {
        match self.phase {
            SessionPhase::InProgress => return Err(Rejection::AlreadyStarted),
            SessionPhase::Finished => return Err(Rejection::Finished),
            SessionPhase::NotStarted => {}
        }
        if self.questions.is_empty() {
            return Err(Rejection::NoQuestions);
        }

        self.phase = SessionPhase::InProgress;
        self.current = 0;
        self.selected = None;
        self.answered = false;
        self.score = 0;
        self.mistakes.clear();
        self.answers.clear();
        self.lives_remaining = self.settings.life_budget();
        self.remaining_secs = self.settings.time_limit_secs();
        self.elapsed_secs = 0;
        Ok(Vec::new())
    }

    /// Choose an option for the current question. May be repeated until checked.
    ///
    /// # Errors
    ///
    /// `AlreadyAnswered` once checked, `OptionOutOfRange` for a bad index.
    pub fn select(&mut self, option: usize) -> Transition {
        self.ensure_in_progress()?;
        if self.answered {
            return Err(Rejection::AlreadyAnswered);
        }
        let len = self.questions[self.current].options().len();
        if option >= len {
            return Err(Rejection::OptionOutOfRange { index: option });
        }
        self.selected = Some(option);
        Ok(Vec::new())
    }

    /// Grade the selected option.
    ///
    /// An incorrect answer that uses up the last heart finishes the session here; the
    /// checked question stays current so its feedback can still be shown.
    ///
    /// # Errors
    ///
    /// `NoSelection` without a selection, `AlreadyAnswered` on a second check.
    pub fn check(&mut self) -> Transition {
        self.ensure_in_progress()?;
        if self.answered {
            return Err(Rejection::AlreadyAnswered);
        }
        let Some(selected) = self.selected else {
            return Err(Rejection::NoSelection);
        };

        let question = &self.questions[self.current];
        let question_id = question.id();
        let correct = question.is_correct(selected);
        let mut effects = Vec::new();

        self.answered = true;
        self.answers.push(AnswerRecord {
            question_id,
            selected,
            correct,
        });

        if correct {
            self.score += 1;
            if let Some(&mistake) = self.mistake_records.get(&question_id) {
                effects.push(Effect::ResolveMistake {
                    question: question_id,
                    mistake,
                });
            }
        } else {
            if !self.mistakes.contains(&question_id) {
                self.mistakes.push(question_id);
            }
            effects.push(Effect::RecordMistake(question_id));
            if let Some(lives) = self.lives_remaining {
                let lives = lives.saturating_sub(1);
                self.lives_remaining = Some(lives);
                if lives == 0 {
                    effects.push(self.finish(FinishReason::OutOfLives));
                }
            }
        }

        Ok(effects)
    }

    /// Move past an answered question, or finish after the last one.
    ///
    /// # Errors
    ///
    /// `NotAnswered` until the current question has been checked.
    pub fn advance(&mut self) -> Transition {
        self.ensure_in_progress()?;
        if !self.answered {
            return Err(Rejection::NotAnswered);
        }

        if self.lives_remaining == Some(0) {
            return Ok(vec![self.finish(FinishReason::OutOfLives)]);
        }
        if self.remaining_secs == Some(0) {
            return Ok(vec![self.finish(FinishReason::TimeExpired)]);
        }
        if self.current + 1 >= self.questions.len() {
            return Ok(vec![self.finish(FinishReason::Completed)]);
        }

        self.current += 1;
        self.selected = None;
        self.answered = false;
        Ok(Vec::new())
    }

    /// Account for one elapsed second; finishes a timed session when it reaches zero.
    ///
    /// # Errors
    ///
    /// `NotStarted`/`Finished` outside an active session. Late ticks are dropped that way.
    pub fn tick(&mut self) -> Transition {
        self.ensure_in_progress()?;
        self.elapsed_secs = self.elapsed_secs.saturating_add(1);

        let Some(remaining) = self.remaining_secs else {
            return Ok(Vec::new());
        };
        let remaining = remaining.saturating_sub(1);
        self.remaining_secs = Some(remaining);
        if remaining == 0 {
            return Ok(vec![self.finish(FinishReason::TimeExpired)]);
        }
        Ok(Vec::new())
    }

    /// Force the countdown to zero and finish, whatever the current question's state.
    ///
    /// # Errors
    ///
    /// `NoTimer` for untimed sessions, `NotStarted`/`Finished` outside an active session.
    pub fn expire(&mut self) -> Transition {
        self.ensure_in_progress()?;
        if self.remaining_secs.is_none() {
            return Err(Rejection::NoTimer);
        }
        self.remaining_secs = Some(0);
        Ok(vec![self.finish(FinishReason::TimeExpired)])
    }

    fn ensure_in_progress(&self) -> Result<(), Rejection> {
        match self.phase {
            SessionPhase::NotStarted => Err(Rejection::NotStarted),
            SessionPhase::Finished => Err(Rejection::Finished),
            SessionPhase::InProgress => Ok(()),
        }
    }

    fn finish(&mut self, reason: FinishReason) -> Effect {
        self.phase = SessionPhase::Finished;
        self.finish_reason = Some(reason);
        Effect::Finish(policy::evaluate(self, &self.settings))
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.phase == SessionPhase::Finished
    }

    #[must_use]
    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// The question on screen. Still available after finishing, for the final feedback.
    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        match self.phase {
            SessionPhase::NotStarted => None,
            _ => self.questions.get(self.current),
        }
    }

    #[must_use]
    pub fn selected_option(&self) -> Option<usize> {
        self.selected
    }

    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.answered
    }

    /// The checked answer for the current question, if any.
    #[must_use]
    pub fn last_answer(&self) -> Option<&AnswerRecord> {
        if !self.answered {
            return None;
        }
        self.answers.last()
    }

    #[must_use]
    pub fn lives_remaining(&self) -> Option<u32> {
        self.lives_remaining
    }

    #[must_use]
    pub fn lives_lost(&self) -> Option<u32> {
        let budget = self.settings.life_budget()?;
        Some(budget.saturating_sub(self.lives_remaining.unwrap_or(budget)))
    }

    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.remaining_secs
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Questions answered incorrectly, in the order they were missed.
    #[must_use]
    pub fn mistakes(&self) -> &[QuestionId] {
        &self.mistakes
    }

    #[must_use]
    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    #[must_use]
    pub fn mistake_record(&self, question: QuestionId) -> Option<MistakeId> {
        self.mistake_records.get(&question).copied()
    }

    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let total = self.questions.len();
        let answered = self.answers.len();
        SessionProgress {
            total,
            answered,
            remaining: total.saturating_sub(answered),
            is_complete: self.is_finished(),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("variant", &self.settings.variant())
            .field("phase", &self.phase)
            .field("questions_len", &self.questions.len())
            .field("current", &self.current)
            .field("answered", &self.answered)
            .field("score", &self.score)
            .field("lives_remaining", &self.lives_remaining)
            .field("remaining_secs", &self.remaining_secs)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Question {id}"),
            vec!["correct".into(), "wrong".into(), "wrong too".into()],
            0,
            format!("Explanation {id}"),
            "Australia and its people",
        )
        .unwrap()
    }

    fn questions(n: u64) -> Vec<Question> {
        (1..=n).map(question).collect()
    }

    fn practice(lives: u32) -> SessionSettings {
        SessionSettings::practice()
            .with_life_budget(Some(lives))
            .unwrap()
    }

    fn answer(session: &mut Session, option: usize) -> Vec<Effect> {
        session.select(option).unwrap();
        session.check().unwrap()
    }

    fn finish_verdict(effects: &[Effect]) -> Option<&Verdict> {
        effects.iter().find_map(|e| match e {
            Effect::Finish(v) => Some(v),
            _ => None,
        })
    }

    #[test]
    fn start_initialises_budgets() {
        let mut session = Session::new(questions(3), SessionSettings::mock_exam());
        assert_eq!(session.phase(), SessionPhase::NotStarted);
        assert!(session.current_question().is_none());

        session.start().unwrap();
        assert_eq!(session.phase(), SessionPhase::InProgress);
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.remaining_secs(), Some(2700));
        assert_eq!(session.lives_remaining(), None);
        assert_eq!(session.start(), Err(Rejection::AlreadyStarted));
    }

    #[test]
    fn empty_question_list_cannot_start() {
        let mut session = Session::new(Vec::new(), SessionSettings::practice());
        assert_eq!(session.start(), Err(Rejection::NoQuestions));
        assert_eq!(session.phase(), SessionPhase::NotStarted);
    }

    #[test]
    fn all_correct_practice_finishes_after_last_continue() {
        let mut session = Session::new(questions(5), practice(5));
        session.start().unwrap();

        for i in 0..5 {
            assert_eq!(session.current_index(), i);
            let effects = answer(&mut session, 0);
            assert!(effects.is_empty());
            let effects = session.advance().unwrap();
            if i < 4 {
                assert!(effects.is_empty());
                assert_eq!(session.phase(), SessionPhase::InProgress);
            } else {
                let verdict = finish_verdict(&effects).unwrap();
                assert_eq!(verdict.experience, 5 * 10);
                assert!(verdict.perfect);
            }
        }

        assert_eq!(session.phase(), SessionPhase::Finished);
        assert_eq!(session.score(), 5);
        assert_eq!(session.lives_remaining(), Some(5));
        assert_eq!(session.finish_reason(), Some(FinishReason::Completed));
    }

    #[test]
    fn losing_last_life_finishes_on_check() {
        let mut session = Session::new(questions(5), practice(2));
        session.start().unwrap();

        let effects = answer(&mut session, 1);
        assert_eq!(effects, vec![Effect::RecordMistake(QuestionId::new(1))]);
        session.advance().unwrap();

        let effects = answer(&mut session, 2);
        assert_eq!(effects[0], Effect::RecordMistake(QuestionId::new(2)));
        let verdict = finish_verdict(&effects).unwrap();
        assert_eq!(verdict.lives_lost, Some(2));
        assert!(!verdict.passed);

        assert_eq!(session.phase(), SessionPhase::Finished);
        assert_eq!(session.finish_reason(), Some(FinishReason::OutOfLives));
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.lives_remaining(), Some(0));
        assert_eq!(session.score(), 0);
        // Feedback for the fatal question is still readable.
        assert_eq!(session.current_question().unwrap().explanation(), "Explanation 2");
        assert!(!session.last_answer().unwrap().correct);
        assert_eq!(session.advance(), Err(Rejection::Finished));
    }

    #[test]
    fn check_requires_selection() {
        let mut session = Session::new(questions(2), practice(3));
        session.start().unwrap();
        assert_eq!(session.check(), Err(Rejection::NoSelection));
        assert!(!session.is_answered());
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn double_check_is_rejected_without_side_effects() {
        let mut session = Session::new(questions(2), practice(3));
        session.start().unwrap();
        answer(&mut session, 1);
        assert_eq!(session.check(), Err(Rejection::AlreadyAnswered));
        assert_eq!(session.select(0), Err(Rejection::AlreadyAnswered));
        assert_eq!(session.lives_remaining(), Some(2));
        assert_eq!(session.mistakes(), &[QuestionId::new(1)]);
        assert_eq!(session.score(), 0);
    }

    #[test]
    fn continue_requires_answer() {
        let mut session = Session::new(questions(2), practice(3));
        session.start().unwrap();
        session.select(0).unwrap();
        assert_eq!(session.advance(), Err(Rejection::NotAnswered));
        assert_eq!(session.current_index(), 0);
        assert_eq!(session.selected_option(), Some(0));
    }

    #[test]
    fn selection_can_change_before_check_and_clears_on_continue() {
        let mut session = Session::new(questions(2), practice(3));
        session.start().unwrap();
        session.select(2).unwrap();
        session.select(0).unwrap();
        assert_eq!(
            session.select(3),
            Err(Rejection::OptionOutOfRange { index: 3 })
        );
        assert_eq!(session.selected_option(), Some(0));
        session.check().unwrap();
        assert_eq!(session.score(), 1);
        session.advance().unwrap();
        assert_eq!(session.selected_option(), None);
        assert!(!session.is_answered());
    }

    #[test]
    fn timer_expiry_scores_only_checked_questions() {
        let settings = SessionSettings::mock_exam()
            .with_time_limit(Some(30))
            .unwrap()
            .with_mandatory_topic(None)
            .unwrap();
        let mut session = Session::new(questions(5), settings);
        session.start().unwrap();

        answer(&mut session, 0);
        session.advance().unwrap();
        answer(&mut session, 0);
        session.advance().unwrap();
        // On question 3, selected but not checked.
        session.select(0).unwrap();

        let mut finish = None;
        for _ in 0..30 {
            let effects = session.tick().unwrap();
            if let Some(v) = finish_verdict(&effects) {
                finish = Some(v.clone());
            }
        }
        let verdict = finish.expect("countdown finished the session");
        assert_eq!(verdict.correct_count, 2);
        assert_eq!(verdict.total_count, 5);
        assert_eq!(verdict.elapsed_secs, 30);
        assert_eq!(session.finish_reason(), Some(FinishReason::TimeExpired));
        assert_eq!(session.remaining_secs(), Some(0));

        // Late input from the user loses the race.
        assert_eq!(session.check(), Err(Rejection::Finished));
        assert_eq!(session.tick(), Err(Rejection::Finished));
        assert_eq!(session.score(), 2);
    }

    #[test]
    fn expire_only_applies_to_timed_sessions() {
        let mut untimed = Session::new(questions(2), practice(3));
        untimed.start().unwrap();
        assert_eq!(untimed.expire(), Err(Rejection::NoTimer));
        assert_eq!(untimed.tick(), Ok(Vec::new()));
        assert_eq!(untimed.elapsed_secs(), 1);

        let mut timed = Session::new(questions(2), SessionSettings::mock_exam());
        timed.start().unwrap();
        answer(&mut timed, 0);
        let effects = timed.expire().unwrap();
        assert_eq!(finish_verdict(&effects).unwrap().correct_count, 1);
        assert_eq!(timed.expire(), Err(Rejection::Finished));
    }

    #[test]
    fn correct_review_answer_resolves_its_mistake_record() {
        let mut session = Session::new(questions(2), SessionSettings::mistake_review())
            .with_mistake_records([(QuestionId::new(1), MistakeId::new(11))]);
        session.start().unwrap();

        let effects = answer(&mut session, 0);
        assert_eq!(
            effects,
            vec![Effect::ResolveMistake {
                question: QuestionId::new(1),
                mistake: MistakeId::new(11),
            }]
        );
        session.advance().unwrap();

        // No record for question 2: a correct answer has nothing to resolve.
        assert!(answer(&mut session, 0).is_empty());
    }

    #[test]
    fn apply_dispatches_events() {
        let mut session = Session::new(questions(1), SessionSettings::mistake_review());
        session.apply(SessionEvent::Start).unwrap();
        session.apply(SessionEvent::Select(0)).unwrap();
        session.apply(SessionEvent::Check).unwrap();
        let effects = session.apply(SessionEvent::Continue).unwrap();
        assert!(matches!(effects.as_slice(), [Effect::Finish(_)]));
        assert_eq!(
            session.apply(SessionEvent::Select(0)),
            Err(Rejection::Finished)
        );
        assert_eq!(
            session.progress(),
            SessionProgress {
                total: 1,
                answered: 1,
                remaining: 0,
                is_complete: true,
            }
        );
    }

    #[test]
    fn operations_before_start_are_rejected() {
        let mut session = Session::new(questions(2), practice(3));
        assert_eq!(session.select(0), Err(Rejection::NotStarted));
        assert_eq!(session.check(), Err(Rejection::NotStarted));
        assert_eq!(session.advance(), Err(Rejection::NotStarted));
        assert_eq!(session.tick(), Err(Rejection::NotStarted));
    }
}

//
// ─── PROPERTY TESTS ────────────────────────────────────────────────────────────
//
