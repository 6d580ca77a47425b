use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("a question needs at least 2 options, got {len}")]
    TooFewOptions { len: usize },

    #[error("option {index} is blank")]
    BlankOption { index: usize },

    #[error("correct index {index} is out of range for {len} options")]
    CorrectIndexOutOfRange { index: usize, len: usize },

    #[error("topic cannot be empty")]
    EmptyTopic,
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated question as it appears in a question bank file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<String>,
    pub correct_index: usize,
    #[serde(default)]
    pub explanation: String,
    pub topic: String,
}

impl QuestionDraft {
    /// Validate the draft into a `Question`.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if text/topic are blank, fewer than two options are given,
    /// an option is blank, or `correct_index` does not point at an option.
    pub fn validate(self) -> Result<Question, QuestionError> {
        let text = self.text.trim().to_owned();
        if text.is_empty() {
            return Err(QuestionError::EmptyText);
        }
        let topic = self.topic.trim().to_owned();
        if topic.is_empty() {
            return Err(QuestionError::EmptyTopic);
        }
        let len = self.options.len();
        if len < 2 {
            return Err(QuestionError::TooFewOptions { len });
        }
        if let Some(index) = self.options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::BlankOption { index });
        }
        if self.correct_index >= len {
            return Err(QuestionError::CorrectIndexOutOfRange {
                index: self.correct_index,
                len,
            });
        }

        Ok(Question {
            id: self.id,
            text,
            options: self.options,
            correct_index: self.correct_index,
            explanation: self.explanation,
            topic,
        })
    }
}

/// A multiple-choice question with exactly one correct option.
///
/// Option order is the display order and is what `correct_index` points into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft", into = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<String>,
    correct_index: usize,
    explanation: String,
    topic: String,
}

impl Question {
    /// Creates a validated question.
    ///
    /// # Errors
    ///
    /// See [`QuestionDraft::validate`].
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<String>,
        correct_index: usize,
        explanation: impl Into<String>,
        topic: impl Into<String>,
    ) -> Result<Self, QuestionError> {
        QuestionDraft {
            id,
            text: text.into(),
            options,
            correct_index,
            explanation: explanation.into(),
            topic: topic.into(),
        }
        .validate()
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn correct_index(&self) -> usize {
        self.correct_index
    }

    #[must_use]
    pub fn explanation(&self) -> &str {
        &self.explanation
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn is_correct(&self, option: usize) -> bool {
        option == self.correct_index
    }

    #[must_use]
    pub fn has_topic(&self, topic: &str) -> bool {
        self.topic == topic
    }
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl From<Question> for QuestionDraft {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            text: q.text,
            options: q.options,
            correct_index: q.correct_index,
            explanation: q.explanation,
            topic: q.topic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("option {i}")).collect()
    }

    #[test]
    fn builds_valid_question() {
        let q = Question::new(
            QuestionId::new(1),
            "  What is the capital of Australia?  ",
            vec!["Sydney".into(), "Canberra".into(), "Melbourne".into()],
            1,
            "Canberra is the capital.",
            "Australia and its people",
        )
        .unwrap();

        assert_eq!(q.text(), "What is the capital of Australia?");
        assert!(q.is_correct(1));
        assert!(!q.is_correct(0));
        assert!(q.has_topic("Australia and its people"));
    }

    #[test]
    fn rejects_single_option() {
        let err = Question::new(QuestionId::new(1), "Q", options(1), 0, "", "t").unwrap_err();
        assert_eq!(err, QuestionError::TooFewOptions { len: 1 });
    }

    #[test]
    fn rejects_out_of_range_correct_index() {
        let err = Question::new(QuestionId::new(1), "Q", options(3), 3, "", "t").unwrap_err();
        assert_eq!(err, QuestionError::CorrectIndexOutOfRange { index: 3, len: 3 });
    }

    #[test]
    fn rejects_blank_option_and_text() {
        let err = Question::new(
            QuestionId::new(1),
            "Q",
            vec!["a".into(), "  ".into()],
            0,
            "",
            "t",
        )
        .unwrap_err();
        assert_eq!(err, QuestionError::BlankOption { index: 1 });

        let err = Question::new(QuestionId::new(1), " ", options(2), 0, "", "t").unwrap_err();
        assert_eq!(err, QuestionError::EmptyText);
    }

    #[test]
    fn deserializing_invalid_json_fails() {
        let json = r#"{"id":1,"text":"Q","options":["a","b"],"correct_index":5,"topic":"t"}"#;
        assert!(serde_json::from_str::<Question>(json).is_err());

        let json = r#"{"id":1,"text":"Q","options":["a","b"],"correct_index":1,"topic":"t"}"#;
        let q: Question = serde_json::from_str(json).unwrap();
        assert_eq!(q.correct_index(), 1);
        assert_eq!(q.explanation(), "");
    }
}
