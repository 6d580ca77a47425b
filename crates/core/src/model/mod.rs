mod achievement;
mod hearts;
mod ids;
mod outcome;
mod question;
mod settings;

pub use achievement::{
    Achievement, AchievementEvent, AchievementKind, EXPERIENCE_MILESTONE, qualifying,
};
pub use hearts::{HeartBalance, HeartRefill};
pub use ids::{AttemptId, MistakeId, ParseIdError, QuestionId, UserId};
pub use outcome::Outcome;
pub use question::{Question, QuestionDraft, QuestionError};
pub use settings::{
    DEFAULT_MANDATORY_TOPIC, PassThreshold, SessionSettings, SessionVariant, SettingsError,
};
