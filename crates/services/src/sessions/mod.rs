mod progress;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use progress::{AttemptListItem, ProgressService, ProgressSnapshot};
pub use workflow::{ActiveSession, AnswerFeedback, SessionLoopService};
