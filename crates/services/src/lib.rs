#![forbid(unsafe_code)]

pub mod app_services;
pub mod countdown;
pub mod error;
pub mod sessions;

pub use passmate_core::Clock;
pub use sessions as session;

pub use app_services::AppServices;
pub use countdown::Countdown;
pub use error::{AppServicesError, SessionError};

pub use sessions::{
    ActiveSession, AnswerFeedback, AttemptListItem, ProgressService, ProgressSnapshot,
    SessionLoopService,
};
