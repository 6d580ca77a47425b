use passmate_core::model::{
    AttemptId, MistakeId, Question, QuestionDraft, QuestionId, SessionVariant, UserId,
};
use sqlx::Row;

use crate::repository::{AttemptRecord, MistakeRecord, OutcomeRecord, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn mistake_id_from_i64(v: i64) -> Result<MistakeId, StorageError> {
    Ok(MistakeId::new(i64_to_u64("mistake_id", v)?))
}

pub(crate) fn map_question_row(row: &sqlx::sqlite::SqliteRow) -> Result<Question, StorageError> {
    let options_json: String = row.try_get("options").map_err(ser)?;
    let options: Vec<String> = serde_json::from_str(&options_json).map_err(ser)?;
    let correct_index: i64 = row.try_get("correct_index").map_err(ser)?;

    QuestionDraft {
        id: question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        text: row.try_get("text").map_err(ser)?,
        options,
        correct_index: usize::try_from(correct_index).map_err(ser)?,
        explanation: row.try_get("explanation").map_err(ser)?,
        topic: row.try_get("topic").map_err(ser)?,
    }
    .validate()
    .map_err(ser)
}

pub(crate) fn map_mistake_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<MistakeRecord, StorageError> {
    Ok(MistakeRecord {
        id: mistake_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        recorded_at: row.try_get("recorded_at").map_err(ser)?,
        resolved_at: row.try_get("resolved_at").map_err(ser)?,
    })
}

fn optional_u32(
    row: &sqlx::sqlite::SqliteRow,
    field: &'static str,
) -> Result<Option<u32>, StorageError> {
    row.try_get::<Option<i64>, _>(field)
        .map_err(ser)?
        .map(|v| u32_from_i64(field, v))
        .transpose()
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<AttemptRecord, StorageError> {
    let id: String = row.try_get("id").map_err(ser)?;
    let variant: String = row.try_get("variant").map_err(ser)?;

    Ok(AttemptRecord {
        id: id.parse::<AttemptId>().map_err(ser)?,
        outcome: OutcomeRecord {
            user_id: user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
            variant: variant.parse::<SessionVariant>().map_err(ser)?,
            topic: row.try_get("topic").map_err(ser)?,
            experience: u32_from_i64(
                "experience",
                row.try_get::<i64, _>("experience").map_err(ser)?,
            )?,
            correct_count: u32_from_i64(
                "correct_count",
                row.try_get::<i64, _>("correct_count").map_err(ser)?,
            )?,
            total_count: u32_from_i64(
                "total_count",
                row.try_get::<i64, _>("total_count").map_err(ser)?,
            )?,
            lives_lost: optional_u32(row, "lives_lost")?,
            hearts_remaining: optional_u32(row, "hearts_remaining")?,
            passed: row.try_get("passed").map_err(ser)?,
            started_at: row.try_get("started_at").map_err(ser)?,
            finished_at: row.try_get("finished_at").map_err(ser)?,
        },
    })
}
