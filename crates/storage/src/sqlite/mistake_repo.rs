use chrono::{DateTime, Utc};
use passmate_core::model::{MistakeId, QuestionId, UserId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_mistake_row, mistake_id_from_i64, ser},
};
use crate::repository::{MistakeRecord, MistakeRepository, StorageError};

#[async_trait::async_trait]
impl MistakeRepository for SqliteRepository {
    async fn record_mistake(
        &self,
        user_id: UserId,
        question_id: QuestionId,
        at: DateTime<Utc>,
    ) -> Result<MistakeId, StorageError> {
        let user = id_i64("user_id", user_id.value())?;
        let question = id_i64("question_id", question_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let existing = sqlx::query(
            r"
                SELECT id FROM mistakes
                WHERE user_id = ?1 AND question_id = ?2 AND resolved_at IS NULL
            ",
        )
        .bind(user)
        .bind(question)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conn)?;

        if let Some(row) = existing {
            tx.commit().await.map_err(conn)?;
            return mistake_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?);
        }

        let res = sqlx::query(
            r"
                INSERT INTO mistakes (user_id, question_id, recorded_at, resolved_at)
                VALUES (?1, ?2, ?3, NULL)
            ",
        )
        .bind(user)
        .bind(question)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;
        mistake_id_from_i64(res.last_insert_rowid())
    }

    async fn resolve_mistake(&self, id: MistakeId, at: DateTime<Utc>) -> Result<(), StorageError> {
        let id = id_i64("mistake_id", id.value())?;
        let res = sqlx::query(
            r"
                UPDATE mistakes
                SET resolved_at = COALESCE(resolved_at, ?2)
                WHERE id = ?1
            ",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn outstanding_mistakes(
        &self,
        user_id: UserId,
    ) -> Result<Vec<MistakeRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, user_id, question_id, recorded_at, resolved_at
                FROM mistakes
                WHERE user_id = ?1 AND resolved_at IS NULL
                ORDER BY recorded_at ASC, id ASC
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_mistake_row).collect()
    }
}
