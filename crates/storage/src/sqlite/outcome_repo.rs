use passmate_core::model::{AttemptId, UserId};
use sqlx::Row;

use super::{
    SqliteRepository,
    achievement_repo::unlock_qualifying,
    mapping::{conn, id_i64, map_attempt_row, ser},
};
use crate::repository::{
    AttemptRecord, OutcomeRecord, OutcomeRepository, PersistedOutcome, StorageError,
};

const ATTEMPT_COLUMNS: &str = "id, user_id, variant, topic, experience, correct_count, \
     total_count, lives_lost, hearts_remaining, passed, started_at, finished_at";

#[async_trait::async_trait]
impl OutcomeRepository for SqliteRepository {
    async fn persist_outcome(
        &self,
        outcome: &OutcomeRecord,
    ) -> Result<PersistedOutcome, StorageError> {
        let attempt_id = AttemptId::generate();
        let user = id_i64("user_id", outcome.user_id.value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO attempts (
                    id, user_id, variant, topic, experience, correct_count, total_count,
                    lives_lost, hearts_remaining, passed, started_at, finished_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )
        .bind(attempt_id.to_string())
        .bind(user)
        .bind(outcome.variant.as_str())
        .bind(outcome.topic.as_deref())
        .bind(i64::from(outcome.experience))
        .bind(i64::from(outcome.correct_count))
        .bind(i64::from(outcome.total_count))
        .bind(outcome.lives_lost.map(i64::from))
        .bind(outcome.hearts_remaining.map(i64::from))
        .bind(outcome.passed)
        .bind(outcome.started_at)
        .bind(outcome.finished_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO profiles (user_id, hearts, hearts_updated_at, experience)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(user_id) DO UPDATE SET
                    experience = profiles.experience + excluded.experience,
                    hearts = COALESCE(excluded.hearts, profiles.hearts),
                    hearts_updated_at = CASE
                        WHEN excluded.hearts IS NULL THEN profiles.hearts_updated_at
                        ELSE excluded.hearts_updated_at
                    END
            ",
        )
        .bind(user)
        .bind(outcome.hearts_remaining.map(i64::from))
        .bind(outcome.hearts_remaining.map(|_| outcome.finished_at))
        .bind(i64::from(outcome.experience))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        let row = sqlx::query("SELECT experience FROM profiles WHERE user_id = ?1")
            .bind(user)
            .fetch_one(&mut *tx)
            .await
            .map_err(conn)?;
        let total: i64 = row.try_get("experience").map_err(ser)?;
        let total = u64::try_from(total).map_err(ser)?;

        let unlocked = unlock_qualifying(
            &mut tx,
            outcome.user_id,
            &outcome.achievement_event(total),
            outcome.finished_at,
        )
        .await?;

        tx.commit().await.map_err(conn)?;
        Ok(PersistedOutcome {
            attempt_id,
            unlocked,
        })
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<AttemptRecord, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Err(StorageError::NotFound);
        };
        map_attempt_row(&row)
    }

    async fn list_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<AttemptRecord>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE user_id = ?1 \
             ORDER BY finished_at DESC, rowid DESC LIMIT ?2"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        rows.iter().map(map_attempt_row).collect()
    }
}
