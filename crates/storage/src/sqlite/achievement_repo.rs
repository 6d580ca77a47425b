use chrono::{DateTime, Utc};
use passmate_core::model::{Achievement, AchievementEvent, AchievementKind, UserId, qualifying};
use sqlx::{Row, SqliteConnection};

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, ser},
};
use crate::repository::{AchievementRepository, StorageError};

/// Insert every qualifying badge; only rows that did not exist yet count as unlocked.
pub(super) async fn unlock_qualifying(
    db: &mut SqliteConnection,
    user_id: UserId,
    event: &AchievementEvent,
    at: DateTime<Utc>,
) -> Result<Vec<Achievement>, StorageError> {
    let user = id_i64("user_id", user_id.value())?;
    let mut unlocked = Vec::new();

    for kind in qualifying(event) {
        let res = sqlx::query(
            r"
                INSERT INTO achievements (user_id, kind, unlocked_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id, kind) DO NOTHING
            ",
        )
        .bind(user)
        .bind(kind.as_str())
        .bind(at)
        .execute(&mut *db)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 1 {
            unlocked.push(kind.achievement());
        }
    }

    Ok(unlocked)
}

#[async_trait::async_trait]
impl AchievementRepository for SqliteRepository {
    async fn evaluate_achievements(
        &self,
        user_id: UserId,
        event: &AchievementEvent,
        at: DateTime<Utc>,
    ) -> Result<Vec<Achievement>, StorageError> {
        let mut db = self.pool.acquire().await.map_err(conn)?;
        unlock_qualifying(&mut db, user_id, event, at).await
    }

    async fn list_unlocked(&self, user_id: UserId) -> Result<Vec<Achievement>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT kind FROM achievements
                WHERE user_id = ?1
                ORDER BY unlocked_at ASC, kind ASC
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| {
                let kind: String = row.try_get("kind").map_err(ser)?;
                kind.parse::<AchievementKind>()
                    .map(AchievementKind::achievement)
                    .map_err(ser)
            })
            .collect()
    }
}
