use chrono::{DateTime, Utc};
use passmate_core::model::{HeartBalance, UserId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, ser, u32_from_i64},
};
use crate::repository::{ProfileRepository, StorageError};

#[async_trait::async_trait]
impl ProfileRepository for SqliteRepository {
    async fn hearts(&self, user_id: UserId) -> Result<Option<HeartBalance>, StorageError> {
        let row = sqlx::query("SELECT hearts, hearts_updated_at FROM profiles WHERE user_id = ?1")
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let Some(hearts) = row.try_get::<Option<i64>, _>("hearts").map_err(ser)? else {
            return Ok(None);
        };
        let updated_at: Option<DateTime<Utc>> = row.try_get("hearts_updated_at").map_err(ser)?;
        let updated_at = updated_at.ok_or_else(|| {
            StorageError::Serialization("hearts stored without a write time".to_owned())
        })?;
        Ok(Some(HeartBalance::new(
            u32_from_i64("hearts", hearts)?,
            updated_at,
        )))
    }

    async fn set_hearts(
        &self,
        user_id: UserId,
        hearts: u32,
        at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO profiles (user_id, hearts, hearts_updated_at, experience)
                VALUES (?1, ?2, ?3, 0)
                ON CONFLICT(user_id) DO UPDATE SET
                    hearts = excluded.hearts,
                    hearts_updated_at = excluded.hearts_updated_at
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(i64::from(hearts))
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;
        Ok(())
    }

    async fn total_experience(&self, user_id: UserId) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT experience FROM profiles WHERE user_id = ?1")
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        match row {
            None => Ok(0),
            Some(row) => {
                let v: i64 = row.try_get("experience").map_err(ser)?;
                u64::try_from(v).map_err(ser)
            }
        }
    }
}
