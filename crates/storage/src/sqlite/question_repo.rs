use std::collections::HashMap;

use passmate_core::model::{Question, QuestionId};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{conn, id_i64, map_question_row, ser},
};
use crate::repository::{QuestionCriteria, QuestionRepository, StorageError};

const QUESTION_COLUMNS: &str = "id, text, options, correct_index, explanation, topic";

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let options = serde_json::to_string(question.options()).map_err(ser)?;
        let correct_index = i64::try_from(question.correct_index()).map_err(ser)?;

        sqlx::query(
            r"
                INSERT INTO questions (id, text, options, correct_index, explanation, topic)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    text = excluded.text,
                    options = excluded.options,
                    correct_index = excluded.correct_index,
                    explanation = excluded.explanation,
                    topic = excluded.topic
            ",
        )
        .bind(id_i64("question_id", question.id().value())?)
        .bind(question.text())
        .bind(options)
        .bind(correct_index)
        .bind(question.explanation())
        .bind(question.topic())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn fetch_questions(
        &self,
        criteria: &QuestionCriteria,
    ) -> Result<Vec<Question>, StorageError> {
        let rows = match criteria {
            QuestionCriteria::Random { count } => {
                let sql =
                    format!("SELECT {QUESTION_COLUMNS} FROM questions ORDER BY RANDOM() LIMIT ?1");
                sqlx::query(&sql)
                    .bind(i64::from(*count))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(conn)?
            }
            QuestionCriteria::Topic { topic, count } => {
                let sql = format!(
                    "SELECT {QUESTION_COLUMNS} FROM questions WHERE topic = ?1 ORDER BY RANDOM() LIMIT ?2"
                );
                sqlx::query(&sql)
                    .bind(topic)
                    .bind(i64::from(*count))
                    .fetch_all(&self.pool)
                    .await
                    .map_err(conn)?
            }
            QuestionCriteria::Ids(ids) => return self.fetch_by_ids(ids).await,
        };

        rows.iter().map(map_question_row).collect()
    }

    async fn list_topics(&self) -> Result<Vec<String>, StorageError> {
        let rows = sqlx::query("SELECT DISTINCT topic FROM questions ORDER BY topic ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("topic").map_err(ser))
            .collect()
    }
}

impl SqliteRepository {
    async fn fetch_by_ids(&self, ids: &[QuestionId]) -> Result<Vec<Question>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!("SELECT {QUESTION_COLUMNS} FROM questions WHERE id IN (");
        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 1).to_string());
        }
        sql.push(')');

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id_i64("question_id", id.value())?);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(conn)?;

        let mut by_id: HashMap<QuestionId, Question> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let question = map_question_row(row)?;
            by_id.insert(question.id(), question);
        }

        // Preserve the caller's order; duplicates in `ids` yield the question once.
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
