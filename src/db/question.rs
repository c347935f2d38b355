use color_eyre::Result;

use super::helpers::{insert, insert_returning, SqlValue};
use super::models::{AnswerModel, QuestionModel};
use super::Db;
use crate::models::NewAnswer;

impl Db {
    pub async fn question_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM question")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Store a question and all of its answers, or nothing at all.
    ///
    /// Returns `true` only when the transaction committed.
    pub async fn add_question(&self, text: &str, answers: &[NewAnswer]) -> bool {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!("could not begin question transaction: {e}");
                return false;
            }
        };

        let mut complete = false;

        let question = insert_returning::<_, i32>(
            &mut *tx,
            "question",
            &[("text", text.into())],
            "id",
        )
        .await;

        if let Some(question_id) = question.applied() {
            complete = true;
            for answer in answers {
                let values = [
                    ("question_id", SqlValue::Int(question_id)),
                    ("text", answer.text.as_str().into()),
                    ("correct", answer.correct.into()),
                ];
                if !insert(&mut *tx, "answer", &values).await.inserted() {
                    complete = false;
                    break;
                }
            }
        }

        if complete {
            match tx.commit().await {
                Ok(()) => {
                    tracing::info!("question added with {} answers", answers.len());
                    true
                }
                Err(e) => {
                    tracing::error!("could not commit question: {e}");
                    false
                }
            }
        } else {
            if let Err(e) = tx.rollback().await {
                tracing::error!("could not roll back question: {e}");
            }
            tracing::warn!("question discarded, not every row could be written");
            false
        }
    }

    /// Question `q_num` of the rotation, counted against the live bank.
    ///
    /// The index wraps modulo the current question count, so the same `q_num`
    /// can land on a different question once the bank grows or shrinks.
    pub async fn fetch_question(&self, q_num: i64) -> Result<Option<QuestionModel>> {
        let count = self.question_count().await?;
        if count == 0 {
            return Ok(None);
        }

        let row: Option<(i32, String)> =
            sqlx::query_as("SELECT id, text FROM question ORDER BY id LIMIT 1 OFFSET $1")
                .bind(q_num.rem_euclid(count))
                .fetch_optional(&self.pool)
                .await?;

        let Some((question_id, text)) = row else {
            return Ok(None);
        };

        let answers = sqlx::query_as::<_, AnswerModel>(
            "SELECT text, correct FROM answer WHERE question_id = $1 ORDER BY id",
        )
        .bind(question_id)
        .fetch_all(&self.pool)
        .await?;

        if answers.is_empty() {
            return Ok(None);
        }

        Ok(Some(QuestionModel { text, answers }))
    }
}
