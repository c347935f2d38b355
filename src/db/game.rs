use color_eyre::Result;
use rand::Rng;

use super::helpers::{delete, insert_returning, update, SqlValue, WriteOutcome};
use super::models::GameModel;
use super::Db;
use crate::models::GameConfig;

impl Db {
    /// Open a new game starting at a random point of the question rotation.
    ///
    /// Configuration is clamped to its allowed ranges before it is stored.
    pub async fn create_game(&self, config: &GameConfig) -> WriteOutcome<i32> {
        let count = match self.question_count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("could not count questions for new game: {e}");
                return WriteOutcome::Failed;
            }
        };

        let question_offset = random_offset(&mut rand::thread_rng(), count);
        let config = config.clamped();

        let values = [
            ("question_offset", SqlValue::Int(question_offset)),
            ("questions_asked", config.questions_asked.into()),
            ("timeout_answered", config.timeout_answered.into()),
            ("score_correct", config.score_correct.into()),
            ("score_fastest", config.score_fastest.into()),
            ("score_incorrect", config.score_incorrect.into()),
            ("score_noanswer", config.score_noanswer.into()),
        ];

        let game = insert_returning(&self.pool, "game", &values, "id").await;
        if let WriteOutcome::Applied(game_id) = game {
            tracing::info!("new game created with id: {game_id}, question_offset: {question_offset}");
        }
        game
    }

    pub async fn start_game(&self, game_id: i32) -> WriteOutcome<u64> {
        let started = update(
            &self.pool,
            "game",
            &[("time_started", SqlValue::Now)],
            &[("id", game_id.into())],
        )
        .await;

        if started.affected_any() {
            tracing::info!("game started with id: {game_id}");
        }
        started
    }

    /// Delete a game. Its players and event records go with it through the
    /// foreign keys' `ON DELETE CASCADE`.
    pub async fn remove_game(&self, game_id: i32) -> WriteOutcome<u64> {
        let removed = delete(&self.pool, "game", &[("id", game_id.into())]).await;

        if removed.affected_any() {
            tracing::info!("game removed with id: {game_id}");
        }
        removed
    }

    pub async fn fetch_game(&self, game_id: i32) -> Result<Option<GameModel>> {
        let game = sqlx::query_as::<_, GameModel>(
            r#"
            SELECT id, question_offset, questions_asked, timeout_answered,
                   score_correct, score_fastest, score_incorrect, score_noanswer,
                   time_created, time_started
            FROM game
            WHERE id = $1
            "#,
        )
        .bind(game_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(game)
    }
}

/// Uniform pick in `[0, count)`; 0 for an empty bank.
pub(crate) fn random_offset(rng: &mut impl Rng, count: i64) -> i32 {
    let upper = i32::try_from(count).unwrap_or(i32::MAX);
    if upper <= 0 {
        return 0;
    }
    rng.gen_range(0..upper)
}
