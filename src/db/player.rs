use color_eyre::Result;

use super::helpers::{delete, insert_returning, SqlValue, WriteOutcome};
use super::models::PlayerModel;
use super::Db;

impl Db {
    pub async fn create_player(&self, game_id: i32, name: &str) -> WriteOutcome<i32> {
        let player = insert_returning(
            &self.pool,
            "player",
            &[("game_id", SqlValue::Int(game_id)), ("name", name.into())],
            "id",
        )
        .await;

        if let WriteOutcome::Applied(player_id) = player {
            tracing::info!("player {player_id} joined game {game_id}");
        }
        player
    }

    pub async fn remove_player(&self, player_id: i32) -> WriteOutcome<u64> {
        delete(&self.pool, "player", &[("id", player_id.into())]).await
    }

    pub async fn fetch_players(&self, game_id: i32) -> Result<Vec<PlayerModel>> {
        let players = sqlx::query_as::<_, PlayerModel>(
            "SELECT id, game_id, name FROM player WHERE game_id = $1 ORDER BY id",
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(players)
    }
}
