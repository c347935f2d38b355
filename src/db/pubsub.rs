use color_eyre::Result;
use sqlx::PgConnection;

use super::helpers::{insert_returning, SqlValue, WriteOutcome};
use super::models::EventRecord;
use super::Db;

/// Notification channel every server process listens on.
pub const PUBSUB_CHANNEL: &str = "pubsub_insert";

impl Db {
    /// Record a game event and announce it to every listening process.
    ///
    /// The row insert and the channel notification share one transaction, so
    /// listeners hear about the event exactly when the row becomes visible,
    /// in commit order. Returns the new event id.
    pub async fn broadcast(
        &self,
        game_id: i32,
        kind: &str,
        data: serde_json::Value,
    ) -> WriteOutcome<i32> {
        let mut tx = match self.pool.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                tracing::error!("could not begin broadcast transaction: {e}");
                return WriteOutcome::Failed;
            }
        };

        let values = [
            ("game_id", SqlValue::Int(game_id)),
            ("type", kind.into()),
            ("data", data.into()),
        ];
        let WriteOutcome::Applied(event_id) =
            insert_returning::<_, i32>(&mut *tx, "pubsub", &values, "id").await
        else {
            // dropping the transaction rolls it back
            return WriteOutcome::Failed;
        };

        if let Err(e) = notify_inserted(&mut tx, event_id).await {
            tracing::error!(event_id, "could not notify {PUBSUB_CHANNEL}: {e}");
            return WriteOutcome::Failed;
        }

        match tx.commit().await {
            Ok(()) => {
                tracing::debug!(game_id, event_id, kind, "event broadcast");
                WriteOutcome::Applied(event_id)
            }
            Err(e) => {
                tracing::error!(event_id, "could not commit broadcast: {e}");
                WriteOutcome::Failed
            }
        }
    }

    /// Every event recorded for a game, oldest first.
    pub async fn fetch_events(&self, game_id: i32) -> Result<Vec<EventRecord>> {
        let events = sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, game_id, type AS kind, data, created_at
            FROM pubsub
            WHERE game_id = $1
            ORDER BY id
            "#,
        )
        .bind(game_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

/// Send the stored event row, as JSON, on [`PUBSUB_CHANNEL`].
///
/// Postgres queues the notification and delivers it when the surrounding
/// transaction commits; a rollback discards it.
async fn notify_inserted(conn: &mut PgConnection, event_id: i32) -> sqlx::Result<()> {
    sqlx::query("SELECT pg_notify($1, row_to_json(p)::text) FROM pubsub p WHERE p.id = $2")
        .bind(PUBSUB_CHANNEL)
        .bind(event_id)
        .execute(conn)
        .await?;

    Ok(())
}
