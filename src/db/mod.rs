// Database module - provides data access layer

use color_eyre::{eyre::ensure, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

// Re-export models for convenience
pub mod models;
pub use models::*;

pub mod helpers;
pub mod migrations;

// Internal modules
mod game;
mod player;
mod pubsub;
mod question;

pub use pubsub::PUBSUB_CHANNEL;

// Main database handle
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

impl Db {
    /// Open a pool of at most `max_connections`, verify it and apply pending migrations.
    pub async fn new(options: PgConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: PgPool) -> Result<Self> {
        let one: i32 = sqlx::query_scalar("SELECT 1").fetch_one(&pool).await?;
        ensure!(one == 1, "connection check failed");

        migrations::run(&pool).await?;

        tracing::info!("database connection has been verified");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migration_applied(&self, version: &str) -> Result<bool> {
        let applied: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE version = $1)",
        )
        .bind(version)
        .fetch_one(&self.pool)
        .await?;

        Ok(applied)
    }
}
