use sqlx::postgres::PgConnectOptions;

use crate::services::import::ImportSettings;

/// PostgreSQL connection settings, read from flags or the environment.
#[derive(clap::Args, Debug, Clone)]
pub struct DbConfig {
    /// Database server host.
    #[arg(long = "db-host", env = "POSTGRES_SERVER", default_value = "localhost")]
    pub host: String,

    /// Database server port.
    #[arg(long = "db-port", env = "POSTGRES_PORT", default_value_t = 5432)]
    pub port: u16,

    /// Database name.
    #[arg(long = "db-name", env = "POSTGRES_DB", default_value = "quiz")]
    pub database: String,

    /// Database user.
    #[arg(long = "db-user", env = "POSTGRES_QUIZUSER", default_value = "quiz")]
    pub user: String,

    /// Database password.
    #[arg(long = "db-password", env = "POSTGRES_QUIZPASS", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Maximum pooled connections.
    #[arg(long = "db-pool-size", env = "POSTGRES_POOL_SIZE", default_value_t = 10)]
    pub pool_size: u32,
}

impl DbConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database)
            .username(&self.user)
            .password(&self.password)
    }
}

/// Question import settings.
#[derive(clap::Args, Debug, Clone)]
pub struct ImportConfig {
    /// Stop importing once the bank holds this many questions.
    #[arg(long, env = "QUIZ_QUESTIONS_MAX", default_value_t = 100)]
    pub questions_max: i64,

    /// Trivia feed endpoint.
    #[arg(long, env = "QUIZ_TRIVIA_URL", default_value = crate::trivia::OPEN_TDB_URL)]
    pub trivia_url: String,
}

impl ImportConfig {
    pub fn settings(&self) -> ImportSettings {
        ImportSettings {
            max_questions: self.questions_max,
            ..ImportSettings::default()
        }
    }
}
