// Database model structs

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GameModel {
    pub id: i32,
    pub question_offset: i32,
    pub questions_asked: i32,
    pub timeout_answered: i32,
    pub score_correct: i32,
    pub score_fastest: i32,
    pub score_incorrect: i32,
    pub score_noanswer: i32,
    pub time_created: DateTime<Utc>,
    pub time_started: Option<DateTime<Utc>>,
}

impl GameModel {
    pub fn is_started(&self) -> bool {
        self.time_started.is_some()
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PlayerModel {
    pub id: i32,
    pub game_id: i32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct AnswerModel {
    pub text: String,
    pub correct: bool,
}

/// A question as served to players, answers in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionModel {
    pub text: String,
    pub answers: Vec<AnswerModel>,
}

/// One row of the append-only event log.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i32,
    pub game_id: i32,
    pub kind: String,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
