use color_eyre::Result;

use crate::db::Db;
use crate::models::NewAnswer;
use crate::trivia::{format_question, OpenTdbClient, TriviaQuestion};

// ---------------------------------------------------------------------------
// QuestionBank trait (DIP: service defines the abstraction it needs)
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
pub trait QuestionBank: Send + Sync {
    fn question_count(&self) -> impl std::future::Future<Output = Result<i64>> + Send;

    fn add_question(
        &self,
        text: &str,
        answers: &[NewAnswer],
    ) -> impl std::future::Future<Output = bool> + Send;
}

impl QuestionBank for Db {
    async fn question_count(&self) -> Result<i64> {
        Db::question_count(self).await
    }

    async fn add_question(&self, text: &str, answers: &[NewAnswer]) -> bool {
        Db::add_question(self, text, answers).await
    }
}

// ---------------------------------------------------------------------------
// TriviaSource trait
// ---------------------------------------------------------------------------

#[cfg_attr(test, mockall::automock)]
pub trait TriviaSource: Send + Sync {
    fn fetch_batch(
        &self,
        amount: usize,
    ) -> impl std::future::Future<Output = Result<Vec<TriviaQuestion>>> + Send;
}

impl TriviaSource for OpenTdbClient {
    async fn fetch_batch(&self, amount: usize) -> Result<Vec<TriviaQuestion>> {
        OpenTdbClient::fetch_batch(self, amount).await
    }
}

// ---------------------------------------------------------------------------
// ImportService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSettings {
    /// Stop importing once the bank holds this many questions.
    pub max_questions: i64,
    /// Upper bound on feed requests per import run.
    pub max_api_calls: usize,
    /// Questions requested per feed call.
    pub batch_size: usize,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            max_questions: 100,
            max_api_calls: 10,
            batch_size: 50,
        }
    }
}

impl ImportSettings {
    /// How many feed calls it takes to top up a bank of `count` questions.
    pub fn calls_needed(&self, count: i64) -> usize {
        if count >= self.max_questions || self.batch_size == 0 {
            return 0;
        }
        let missing = usize::try_from(self.max_questions - count).unwrap_or(usize::MAX);
        missing.div_ceil(self.batch_size).min(self.max_api_calls)
    }
}

pub struct ImportService<B: QuestionBank = Db, S: TriviaSource = OpenTdbClient> {
    bank: B,
    source: S,
    settings: ImportSettings,
}

impl<B: QuestionBank, S: TriviaSource> ImportService<B, S> {
    pub fn new(bank: B, source: S, settings: ImportSettings) -> Self {
        Self {
            bank,
            source,
            settings,
        }
    }

    /// Top the question bank up from the trivia feed. Returns how many
    /// questions were stored.
    ///
    /// Feed calls run concurrently; a failed call is logged and skipped.
    /// Questions are stored one at a time, each atomically.
    pub async fn import_questions(&self) -> Result<usize> {
        let count = self.bank.question_count().await?;
        let calls = self.settings.calls_needed(count);
        if calls == 0 {
            tracing::info!("question bank already holds {count} questions, nothing to import");
            return Ok(0);
        }

        let batches = futures::future::join_all(
            (0..calls).map(|_| self.source.fetch_batch(self.settings.batch_size)),
        )
        .await;

        let mut imported = 0;
        for batch in batches {
            let questions = match batch {
                Ok(questions) => questions,
                Err(e) => {
                    tracing::warn!("skipping failed trivia batch: {e}");
                    continue;
                }
            };

            for question in &questions {
                let (text, answers) = format_question(question);
                if self.bank.add_question(&text, &answers).await {
                    imported += 1;
                }
            }
        }

        tracing::info!("imported {imported} questions");
        Ok(imported)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
