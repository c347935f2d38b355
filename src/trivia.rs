use color_eyre::Result;
use serde::Deserialize;

use crate::models::NewAnswer;
use crate::utils::{clean_string, compare_answers};

pub const OPEN_TDB_URL: &str = "https://opentdb.com/api.php";

/// One question as served by the Open Trivia DB, text still HTML-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TriviaQuestion {
    pub category: String,
    pub question: String,
    pub correct_answer: String,
    #[serde(default)]
    pub incorrect_answers: Vec<String>,
}

#[derive(Deserialize)]
struct TriviaResponse {
    #[serde(default)]
    response_code: i32,
    #[serde(default)]
    results: Vec<TriviaQuestion>,
}

/// Turn a feed question into stored question text plus ordered answers.
///
/// The text reads `"<category>: <question>"`, dropping any `"Group:"` prefix
/// from the category. Answers are listed `True`/`False` first, then numbers in
/// order, then alphabetically.
pub fn format_question(q: &TriviaQuestion) -> (String, Vec<NewAnswer>) {
    let text = format!(
        "{}: {}",
        clean_string(strip_category_group(&q.category)),
        clean_string(&q.question)
    );

    let mut answers = Vec::with_capacity(q.incorrect_answers.len() + 1);
    answers.push(NewAnswer::new(clean_string(&q.correct_answer), true));
    answers.extend(
        q.incorrect_answers
            .iter()
            .map(|a| NewAnswer::new(clean_string(a), false)),
    );
    answers.sort_by(|a, b| compare_answers(&a.text, &b.text));

    (text, answers)
}

// "Entertainment: Video Games" -> " Video Games"
fn strip_category_group(category: &str) -> &str {
    match category.rfind(':') {
        Some(pos) if pos > 0 => &category[pos + 1..],
        _ => category,
    }
}

#[derive(Clone)]
pub struct OpenTdbClient {
    client: reqwest::Client,
    url: String,
}

impl OpenTdbClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub async fn fetch_batch(&self, amount: usize) -> Result<Vec<TriviaQuestion>> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("amount", amount)])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            tracing::error!("trivia API error: {status} - {text}");
            color_eyre::eyre::bail!("trivia API returned {status}");
        }

        let body: TriviaResponse = resp.json().await?;
        if body.response_code != 0 {
            color_eyre::eyre::bail!("trivia API response code {}", body.response_code);
        }

        tracing::info!("fetched {} trivia questions", body.results.len());
        Ok(body.results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(category: &str, correct: &str, incorrect: &[&str]) -> TriviaQuestion {
        TriviaQuestion {
            category: category.to_string(),
            question: "Is &quot;Rust&quot; a   language?".to_string(),
            correct_answer: correct.to_string(),
            incorrect_answers: incorrect.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn text_combines_category_and_question() {
        let (text, _) = format_question(&question("Science: Computers", "True", &["False"]));
        assert_eq!(text, "Computers: Is 'Rust' a language?");

        let (text, _) = format_question(&question("General Knowledge", "True", &["False"]));
        assert_eq!(text, "General Knowledge: Is 'Rust' a language?");
    }

    #[test]
    fn boolean_answers_list_true_first() {
        let (_, answers) = format_question(&question("Art", "False", &["True"]));
        assert_eq!(
            answers,
            [NewAnswer::new("True", false), NewAnswer::new("False", true)]
        );
    }

    #[test]
    fn numeric_answers_sort_numerically() {
        let (_, answers) = format_question(&question("Math", "12", &["100", "3", "7"]));
        let texts: Vec<&str> = answers.iter().map(|a| a.text.as_str()).collect();

        assert_eq!(texts, ["3", "7", "12", "100"]);
        assert_eq!(answers.iter().filter(|a| a.correct).count(), 1);
        assert!(answers[2].correct);
    }

    #[test]
    fn parses_api_response() {
        let body = r#"{
            "response_code": 0,
            "results": [{
                "type": "multiple",
                "difficulty": "easy",
                "category": "Geography",
                "question": "Capital of France?",
                "correct_answer": "Paris",
                "incorrect_answers": ["Rome", "Berlin", "Madrid"]
            }]
        }"#;
        let parsed: TriviaResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.response_code, 0);
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].incorrect_answers.len(), 3);
    }
}
