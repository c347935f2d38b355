use serde::{Deserialize, Serialize};

use crate::utils::{clamp, parse_int};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAnswer {
    pub text: String,
    #[serde(default)]
    pub correct: bool,
}

impl NewAnswer {
    pub fn new(text: impl Into<String>, correct: bool) -> Self {
        Self {
            text: text.into(),
            correct,
        }
    }
}

/// Settings a host picks when opening a game.
///
/// Every field is read leniently: numbers, numeric strings and garbage are all
/// accepted, garbage reading as 0. Ranges are enforced by [`GameConfig::clamped`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GameConfig {
    #[serde(default, deserialize_with = "deserialize_lenient_i64")]
    pub questions_asked: i64,
    #[serde(default, deserialize_with = "deserialize_lenient_i64")]
    pub timeout_answered: i64,
    #[serde(default, deserialize_with = "deserialize_lenient_i64")]
    pub score_correct: i64,
    #[serde(default, deserialize_with = "deserialize_lenient_i64")]
    pub score_fastest: i64,
    #[serde(default, deserialize_with = "deserialize_lenient_i64")]
    pub score_incorrect: i64,
    #[serde(default, deserialize_with = "deserialize_lenient_i64")]
    pub score_noanswer: i64,
}

pub const QUESTIONS_ASKED_RANGE: (i32, i32) = (1, 50);
pub const TIMEOUT_ANSWERED_RANGE: (i32, i32) = (5, 60);
pub const SCORE_RANGE: (i32, i32) = (-100, 100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedGameConfig {
    pub questions_asked: i32,
    pub timeout_answered: i32,
    pub score_correct: i32,
    pub score_fastest: i32,
    pub score_incorrect: i32,
    pub score_noanswer: i32,
}

impl GameConfig {
    pub fn clamped(&self) -> ClampedGameConfig {
        let within = |(min, max): (i32, i32), value: i64| clamp(min, value, max);
        ClampedGameConfig {
            questions_asked: within(QUESTIONS_ASKED_RANGE, self.questions_asked),
            timeout_answered: within(TIMEOUT_ANSWERED_RANGE, self.timeout_answered),
            score_correct: within(SCORE_RANGE, self.score_correct),
            score_fastest: within(SCORE_RANGE, self.score_fastest),
            score_incorrect: within(SCORE_RANGE, self.score_incorrect),
            score_noanswer: within(SCORE_RANGE, self.score_noanswer),
        }
    }
}

/// Accept a JSON number, a string holding one, or anything unreadable as 0.
/// Form posts send every value as a string.
fn deserialize_lenient_i64<'de, D: serde::Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
    struct Vis;
    impl<'de> serde::de::Visitor<'de> for Vis {
        type Value = i64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("number, numeric string, or null")
        }
        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<i64, E> { Ok(v) }
        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<i64, E> {
            Ok(i64::try_from(v).unwrap_or(i64::MAX))
        }
        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<i64, E> {
            // `as` truncates toward zero, saturates, and maps NaN to 0
            Ok(v as i64)
        }
        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<i64, E> { Ok(parse_int(v)) }
        fn visit_bool<E: serde::de::Error>(self, _: bool) -> Result<i64, E> { Ok(0) }
        fn visit_unit<E: serde::de::Error>(self) -> Result<i64, E> { Ok(0) }
        fn visit_none<E: serde::de::Error>(self) -> Result<i64, E> { Ok(0) }
        fn visit_some<D: serde::Deserializer<'de>>(self, d: D) -> Result<i64, D::Error> {
            d.deserialize_any(Vis)
        }
    }
    d.deserialize_any(Vis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_config_reads_numbers_and_strings() {
        let config: GameConfig = serde_json::from_str(
            r#"{
                "questions_asked": "12",
                "timeout_answered": 20,
                "score_correct": 10.7,
                "score_fastest": "five",
                "score_incorrect": "-5",
                "score_noanswer": null
            }"#,
        )
        .unwrap();

        assert_eq!(config.questions_asked, 12);
        assert_eq!(config.timeout_answered, 20);
        assert_eq!(config.score_correct, 10);
        assert_eq!(config.score_fastest, 0);
        assert_eq!(config.score_incorrect, -5);
        assert_eq!(config.score_noanswer, 0);
    }

    #[test]
    fn missing_fields_clamp_to_minimums() {
        let config: GameConfig = serde_json::from_str("{}").unwrap();
        let clamped = config.clamped();

        assert_eq!(clamped.questions_asked, 1);
        assert_eq!(clamped.timeout_answered, 5);
        assert_eq!(clamped.score_correct, 0);
    }

    #[test]
    fn out_of_range_values_are_clipped() {
        let config = GameConfig {
            questions_asked: 500,
            timeout_answered: 1,
            score_correct: 1000,
            score_fastest: -1000,
            score_incorrect: -100,
            score_noanswer: 100,
        };

        assert_eq!(
            config.clamped(),
            ClampedGameConfig {
                questions_asked: 50,
                timeout_answered: 5,
                score_correct: 100,
                score_fastest: -100,
                score_incorrect: -100,
                score_noanswer: 100,
            }
        );
    }
}
