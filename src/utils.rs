use std::cmp::Ordering;

/// Restrict `value` to `[min, max]`.
///
/// Never panics: with `min > max` the result is `min`.
pub fn clamp(min: i32, value: i64, max: i32) -> i32 {
    // both bounds fit in i32, so the narrowing cast is lossless
    value.min(i64::from(max)).max(i64::from(min)) as i32
}

/// Read the leading base-10 integer of `s`, the way web form values are read.
///
/// Leading whitespace and a sign are accepted, anything after the digits is
/// ignored, and input without a leading digit reads as 0. Saturates at the
/// `i64` bounds.
pub fn parse_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut value: i64 = 0;
    for digit in rest.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(digit - b'0');
        value = value
            .saturating_mul(10)
            .saturating_add(if negative { -digit } else { digit });
    }
    value
}

/// Normalise question and answer text fetched from a trivia feed.
///
/// Angle brackets are escaped, quote entities become plain apostrophes, a bare
/// `&` followed by whitespace is escaped, and every whitespace run collapses
/// to a single space.
pub fn clean_string(s: &str) -> String {
    let s = s
        .trim()
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace("&#039;", "'");
    let s = ["&quot;", "&ldquo;", "&rdquo;", "&laquo;", "&raquo;"]
        .iter()
        .fold(s, |acc, entity| acc.replace(entity, "'"));

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_whitespace() {
            while chars.next_if(|c| c.is_whitespace()).is_some() {}
            out.push(' ');
        } else if c == '&' && chars.peek().is_some_and(|c| c.is_whitespace()) {
            out.push_str("&amp;");
        } else {
            out.push(c);
        }
    }
    out
}

/// Sort key that lists `True` before `False`, numbers in numeric order, then
/// any other text alphabetically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnswerKey {
    True,
    False,
    Number(i64),
    Text(String),
}

pub fn answer_key(text: &str) -> AnswerKey {
    match text {
        "True" => AnswerKey::True,
        "False" => AnswerKey::False,
        t if t.trim().parse::<f64>().is_ok_and(f64::is_finite) => {
            AnswerKey::Number(parse_int(t))
        }
        t => AnswerKey::Text(t.to_string()),
    }
}

pub fn compare_answers(a: &str, b: &str) -> Ordering {
    answer_key(a).cmp(&answer_key(b))
}
