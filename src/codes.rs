//! Public game and player codes.
//!
//! Integer ids never leave the server as-is. They are scrambled into short
//! strings over an alphabet that skips look-alike glyphs (`0`/`o`, `1`/`l`/`i`,
//! `5`/`s`, ...), so a code can be read aloud or typed from a screen. This is
//! obfuscation only: anyone who knows the constants can walk the id space.

/// Characters a code may contain. The position of each character is its digit value.
pub const ALPHABET: &str = "2346789acdefghkmnpqrtvwxy";

const DIGITS: &[u8] = ALPHABET.as_bytes();
const BASE: u128 = DIGITS.len() as u128;
const OFFSET: u128 = BASE * BASE;
const MULT: u128 = 7;

/// Maximum length `clean` keeps when no explicit length is needed.
pub const DEFAULT_CLEAN_LEN: usize = 10;

/// Encode an id as a public code.
///
/// Digits are written least significant first, so consecutive ids differ in
/// their leading character rather than their last one.
pub fn encode(n: u64) -> String {
    let mut v = u128::from(n) * MULT + OFFSET;
    let mut code = String::new();
    while v > 0 {
        code.push(char::from(DIGITS[(v % BASE) as usize]));
        v /= BASE;
    }
    code
}

/// Decode a public code back into its id.
///
/// Returns `None` when the code contains characters outside [`ALPHABET`], is
/// empty, or does not land on a value `encode` could have produced.
pub fn decode(code: &str) -> Option<u64> {
    let code = code.to_lowercase();

    let digits: Vec<u128> = code.chars().filter_map(digit_value).collect();
    if digits.len() != code.chars().count() || digits.is_empty() {
        return None;
    }

    let mut v: u128 = 0;
    for digit in digits.iter().rev() {
        v = v.checked_mul(BASE)?.checked_add(*digit)?;
    }

    let shifted = v.checked_sub(OFFSET)?;
    if shifted % MULT != 0 {
        return None;
    }
    u64::try_from(shifted / MULT).ok()
}

/// Sanitize an externally supplied code before decoding it.
///
/// Trims surrounding whitespace, keeps ASCII letters and digits only, and
/// truncates to `max_len` characters.
pub fn clean(s: &str, max_len: usize) -> String {
    s.trim()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(max_len)
        .collect()
}

fn digit_value(c: char) -> Option<u128> {
    let byte = u8::try_from(c).ok()?;
    DIGITS.iter().position(|&d| d == byte).map(|i| i as u128)
}
