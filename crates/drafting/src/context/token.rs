//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token. This is an
//! approximation, not a tokenizer; every budget decision downstream is
//! advisory, which is why the assembler truncates twice (per category,
//! then the whole body).

use std::borrow::Cow;

/// Appended whenever content was cut to fit a cap.
pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated to fit the token budget ...]";

/// Characters given up at the cut point so the marker fits inside the cap.
/// Must be at least the marker's length for `truncate` to respect its bound.
const MARKER_RESERVE_CHARS: usize = 100;

const CHARS_PER_TOKEN: usize = 4;

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Cut `text` so that its estimate is at most `max_tokens`.
///
/// Text already within the cap is returned borrowed and untouched.
/// Otherwise the first `max_tokens * 4 - 100` characters are kept and
/// [`TRUNCATION_MARKER`] is appended. When the cap is too small to hold
/// the marker at all, the plain prefix is returned instead.
pub fn truncate(text: &str, max_tokens: usize) -> Cow<'_, str> {
    if estimate_tokens(text) <= max_tokens {
        return Cow::Borrowed(text);
    }

    let max_chars = max_tokens * CHARS_PER_TOKEN;
    let marker_chars = TRUNCATION_MARKER.chars().count();
    if max_chars < marker_chars {
        return Cow::Owned(text.chars().take(max_chars).collect());
    }

    let keep = max_chars.saturating_sub(MARKER_RESERVE_CHARS);
    let cut = char_boundary(text, keep);
    let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
    out.push_str(&text[..cut]);
    out.push_str(TRUNCATION_MARKER);
    Cow::Owned(out)
}

/// Whether `text` was produced by a truncating [`truncate`] call.
pub fn is_truncated(text: &str) -> bool {
    text.ends_with(TRUNCATION_MARKER)
}

/// Byte offset of the `chars`-th character (or the end of the string).
fn char_boundary(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}
