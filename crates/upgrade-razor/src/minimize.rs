//! Narrowing an edit to the tokens that actually changed.
//!
//! Text is split into identifier runs (letters, digits, `_`) and single
//! characters, so trimming never cuts an identifier in half.

use std::ops::Range;

/// Split `text` into identifier runs and single non-identifier characters.
pub fn tokenize(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut run_start = None;

    for (i, c) in text.char_indices() {
        if is_identifier_char(c) {
            run_start.get_or_insert(i);
            continue;
        }
        if let Some(start) = run_start.take() {
            tokens.push(&text[start..i]);
        }
        tokens.push(&text[i..i + c.len_utf8()]);
    }
    if let Some(start) = run_start {
        tokens.push(&text[start..]);
    }
    tokens
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Strip the tokens `original` and `updated` share at both ends.
///
/// When that would leave nothing of a non-empty `original`, one shared token
/// is kept so the result can still be located in the template. An identifier
/// is preferred over punctuation or whitespace.
pub fn minimize<'a>(original: &'a str, updated: &'a str) -> (&'a str, &'a str) {
    let (from, to) = minimized_ranges(original, updated);
    (&original[from], &updated[to])
}

/// Byte ranges of the [`minimize`] result within `original` and `updated`.
pub fn minimized_ranges(original: &str, updated: &str) -> (Range<usize>, Range<usize>) {
    let a = tokenize(original);
    let b = tokenize(updated);

    let mut prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let limit = a.len().min(b.len()) - prefix;
    let mut suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take(limit)
        .take_while(|(x, y)| x == y)
        .count();

    if !a.is_empty() && prefix + suffix == a.len() {
        let identifier = |token: &str| token.chars().all(is_identifier_char);
        let prefix_token = prefix.checked_sub(1).map(|i| a[i]);
        let suffix_token = (suffix > 0).then(|| a[a.len() - suffix]);
        match (prefix_token, suffix_token) {
            (Some(token), _) if identifier(token) => prefix -= 1,
            (_, Some(token)) if identifier(token) => suffix -= 1,
            (Some(_), _) => prefix -= 1,
            _ => suffix -= 1,
        }
    }

    (
        token_range(original, &a, prefix, suffix),
        token_range(updated, &b, prefix, suffix),
    )
}

fn token_range(text: &str, tokens: &[&str], prefix: usize, suffix: usize) -> Range<usize> {
    let start: usize = tokens[..prefix].iter().map(|t| t.len()).sum();
    let end: usize = text.len() - tokens[tokens.len() - suffix..].iter().map(|t| t.len()).sum::<usize>();
    start..end
}

/// Trim both sides and drop a `;` they both end with.
pub fn trim_shared<'a>(original: &'a str, updated: &'a str) -> (&'a str, &'a str) {
    let original = original.trim();
    let updated = updated.trim();
    match (original.strip_suffix(';'), updated.strip_suffix(';')) {
        (Some(o), Some(u)) => (o, u),
        _ => (original, updated),
    }
}

/// [`trim_shared`], then [`minimize`].
pub fn narrow<'a>(original: &'a str, updated: &'a str) -> (&'a str, &'a str) {
    let (original, updated) = trim_shared(original, updated);
    minimize(original, updated)
}
