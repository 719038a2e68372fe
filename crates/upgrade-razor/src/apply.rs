//! Writing replacements back into Razor templates.
//!
//! Replacements for one template are applied bottom-up, so edits never shift
//! the lines of edits still pending. Each one is confined to the lines its
//! original sub-text maps to:
//!
//! - empty original: the new code is inserted, as `@using` lines when it is
//!   nothing but `using` declarations and as an `@{ }` block otherwise;
//! - empty update: the original is removed along with any `@(expr)` or
//!   `@expr` transition around it. A generated `Write(expr)` call is looked
//!   up by its argument;
//! - otherwise the narrowed original is replaced by the narrowed update. The
//!   change is located through the longest run of surrounding original
//!   tokens that still appears in the template.
//!
//! Matches never start or end inside an identifier. A replacement whose lines
//! no longer exist in the template is skipped.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use upgrade_fs::write_atomic;

use crate::error::{Error, Result};
use crate::minimize::{is_identifier_char, minimized_ranges, tokenize, trim_shared};
use crate::replacement::TextReplacement;

static USING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s*using\s+[^;{}()]+;)+\s*$").unwrap());

static USING_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"using\s+(?P<target>[^;]+?)\s*;").unwrap());

static WRITE_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^Write(?:Literal)?\s*\((?P<inner>.*)\)$").unwrap());

/// Group replacements by template, in first-seen order. Each group is sorted
/// by descending line; replacements on the same line keep their order.
pub fn group_by_file(replacements: &[TextReplacement]) -> Vec<(&str, Vec<&TextReplacement>)> {
    let mut groups: Vec<(&str, Vec<&TextReplacement>)> = Vec::new();
    for replacement in replacements {
        match groups.iter_mut().find(|(path, _)| *path == replacement.file_path()) {
            Some((_, group)) => group.push(replacement),
            None => groups.push((replacement.file_path(), vec![replacement])),
        }
    }
    for (_, group) in &mut groups {
        group.sort_by(|a, b| b.line().cmp(&a.line()));
    }
    groups
}

/// Apply `replacements` to one template's text.
pub fn apply_to_text(text: &str, replacements: &[&TextReplacement]) -> String {
    let mut ordered = replacements.to_vec();
    ordered.sort_by(|a, b| b.line().cmp(&a.line()));

    let mut buffer = text.to_string();
    for replacement in ordered {
        if replacement.is_noop() || is_blank(replacement) {
            continue;
        }
        if !apply_one(&mut buffer, replacement) {
            tracing::debug!(
                location = %replacement.original.location_key(),
                "Replacement not applied"
            );
        }
    }
    buffer
}

/// Apply replacements to the templates on disk.
///
/// Relative template paths are resolved against `root`. Returns the files
/// that changed.
pub fn apply_to_files(replacements: &[TextReplacement], root: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut changed = Vec::new();
    for (file, group) in group_by_file(replacements) {
        let path = match root {
            Some(root) if Path::new(file).is_relative() => root.join(file),
            _ => PathBuf::from(file),
        };
        let original = fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let updated = apply_to_text(&original, &group);
        if updated != original {
            write_atomic(&path, updated.as_bytes())?;
            tracing::info!(path = %path.display(), replacements = group.len(), "Updated template");
            changed.push(path);
        }
    }
    Ok(changed)
}

fn is_blank(replacement: &TextReplacement) -> bool {
    replacement.original.text.trim().is_empty() && replacement.updated.trim().is_empty()
}

fn apply_one(buffer: &mut String, replacement: &TextReplacement) -> bool {
    let Some(window) = line_window(buffer, replacement.line(), replacement.original.line_count()) else {
        return false;
    };

    let original = replacement.original.text.trim();
    let updated = replacement.updated.trim();
    if original.is_empty() {
        let newline = newline_style(buffer);
        buffer.insert_str(window.start, &format_insertion(updated, newline));
        return true;
    }
    if updated.is_empty() {
        return remove_expression(buffer, window, original);
    }

    let (original, updated) = trim_shared(original, updated);
    let (from, to) = minimized_ranges(original, updated);
    replace_in_context(buffer, window, original, from, &updated[to])
}

/// Byte range of `count` lines starting at 1-based `line`, line breaks
/// included. Line 0 is treated as line 1.
fn line_window(text: &str, line: usize, count: usize) -> Option<Range<usize>> {
    let starts: Vec<usize> = std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect();
    let first = line.saturating_sub(1);
    let last = first + count - 1;
    if last >= starts.len() {
        return None;
    }
    let end = starts.get(last + 1).copied().unwrap_or(text.len());
    Some(starts[first]..end)
}

fn newline_style(text: &str) -> &'static str {
    if text.contains("\r\n") { "\r\n" } else { "\n" }
}

fn format_insertion(code: &str, newline: &str) -> String {
    if USING_BLOCK.is_match(code) {
        return USING_DECLARATION
            .captures_iter(code)
            .filter_map(|c| c.name("target"))
            .map(|target| format!("@using {}{newline}", target.as_str()))
            .collect();
    }
    if code.contains('\n') {
        format!("@{{{newline}{code}{newline}}}{newline}")
    } else {
        format!("@{{ {code} }}{newline}")
    }
}

/// Remove `original` from the window, preferring its Razor transition forms.
fn remove_expression(buffer: &mut String, window: Range<usize>, original: &str) -> bool {
    let expression = original.strip_suffix(';').unwrap_or(original).trim_end();
    let argument = WRITE_CALL
        .captures(expression)
        .and_then(|c| c.name("inner"))
        .map(|inner| inner.as_str().trim())
        .filter(|inner| !inner.is_empty());

    let mut candidates = Vec::new();
    for expr in std::iter::once(expression).chain(argument) {
        candidates.push(format!("@({expr})"));
        candidates.push(format!("@{expr}"));
    }
    candidates.push(original.to_string());

    candidates.iter().any(|candidate| {
        match find_bounded(&buffer[window.clone()], candidate) {
            Some(offset) => {
                let start = window.start + offset;
                buffer.replace_range(start..start + candidate.len(), "");
                true
            }
            None => false,
        }
    })
}

/// Replace `context[span]` with `to`, where the template holds it.
///
/// Token runs of `context` that cover `span` are tried longest first, so the
/// edit lands on the mapped expression rather than on the first look-alike.
fn replace_in_context(
    buffer: &mut String,
    window: Range<usize>,
    context: &str,
    span: Range<usize>,
    to: &str,
) -> bool {
    if span.is_empty() {
        return false;
    }
    let mut bounds = vec![0];
    for token in tokenize(context) {
        bounds.push(bounds[bounds.len() - 1] + token.len());
    }
    let (Some(first), Some(last)) = (
        bounds.iter().position(|&b| b == span.start),
        bounds.iter().position(|&b| b == span.end),
    ) else {
        return false;
    };
    let tokens = bounds.len() - 1;

    for width in (last - first..=tokens).rev() {
        for start in first.saturating_sub(width - (last - first))..=first {
            let end = start + width;
            if end > tokens {
                break;
            }
            let needle = &context[bounds[start]..bounds[end]];
            if let Some(offset) = find_bounded(&buffer[window.clone()], needle) {
                let at = window.start + offset + (span.start - bounds[start]);
                buffer.replace_range(at..at + span.len(), to);
                return true;
            }
        }
    }
    false
}

/// First occurrence of `needle` that does not split an identifier.
fn find_bounded(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let starts_word = needle.chars().next().is_some_and(is_identifier_char);
    let ends_word = needle.chars().next_back().is_some_and(is_identifier_char);
    haystack.match_indices(needle).map(|(at, _)| at).find(|&at| {
        let before = haystack[..at].chars().next_back();
        let after = haystack[at + needle.len()..].chars().next();
        !(starts_word && before.is_some_and(is_identifier_char))
            && !(ends_word && after.is_some_and(is_identifier_char))
    })
}
