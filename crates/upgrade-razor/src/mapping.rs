//! Scanning generated code for `#line` directives.
//!
//! A directive of the form `#line 12 "Views/Home/Index.cshtml"` starts a
//! mapped region on the line after it. The region ends just before the line
//! break that precedes the next directive. `#line hidden`, `#line default`
//! and any other directive without a line/file pair close the open region
//! without opening a new one.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// A whole directive line, including its line break when there is one.
static DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#[ \t]*line\b(?P<args>[^\r\n]*)(?:\r?\n)?").unwrap());

static LINE_AND_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\s+(?P<line>\d+)\s+"(?P<file>[^"]*)"\s*$"#).unwrap());

/// A span of generated text attributed to a location in a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedSubText {
    /// Template the text came from
    pub file_path: String,
    /// 1-based line in the template where the text starts; 0 for text
    /// preceding the first directive
    pub line: usize,
    /// The generated text itself
    pub text: String,
    /// Byte range of `text` in the generated document
    pub span: Range<usize>,
}

impl MappedSubText {
    pub fn new(file_path: impl Into<String>, line: usize, text: impl Into<String>, span: Range<usize>) -> Self {
        Self {
            file_path: file_path.into(),
            line,
            text: text.into(),
            span,
        }
    }

    /// `{path}@{line}`
    pub fn location_key(&self) -> String {
        format!("{}@{}", self.file_path, self.line)
    }

    /// Number of template lines the text covers. Never less than one.
    pub fn line_count(&self) -> usize {
        self.text.lines().count().max(1)
    }
}

struct Open {
    file_path: String,
    line: usize,
    start: usize,
}

/// Cut `text` into mapped sub-texts, in document order.
///
/// With a `default_path`, everything before the first directive is emitted as
/// a sub-text of that file at line 0, even when it is empty.
pub fn scan(text: &str, default_path: Option<&str>) -> Vec<MappedSubText> {
    let mut mapped = Vec::new();
    let mut open = default_path.map(|path| Open {
        file_path: path.to_string(),
        line: 0,
        start: 0,
    });

    for captures in DIRECTIVE.captures_iter(text) {
        let Some(directive) = captures.get(0) else {
            continue;
        };
        if let Some(region) = open.take() {
            let end = without_preceding_newline(text, directive.start()).max(region.start);
            mapped.push(close(text, region, end));
        }

        let args = captures.name("args").map_or("", |m| m.as_str());
        open = parse_line_and_file(args).map(|(line, file_path)| Open {
            file_path,
            line,
            start: directive.end(),
        });
        if open.is_none() {
            tracing::trace!(directive = directive.as_str().trim(), "Directive closes mapping");
        }
    }

    if let Some(region) = open {
        mapped.push(close(text, region, text.len()));
    }
    mapped
}

fn close(text: &str, region: Open, end: usize) -> MappedSubText {
    MappedSubText::new(region.file_path, region.line, &text[region.start..end], region.start..end)
}

fn parse_line_and_file(args: &str) -> Option<(usize, String)> {
    let captures = LINE_AND_FILE.captures(args)?;
    let line = captures.name("line")?.as_str().parse().ok()?;
    let file = captures.name("file")?.as_str().to_string();
    Some((line, file))
}

/// Step back over the `\n` or `\r\n` that ends the line before `offset`.
fn without_preceding_newline(text: &str, offset: usize) -> usize {
    let before = &text[..offset];
    if before.ends_with("\r\n") {
        offset - 2
    } else if before.ends_with('\n') {
        offset - 1
    } else {
        offset
    }
}
