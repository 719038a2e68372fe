use crate::mapping::MappedSubText;

/// New content for one mapped sub-text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextReplacement {
    pub original: MappedSubText,
    pub updated: String,
}

impl TextReplacement {
    pub fn new(original: MappedSubText, updated: impl Into<String>) -> Self {
        Self {
            original,
            updated: updated.into(),
        }
    }

    /// Template the replacement applies to
    pub fn file_path(&self) -> &str {
        &self.original.file_path
    }

    pub fn line(&self) -> usize {
        self.original.line
    }

    /// True when applying would change nothing.
    pub fn is_noop(&self) -> bool {
        self.original.text == self.updated
    }
}
