//! Replacements between two generations of the same generated document

use std::path::{Path, PathBuf};

use crate::apply::{apply_to_files, group_by_file};
use crate::correlate::correlate;
use crate::error::Result;
use crate::mapping::{MappedSubText, scan};
use crate::replacement::TextReplacement;

/// What changed in each template, given the generated code before and after a
/// code fix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappedTextDiff {
    replacements: Vec<TextReplacement>,
}

impl MappedTextDiff {
    /// Scan both documents and correlate their sub-texts file by file.
    ///
    /// `default_path` attributes text before the first `#line` directive to
    /// that template.
    ///
    /// # Panics
    ///
    /// If `updated` maps more sub-texts to a template than `original` does.
    pub fn compute(original: &str, updated: &str, default_path: Option<&str>) -> Self {
        let before = by_file(scan(original, default_path));
        let after = by_file(scan(updated, default_path));

        let mut replacements = Vec::new();
        for (file, originals) in &before {
            let texts: Vec<&str> = after
                .iter()
                .find(|(f, _)| f == file)
                .map(|(_, mapped)| mapped.iter().map(|m| m.text.as_str()).collect())
                .unwrap_or_default();
            replacements.extend(correlate(originals, &texts));
        }
        for (file, mapped) in &after {
            if !before.iter().any(|(f, _)| f == file) {
                let texts: Vec<&str> = mapped.iter().map(|m| m.text.as_str()).collect();
                replacements.extend(correlate(&[], &texts));
            }
        }

        tracing::debug!(replacements = replacements.len(), "Computed mapped text diff");
        Self { replacements }
    }

    pub fn replacements(&self) -> &[TextReplacement] {
        &self.replacements
    }

    pub fn into_replacements(self) -> Vec<TextReplacement> {
        self.replacements
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Templates touched, in first-seen order.
    pub fn files(&self) -> Vec<&str> {
        group_by_file(&self.replacements)
            .into_iter()
            .map(|(file, _)| file)
            .collect()
    }

    /// Write every replacement into its template on disk.
    pub fn apply_to_files(&self, root: Option<&Path>) -> Result<Vec<PathBuf>> {
        apply_to_files(&self.replacements, root)
    }
}

fn by_file(mapped: Vec<MappedSubText>) -> Vec<(String, Vec<MappedSubText>)> {
    let mut groups: Vec<(String, Vec<MappedSubText>)> = Vec::new();
    for sub_text in mapped {
        match groups.iter_mut().find(|(file, _)| *file == sub_text.file_path) {
            Some((_, group)) => group.push(sub_text),
            None => groups.push((sub_text.file_path.clone(), vec![sub_text])),
        }
    }
    groups
}
