//! Aggregation of option sections contributed by several extensions.
//!
//! Three shapes are supported:
//!
//! - [`OptionsAggregator::configure`] merges every extension's section into
//!   one value, member by member. A member is only overwritten when the
//!   incoming value is not empty (`null`, `""`, `[]`), so the last non-empty
//!   contribution wins for each member. This is a shallow merge.
//! - [`OptionsAggregator::collect`] returns one element per contributing
//!   extension.
//! - [`OptionsAggregator::collect_file_scoped`] does the same but pairs each
//!   element with the files of the extension that contributed it, so relative
//!   paths inside the option can be resolved against the right root.
//!
//! Nothing is cached; every call re-reads the manifests.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::file_provider::FileProvider;
use crate::instance::ExtensionInstance;

/// Whether a value counts as "not specified" when merging.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Copy each non-empty member of `source` onto `target`.
///
/// Member names are matched case-insensitively; an existing member keeps its
/// spelling.
pub fn merge_members(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        if is_empty_value(value) {
            continue;
        }
        let existing = target
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .cloned()
            .unwrap_or_else(|| key.clone());
        target.insert(existing, value.clone());
    }
}

/// An option value paired with the files of the extension that supplied it.
pub struct FileScoped<T> {
    pub value: T,
    pub extension: String,
    pub files: Arc<dyn FileProvider>,
}

impl<T: fmt::Debug> fmt::Debug for FileScoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileScoped")
            .field("value", &self.value)
            .field("extension", &self.extension)
            .finish_non_exhaustive()
    }
}

/// Binds option sections across an ordered list of extensions.
#[derive(Debug, Clone, Copy)]
pub struct OptionsAggregator<'a> {
    extensions: &'a [Arc<ExtensionInstance>],
}

impl<'a> OptionsAggregator<'a> {
    pub fn new(extensions: &'a [Arc<ExtensionInstance>]) -> Self {
        Self { extensions }
    }

    /// Merge `section` from every extension, in order, into `target`.
    pub fn configure<T>(&self, section: &str, target: &mut T) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let merge_error = |source| Error::OptionsMerge {
            section: section.to_string(),
            source,
        };

        let mut merged = serde_json::to_value(&*target).map_err(merge_error)?;
        for extension in self.extensions {
            let Some(contribution) = extension.manifest().section(section) else {
                continue;
            };
            match (&mut merged, contribution) {
                (Value::Object(target_map), Value::Object(source_map)) => {
                    merge_members(target_map, source_map);
                }
                (slot, value) if !is_empty_value(value) => {
                    *slot = value.clone();
                }
                _ => {}
            }
            tracing::trace!(section, extension = extension.name(), "Merged options");
        }

        *target = T::deserialize(merged).map_err(merge_error)?;
        Ok(())
    }

    /// One element per extension that has `section`.
    ///
    /// Sections that fail to bind are logged and skipped.
    pub fn collect<T: DeserializeOwned>(&self, section: &str) -> Vec<T> {
        self.bound(section)
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }

    /// Like [`collect`](Self::collect), with each element tagged with its
    /// extension's files.
    pub fn collect_file_scoped<T: DeserializeOwned>(&self, section: &str) -> Vec<FileScoped<T>> {
        self.bound(section)
            .into_iter()
            .map(|(extension, value)| FileScoped {
                value,
                extension: extension.name().to_string(),
                files: Arc::clone(extension.files()),
            })
            .collect()
    }

    fn bound<T: DeserializeOwned>(&self, section: &str) -> Vec<(&'a ExtensionInstance, T)> {
        self.extensions
            .iter()
            .filter_map(|extension| match extension.get_options::<T>(section) {
                Ok(Some(value)) => Some((extension.as_ref(), value)),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping extension options");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::file_provider::InMemoryFileProvider;
    use crate::instance::ExtensionBuilder;
    use crate::manifest::ExtensionManifest;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Sample {
        a: Option<i64>,
        b: Option<String>,
        #[serde(default)]
        tags: Vec<String>,
    }

    fn extension(name: &str, manifest: Value) -> Arc<ExtensionInstance> {
        let manifest = ExtensionManifest::from_value(name, manifest).unwrap();
        let files = InMemoryFileProvider::new().with_file("map.json", name.as_bytes().to_vec());
        Arc::new(
            ExtensionBuilder::new(name, manifest, Arc::new(files))
                .name(name)
                .build()
                .unwrap(),
        )
    }

    #[rstest]
    #[case(json!(null), true)]
    #[case(json!(""), true)]
    #[case(json!([]), true)]
    #[case(json!(0), false)]
    #[case(json!(false), false)]
    #[case(json!({}), false)]
    #[case(json!(" "), false)]
    fn test_is_empty_value(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(is_empty_value(&value), expected);
    }

    #[test]
    fn test_configure_last_non_empty_wins() {
        let extensions = vec![
            extension("first", json!({ "Sample": { "A": 1, "B": null } })),
            extension("second", json!({ "Sample": { "A": 2, "B": "x" } })),
        ];
        let mut target = Sample::default();
        OptionsAggregator::new(&extensions)
            .configure("Sample", &mut target)
            .unwrap();
        assert_eq!(
            target,
            Sample {
                a: Some(2),
                b: Some("x".to_string()),
                tags: vec![],
            }
        );
    }

    #[test]
    fn test_configure_empty_values_do_not_clobber() {
        let extensions = vec![
            extension("first", json!({ "Sample": { "A": 1, "B": "kept", "Tags": ["t"] } })),
            extension("second", json!({ "Sample": { "A": null, "B": "", "Tags": [] } })),
            extension("third", json!({ "Other": { "A": 9 } })),
        ];
        let mut target = Sample::default();
        OptionsAggregator::new(&extensions)
            .configure("sample", &mut target)
            .unwrap();
        assert_eq!(
            target,
            Sample {
                a: Some(1),
                b: Some("kept".to_string()),
                tags: vec!["t".to_string()],
            }
        );
    }

    #[test]
    fn test_configure_is_shallow() {
        let extensions = vec![
            extension("first", json!({ "Nested": { "Map": { "x": 1 } } })),
            extension("second", json!({ "Nested": { "Map": { "y": 2 } } })),
        ];
        let mut target = json!({});
        OptionsAggregator::new(&extensions)
            .configure("Nested", &mut target)
            .unwrap();
        assert_eq!(target, json!({ "Map": { "y": 2 } }));
    }

    #[test]
    fn test_configure_matches_members_case_insensitively() {
        let extensions = vec![extension("first", json!({ "Sample": { "a": 5 } }))];
        let mut target = Sample {
            a: Some(1),
            ..Sample::default()
        };
        OptionsAggregator::new(&extensions)
            .configure("Sample", &mut target)
            .unwrap();
        assert_eq!(target.a, Some(5));
    }

    #[test]
    fn test_configure_scalar_section() {
        let extensions = vec![
            extension("first", json!({ "Retries": 3 })),
            extension("second", json!({ "Retries": null })),
        ];
        let mut retries = 0u32;
        OptionsAggregator::new(&extensions)
            .configure("Retries", &mut retries)
            .unwrap();
        assert_eq!(retries, 3);
    }

    #[test]
    fn test_collect_one_element_per_extension() {
        let extensions = vec![
            extension("first", json!({ "Sample": { "A": 1 } })),
            extension("second", json!({})),
            extension("third", json!({ "Sample": { "A": "not a number" } })),
            extension("fourth", json!({ "Sample": { "B": "y" } })),
        ];
        let collected: Vec<Sample> = OptionsAggregator::new(&extensions).collect("Sample");
        assert_eq!(
            collected,
            vec![
                Sample {
                    a: Some(1),
                    ..Sample::default()
                },
                Sample {
                    b: Some("y".to_string()),
                    ..Sample::default()
                },
            ]
        );
    }

    #[test]
    fn test_collect_file_scoped_keeps_extension_files() {
        let extensions = vec![
            extension("first", json!({ "Sample": { "A": 1 } })),
            extension("second", json!({ "Sample": { "A": 2 } })),
        ];
        let scoped: Vec<FileScoped<Sample>> =
            OptionsAggregator::new(&extensions).collect_file_scoped("Sample");

        assert_eq!(scoped.len(), 2);
        assert_eq!(scoped[1].extension, "second");
        assert_eq!(scoped[1].value.a, Some(2));
        assert_eq!(
            scoped[1].files.read_to_string("map.json").unwrap().as_deref(),
            Some("second")
        );
    }
}
