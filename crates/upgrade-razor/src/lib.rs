//! Line-mapped text replacement for Razor templates.
//!
//! Generated C# carries `#line` directives pointing back at the `.cshtml`
//! source. This crate cuts generated documents into [`MappedSubText`]s,
//! pairs original and updated sub-texts (even when a code fix deleted some
//! of them), and writes the resulting edits back into the template.

pub mod apply;
pub mod correlate;
pub mod diff;
pub mod error;
pub mod mapping;
pub mod minimize;
pub mod replacement;

pub use apply::{apply_to_files, apply_to_text, group_by_file};
pub use correlate::{MAX_ARRANGEMENTS, correlate, edit_distance};
pub use diff::MappedTextDiff;
pub use error::{Error, Result};
pub use mapping::{MappedSubText, scan};
pub use minimize::{minimize, minimized_ranges, narrow, tokenize, trim_shared};
pub use replacement::TextReplacement;
