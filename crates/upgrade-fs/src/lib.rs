//! Filesystem helpers for Upgrade Assistant
//!
//! Both the extension source store and the template rewriter persist files
//! through [`write_atomic`].

pub mod error;
pub mod io;

pub use error::{Error, Result};
pub use io::write_atomic;
