//! File access rooted at an extension's location.
//!
//! Every extension owns exactly one [`FileProvider`]. Paths passed to a
//! provider are relative, `/`-separated, and never escape the root.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use zip::ZipArchive;

use crate::error::{Error, Result};

/// Read-only access to the files shipped with an extension.
pub trait FileProvider: Send + Sync + fmt::Debug {
    /// Read a file. Returns `Ok(None)` when the file isn't present.
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Whether a file exists.
    fn exists(&self, path: &str) -> bool {
        matches!(self.read(path), Ok(Some(_)))
    }

    /// Physical root directory, if the provider is backed by one.
    fn root(&self) -> Option<&Path> {
        None
    }

    /// Read a file as UTF-8 text.
    fn read_to_string(&self, path: &str) -> Result<Option<String>> {
        match self.read(path)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))),
            None => Ok(None),
        }
    }
}

fn normalize_entry(entry: &str) -> Cow<'_, str> {
    let entry = entry.trim_start_matches(['/', '\\']);
    if entry.contains('\\') {
        Cow::Owned(entry.replace('\\', "/"))
    } else {
        Cow::Borrowed(entry)
    }
}

/// Files in a directory on disk.
#[derive(Debug, Clone)]
pub struct DirectoryFileProvider {
    root: PathBuf,
}

impl DirectoryFileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let entry = normalize_entry(path);
        let relative = Path::new(entry.as_ref());
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            tracing::debug!(path, root = ?self.root, "Rejecting path outside extension root");
            return None;
        }
        Some(self.root.join(relative))
    }
}

impl FileProvider for DirectoryFileProvider {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(candidate) = self.resolve(path) else {
            return Ok(None);
        };
        if !candidate.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(&candidate)?))
    }

    fn root(&self) -> Option<&Path> {
        Some(&self.root)
    }
}

/// Files inside a zip archive. The archive handle stays open until the
/// provider is dropped.
pub struct ZipFileProvider {
    path: PathBuf,
    archive: Mutex<ZipArchive<File>>,
}

impl ZipFileProvider {
    /// Open an archive for reading.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path)?;
        let archive = ZipArchive::new(file).map_err(|source| Error::Archive {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            archive: Mutex::new(archive),
        })
    }

    /// Location of the archive on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for ZipFileProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZipFileProvider")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl FileProvider for ZipFileProvider {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let entry = normalize_entry(path);
        let mut archive = self.archive.lock().unwrap_or_else(PoisonError::into_inner);
        match archive.by_name(entry.as_ref()) {
            Ok(mut file) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                Ok(Some(buf))
            }
            Err(zip::result::ZipError::FileNotFound) => Ok(None),
            Err(source) => Err(Error::Archive {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Files held in memory, keyed by relative path.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileProvider {
    files: BTreeMap<String, Vec<u8>>,
}

impl InMemoryFileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file, replacing any existing entry with the same path.
    pub fn with_file(mut self, path: &str, contents: impl Into<Vec<u8>>) -> Self {
        self.files
            .insert(normalize_entry(path).into_owned(), contents.into());
        self
    }
}

impl FileProvider for InMemoryFileProvider {
    fn read(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(normalize_entry(path).as_ref()).cloned())
    }
}
