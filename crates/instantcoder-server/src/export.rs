//! Project archive export
//!
//! Zips a project directory for download, leaving out dependencies, build
//! output, version control and secrets.

use std::fs::File;
use std::io::{self, Cursor, Seek, Write};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// File name offered to the browser
pub const ARCHIVE_NAME: &str = "instantcoder-project.zip";

/// Always excluded. A single name matches that component at any depth,
/// a multi-component entry matches relative to the project root.
pub const DEFAULT_EXCLUSIONS: &[&str] = &[
    "node_modules",
    ".next",
    ".git",
    "prisma/migrations",
];

/// Prefix of environment files (`.env`, `.env.local`, ...)
const ENV_FILE_PREFIX: &str = ".env";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Project root {0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to walk project: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Failed to write archive: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Builds zip archives of a project directory
#[derive(Debug, Clone)]
pub struct ProjectExporter {
    root: PathBuf,
    exclusions: Vec<PathBuf>,
}

impl ProjectExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclusions: DEFAULT_EXCLUSIONS.iter().map(PathBuf::from).collect(),
        }
    }

    /// Add exclusions on top of the defaults
    pub fn with_exclusions<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclusions.extend(
            extra
                .into_iter()
                .map(|e| PathBuf::from(e.as_ref().trim_matches('/')))
                .filter(|e| !e.as_os_str().is_empty()),
        );
        self
    }

    /// Whether `relative` (a path inside the root) is left out
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let is_env_file = relative
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(ENV_FILE_PREFIX));
        if is_env_file {
            return true;
        }

        self.exclusions.iter().any(|exclusion| {
            if exclusion.components().count() == 1 {
                relative
                    .components()
                    .any(|component| component.as_os_str() == exclusion.as_os_str())
            } else {
                relative.starts_with(exclusion)
            }
        })
    }

    /// Write the archive to `writer`, returning the number of files stored
    pub fn write_archive<W: Write + Seek>(&self, writer: W) -> Result<usize, ExportError> {
        if !self.root.is_dir() {
            return Err(ExportError::NotADirectory(self.root.clone()));
        }

        let mut zip = ZipWriter::new(writer);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.root)
                    .map(|relative| !self.is_excluded(relative))
                    .unwrap_or(false)
            });

        let mut files = 0;
        for entry in walker {
            let entry = entry?;
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let Some(name) = archive_name(relative) else {
                continue;
            };

            let file_type = entry.file_type();
            if file_type.is_dir() {
                zip.add_directory(name, options)?;
            } else if file_type.is_file() {
                zip.start_file(name, options)?;
                let mut source = File::open(entry.path())?;
                io::copy(&mut source, &mut zip)?;
                files += 1;
            } else {
                log::debug!("[export] Skipping {:?}: not a regular file", entry.path());
            }
        }

        zip.finish()?;
        Ok(files)
    }

    /// Build the whole archive in memory
    pub fn archive_bytes(&self) -> Result<Vec<u8>, ExportError> {
        let mut cursor = Cursor::new(Vec::new());
        let files = self.write_archive(&mut cursor)?;
        let bytes = cursor.into_inner();
        log::info!(
            "[export] Archived {} files from {:?} ({} bytes)",
            files,
            self.root,
            bytes.len()
        );
        Ok(bytes)
    }
}

/// Zip entry name: components joined with `/`, regardless of platform
fn archive_name(relative: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            _ => return None,
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}
