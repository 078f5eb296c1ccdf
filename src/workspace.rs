//! Per-language workspace directories and collision-free file naming.

use crate::error::{PadError, Result};
use crate::lang::LanguageId;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Issued basenames are numbered across the whole process so no two units
/// ever share a name, regardless of which manager issued them.
static BASENAME_SEQ: AtomicU64 = AtomicU64::new(1);

/// Owns the output directory layout: one subdirectory per language under a
/// base path, holding generated sources and build artifacts.
///
/// The manager never deletes anything; cleanup of workspace files belongs
/// to the hosting application.
#[derive(Clone, Debug)]
pub struct WorkspaceManager {
    base_dir: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager rooted at `base_dir`. No directories are created
    /// until [`ensure_directory`](Self::ensure_directory) is called.
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the output base path
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory holding a language's sources and artifacts.
    pub fn language_dir(&self, language: LanguageId) -> PathBuf {
        self.base_dir.join(language.dir_name())
    }

    /// Create the language's directory if absent. Idempotent: an existing
    /// directory is not an error, only genuine filesystem failures are.
    pub fn ensure_directory(&self, language: LanguageId) -> Result<PathBuf> {
        let dir = self.language_dir(language);
        fs::create_dir_all(&dir).map_err(|e| {
            log::warn!("failed to create workspace directory {}: {}", dir.display(), e);
            PadError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to create workspace directory {}: {}", dir.display(), e),
            ))
        })?;
        Ok(dir)
    }

    /// A basename no previous call in this process has returned.
    ///
    /// Combines a monotonic counter (uniqueness within the process) with a
    /// random stem (collision avoidance against residue from earlier runs).
    /// Names double as Java class names, so they must stay valid
    /// identifiers: a leading letter, then letters, digits and underscores.
    pub fn new_unique_basename(&self) -> String {
        let seq = BASENAME_SEQ.fetch_add(1, Ordering::Relaxed);
        let stem = Uuid::new_v4().simple().to_string();
        format!("u{}_{}", seq, &stem[..8])
    }

    /// Path the source file for a unit is written to.
    pub fn source_path(&self, language: LanguageId, basename: &str, extension: &str) -> PathBuf {
        self.language_dir(language)
            .join(format!("{}.{}", basename, extension))
    }

    /// Path of a compiled native binary, with the platform executable
    /// suffix applied (`.exe` on Windows, nothing elsewhere).
    pub fn native_artifact_path(&self, language: LanguageId, basename: &str) -> PathBuf {
        self.language_dir(language)
            .join(format!("{}{}", basename, std::env::consts::EXE_SUFFIX))
    }

    /// Path of the class file produced for a Java unit.
    pub fn class_artifact_path(&self, language: LanguageId, basename: &str) -> PathBuf {
        self.language_dir(language)
            .join(format!("{}.class", basename))
    }
}
