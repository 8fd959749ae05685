//! All-or-nothing output.
//!
//! Single-file formats are written to a temporary file in the target
//! directory and renamed over the target once complete. Multi-file formats
//! are assembled in a hidden staging directory beside the target and moved
//! into place one component at a time, with the primary component last so
//! the layer only becomes readable once every other component is present.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::{NamedTempFile, TempDir};

use crate::error::{Result, SeglabelError};

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn write_failed(path: &Path, reason: impl std::fmt::Display) -> SeglabelError {
    SeglabelError::WriteFailed { path: path.to_path_buf(), reason: reason.to_string() }
}

/// Write a single file atomically.
///
/// The temporary file is removed if `write` fails or the rename does.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> Result<()>,
{
    let dir = parent_dir(path);
    let temp = NamedTempFile::new_in(&dir).map_err(|e| write_failed(path, e))?;

    {
        let mut writer = BufWriter::new(temp.as_file());
        write(&mut writer)?;
        writer.flush().map_err(|e| write_failed(path, e))?;
    }
    temp.as_file().sync_all().map_err(|e| write_failed(path, e))?;

    temp.persist(path).map_err(|e| write_failed(path, e.error))?;
    Ok(())
}

/// Staging area for a multi-file layer such as a Shapefile
pub struct StagedLayer {
    dir: TempDir,
    target: PathBuf,
    file_name: String,
}

impl StagedLayer {
    /// Create a staging directory beside `target`
    pub fn new(target: &Path) -> Result<Self> {
        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| write_failed(target, "output path has no file name"))?
            .to_string();

        let dir = tempfile::Builder::new()
            .prefix(".seglabel-")
            .tempdir_in(parent_dir(target))
            .map_err(|e| write_failed(target, e))?;

        Ok(Self { dir, target: target.to_path_buf(), file_name })
    }

    /// Path of the primary component inside the staging directory
    pub fn staged_path(&self) -> PathBuf {
        self.dir.path().join(&self.file_name)
    }

    /// Move the staged components into place, `primary_extension` last.
    ///
    /// A component in `extensions` that was never staged is removed from
    /// the target, so a previous layer's `.prj` cannot outlive it. The
    /// staging directory is removed when this value is dropped.
    pub fn commit(self, extensions: &[&str], primary_extension: &str) -> Result<()> {
        let staged = self.staged_path();

        let ordered = extensions
            .iter()
            .filter(|ext| !ext.eq_ignore_ascii_case(primary_extension))
            .chain(std::iter::once(&primary_extension));

        for ext in ordered {
            let from = staged.with_extension(ext);
            let to = self.target.with_extension(ext);
            if from.exists() {
                fs::rename(&from, &to).map_err(|e| write_failed(&to, e))?;
                continue;
            }
            match fs::remove_file(&to) {
                Ok(()) => tracing::debug!("Removed stale component {}", to.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(write_failed(&to, e)),
            }
        }

        Ok(())
    }
}
