//! Delivery – hands the finished document to the user.
//!
//! Sharing is preferred when a [`ShareTarget`] is configured and supports
//! file attachments. When it does not, or the share attempt fails, the
//! document is saved locally instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;

use crate::error::{Error, Result};

/// Fallback file stem when a title sanitizes to nothing.
pub const FALLBACK_STEM: &str = "lesson";

/// Build `<sanitized-title>.pdf`.
///
/// Runs of whitespace become a single `_`; letters, digits, `-` and `_`
/// are kept; everything else is dropped.
pub fn sanitize_filename(title: &str) -> String {
    let mut stem = String::with_capacity(title.len());
    let mut pending_space = false;
    for ch in title.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if ch.is_alphanumeric() || ch == '-' || ch == '_' {
            if pending_space && !stem.is_empty() {
                stem.push('_');
            }
            pending_space = false;
            stem.push(ch);
        }
    }
    if stem.is_empty() {
        stem.push_str(FALLBACK_STEM);
    }
    format!("{stem}.pdf")
}

/// A platform share capability.
pub trait ShareTarget {
    fn can_share_files(&self) -> bool;
    fn share(&self, file: &Path, caption: &str) -> Result<()>;
}

/// Shares by running an external program as `<program> <file> <caption>`.
#[derive(Debug, Clone)]
pub struct CommandShare {
    pub program: String,
}

impl ShareTarget for CommandShare {
    fn can_share_files(&self) -> bool {
        !self.program.trim().is_empty()
    }

    fn share(&self, file: &Path, caption: &str) -> Result<()> {
        let status = Command::new(&self.program)
            .arg(file)
            .arg(caption)
            .status()
            .map_err(|e| Error::Delivery(format!("cannot run '{}': {e}", self.program)))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Delivery(format!(
                "'{}' exited with {status}",
                self.program
            )))
        }
    }
}

/// How the document reached the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", content = "path", rename_all = "lowercase")]
pub enum Delivered {
    Shared(PathBuf),
    Saved(PathBuf),
}

impl Delivered {
    pub fn path(&self) -> &Path {
        match self {
            Delivered::Shared(p) | Delivered::Saved(p) => p,
        }
    }
}

/// A document written next to its final path as `<name>.part`. Committing
/// renames it into place; dropping it uncommitted removes it.
struct StagedFile {
    part: PathBuf,
    committed: bool,
}

impl StagedFile {
    fn write(final_path: &Path, bytes: &[u8]) -> Result<Self> {
        let mut part = final_path.as_os_str().to_owned();
        part.push(".part");
        let part = PathBuf::from(part);
        let staged = Self {
            part,
            committed: false,
        };
        fs::write(&staged.part, bytes)?;
        Ok(staged)
    }

    fn commit(mut self, final_path: &Path) -> Result<()> {
        fs::rename(&self.part, final_path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed && self.part.exists() {
            if let Err(e) = fs::remove_file(&self.part) {
                log::warn!("could not discard '{}': {e}", self.part.display());
            }
        }
    }
}

pub struct Delivery {
    pub out_dir: PathBuf,
    pub share: Option<Box<dyn ShareTarget>>,
}

impl Delivery {
    /// Save-only delivery into `out_dir`.
    pub fn local(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
            share: None,
        }
    }

    pub fn with_share(mut self, share: Box<dyn ShareTarget>) -> Self {
        self.share = Some(share);
        self
    }

    /// Deliver `bytes` as `filename`. A partially written file never
    /// survives a failed write.
    pub fn deliver(&self, bytes: &[u8], filename: &str, caption: &str) -> Result<Delivered> {
        if !self.out_dir.as_os_str().is_empty() {
            fs::create_dir_all(&self.out_dir)?;
        }
        let path = self.out_dir.join(filename);
        StagedFile::write(&path, bytes)?.commit(&path)?;

        if let Some(share) = self.share.as_ref().filter(|s| s.can_share_files()) {
            match share.share(&path, caption) {
                Ok(()) => {
                    log::info!("shared '{}'", path.display());
                    return Ok(Delivered::Shared(path));
                }
                Err(e) => log::warn!("sharing failed, saving locally instead: {e}"),
            }
        }

        log::info!("saved '{}'", path.display());
        Ok(Delivered::Saved(path))
    }
}
