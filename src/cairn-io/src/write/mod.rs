use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use log::debug;
use serde::Serialize;
use tempfile::NamedTempFile;

/// Serialise `value` as pretty-printed JSON at `path`, atomically.
///
/// The document is written into a temporary file within the destination
/// directory and renamed into place, so an interrupted run never leaves a
/// partial file behind.
///
/// # Errors
/// on serialisation failure, or any I/O failure while writing or
/// persisting the temporary file.
pub fn atomic_write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());

    let mut temp = match parent {
        Some(dir) => NamedTempFile::new_in(dir),
        None      => NamedTempFile::new(),
    }
    .with_context(|| format!("While staging a temporary file next to {}", path.display()))?;

    serde_json::to_writer_pretty(&mut temp, value)
        .with_context(|| format!("While serializing {}", path.display()))?;
    temp.write_all(b"\n")?;
    temp.flush()?;

    temp.persist(path)
        .with_context(|| format!("While persisting {}", path.display()))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Write plain text at `path` with the same temp-then-rename discipline
/// as [`atomic_write_json`].
pub fn atomic_write_text(path: &Path, content: &str) -> Result<()> {
    let parent = path.parent().filter(|dir| !dir.as_os_str().is_empty());

    let mut temp = match parent {
        Some(dir) => NamedTempFile::new_in(dir),
        None      => NamedTempFile::new(),
    }
    .with_context(|| format!("While staging a temporary file next to {}", path.display()))?;

    temp.write_all(content.as_bytes())?;
    temp.flush()?;
    temp.persist(path)
        .with_context(|| format!("While persisting {}", path.display()))?;
    debug!("Wrote {}", path.display());
    Ok(())
}
