use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{io_error, CertResult};

/// File contents written to a temporary sibling of `path`, not yet visible
/// under `path`. Dropping it removes the temporary file.
pub(crate) struct StagedFile<'a> {
    path: &'a Path,
    staged: NamedTempFile,
}

/// Writes `chunks` back to back into a temporary file next to `path` and
/// syncs it.
pub(crate) fn stage<'a>(path: &'a Path, chunks: &[&[u8]]) -> CertResult<StagedFile<'a>> {
    let parent = ensure_parent_exists(path)?;
    let mut staged = NamedTempFile::new_in(parent).map_err(io_error(parent))?;
    for chunk in chunks {
        staged.write_all(chunk).map_err(io_error(path))?;
    }
    staged.as_file().sync_all().map_err(io_error(path))?;
    Ok(StagedFile { path, staged })
}

/// Renames every staged file into place. If a rename fails, files already
/// moved by this call are removed again, so either all of them appear or
/// none do.
pub(crate) fn commit_all(files: Vec<StagedFile<'_>>) -> CertResult<()> {
    let mut committed: Vec<&Path> = Vec::with_capacity(files.len());
    for StagedFile { path, staged } in files {
        if let Err(error) = staged.persist(path) {
            for done in &committed {
                if let Err(cleanup) = fs::remove_file(done) {
                    warn!(path = %done.display(), error = %cleanup, "failed to roll back persisted file");
                }
            }
            return Err(io_error(path)(error.error));
        }
        debug!(path = %path.display(), "persisted file");
        committed.push(path);
    }
    Ok(())
}

/// Replaces `path` with `chunks` without ever exposing a truncated file.
pub(crate) fn write_atomic(path: &Path, chunks: &[&[u8]]) -> CertResult<()> {
    commit_all(vec![stage(path, chunks)?])
}

fn ensure_parent_exists(path: &Path) -> CertResult<&Path> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
            Ok(parent)
        }
        _ => Ok(Path::new(".")),
    }
}
