use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{ChimeraError, Result};

/// Expand an image specifier into an ordered list of existing cube paths.
///
/// A specifier starting with '@' names a newline-delimited list file;
/// anything else is a comma-separated list of paths. Every resolved path
/// must exist before any processing starts.
pub fn expand_image_spec(spec: &str) -> Result<Vec<PathBuf>> {
    let paths: Vec<PathBuf> = if let Some(list_file) = spec.strip_prefix('@') {
        let list_path = PathBuf::from(list_file);
        if !list_path.exists() {
            return Err(ChimeraError::MissingFile(list_path));
        }
        fs::read_to_string(&list_path)?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(PathBuf::from)
            .collect()
    } else {
        spec.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect()
    };

    if paths.is_empty() {
        return Err(ChimeraError::EmptySequence);
    }

    for path in &paths {
        if !path.exists() {
            return Err(ChimeraError::MissingFile(path.clone()));
        }
    }

    debug!(cubes = paths.len(), "Resolved image specifier");
    Ok(paths)
}

/// Working copy of the coordinate file.
///
/// The original file is never mutated; the scratch copy is rewritten after
/// every frame with the centroid the engine just measured, so each frame's
/// measurement starts from the previous frame's position.
pub struct CoordScratch {
    path: PathBuf,
}

impl CoordScratch {
    /// Verify the coordinate file exists and copy it to `<coords>.tmp`.
    pub fn create(coords: &Path) -> Result<Self> {
        if !coords.exists() {
            return Err(ChimeraError::MissingFile(coords.to_path_buf()));
        }

        let mut name = coords.as_os_str().to_os_string();
        name.push(".tmp");
        let path = PathBuf::from(name);
        fs::copy(coords, &path)?;

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the scratch file with a new centroid line.
    pub fn write_centroid(&self, line: &str) -> Result<()> {
        fs::write(&self.path, format!("{}\n", line.trim()))?;
        Ok(())
    }

    /// Delete the scratch file. Called unconditionally at end of run.
    pub fn remove(self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
