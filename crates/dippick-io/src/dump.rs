//! Debug dumps as JSON files.

use std::path::{Path, PathBuf};

use dippick_pipeline::dump::{DebugRaster, DebugSink, DumpStage};
use dippick_pipeline::FloatImage;

use crate::IoError;

/// Writes each dumped raster to `<dir>/<stage>.json`.
///
/// Write failures are logged and otherwise ignored so a full disk never
/// aborts a transform.
#[derive(Debug, Clone)]
pub struct FileDumpSink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl FileDumpSink {
    /// Create the sink, creating `dir` if needed.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Write`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, IoError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| IoError::Write {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            written: Vec::new(),
        })
    }

    /// Path a dump of `stage` is written to.
    #[must_use]
    pub fn path_for(&self, stage: DumpStage) -> PathBuf {
        self.dir.join(format!("{stage}.json"))
    }

    /// Files successfully written so far, in order.
    #[must_use]
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    fn write(&self, path: &Path, raster: &DebugRaster) -> Result<(), IoError> {
        let json = serde_json::to_vec(raster).map_err(|source| IoError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| IoError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl DebugSink for FileDumpSink {
    fn dump(&mut self, stage: DumpStage, raster: &FloatImage) {
        let path = self.path_for(stage);
        match self.write(&path, &DebugRaster::from_image(raster)) {
            Ok(()) => {
                log::debug!("dumped {stage} to {}", path.display());
                self.written.push(path);
            }
            Err(err) => log::warn!("skipping {stage} dump: {err}"),
        }
    }
}

/// Read a dump written by [`FileDumpSink`].
///
/// # Errors
///
/// Returns [`IoError::Read`], [`IoError::Json`], or [`IoError::Dump`]
/// if the raster shape is inconsistent.
pub fn read_dump(path: &Path) -> Result<DebugRaster, IoError> {
    let bytes = std::fs::read(path).map_err(|source| IoError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raster: DebugRaster = serde_json::from_slice(&bytes).map_err(|source| IoError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    raster.validate()?;
    Ok(raster)
}
