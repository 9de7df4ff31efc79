use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::error::{ClassifyError, DecodeError};
use super::normalizer::{NormalizedTensor, Normalizer, RawImage};

/// Where request payloads live while they are decoded.
#[derive(Debug, Clone, Default)]
pub enum StagingArea {
    #[default]
    Memory,
    /// Each payload becomes a temporary file in this directory, removed
    /// when the request is done with it.
    Disk(PathBuf),
}

/// A payload held for exactly one request. Dropping it releases any file.
#[derive(Debug)]
pub enum StagedImage {
    Memory(RawImage),
    File(NamedTempFile),
}

impl StagingArea {
    pub fn from_dir(dir: Option<PathBuf>) -> Self {
        dir.map(StagingArea::Disk).unwrap_or_default()
    }

    pub fn dir(&self) -> Option<&Path> {
        match self {
            StagingArea::Memory => None,
            StagingArea::Disk(dir) => Some(dir),
        }
    }

    pub fn stage(&self, raw: RawImage) -> Result<StagedImage, ClassifyError> {
        match self {
            StagingArea::Memory => Ok(StagedImage::Memory(raw)),
            StagingArea::Disk(dir) => {
                let mut file = tempfile::Builder::new()
                    .prefix("upload-")
                    .tempfile_in(dir)
                    .map_err(ClassifyError::Staging)?;
                file.write_all(raw.bytes()).map_err(ClassifyError::Staging)?;
                file.flush().map_err(ClassifyError::Staging)?;
                Ok(StagedImage::File(file))
            }
        }
    }
}

impl StagedImage {
    pub fn normalize(&self, normalizer: &Normalizer) -> Result<NormalizedTensor, DecodeError> {
        match self {
            StagedImage::Memory(raw) => normalizer.normalize(raw),
            StagedImage::File(file) => normalizer.normalize_file(file.path()),
        }
    }
}
