// Image stager
// Validates image files by magic number and decodes them through the backend
// into a queue consumed by the next turn's evaluation.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::backend::Bitmap;

/// Image validation failures, reported before any state mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("vision projector not loaded - provide one to use images")]
    NoVisionBackend,

    #[error("image file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("unsupported image format (expected JPG or PNG): {0}")]
    UnsupportedFormat(PathBuf),
}

/// Read the first four bytes of a file and check for JPEG or PNG magic.
fn has_image_magic(path: &Path) -> io::Result<bool> {
    let mut header = [0u8; 4];
    File::open(path)?.read_exact(&mut header)?;

    // JPEG: FF D8 FF
    if header[0] == 0xFF && header[1] == 0xD8 && header[2] == 0xFF {
        return Ok(true);
    }
    // PNG: 89 50 4E 47
    if header == [0x89, 0x50, 0x4E, 0x47] {
        return Ok(true);
    }
    Ok(false)
}

/// Classify a failed header read: a short read means a truncated header,
/// so the format is unsupported; any other open/read failure means the file
/// is not readable at all.
fn read_failure(path: &Path, err: &io::Error) -> ValidationError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ValidationError::UnsupportedFormat(path.to_path_buf())
    } else {
        ValidationError::FileNotFound(path.to_path_buf())
    }
}

/// Validate image paths without mutating anything.
///
/// Checks, in order: a vision backend is available, each file exists and is
/// readable, and each file starts with JPEG or PNG magic bytes.
pub fn validate(vision_available: bool, paths: &[PathBuf]) -> Result<(), ValidationError> {
    if !vision_available {
        return Err(ValidationError::NoVisionBackend);
    }

    for path in paths {
        if !path.is_file() {
            return Err(ValidationError::FileNotFound(path.clone()));
        }
        match has_image_magic(path) {
            Ok(true) => {}
            Ok(false) => return Err(ValidationError::UnsupportedFormat(path.clone())),
            Err(e) => return Err(read_failure(path, &e)),
        }
    }
    Ok(())
}

/// A decoded bitmap together with its source path, staged for the next turn.
#[derive(Debug)]
pub struct StagedImage {
    pub path: PathBuf,
    pub bitmap: Bitmap,
}

/// Queue of staged images, owned by the session until the next evaluation
/// drains it. Consumed-once: images apply to the next turn only.
#[derive(Debug, Default)]
pub struct StagedImages {
    queue: Vec<StagedImage>,
}

impl StagedImages {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: PathBuf, bitmap: Bitmap) {
        self.queue.push(StagedImage { path, bitmap });
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Source paths of the staged images, in staging order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.queue.iter().map(|img| img.path.clone()).collect()
    }

    /// Take every staged image, leaving the queue empty.
    pub fn drain(&mut self) -> Vec<StagedImage> {
        if !self.queue.is_empty() {
            warn!(count = self.queue.len(), "draining staged image queue");
        }
        std::mem::take(&mut self.queue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn validate_requires_vision_backend() {
        let err = validate(false, &[]).unwrap_err();
        assert_eq!(err, ValidationError::NoVisionBackend);
    }

    #[test]
    fn validate_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.png");
        let err = validate(true, &[missing.clone()]).unwrap_err();
        assert_eq!(err, ValidationError::FileNotFound(missing));
    }

    #[test]
    fn validate_accepts_png_and_jpeg_magic() {
        let dir = TempDir::new().unwrap();
        let png = write_file(&dir, "circle.png", &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]);
        let jpg = write_file(&dir, "photo.jpg", &[0xFF, 0xD8, 0xFF, 0xE0, 0x00]);

        assert!(validate(true, &[png, jpg]).is_ok());
    }

    #[test]
    fn validate_rejects_wrong_magic() {
        let dir = TempDir::new().unwrap();
        let bogus = write_file(&dir, "notes.txt", b"hello world");
        let err = validate(true, &[bogus.clone()]).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedFormat(bogus));
    }

    #[test]
    fn validate_rejects_truncated_header() {
        let dir = TempDir::new().unwrap();
        let short = write_file(&dir, "tiny.png", &[0x89, 0x50]);
        let err = validate(true, &[short.clone()]).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedFormat(short));
    }

    #[test]
    fn unreadable_file_reports_not_found() {
        // Only a short read is a format problem; a file that cannot be
        // opened or read at all is reported as missing.
        let path = PathBuf::from("locked.png");

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            read_failure(&path, &denied),
            ValidationError::FileNotFound(path.clone())
        );

        let short = io::Error::new(io::ErrorKind::UnexpectedEof, "short read");
        assert_eq!(
            read_failure(&path, &short),
            ValidationError::UnsupportedFormat(path)
        );
    }

    #[test]
    fn drain_empties_the_queue() {
        let mut staged = StagedImages::new();
        staged.push(
            PathBuf::from("a.png"),
            Bitmap {
                width: 1,
                height: 1,
                data: vec![0, 0, 0],
            },
        );
        staged.push(
            PathBuf::from("b.png"),
            Bitmap {
                width: 1,
                height: 1,
                data: vec![1, 1, 1],
            },
        );

        assert_eq!(staged.len(), 2);
        assert_eq!(
            staged.paths(),
            vec![PathBuf::from("a.png"), PathBuf::from("b.png")]
        );

        let drained = staged.drain();
        assert_eq!(drained.len(), 2);
        assert!(staged.is_empty());
        assert!(staged.drain().is_empty());
    }
}
