//! Generated image files
//!
//! An [`Artifact`] names the output file for one request and removes it when
//! dropped. Removal is best-effort: a failure is logged at `warn` and never
//! reaches the client, whose response has already been produced by then.

use crate::ImageFormat;
use log::{debug, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Output file exclusively owned by one `/generate` request
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    /// Reserve a unique path `image-{millis}-{seq}.{ext}` under `dir`.
    ///
    /// `dir` is created recursively if missing. The file itself is not created.
    pub fn reserve(dir: &Path, format: ImageFormat) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);

        let path = dir.join(format!("image-{}-{}.{}", millis, seq, format.extension()));
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        remove_best_effort(&self.path);
    }
}

/// Delete `path`, logging instead of failing. A file that was never written is
/// not an error.
pub fn remove_best_effort(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Deleted {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Error deleting file {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_creates_directory_and_unique_names() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("public").join("generated");

        let a = Artifact::reserve(&dir, ImageFormat::Png).unwrap();
        let b = Artifact::reserve(&dir, ImageFormat::Png).unwrap();

        assert!(dir.is_dir());
        assert_ne!(a.path(), b.path());
        assert!(!a.path().exists());

        let name = a.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("image-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn extension_follows_format() {
        let root = tempfile::tempdir().unwrap();
        let a = Artifact::reserve(root.path(), ImageFormat::Jpeg).unwrap();
        assert_eq!(a.path().extension().and_then(|e| e.to_str()), Some("jpeg"));
    }

    #[test]
    fn drop_removes_written_file() {
        let root = tempfile::tempdir().unwrap();
        let a = Artifact::reserve(root.path(), ImageFormat::Png).unwrap();
        std::fs::write(a.path(), b"img").unwrap();
        let path = a.path().to_path_buf();

        drop(a);
        assert!(!path.exists());
    }

    #[test]
    fn drop_without_file_is_quiet() {
        let root = tempfile::tempdir().unwrap();
        let a = Artifact::reserve(root.path(), ImageFormat::Webp).unwrap();
        drop(a);
    }
}
