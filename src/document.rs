//! Page shell construction and the per-render temporary document
//!
//! The caller's HTML is wrapped in a complete document that loads a
//! utility-CSS script in `<head>`. The markup is inserted verbatim; callers are
//! trusted and nothing is escaped.

use crate::{Error, Result};
use log::{debug, warn};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;

/// Wrap `body_html` in a full document that pulls in `script_url`.
pub fn page_shell(body_html: &str, script_url: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <script src="{script_url}"></script>
  </head>
  <body>
    {body_html}
  </body>
</html>
"#
    )
}

/// A temporary HTML file owned by exactly one render call.
///
/// Each document gets its own unique path, so concurrent renders never share
/// or clobber each other's input. The file is removed when the value is
/// dropped, on success and failure alike; a failed removal is logged and
/// otherwise ignored.
#[derive(Debug)]
pub struct TempDocument {
    path: Option<TempPath>,
}

impl TempDocument {
    /// Write the page shell for `body_html` to a fresh file.
    ///
    /// The file is created in `dir` when given, otherwise in the system
    /// temporary directory.
    pub fn create(dir: Option<&Path>, body_html: &str, script_url: &str) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("htmlshot-").suffix(".html");

        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        file.write_all(page_shell(body_html, script_url).as_bytes())?;
        file.flush()?;

        let path = file.into_temp_path();
        debug!("Wrote temporary document {}", path.display());
        Ok(Self { path: Some(path) })
    }

    /// Location of the document on disk
    pub fn path(&self) -> &Path {
        // `path` is only taken in `drop`
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// `file://` URL the browser navigates to
    pub fn file_url(&self) -> Result<String> {
        let absolute: PathBuf = if self.path().is_absolute() {
            self.path().to_path_buf()
        } else {
            std::env::current_dir()?.join(self.path())
        };

        url::Url::from_file_path(&absolute)
            .map(|u| u.to_string())
            .map_err(|_| Error::Other(format!("Cannot build file URL for {}", absolute.display())))
    }
}

impl Drop for TempDocument {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let shown = path.display().to_string();
            if let Err(e) = path.close() {
                warn!("Failed to delete temporary document {}: {}", shown, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_injects_markup_verbatim() {
        let doc = page_shell("<h1 class=\"text-xl\">Hi & bye</h1>", "https://cdn.example/tw.js");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains(r#"<script src="https://cdn.example/tw.js"></script>"#));
        assert!(doc.contains("<h1 class=\"text-xl\">Hi & bye</h1>"));

        let head_end = doc.find("</head>").unwrap();
        let body_start = doc.find("<body>").unwrap();
        let content = doc.find("<h1").unwrap();
        assert!(head_end < body_start && body_start < content);
    }

    #[test]
    fn temp_document_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let doc = TempDocument::create(Some(dir.path()), "<p>x</p>", "s.js").unwrap();
        let path = doc.path().to_path_buf();

        assert!(path.exists());
        assert!(path.starts_with(dir.path()));
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("html"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("<p>x</p>"));

        drop(doc);
        assert!(!path.exists());
    }

    #[test]
    fn concurrent_documents_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = TempDocument::create(Some(dir.path()), "<p>a</p>", "s.js").unwrap();
        let b = TempDocument::create(Some(dir.path()), "<p>b</p>", "s.js").unwrap();
        assert_ne!(a.path(), b.path());

        drop(a);
        assert!(b.path().exists());
        assert!(std::fs::read_to_string(b.path()).unwrap().contains("<p>b</p>"));
    }

    #[test]
    fn file_url_points_at_document() {
        let dir = tempfile::tempdir().unwrap();
        let doc = TempDocument::create(Some(dir.path()), "", "s.js").unwrap();
        let url = doc.file_url().unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with(".html"));
    }

    #[test]
    fn removal_of_already_deleted_file_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let doc = TempDocument::create(Some(dir.path()), "", "s.js").unwrap();
        std::fs::remove_file(doc.path()).unwrap();
        drop(doc);
    }
}
