//! The Artifact Collector: named, sequence-numbered captures under a fixed
//! output root.
//!
//! Artifacts are diagnostic, not assertions: a capture failure is reported
//! and recorded but never fails the owning flow.

use crate::driver::SessionDriver;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Writes captures as `<sequence>_<name>.<ext>` so repeated runs produce
/// identical, chronologically sortable filenames.
pub struct ArtifactCollector {
    root: PathBuf,
    sequence: u32,
    written: Vec<PathBuf>,
}

impl ArtifactCollector {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sequence: 0,
            written: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Screenshot the session's page. Returns the path on success, `None` on
    /// a reported-but-absorbed failure.
    pub async fn capture_page(
        &mut self,
        driver: &mut dyn SessionDriver,
        name: &str,
    ) -> Option<PathBuf> {
        match driver.screenshot().await {
            Ok(bytes) => self.write(name, "png", &bytes),
            Err(e) => {
                warn!(name, error = %e, "screenshot capture failed");
                None
            }
        }
    }

    /// Write a text artifact, e.g. a condition snapshot at failure time.
    pub fn capture_text(&mut self, name: &str, contents: &str) -> Option<PathBuf> {
        self.write(name, "txt", contents.as_bytes())
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn into_written(self) -> Vec<PathBuf> {
        self.written
    }

    fn write(&mut self, name: &str, ext: &str, bytes: &[u8]) -> Option<PathBuf> {
        self.sequence += 1;
        let file = format!("{:03}_{}.{}", self.sequence, sanitize(name), ext);
        let path = self.root.join(file);

        if let Err(e) = fs::create_dir_all(&self.root) {
            warn!(root = %self.root.display(), error = %e, "artifact directory unavailable");
            return None;
        }
        match fs::write(&path, bytes) {
            Ok(()) => {
                info!(path = %path.display(), bytes = bytes.len(), "artifact written");
                self.written.push(path.clone());
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "artifact write failed");
                None
            }
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
