//! Local object-store layout and the upload path resolver built on it.

use std::path::{Path, PathBuf};

use super::ObjectPathResolver;

/// Content-addressed object directory laid out as
/// `<root>/<oid[0..2]>/<oid[2..4]>/<oid>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ObjectPathResolver for LocalObjectStore {
    fn object_path(&self, oid: &str) -> PathBuf {
        match (oid.get(0..2), oid.get(2..4)) {
            (Some(a), Some(b)) if oid.len() > 4 => self.root.join(a).join(b).join(oid),
            _ => self.root.join(oid),
        }
    }
}
