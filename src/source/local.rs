use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::FileSource;
use crate::error::IoError;
use crate::io::LocalFileReader;

/// Serves files below a root directory.
///
/// Request paths are always relative to the root. Absolute paths and paths
/// with `..` components are reported as not found, so nothing outside the
/// root can be opened.
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    root: PathBuf,
}

impl LocalFileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a request path against the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, IoError> {
        let relative = Path::new(path);
        let mut resolved = self.root.clone();
        let mut has_file = false;

        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    has_file = true;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(IoError::NotFound(path.to_string()));
                }
            }
        }

        if !has_file {
            return Err(IoError::NotFound(path.to_string()));
        }

        Ok(resolved)
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    type Reader = LocalFileReader;

    async fn open(&self, path: &str) -> Result<Self::Reader, IoError> {
        let resolved = self.resolve(path)?;
        LocalFileReader::open(&resolved)
            .await
            .map_err(|err| match err {
                // Report the request path, not the resolved one
                IoError::NotFound(_) => IoError::NotFound(path.to_string()),
                other => other,
            })
    }
}
