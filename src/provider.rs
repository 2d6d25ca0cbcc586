use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::File;
use tracing::debug;

use crate::{KnownSize, ResourceHandle, TransferError};

/// A resource opened for one request, with the content type to serve it as.
#[derive(Debug)]
pub struct OpenedResource<R> {
    pub handle: R,
    pub content_type: String,
}

/// Maps an identifier to an open [`ResourceHandle`].
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    type Resource: ResourceHandle + 'static;

    /// Open `id`. A missing resource must be [`TransferError::NotFound`].
    async fn open(&self, id: &str) -> Result<OpenedResource<Self::Resource>, TransferError>;
}

/// Serves regular files below a root directory, typed by extension.
#[derive(Debug, Clone)]
pub struct FileProvider {
    root: PathBuf,
}

impl FileProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileProvider { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Only plain relative paths are looked up, nothing can escape the root.
    fn resolve(&self, id: &str) -> Option<PathBuf> {
        let relative = Path::new(id);
        let plain = relative.components().all(|c| matches!(c, Component::Normal(_)));
        if id.is_empty() || !plain {
            return None;
        }
        Some(self.root.join(relative))
    }
}

#[async_trait]
impl ResourceProvider for FileProvider {
    type Resource = KnownSize<File>;

    async fn open(&self, id: &str) -> Result<OpenedResource<KnownSize<File>>, TransferError> {
        let path = self.resolve(id).ok_or_else(|| TransferError::not_found(id))?;
        let open_error = |source: io::Error| match source.kind() {
            io::ErrorKind::NotFound => TransferError::not_found(id),
            _ => TransferError::Open { id: id.to_string(), source },
        };

        let file = File::open(&path).await.map_err(open_error)?;
        let metadata = file.metadata().await.map_err(open_error)?;
        if !metadata.is_file() {
            return Err(TransferError::not_found(id));
        }

        let content_type = mime_guess::from_path(&path).first_or_octet_stream().to_string();
        debug!(path = %path.display(), byte_size = metadata.len(), %content_type, "opened resource");
        Ok(OpenedResource {
            handle: KnownSize::sized(file, metadata.len()),
            content_type,
        })
    }
}
