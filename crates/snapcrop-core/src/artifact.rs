//! Artifact manager: encoded crops and their preview handles.
//!
//! A preview handle is a finite host resource (an object URL in a browser).
//! The manager keeps at most one live handle: committing a new artifact
//! releases the previous handle before acquiring the next, and dropping the
//! manager releases whatever is still live.
//!
//! Release failures are logged and swallowed. They never fail the session.

use std::collections::HashMap;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::raster::EncodedImage;

/// Mime type of every artifact.
pub const ARTIFACT_MIME_TYPE: &str = "image/jpeg";

/// Errors from the preview backend.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResourceError {
    #[error("Failed to create preview: {0}")]
    AcquireFailed(String),

    #[error("Failed to release preview {url}: {reason}")]
    ReleaseFailed { url: String, reason: String },
}

/// Opaque reference to a live preview resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PreviewHandle {
    id: u64,
    url: String,
}

impl PreviewHandle {
    pub fn new(id: u64, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// URL the host can display the preview from.
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Host resource that backs preview handles.
pub trait PreviewBackend {
    /// Create a preview for encoded bytes.
    fn acquire(&mut self, bytes: &Bytes, mime_type: &str) -> Result<PreviewHandle, ResourceError>;

    /// Free a preview. Unknown handles should be a no-op.
    fn release(&mut self, handle: &PreviewHandle) -> Result<(), ResourceError>;
}

/// In-memory preview backend with one slot per live handle.
#[derive(Debug, Default)]
pub struct PreviewArena {
    slots: HashMap<u64, Bytes>,
    next_id: u64,
}

impl PreviewArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of handles acquired and not yet released.
    pub fn live_count(&self) -> usize {
        self.slots.len()
    }

    /// Bytes behind a live handle.
    pub fn get(&self, handle: &PreviewHandle) -> Option<&Bytes> {
        self.slots.get(&handle.id)
    }
}

impl PreviewBackend for PreviewArena {
    fn acquire(&mut self, bytes: &Bytes, _mime_type: &str) -> Result<PreviewHandle, ResourceError> {
        self.next_id += 1;
        let id = self.next_id;
        self.slots.insert(id, bytes.clone());
        Ok(PreviewHandle::new(id, format!("preview://{}", id)))
    }

    fn release(&mut self, handle: &PreviewHandle) -> Result<(), ResourceError> {
        self.slots.remove(&handle.id);
        Ok(())
    }
}

/// The output handed to the host on every successful commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactPayload {
    #[serde(skip)]
    pub bytes: Bytes,
    pub mime_type: &'static str,
    pub name: String,
}

/// An encoded crop with its preview.
///
/// `file_name` is not the dropped file's name unchanged: it keeps the stem
/// and always ends in `.jpg` (see [`output_file_name`]), so a cropped
/// `photo.png` is delivered as `photo.jpg`. Hosts that wrapped the bytes in a
/// `File` under the dropped name should switch to this name.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Bytes,
    pub mime_type: &'static str,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub preview: PreviewHandle,
}

impl Artifact {
    pub fn payload(&self) -> ArtifactPayload {
        ArtifactPayload {
            bytes: self.bytes.clone(),
            mime_type: self.mime_type,
            name: self.file_name.clone(),
        }
    }
}

/// Owns the single live artifact and its preview handle.
pub struct ArtifactManager<B: PreviewBackend> {
    backend: B,
    live: Option<Artifact>,
}

impl<B: PreviewBackend> ArtifactManager<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            live: None,
        }
    }

    /// Wrap encoded bytes into a named artifact with a fresh preview.
    ///
    /// The previous artifact's handle is released before the new one is
    /// acquired.
    pub fn commit(
        &mut self,
        encoded: EncodedImage,
        file_name: &str,
    ) -> Result<Artifact, ResourceError> {
        self.release_live();

        let preview = self.backend.acquire(&encoded.bytes, ARTIFACT_MIME_TYPE)?;
        log::debug!("acquired preview {}", preview.url());

        let artifact = Artifact {
            bytes: encoded.bytes,
            mime_type: ARTIFACT_MIME_TYPE,
            file_name: output_file_name(file_name),
            width: encoded.width,
            height: encoded.height,
            preview,
        };
        self.live = Some(artifact.clone());
        Ok(artifact)
    }

    /// Release an artifact's preview. Releasing an artifact that is not live
    /// (already released or replaced) does nothing.
    pub fn release(&mut self, artifact: &Artifact) {
        let is_live = self
            .live
            .as_ref()
            .is_some_and(|live| live.preview == artifact.preview);
        if is_live {
            self.release_live();
        }
    }

    /// Release any live preview and forget the artifact.
    pub fn reset(&mut self) {
        self.release_live();
    }

    pub fn live(&self) -> Option<&Artifact> {
        self.live.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn release_live(&mut self) {
        let Some(artifact) = self.live.take() else {
            return;
        };
        match self.backend.release(&artifact.preview) {
            Ok(()) => log::debug!("released preview {}", artifact.preview.url()),
            Err(err) => log::warn!("{}", err),
        }
    }
}

impl<B: PreviewBackend> Drop for ArtifactManager<B> {
    fn drop(&mut self) {
        self.release_live();
    }
}

/// Name of the committed file: the original stem with a `.jpg` extension.
pub fn output_file_name(original: &str) -> String {
    let base = original.rsplit(['/', '\\']).next().unwrap_or_default();
    let stem = match base.rfind('.') {
        Some(dot) => &base[..dot],
        None => base,
    };

    if stem.trim().is_empty() {
        "cropped.jpg".to_string()
    } else {
        format!("{}.jpg", stem)
    }
}
