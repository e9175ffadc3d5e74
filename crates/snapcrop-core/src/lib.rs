//! Snapcrop Core - interactive image cropping
//!
//! This crate provides the host-independent half of snapcrop: file intake
//! and validation, the pan/zoom crop controller, JPEG rasterization, the
//! preview-handle manager and the session state machine that ties them
//! together. Hosts drive a [`CropSession`] directly, or through the tokio
//! driver in [`runtime`] when the `runtime` feature is enabled.

pub mod artifact;
pub mod config;
pub mod controller;
pub mod intake;
pub mod raster;
pub mod region;
#[cfg(feature = "runtime")]
pub mod runtime;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{
    output_file_name, Artifact, ArtifactManager, ArtifactPayload, PreviewArena, PreviewBackend,
    PreviewHandle, ResourceError, ARTIFACT_MIME_TYPE,
};
pub use config::{ConfigError, CropShape, CropperConfig, DisplayArea, Rgb, ZoomRange};
pub use controller::{CropController, DisplayRect, ViewState};
pub use intake::{ImageFile, IntakeError, MimeType, SourceImage};
pub use raster::{rasterize, EncodedImage, RasterError, RasterOptions};
pub use region::{CropRegion, RegionError};
pub use session::{
    Completion, CropSession, Generation, Notification, SessionError, SessionObserver,
    SessionSnapshot, SessionState,
};
