//! Cropping session: the state machine tying intake, controller, rasterizer
//! and artifact manager together.
//!
//! # States
//!
//! ```text
//! Empty --load--> Loaded --open--> Cropping --commit--> Ready
//!                   ^                 |  ^                |
//!                   +-----cancel------+  +-----recrop-----+
//! any --reset--> Empty
//! ```
//!
//! # Async work
//!
//! Decode and encode are split into `begin_*` (validate and capture inputs)
//! and `finish_*` (apply the result). Every pending operation carries the
//! [`Generation`] it was issued under. Reset and new drops bump the
//! generation, and a completion from an older generation is discarded
//! instead of applied. The caller decides where the work in between runs:
//! inline ([`CropSession::load_blocking`]), on a blocking thread pool
//! (see `runtime`), or in a browser worker.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::artifact::{Artifact, ArtifactManager, ArtifactPayload, PreviewBackend, ResourceError};
use crate::config::{ConfigError, CropShape, CropperConfig};
use crate::controller::{CropController, DisplayRect, ViewState};
use crate::intake::{self, ImageFile, IntakeError, MimeType, SourceImage};
use crate::raster::{self, EncodedImage, RasterError, RasterOptions};
use crate::region::CropRegion;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No source image.
    Empty,
    /// Source decoded, cropper closed.
    Loaded,
    /// Cropper open.
    Cropping,
    /// Artifact committed, cropper closed.
    Ready,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Empty => "empty",
            SessionState::Loaded => "loaded",
            SessionState::Cropping => "cropping",
            SessionState::Ready => "ready",
        })
    }
}

/// Errors surfaced by session commands.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Intake(#[from] IntakeError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// The command does not apply in the current state.
    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    /// A crop is already being encoded.
    #[error("A crop is already being processed")]
    Busy,

    /// The session task has shut down.
    #[error("Session has shut down")]
    Closed,
}

/// User-visible notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Notification {
    FileTooLarge { limit_mb: f64 },
    UnsupportedFile { mime_type: String },
    CorruptFile { reason: String },
    /// Raster failures are reported generically; the session stays in
    /// `Cropping` so the user can retry.
    ProcessingFailed,
    CropApplied { file_name: String },
}

impl Notification {
    /// Notification for a rejected file. An empty drop is silent.
    pub fn from_intake(err: &IntakeError) -> Option<Self> {
        match err {
            IntakeError::NoFile => None,
            IntakeError::TooLarge { limit_mb, .. } => Some(Notification::FileTooLarge {
                limit_mb: *limit_mb,
            }),
            IntakeError::UnsupportedType(mime_type) => Some(Notification::UnsupportedFile {
                mime_type: mime_type.clone(),
            }),
            IntakeError::DecodeError(reason) => Some(Notification::CorruptFile {
                reason: reason.clone(),
            }),
        }
    }

    /// Short text for a toast.
    pub fn message(&self) -> String {
        match self {
            Notification::FileTooLarge { limit_mb } => {
                format!("File too large: file size exceeds {}MB limit", limit_mb)
            }
            Notification::UnsupportedFile { mime_type } => {
                format!("Unsupported file type: {}", mime_type)
            }
            Notification::CorruptFile { .. } => {
                "Could not read image: file is corrupted".to_string()
            }
            Notification::ProcessingFailed => "Failed to crop image".to_string(),
            Notification::CropApplied { file_name } => {
                format!("Cropped image ready: {}", file_name)
            }
        }
    }
}

/// Receives state changes and output from a session.
///
/// All methods default to no-ops.
pub trait SessionObserver {
    fn state_changed(&mut self, _state: SessionState) {}
    fn region_changed(&mut self, _region: CropRegion) {}
    fn notify(&mut self, _notification: &Notification) {}
    /// Called exactly once per successful commit.
    fn artifact_ready(&mut self, _payload: &ArtifactPayload) {}
}

impl SessionObserver for () {}

/// Monotonic session generation. Bumped on reset and on every new drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Generation(u64);

impl Generation {
    fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

/// A value produced under a specific generation.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    pub generation: Generation,
    pub value: T,
}

impl<T> Tagged<T> {
    pub fn new(generation: Generation, value: T) -> Self {
        Self { generation, value }
    }
}

/// Whether a completion was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// Issued under an older generation and dropped.
    Stale,
}

/// A decoded file, ready to become the session source.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFile {
    pub name: String,
    pub source: SourceImage,
}

pub type DecodeOutcome = Tagged<Result<DecodedFile, IntakeError>>;
pub type RasterOutcome = Tagged<Result<EncodedImage, RasterError>>;

/// A validated file waiting to be decoded.
#[derive(Debug)]
pub struct PendingDecode {
    generation: Generation,
    file: ImageFile,
    mime: MimeType,
    config: CropperConfig,
}

impl PendingDecode {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Decode the file. Blocking.
    pub fn run(self) -> DecodeOutcome {
        let result = intake::decode(&self.file, self.mime, &self.config).map(|source| DecodedFile {
            name: self.file.name,
            source,
        });
        Tagged::new(self.generation, result)
    }
}

/// A crop waiting to be rasterized.
#[derive(Debug)]
pub struct PendingRaster {
    generation: Generation,
    source: Arc<SourceImage>,
    region: CropRegion,
    options: RasterOptions,
}

impl PendingRaster {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn region(&self) -> CropRegion {
        self.region
    }

    /// Rasterize and encode the crop. Blocking.
    pub fn run(self) -> RasterOutcome {
        let result = raster::rasterize(&self.source, self.region, self.options);
        Tagged::new(self.generation, result)
    }
}

/// Point-in-time view of a session for hosts and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub generation: Generation,
    pub file_name: Option<String>,
    pub source_size: Option<(u32, u32)>,
    pub view: Option<ViewState>,
    pub region: Option<CropRegion>,
    pub artifact: Option<ArtifactPayload>,
    pub preview_url: Option<String>,
    pub processing: bool,
}

/// A single cropping session.
pub struct CropSession<B: PreviewBackend, O: SessionObserver = ()> {
    config: CropperConfig,
    generation: Generation,
    state: SessionState,
    source: Option<Arc<SourceImage>>,
    file_name: Option<String>,
    controller: Option<CropController>,
    artifacts: ArtifactManager<B>,
    observer: O,
    encoding: bool,
}

impl<B: PreviewBackend> CropSession<B, ()> {
    /// Create a session without an observer.
    pub fn new(config: CropperConfig, backend: B) -> Result<Self, SessionError> {
        Self::with_observer(config, backend, ())
    }
}

impl<B: PreviewBackend, O: SessionObserver> CropSession<B, O> {
    /// Create a session that reports to `observer`.
    pub fn with_observer(
        config: CropperConfig,
        backend: B,
        observer: O,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            config,
            generation: Generation::default(),
            state: SessionState::Empty,
            source: None,
            file_name: None,
            controller: None,
            artifacts: ArtifactManager::new(backend),
            observer,
            encoding: false,
        })
    }

    pub fn config(&self) -> &CropperConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_deref()
    }

    pub fn view(&self) -> Option<&ViewState> {
        self.controller.as_ref().map(|c| c.view())
    }

    pub fn current_region(&self) -> Option<CropRegion> {
        self.controller.as_ref().map(|c| c.current_region())
    }

    pub fn crop_box(&self) -> Option<DisplayRect> {
        self.controller.as_ref().map(|c| c.crop_box())
    }

    pub fn artifact(&self) -> Option<&Artifact> {
        self.artifacts.live()
    }

    pub fn backend(&self) -> &B {
        self.artifacts.backend()
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    pub fn observer_mut(&mut self) -> &mut O {
        &mut self.observer
    }

    /// Whether an encode is in flight.
    pub fn is_processing(&self) -> bool {
        self.encoding
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let artifact = self.artifacts.live();
        SessionSnapshot {
            state: self.state,
            generation: self.generation,
            file_name: self.file_name.clone(),
            source_size: self.source.as_ref().map(|s| (s.width, s.height)),
            view: self.view().copied(),
            region: self.current_region(),
            artifact: artifact.map(Artifact::payload),
            preview_url: artifact.map(|a| a.preview.url().to_string()),
            processing: self.encoding,
        }
    }

    // ------------------------------------------------------------------
    // Intake
    // ------------------------------------------------------------------

    /// Validate a drop and start a decode.
    ///
    /// Rejected files leave the session untouched. An accepted file discards
    /// the current source and artifact and starts a new generation, so any
    /// decode or encode still in flight becomes stale.
    pub fn begin_load(&mut self, files: &[ImageFile]) -> Result<PendingDecode, SessionError> {
        let validated = intake::select_file(files)
            .and_then(|file| intake::validate(file, &self.config).map(|mime| (file, mime)));

        let (file, mime) = match validated {
            Ok(accepted) => accepted,
            Err(err) => {
                log::info!("rejected file: {}", err);
                if let Some(notification) = Notification::from_intake(&err) {
                    self.observer.notify(&notification);
                }
                return Err(err.into());
            }
        };

        self.clear();
        log::info!(
            "accepted {} ({}, {} bytes) as generation {}",
            file.name,
            mime,
            file.size(),
            self.generation.0
        );

        Ok(PendingDecode {
            generation: self.generation,
            file: file.clone(),
            mime,
            config: self.config.clone(),
        })
    }

    /// Apply a finished decode.
    pub fn finish_load(&mut self, done: DecodeOutcome) -> Result<Completion, SessionError> {
        if done.generation != self.generation {
            log::debug!(
                "discarding decode from generation {} (current {})",
                done.generation.0,
                self.generation.0
            );
            return Ok(Completion::Stale);
        }

        let decoded = match done.value {
            Ok(decoded) => decoded,
            Err(err) => {
                log::warn!("decode failed: {}", err);
                if let Some(notification) = Notification::from_intake(&err) {
                    self.observer.notify(&notification);
                }
                return Err(err.into());
            }
        };

        let DecodedFile { name, source } = decoded;
        self.controller = Some(CropController::new(source.width, source.height, &self.config));
        self.source = Some(Arc::new(source));
        self.file_name = Some(name);
        self.transition(SessionState::Loaded);

        if self.config.open_cropper_on_load {
            self.open_cropper()?;
        }
        Ok(Completion::Applied)
    }

    /// Validate, decode and apply in one call.
    pub fn load_blocking(&mut self, files: &[ImageFile]) -> Result<Completion, SessionError> {
        let pending = self.begin_load(files)?;
        self.finish_load(pending.run())
    }

    // ------------------------------------------------------------------
    // Cropper lifecycle
    // ------------------------------------------------------------------

    /// Open the cropper over a freshly loaded source.
    pub fn open_cropper(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Loaded, "open the cropper")?;
        self.start_cropping();
        Ok(())
    }

    /// Reopen the cropper over the original source after a commit.
    ///
    /// The committed artifact stays live until the next commit replaces it
    /// or the session resets.
    pub fn recrop(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Ready, "recrop")?;
        self.start_cropping();
        Ok(())
    }

    /// Close the cropper without committing.
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        self.require(SessionState::Cropping, "cancel")?;
        if self.encoding {
            return Err(SessionError::Busy);
        }
        let next = if self.artifacts.live().is_some() {
            SessionState::Ready
        } else {
            SessionState::Loaded
        };
        self.transition(next);
        Ok(())
    }

    /// Discard source, view and artifact. Work in flight becomes stale.
    pub fn reset(&mut self) {
        self.clear();
        log::info!("session reset to generation {}", self.generation.0);
    }

    // ------------------------------------------------------------------
    // Interaction (ignored unless the cropper is open)
    // ------------------------------------------------------------------

    pub fn set_pan(&mut self, pan_x: f64, pan_y: f64) {
        self.interact(|c| c.set_pan(pan_x, pan_y));
    }

    pub fn drag(&mut self, dx: f64, dy: f64) {
        self.interact(|c| c.drag(dx, dy));
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.interact(|c| c.set_zoom(zoom));
    }

    pub fn step_zoom(&mut self, steps: i32) {
        self.interact(|c| c.step_zoom(steps));
    }

    pub fn set_aspect_ratio(&mut self, ratio: f64) {
        self.interact(|c| c.set_aspect_ratio(ratio));
    }

    pub fn set_shape(&mut self, shape: CropShape) {
        self.interact(|c| c.set_shape(shape));
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// Capture the current region for rasterization.
    pub fn begin_commit(&mut self) -> Result<PendingRaster, SessionError> {
        self.require(SessionState::Cropping, "commit")?;
        if self.encoding {
            return Err(SessionError::Busy);
        }

        let (Some(source), Some(controller)) = (&self.source, &self.controller) else {
            return Err(SessionError::InvalidState {
                action: "commit",
                state: self.state,
            });
        };

        let pending = PendingRaster {
            generation: self.generation,
            source: Arc::clone(source),
            region: controller.current_region(),
            options: RasterOptions::from_config(&self.config),
        };
        self.encoding = true;
        log::debug!("committing region {:?}", pending.region);
        Ok(pending)
    }

    /// Apply a finished raster operation.
    ///
    /// On failure the session stays in `Cropping` so the user can retry.
    pub fn finish_commit(&mut self, done: RasterOutcome) -> Result<Completion, SessionError> {
        if done.generation != self.generation {
            log::debug!(
                "discarding encode from generation {} (current {})",
                done.generation.0,
                self.generation.0
            );
            return Ok(Completion::Stale);
        }
        self.encoding = false;

        let committed = done
            .value
            .map_err(SessionError::from)
            .and_then(|encoded| {
                let name = self.file_name.as_deref().unwrap_or_default();
                self.artifacts.commit(encoded, name).map_err(SessionError::from)
            });

        match committed {
            Ok(artifact) => {
                log::info!(
                    "committed {} ({}x{}, {} bytes)",
                    artifact.file_name,
                    artifact.width,
                    artifact.height,
                    artifact.bytes.len()
                );
                self.transition(SessionState::Ready);
                self.observer.notify(&Notification::CropApplied {
                    file_name: artifact.file_name.clone(),
                });
                self.observer.artifact_ready(&artifact.payload());
                Ok(Completion::Applied)
            }
            Err(err) => {
                log::warn!("crop failed: {}", err);
                self.observer.notify(&Notification::ProcessingFailed);
                Err(err)
            }
        }
    }

    /// Rasterize and commit in one call.
    pub fn commit_blocking(&mut self) -> Result<Completion, SessionError> {
        let pending = self.begin_commit()?;
        self.finish_commit(pending.run())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require(&self, expected: SessionState, action: &'static str) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    fn start_cropping(&mut self) {
        if let Some(controller) = self.controller.as_mut() {
            controller.reset_view();
        }
        self.transition(SessionState::Cropping);
        self.emit_region();
    }

    fn interact(&mut self, apply: impl FnOnce(&mut CropController)) {
        if self.state != SessionState::Cropping {
            log::debug!("ignoring interaction while {}", self.state);
            return;
        }
        if let Some(controller) = self.controller.as_mut() {
            apply(controller);
        }
        self.emit_region();
    }

    fn emit_region(&mut self) {
        if let Some(region) = self.current_region() {
            self.observer.region_changed(region);
        }
    }

    fn clear(&mut self) {
        self.generation = self.generation.next();
        self.artifacts.reset();
        self.source = None;
        self.file_name = None;
        self.controller = None;
        self.encoding = false;
        self.transition(SessionState::Empty);
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            log::debug!("session {} -> {}", self.state, next);
            self.state = next;
            self.observer.state_changed(next);
        }
    }
}


// ============================================================================
// Property-Based Tests
// ============================================================================
