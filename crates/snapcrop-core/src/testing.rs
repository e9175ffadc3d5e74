//! Test fixtures shared across modules.

use std::collections::HashSet;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use image::{ImageFormat, Rgba, RgbaImage};

use crate::artifact::{ArtifactPayload, PreviewBackend, PreviewHandle, ResourceError};
use crate::intake::ImageFile;
use crate::region::CropRegion;
use crate::session::{Notification, SessionObserver, SessionState};

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    })
}

/// A valid PNG file of the given size.
pub(crate) fn png_file(name: &str, width: u32, height: u32) -> ImageFile {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    ImageFile::new(name, "image/png", out.into_inner())
}

/// A valid JPEG file, zero-padded to at least `size` bytes.
pub(crate) fn jpeg_file(name: &str, width: u32, height: u32, size: usize) -> ImageFile {
    let rgb = image::DynamicImage::ImageRgba8(gradient(width, height)).into_rgb8();
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    let mut bytes = out.into_inner();
    if bytes.len() < size {
        bytes.resize(size, 0);
    }
    ImageFile::new(name, "image/jpeg", bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PreviewEvent {
    Acquired(u64),
    Released(u64),
}

#[derive(Debug, Default)]
struct Recorder {
    next_id: u64,
    live: HashSet<u64>,
    events: Vec<PreviewEvent>,
    fail_acquires: bool,
    fail_releases: bool,
}

/// Preview backend that records every acquire and release.
///
/// Clones share state so tests can inspect a backend owned by a session.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingPreviews {
    inner: Arc<Mutex<Recorder>>,
}

impl RecordingPreviews {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn events(&self) -> Vec<PreviewEvent> {
        self.inner.lock().unwrap().events.clone()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.inner.lock().unwrap().live.len()
    }

    pub(crate) fn release_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| matches!(e, PreviewEvent::Released(_)))
            .count()
    }

    pub(crate) fn fail_acquires(&self, fail: bool) {
        self.inner.lock().unwrap().fail_acquires = fail;
    }

    pub(crate) fn fail_releases(&self, fail: bool) {
        self.inner.lock().unwrap().fail_releases = fail;
    }
}

impl PreviewBackend for RecordingPreviews {
    fn acquire(
        &mut self,
        _bytes: &Bytes,
        _mime_type: &str,
    ) -> Result<PreviewHandle, ResourceError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_acquires {
            return Err(ResourceError::AcquireFailed("backend refused".to_string()));
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.live.insert(id);
        inner.events.push(PreviewEvent::Acquired(id));
        Ok(PreviewHandle::new(id, format!("blob:test/{}", id)))
    }

    fn release(&mut self, handle: &PreviewHandle) -> Result<(), ResourceError> {
        let mut inner = self.inner.lock().unwrap();
        inner.live.remove(&handle.id());
        inner.events.push(PreviewEvent::Released(handle.id()));
        if inner.fail_releases {
            return Err(ResourceError::ReleaseFailed {
                url: handle.url().to_string(),
                reason: "backend refused".to_string(),
            });
        }
        Ok(())
    }
}

/// Observer that keeps everything it is told.
#[derive(Debug, Default)]
pub(crate) struct RecordingObserver {
    pub states: Vec<SessionState>,
    pub regions: Vec<CropRegion>,
    pub notifications: Vec<Notification>,
    pub payloads: Vec<ArtifactPayload>,
}

impl SessionObserver for RecordingObserver {
    fn state_changed(&mut self, state: SessionState) {
        self.states.push(state);
    }

    fn region_changed(&mut self, region: CropRegion) {
        self.regions.push(region);
    }

    fn notify(&mut self, notification: &Notification) {
        self.notifications.push(notification.clone());
    }

    fn artifact_ready(&mut self, payload: &ArtifactPayload) {
        self.payloads.push(payload.clone());
    }
}
