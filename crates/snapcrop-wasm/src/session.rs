//! Cropping session bindings.
//!
//! `JsCropSession` wraps the core session with object-URL previews. Decode
//! and encode run inline on the calling thread. Notifications are queued and
//! drained by the page with `take_notifications()`.
//!
//! # Example
//!
//! ```typescript
//! import { JsCropSession } from '@snapcrop/wasm';
//!
//! const session = new JsCropSession({ aspectRatio: 16 / 9, maxSizeMB: 10 });
//! session.load(new Uint8Array(await file.arrayBuffer()), file.type, file.name);
//! session.set_zoom(1.5);
//! const artifact = session.commit();
//! img.src = artifact.url;
//! ```

use serde::Serialize;
use snapcrop_core::{
    ArtifactPayload, CropShape, CropSession, CropperConfig, ImageFile, Notification,
    SessionObserver, SessionState,
};
use wasm_bindgen::prelude::*;

use crate::previews::ObjectUrlPreviews;

/// A notification in the shape the page renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Toast {
    pub message: String,
    pub notification: Notification,
}

/// Observer that queues notifications until the page drains them.
#[derive(Debug, Default)]
pub struct NotificationQueue {
    pending: Vec<Toast>,
}

impl NotificationQueue {
    pub fn take(&mut self) -> Vec<Toast> {
        std::mem::take(&mut self.pending)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl SessionObserver for NotificationQueue {
    fn state_changed(&mut self, state: SessionState) {
        log::debug!("state: {}", state);
    }

    fn notify(&mut self, notification: &Notification) {
        self.pending.push(Toast {
            message: notification.message(),
            notification: notification.clone(),
        });
    }

    fn artifact_ready(&mut self, payload: &ArtifactPayload) {
        log::info!("artifact ready: {} ({} bytes)", payload.name, payload.bytes.len());
    }
}

/// Parse a crop shape name ("rect" or "round").
pub fn parse_shape(name: &str) -> Option<CropShape> {
    match name {
        "rect" => Some(CropShape::Rect),
        "round" => Some(CropShape::Round),
        _ => None,
    }
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// A committed crop, ready for display and download.
#[wasm_bindgen]
pub struct JsArtifact {
    bytes: Vec<u8>,
    name: String,
    mime_type: String,
    url: String,
    width: u32,
    height: u32,
}

#[wasm_bindgen]
impl JsArtifact {
    /// File name for downloads, e.g. `photo.jpg`
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.name.clone()
    }

    /// Always `image/jpeg`
    #[wasm_bindgen(getter)]
    pub fn mime_type(&self) -> String {
        self.mime_type.clone()
    }

    /// Object URL of the preview. Revoked by the session on the next commit,
    /// on reset, and when the session is freed.
    #[wasm_bindgen(getter)]
    pub fn url(&self) -> String {
        self.url.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[wasm_bindgen(getter)]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[wasm_bindgen(getter)]
    pub fn byte_length(&self) -> usize {
        self.bytes.len()
    }

    /// Returns the JPEG bytes as a Uint8Array (copied).
    pub fn bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }
}

/// An interactive cropping session.
#[wasm_bindgen]
pub struct JsCropSession {
    inner: CropSession<ObjectUrlPreviews, NotificationQueue>,
}

#[wasm_bindgen]
impl JsCropSession {
    /// Create a session. `config` is a camelCase `CropperConfig` object; any
    /// omitted field takes its default and an unknown key is an error. Pass
    /// `undefined` for all defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<JsCropSession, JsValue> {
        let config: CropperConfig = if config.is_undefined() || config.is_null() {
            CropperConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };

        let inner = CropSession::with_observer(
            config,
            ObjectUrlPreviews::new(),
            NotificationQueue::default(),
        )
        .map_err(js_error)?;
        Ok(JsCropSession { inner })
    }

    /// Validate and decode a dropped file.
    pub fn load(&mut self, bytes: Vec<u8>, mime_type: &str, name: &str) -> Result<(), JsValue> {
        let file = ImageFile::new(name, mime_type, bytes);
        self.inner.load_blocking(&[file]).map(|_| ()).map_err(js_error)
    }

    /// Validate and decode a `data:` URI.
    pub fn load_data_uri(&mut self, name: &str, uri: &str) -> Result<(), JsValue> {
        let file = ImageFile::from_data_uri(name, uri).map_err(js_error)?;
        self.inner.load_blocking(&[file]).map(|_| ()).map_err(js_error)
    }

    /// Open the cropper after a load with `openCropperOnLoad: false`.
    pub fn open_cropper(&mut self) -> Result<(), JsValue> {
        self.inner.open_cropper().map_err(js_error)
    }

    pub fn set_pan(&mut self, pan_x: f64, pan_y: f64) {
        self.inner.set_pan(pan_x, pan_y);
    }

    /// Drag the image by a pointer delta in display pixels.
    pub fn drag(&mut self, dx: f64, dy: f64) {
        self.inner.drag(dx, dy);
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.inner.set_zoom(zoom);
    }

    /// Zoom by whole `zoomStep` increments (wheel notches).
    pub fn step_zoom(&mut self, steps: i32) {
        self.inner.step_zoom(steps);
    }

    pub fn set_aspect_ratio(&mut self, ratio: f64) {
        self.inner.set_aspect_ratio(ratio);
    }

    pub fn set_shape(&mut self, shape: &str) -> Result<(), JsValue> {
        let Some(parsed) = parse_shape(shape) else {
            return Err(js_error(format!("Unknown shape: {}", shape)));
        };
        self.inner.set_shape(parsed);
        Ok(())
    }

    /// Current crop region in source pixels, or `undefined` with no source.
    pub fn region(&self) -> Result<JsValue, JsValue> {
        Ok(serde_wasm_bindgen::to_value(&self.inner.current_region())?)
    }

    /// Crop frame in display pixels, or `undefined` with no source.
    pub fn crop_box(&self) -> Result<JsValue, JsValue> {
        Ok(serde_wasm_bindgen::to_value(&self.inner.crop_box())?)
    }

    /// One of `empty`, `loaded`, `cropping`, `ready`.
    #[wasm_bindgen(getter)]
    pub fn state(&self) -> String {
        self.inner.state().to_string()
    }

    #[wasm_bindgen(getter)]
    pub fn processing(&self) -> bool {
        self.inner.is_processing()
    }

    /// Full session snapshot as a plain object.
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        Ok(serde_wasm_bindgen::to_value(&self.inner.snapshot())?)
    }

    /// The decoded source as a PNG data URI for the cropper background.
    pub fn source_data_uri(&self) -> Result<Option<String>, JsValue> {
        self.inner
            .source()
            .map(|source| source.to_data_uri().map_err(js_error))
            .transpose()
    }

    /// Rasterize the current region and replace the previous artifact.
    pub fn commit(&mut self) -> Result<JsArtifact, JsValue> {
        self.inner.commit_blocking().map_err(js_error)?;

        let artifact = self
            .inner
            .artifact()
            .ok_or_else(|| js_error("No artifact after commit"))?;
        Ok(JsArtifact {
            bytes: artifact.bytes.to_vec(),
            name: artifact.file_name.clone(),
            mime_type: artifact.mime_type.to_string(),
            url: artifact.preview.url().to_string(),
            width: artifact.width,
            height: artifact.height,
        })
    }

    pub fn recrop(&mut self) -> Result<(), JsValue> {
        self.inner.recrop().map_err(js_error)
    }

    pub fn cancel(&mut self) -> Result<(), JsValue> {
        self.inner.cancel().map_err(js_error)
    }

    /// Drop source, view and artifact, revoking the preview URL.
    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// Drain queued notifications as `{ message, notification }` objects.
    pub fn take_notifications(&mut self) -> Result<JsValue, JsValue> {
        let toasts = self.inner.observer_mut().take();
        Ok(serde_wasm_bindgen::to_value(&toasts)?)
    }
}


/// WASM-specific tests that need a browser for object URLs.
#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use std::io::Cursor;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([10, 200, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[wasm_bindgen_test]
    fn test_load_commit_recrop() {
        let mut session = JsCropSession::new(JsValue::UNDEFINED).unwrap();
        session.load(png_bytes(80, 60), "image/png", "pic.png").unwrap();
        assert_eq!(session.state(), "cropping");

        let first = session.commit().unwrap();
        assert_eq!(first.name(), "pic.jpg");
        assert_eq!((first.width(), first.height()), (60, 60));
        assert!(first.url().starts_with("blob:"));

        session.recrop().unwrap();
        session.set_zoom(2.0);
        let second = session.commit().unwrap();
        assert_eq!(second.width(), 30);
        assert_ne!(first.url(), second.url());
    }

    #[wasm_bindgen_test]
    fn test_rejected_file_queues_toast() {
        let mut session = JsCropSession::new(JsValue::UNDEFINED).unwrap();
        assert!(session.load(vec![0u8; 16], "image/gif", "a.gif").is_err());
        assert_eq!(session.state(), "empty");
        assert_eq!(session.inner.observer().len(), 1);
    }

    fn config_object(entries: &[(&str, JsValue)]) -> JsValue {
        let object = js_sys::Object::new();
        for (key, value) in entries {
            js_sys::Reflect::set(&object, &JsValue::from_str(key), value).unwrap();
        }
        object.into()
    }

    #[wasm_bindgen_test]
    fn test_config_object_is_honored() {
        let zoom = js_sys::Array::of2(&JsValue::from(1.0), &JsValue::from(4.0));
        let config = config_object(&[
            ("maxSizeMB", JsValue::from(2.0)),
            ("zoomRange", zoom.into()),
        ]);
        let session = JsCropSession::new(config).unwrap();
        assert_eq!(session.inner.config().max_size_mb, 2.0);
        assert_eq!(session.inner.config().zoom_range.max, 4.0);

        let config = config_object(&[("maxSize", JsValue::from(2.0))]);
        assert!(JsCropSession::new(config).is_err());
    }

    #[wasm_bindgen_test]
    fn test_commit_without_source_fails() {
        let mut session = JsCropSession::new(JsValue::UNDEFINED).unwrap();
        assert!(session.commit().is_err());
    }
}
