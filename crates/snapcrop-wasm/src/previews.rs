//! Object-URL preview backend.
//!
//! Each committed crop becomes a `Blob` whose URL is handed to the page for
//! display. Object URLs keep their blob alive until revoked, so the core's
//! artifact manager decides when to call [`PreviewBackend::release`].

use bytes::Bytes;
use snapcrop_core::{PreviewBackend, PreviewHandle, ResourceError};
use wasm_bindgen::JsValue;
use web_sys::{Blob, BlobPropertyBag, Url};

/// Preview backend built on `URL.createObjectURL`.
#[derive(Debug, Default)]
pub struct ObjectUrlPreviews {
    next_id: u64,
}

impl ObjectUrlPreviews {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreviewBackend for ObjectUrlPreviews {
    fn acquire(&mut self, bytes: &Bytes, mime_type: &str) -> Result<PreviewHandle, ResourceError> {
        let array = js_sys::Uint8Array::from(bytes.as_ref());
        let parts = js_sys::Array::of1(&array);

        let options = BlobPropertyBag::new();
        options.set_type(mime_type);

        let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)
            .map_err(|e| ResourceError::AcquireFailed(describe(&e)))?;
        let url = Url::create_object_url_with_blob(&blob)
            .map_err(|e| ResourceError::AcquireFailed(describe(&e)))?;

        self.next_id += 1;
        Ok(PreviewHandle::new(self.next_id, url))
    }

    fn release(&mut self, handle: &PreviewHandle) -> Result<(), ResourceError> {
        Url::revoke_object_url(handle.url()).map_err(|e| ResourceError::ReleaseFailed {
            url: handle.url().to_string(),
            reason: describe(&e),
        })
    }
}

fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| format!("{:?}", value))
}

#[cfg(all(test, target_arch = "wasm32"))]
mod wasm_tests {
    use super::*;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[wasm_bindgen_test]
    fn test_acquire_creates_blob_url() {
        let mut previews = ObjectUrlPreviews::new();
        let handle = previews
            .acquire(&Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]), "image/jpeg")
            .unwrap();

        assert!(handle.url().starts_with("blob:"));
        assert_eq!(handle.id(), 1);
        assert!(previews.release(&handle).is_ok());
    }

    #[wasm_bindgen_test]
    fn test_ids_are_unique() {
        let mut previews = ObjectUrlPreviews::new();
        let bytes = Bytes::from_static(&[1, 2, 3]);
        let a = previews.acquire(&bytes, "image/jpeg").unwrap();
        let b = previews.acquire(&bytes, "image/jpeg").unwrap();

        assert_ne!(a.id(), b.id());
        assert_ne!(a.url(), b.url());
    }
}
