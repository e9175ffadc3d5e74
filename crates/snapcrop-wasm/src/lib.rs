//! Snapcrop WASM - WebAssembly bindings for snapcrop
//!
//! This crate exposes the snapcrop-core cropping session to JavaScript.
//!
//! # Module Structure
//!
//! - `session` - `JsCropSession` and the committed `JsArtifact`
//! - `previews` - Object-URL preview backend
//! - `logger` - Console backend for the `log` facade
//!
//! # Usage
//!
//! ```typescript
//! import init, { JsCropSession } from '@snapcrop/wasm';
//!
//! await init();
//!
//! const session = new JsCropSession({ aspectRatio: 1 });
//! session.load(new Uint8Array(await file.arrayBuffer()), file.type, file.name);
//! const artifact = session.commit();
//! console.log(`Cropped ${artifact.width}x${artifact.height} -> ${artifact.url}`);
//! ```

use wasm_bindgen::prelude::*;

mod logger;
mod previews;
mod session;

pub use previews::ObjectUrlPreviews;
pub use session::{JsArtifact, JsCropSession, NotificationQueue, Toast};

/// Initialize the WASM module (called automatically on load)
#[wasm_bindgen(start)]
pub fn init() {
    logger::install(log::LevelFilter::Info);
}

/// Change console log verbosity: `off`, `error`, `warn`, `info`, `debug`, `trace`.
#[wasm_bindgen]
pub fn set_log_level(level: &str) -> Result<(), JsValue> {
    let level = logger::parse_level(level)
        .ok_or_else(|| JsValue::from_str(&format!("Unknown log level: {}", level)))?;
    logger::install(level);
    Ok(())
}

/// Get the version of the WASM module
#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
