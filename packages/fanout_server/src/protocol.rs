//! Drawing event wire format.
//!
//! Clients exchange one JSON object per stroke segment:
//!
//! ```json
//! {"x":100,"y":100,"prevX":90,"prevY":90,"color":"#000000","isDrawing":true}
//! ```
//!
//! Missing fields take their zero value and unknown fields are ignored, so
//! older and newer clients can share a canvas.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DrawEvent {
    pub x: f64,
    pub y: f64,
    pub prev_x: f64,
    pub prev_y: f64,
    pub color: String,
    pub is_drawing: bool,
}

impl DrawEvent {
    /// Segment from `(prev_x, prev_y)` to `(x, y)`.
    pub fn segment(prev: (f64, f64), to: (f64, f64), color: &str) -> Self {
        Self {
            x: to.0,
            y: to.1,
            prev_x: prev.0,
            prev_y: prev.1,
            color: color.to_string(),
            is_drawing: true,
        }
    }
}

/// Decode a frame as a drawing event and re-encode it canonically.
///
/// Only a JSON object is a drawing event; arrays and scalars are refused.
pub fn normalize(frame: &[u8]) -> Result<String, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_slice(frame)?;
    if !value.is_object() {
        return Err(serde::de::Error::custom("expected a drawing event object"));
    }
    let event: DrawEvent = serde_json::from_value(value)?;
    serde_json::to_string(&event)
}
