//! Rendering errors.

use scry_common::ScryError;
use thiserror::Error;

/// Errors from composition, rasterization and PNG chunk handling.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Requested raster exceeds the per-axis ceiling.
    #[error("Dimensions {width}x{height} exceed maximum {max}x{max}")]
    TooLarge { width: u32, height: u32, max: u32 },

    /// The artifact is not a renderable SVG document.
    #[error("SVG parse failed: {reason}")]
    Parse { reason: String },

    /// Pixmap allocation or PNG encoding failed.
    #[error("Render failed: {reason}")]
    Render { reason: String },

    /// Input bytes are not a PNG stream ending in an IEND trailer.
    #[error("Malformed PNG container: {reason}")]
    MalformedContainer { reason: String },

    /// A configured font could not be loaded.
    #[error("Failed to load font '{path}': {reason}")]
    Font { path: String, reason: String },
}

impl RenderError {
    pub fn render(reason: impl Into<String>) -> Self {
        Self::Render {
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedContainer {
            reason: reason.into(),
        }
    }
}

impl From<RenderError> for ScryError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::TooLarge { width, height, max } => ScryError::TooLarge { width, height, max },
            other => ScryError::internal(other.to_string()),
        }
    }
}
