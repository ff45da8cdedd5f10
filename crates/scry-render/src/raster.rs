//! SVG rasterization with an explicit font set.
//!
//! Fonts come only from configured directories and files; system fonts are
//! never consulted, so the same artifact renders identically on every host.

use std::path::Path;
use std::sync::Arc;

use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{self, fontdb};
use tracing::{debug, info, instrument, warn};

use crate::error::RenderError;
use crate::png;
use scry_common::RenderConfig;

/// iTXt keyword for the accessibility description.
pub const DESCRIPTION_KEY: &str = "Description";

/// Font database shared by every render.
#[derive(Clone)]
pub struct FontSet {
    db: Arc<fontdb::Database>,
    default_family: Option<String>,
}

impl FontSet {
    /// A font set with no faces. Text in artifacts is dropped.
    pub fn empty() -> Self {
        Self {
            db: Arc::new(fontdb::Database::new()),
            default_family: None,
        }
    }

    /// Load the configured font directories and files.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Font`] if a listed file cannot be loaded or a
    /// listed directory does not exist.
    pub fn load(config: &RenderConfig) -> Result<Self, RenderError> {
        let mut db = fontdb::Database::new();

        for dir in &config.font_dirs {
            if !Path::new(dir).is_dir() {
                return Err(RenderError::Font {
                    path: dir.clone(),
                    reason: "not a directory".into(),
                });
            }
            db.load_fonts_dir(dir);
        }

        for file in &config.font_files {
            db.load_font_file(file).map_err(|e| RenderError::Font {
                path: file.clone(),
                reason: e.to_string(),
            })?;
        }

        if db.is_empty() {
            warn!("No fonts loaded; text in artifacts will not be rendered");
        } else {
            info!(faces = db.len(), "Font set loaded");
        }

        Ok(Self {
            db: Arc::new(db),
            default_family: config.default_font_family.clone(),
        })
    }

    /// Number of loaded font faces.
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet")
            .field("faces", &self.db.len())
            .field("default_family", &self.default_family)
            .finish()
    }
}

/// Renders artifacts to PNG under a per-axis ceiling.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    fonts: FontSet,
    max_dimension: u32,
}

impl Rasterizer {
    pub fn new(fonts: FontSet, max_dimension: u32) -> Self {
        Self {
            fonts,
            max_dimension,
        }
    }

    /// Inclusive per-axis ceiling.
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Fail with [`RenderError::TooLarge`] if either axis exceeds the ceiling.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), RenderError> {
        if width > self.max_dimension || height > self.max_dimension {
            return Err(RenderError::TooLarge {
                width,
                height,
                max: self.max_dimension,
            });
        }
        Ok(())
    }

    /// Render `artifact` into a `width`×`height` PNG.
    ///
    /// The dimension check runs before the artifact is parsed. The artifact
    /// is scaled to fill the requested size.
    #[instrument(skip(self, artifact), fields(artifact_len = artifact.len()))]
    pub fn rasterize(&self, artifact: &str, width: u32, height: u32) -> Result<Vec<u8>, RenderError> {
        self.check_dimensions(width, height)?;

        let mut options = usvg::Options {
            fontdb: Arc::clone(&self.fonts.db),
            ..Default::default()
        };
        if let Some(family) = &self.fonts.default_family {
            options.font_family.clone_from(family);
        }

        let tree = usvg::Tree::from_str(artifact, &options).map_err(|e| {
            RenderError::Parse {
                reason: e.to_string(),
            }
        })?;

        let mut pixmap = Pixmap::new(width, height)
            .ok_or_else(|| RenderError::render(format!("cannot allocate {width}x{height} pixmap")))?;

        let size = tree.size();
        #[allow(clippy::cast_precision_loss)]
        let transform = Transform::from_scale(width as f32 / size.width(), height as f32 / size.height());
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        let encoded = pixmap
            .encode_png()
            .map_err(|e| RenderError::render(e.to_string()))?;

        debug!(width, height, png_len = encoded.len(), "Artifact rasterized");
        Ok(encoded)
    }

    /// Render a board artifact and embed its description as iTXt metadata.
    ///
    /// The description is `alt` when present, else `Board "<name>"`.
    pub fn board_png(
        &self,
        name: &str,
        artifact: &str,
        width: u32,
        height: u32,
        alt: Option<&str>,
    ) -> Result<Vec<u8>, RenderError> {
        let encoded = self.rasterize(artifact, width, height)?;
        let description = match alt.filter(|a| !a.is_empty()) {
            Some(alt) => alt.to_string(),
            None => format!("Board \"{name}\""),
        };
        png::embed_metadata(&encoded, DESCRIPTION_KEY, &description)
    }
}
