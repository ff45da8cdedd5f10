//! Rendering pipeline for scry boards.
//!
//! - [`compose`]: Framed SVG view around a stored artifact
//! - [`raster`]: Deterministic SVG → PNG with an explicit font set
//! - [`png`]: Chunk codec used to embed accessibility metadata

pub mod compose;
pub mod error;
pub mod png;
pub mod raster;

pub use compose::{viewer_compose, xml_escape};
pub use error::RenderError;
pub use png::{build_chunk, crc32, embed_metadata, splice_before_trailer};
pub use raster::{DESCRIPTION_KEY, FontSet, Rasterizer};
