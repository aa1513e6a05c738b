//! Thumbnail generation from source images.

use std::io::Cursor;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use contentpipe_core::error::ProcessingError;
use contentpipe_core::processing::{ProcessedOutput, ProcessingFunction};

const DEFAULT_MAX_WIDTH: u32 = 300;
const DEFAULT_MAX_HEIGHT: u32 = 300;
const JPEG_QUALITY: u8 = 80;
const VARIANT: &str = "thumbnail_v1";

/// Decodes the input image, scales it to fit within the requested bounds
/// while preserving aspect ratio, and re-encodes it as JPEG.
///
/// Bounds come from the intent metadata (`width` / `height`), falling back
/// to 300x300.
pub struct ThumbnailFunction;

impl ThumbnailFunction {
    /// Registry name for this capability.
    pub const NAME: &'static str = "content.thumbnail.v1";

    fn bounds(metadata: &serde_json::Value) -> (u32, u32) {
        let dim = |key: &str, default: u32| {
            metadata
                .get(key)
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        (
            dim("width", DEFAULT_MAX_WIDTH),
            dim("height", DEFAULT_MAX_HEIGHT),
        )
    }
}

#[async_trait]
impl ProcessingFunction for ThumbnailFunction {
    async fn process(
        &self,
        input: &[u8],
        metadata: &serde_json::Value,
    ) -> Result<ProcessedOutput, ProcessingError> {
        let (max_width, max_height) = Self::bounds(metadata);

        let source = image::load_from_memory(input)
            .map_err(|e| ProcessingError(format!("failed to decode source image: {e}")))?;
        let source_width = source.width();
        let source_height = source.height();

        let scaled = if source_width <= max_width && source_height <= max_height {
            // Already within bounds; re-encode without resampling.
            source
        } else {
            source.resize(max_width, max_height, FilterType::Lanczos3)
        };

        let mut encoded = Vec::new();
        scaled
            .to_rgb8()
            .write_with_encoder(JpegEncoder::new_with_quality(
                Cursor::new(&mut encoded),
                JPEG_QUALITY,
            ))
            .map_err(|e| ProcessingError(format!("failed to encode thumbnail: {e}")))?;

        Ok(ProcessedOutput {
            metrics: serde_json::json!({
                "source_width": source_width,
                "source_height": source_height,
                "output_width": scaled.width(),
                "output_height": scaled.height(),
            }),
            item_count: 1,
            derived_bytes: encoded,
            content_type: "image/jpeg".into(),
            filename: format!("{VARIANT}.jpg"),
            derivation_type: "thumbnail".into(),
            variant: VARIANT.into(),
        })
    }
}
