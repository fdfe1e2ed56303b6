//! Thumbnail transform collaborator
//!
//! A [`Transform`] maps a raw capture stream to an encoded thumbnail stream.
//! [`ImageTransform`] performs resize → anchored crop → PNG encode using the
//! `image` crate.

use crate::{collect_stream, ByteStream, CropAnchor, ThumbnailError, ThumbnailSettings};
use bytes::Bytes;
use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::ImageEncoder;
use tracing::debug;

/// Fixed parameters for one thumbnail transform.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformParams {
    pub resize_width: u32,
    pub crop_width: u32,
    pub crop_height: u32,
    pub anchor: CropAnchor,
    pub quality: u8,
}

impl From<&ThumbnailSettings> for TransformParams {
    fn from(settings: &ThumbnailSettings) -> Self {
        Self {
            resize_width: settings.resize_width,
            crop_width: settings.crop_width,
            crop_height: settings.crop_height,
            anchor: settings.anchor,
            quality: settings.quality,
        }
    }
}

impl Default for TransformParams {
    fn default() -> Self {
        Self::from(&ThumbnailSettings::default())
    }
}

pub trait Transform: Send + Sync {
    /// Errors already present in `input` must be forwarded unchanged; the
    /// transform's own failures are reported as [`ThumbnailError::Transform`].
    fn transform(&self, input: ByteStream, params: &TransformParams) -> ByteStream;
}

/// Resize/crop/encode with the `image` crate.
#[derive(Debug, Clone, Default)]
pub struct ImageTransform;

impl Transform for ImageTransform {
    fn transform(&self, input: ByteStream, params: &TransformParams) -> ByteStream {
        stream::once(convert(input, params.clone()))
            .try_filter_map(|chunk| future::ready(Ok(chunk)))
            .boxed()
    }
}

async fn convert(input: ByteStream, params: TransformParams) -> Result<Option<Bytes>, ThumbnailError> {
    let raw = collect_stream(input).await?;
    // Nothing captured means nothing to convert; the caller decides what an
    // empty result means.
    if raw.is_empty() {
        return Ok(None);
    }

    let thumbnail = tokio::task::spawn_blocking(move || render_thumbnail(&raw, &params))
        .await
        .map_err(|e| ThumbnailError::Transform(e.to_string()))??;
    Ok(Some(thumbnail))
}

/// Height that keeps the aspect ratio of `width`x`height` at `target_width`.
fn scaled_height(width: u32, height: u32, target_width: u32) -> Result<u32, ThumbnailError> {
    let scaled = (u64::from(height) * u64::from(target_width)) / u64::from(width.max(1));
    u32::try_from(scaled.max(1)).map_err(|_| {
        ThumbnailError::Transform(format!(
            "{width}x{height} capture is too tall to scale to {target_width}px wide"
        ))
    })
}

/// Decode `raw`, resize to the target width, crop at the anchor and encode as
/// PNG.
pub fn render_thumbnail(raw: &[u8], params: &TransformParams) -> Result<Bytes, ThumbnailError> {
    let source = image::load_from_memory(raw)?;

    let resized_height = scaled_height(source.width(), source.height(), params.resize_width)?;
    let resized = source.resize_exact(params.resize_width, resized_height, FilterType::Triangle);

    let crop = (
        params.crop_width.min(resized.width()),
        params.crop_height.min(resized.height()),
    );
    let (x, y) = params
        .anchor
        .offset((resized.width(), resized.height()), crop);
    let cropped = resized.crop_imm(x, y, crop.0, crop.1).to_rgba8();

    let (compression, filter) = png_quality(params.quality);
    let mut encoded = Vec::new();
    PngEncoder::new_with_quality(&mut encoded, compression, filter).write_image(
        cropped.as_raw(),
        cropped.width(),
        cropped.height(),
        image::ColorType::Rgba8,
    )?;

    debug!(
        "Rendered {}x{} thumbnail from {}x{} source ({} bytes)",
        cropped.width(),
        cropped.height(),
        source.width(),
        source.height(),
        encoded.len()
    );
    Ok(Bytes::from(encoded))
}

/// ImageMagick's PNG quality: tens digit is zlib effort, ones digit the row
/// filter.
pub fn png_quality(quality: u8) -> (CompressionType, PngFilter) {
    let compression = match quality / 10 {
        0..=3 => CompressionType::Fast,
        8..=10 => CompressionType::Best,
        _ => CompressionType::Default,
    };
    let filter = match quality % 10 {
        0 => PngFilter::NoFilter,
        1 => PngFilter::Sub,
        2 => PngFilter::Up,
        3 => PngFilter::Avg,
        4 => PngFilter::Paeth,
        _ => PngFilter::Adaptive,
    };
    (compression, filter)
}
