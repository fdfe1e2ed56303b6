//! Thumbnail production pipeline: capture → transform → collect.

use crate::{
    format_bytes, format_duration, resource_id_of, ByteStream, Capture, CaptureSettings, Config,
    ThumbnailError, Transform, TransformParams,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

/// Something that can produce the artifact for a key.
///
/// The cache depends only on this trait, so the pipeline can be swapped for a
/// fake in tests.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn produce(&self, key: &str) -> Result<Bytes, ThumbnailError>;
}

/// Drives capture and transform for a key and collects the thumbnail.
pub struct PipelineRunner {
    capture: Arc<dyn Capture>,
    transform: Arc<dyn Transform>,
    base_url: Url,
    capture_settings: CaptureSettings,
    transform_params: TransformParams,
}

impl PipelineRunner {
    pub fn new(
        capture: Arc<dyn Capture>,
        transform: Arc<dyn Transform>,
        base_url: Url,
        capture_settings: CaptureSettings,
        transform_params: TransformParams,
    ) -> Self {
        Self {
            capture,
            transform,
            base_url,
            capture_settings,
            transform_params,
        }
    }

    pub fn from_config(
        config: &Config,
        capture: Arc<dyn Capture>,
        transform: Arc<dyn Transform>,
    ) -> Result<Self, ThumbnailError> {
        Ok(Self::new(
            capture,
            transform,
            config.base_url()?,
            config.capture.clone(),
            TransformParams::from(&config.thumbnail),
        ))
    }

    /// `<base>/<resource id>/`
    pub fn capture_url(&self, resource_id: &str) -> Result<Url, ThumbnailError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}/{resource_id}/"))
            .map_err(|e| ThumbnailError::UpstreamCapture(format!("invalid capture url: {e}")))
    }

    async fn run(&self, key: &str) -> Result<Bytes, ThumbnailError> {
        let url = self.capture_url(resource_id_of(key))?;

        debug!("Capturing {} for {}", url, key);
        let raw = self.capture.capture(&url, &self.capture_settings).await?;

        let transformed = self.transform.transform(raw, &self.transform_params);
        let buffer = collect_stream(transformed).await?;

        if buffer.is_empty() {
            return Err(ThumbnailError::EmptyResult);
        }
        Ok(buffer.freeze())
    }
}

#[async_trait]
impl Producer for PipelineRunner {
    async fn produce(&self, key: &str) -> Result<Bytes, ThumbnailError> {
        let started = Instant::now();
        let result = self.run(key).await;

        match &result {
            Ok(thumbnail) => info!(
                "Produced {} ({}) in {}",
                key,
                format_bytes(thumbnail.len()),
                format_duration(started.elapsed())
            ),
            Err(e) => warn!(
                "Production of {} failed after {}: {}",
                key,
                format_duration(started.elapsed()),
                e
            ),
        }

        result
    }
}

/// Concatenate a byte stream, stopping at the first error.
pub async fn collect_stream(mut stream: ByteStream) -> Result<BytesMut, ThumbnailError> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buffer.extend_from_slice(&chunk?);
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockCapture;
    use futures::stream;
    use tokio_test::{assert_err, assert_ok};

    /// Passes chunks through, optionally failing after them.
    struct PassThrough {
        fail_with: Option<String>,
    }

    impl Transform for PassThrough {
        fn transform(&self, input: ByteStream, _params: &TransformParams) -> ByteStream {
            match self.fail_with.clone() {
                None => input,
                Some(message) => input
                    .chain(stream::once(async move {
                        Err(ThumbnailError::Transform(message))
                    }))
                    .boxed(),
            }
        }
    }

    fn capture_yielding(chunks: Vec<Result<Bytes, ThumbnailError>>) -> MockCapture {
        let mut capture = MockCapture::new();
        capture
            .expect_capture()
            .times(1)
            .returning(move |_, _| Ok(stream::iter(chunks.clone()).boxed()));
        capture
    }

    fn runner(capture: MockCapture, transform: PassThrough) -> PipelineRunner {
        PipelineRunner::new(
            Arc::new(capture),
            Arc::new(transform),
            Url::parse("https://run.example.com/plunks/").unwrap(),
            CaptureSettings::default(),
            TransformParams::default(),
        )
    }

    fn ok(data: &'static [u8]) -> Result<Bytes, ThumbnailError> {
        Ok(Bytes::from_static(data))
    }

    #[test]
    fn test_capture_url_appends_resource_id() {
        let runner = runner(MockCapture::new(), PassThrough { fail_with: None });
        assert_eq!(
            runner.capture_url("abc123").unwrap().as_str(),
            "https://run.example.com/plunks/abc123/"
        );
    }

    #[tokio::test]
    async fn test_capture_receives_resource_url_and_settings() {
        let mut capture = MockCapture::new();
        capture
            .expect_capture()
            .withf(|url, settings| {
                url.as_str() == "https://run.example.com/plunks/abc123/"
                    && settings.viewport.width == 1024
                    && settings.viewport.height == 768
            })
            .times(1)
            .returning(|_, _| Ok(stream::iter(vec![Ok(Bytes::from(vec![7u8; 500]))]).boxed()));

        let runner = runner(capture, PassThrough { fail_with: None });
        let thumbnail = assert_ok!(runner.produce("abc123@v1").await);
        assert_eq!(thumbnail.len(), 500);
    }

    #[tokio::test]
    async fn test_chunks_are_concatenated() {
        let runner = runner(
            capture_yielding(vec![ok(b"he"), ok(b"llo")]),
            PassThrough { fail_with: None },
        );
        assert_eq!(runner.produce("abc@v1").await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_empty_output_is_empty_result() {
        let runner = runner(capture_yielding(vec![]), PassThrough { fail_with: None });
        assert_eq!(
            runner.produce("abc@v1").await,
            Err(ThumbnailError::EmptyResult)
        );
    }

    #[tokio::test]
    async fn test_capture_error_mid_stream() {
        let runner = runner(
            capture_yielding(vec![
                ok(b"partial"),
                Err(ThumbnailError::UpstreamCapture("connection reset".to_string())),
            ]),
            PassThrough { fail_with: None },
        );
        let err = assert_err!(runner.produce("abc@v1").await);
        assert!(matches!(err, ThumbnailError::UpstreamCapture(_)));
    }

    #[tokio::test]
    async fn test_capture_failure_at_start() {
        let mut capture = MockCapture::new();
        capture.expect_capture().times(1).returning(|_, _| {
            Err(ThumbnailError::UpstreamCapture(
                "browser is no longer running".to_string(),
            ))
        });
        let runner = runner(capture, PassThrough { fail_with: None });
        let err = assert_err!(runner.produce("abc@v1").await);
        assert!(matches!(err, ThumbnailError::UpstreamCapture(_)));
    }

    #[tokio::test]
    async fn test_transform_error_discards_partial_output() {
        let runner = runner(
            capture_yielding(vec![ok(b"some bytes")]),
            PassThrough {
                fail_with: Some("convert exited with 1".to_string()),
            },
        );
        assert_eq!(
            runner.produce("abc@v1").await,
            Err(ThumbnailError::Transform("convert exited with 1".to_string()))
        );
    }
}
