//! Page capture collaborator
//!
//! Capture turns a URL into a raw image byte stream. The pipeline only sees the
//! [`Capture`] trait; [`ChromeCapture`] is the headless Chrome implementation
//! used in production.

use crate::{create_browser_config, format_duration, CaptureSettings, ThumbnailError};
use async_trait::async_trait;
use bytes::Bytes;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::ScreenshotParams;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use url::Url;

const BLANK_PAGE: &str = "about:blank";

/// Stream of byte chunks flowing between pipeline stages.
pub type ByteStream = BoxStream<'static, Result<Bytes, ThumbnailError>>;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Capture: Send + Sync {
    /// Start capturing `url`. Failures either abort here or surface as an
    /// error item in the returned stream.
    async fn capture(
        &self,
        url: &Url,
        settings: &CaptureSettings,
    ) -> Result<ByteStream, ThumbnailError>;

    /// Whether the capture backend can still serve requests.
    fn is_alive(&self) -> bool {
        true
    }
}

/// How long `shutdown` waits for the browser to close.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Headless Chrome capture backed by a single long-lived browser.
///
/// Captures share the browser through read access, which is only taken while
/// opening a blank tab. Navigation and screenshots run unlocked, so one slow
/// page never holds up another capture or `shutdown`.
pub struct ChromeCapture {
    browser: Arc<RwLock<Browser>>,
    handler: JoinHandle<Result<(), chromiumoxide::error::CdpError>>,
}

impl ChromeCapture {
    pub async fn launch(settings: &CaptureSettings) -> Result<Self, ThumbnailError> {
        let browser_config = create_browser_config(settings)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ThumbnailError::Configuration(format!("browser launch failed: {e}")))?;

        // The CDP handler is a stream that must be polled for the browser to
        // make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("Browser handler error: {}", e);
                    return Err(e);
                }
            }
            info!("Browser handler stream ended");
            Ok(())
        });

        info!("Headless browser launched");
        Ok(Self {
            browser: Arc::new(RwLock::new(browser)),
            handler,
        })
    }

    pub async fn shutdown(&self) {
        info!("Shutting down headless browser...");
        let close = async { self.browser.write().await.close().await };
        if let Some(Err(e)) = within_grace("Browser close", close, CLOSE_GRACE).await {
            warn!("Browser close failed: {}", e);
        }
        self.handler.abort();
    }

    async fn screenshot(
        browser: Arc<RwLock<Browser>>,
        url: Url,
        settings: CaptureSettings,
    ) -> Result<Bytes, ThumbnailError> {
        let page = browser
            .read()
            .await
            .new_page(BLANK_PAGE)
            .await
            .map_err(|e| capture_error(&url, e))?;

        let result = async {
            let viewport = &settings.viewport;
            let emulation_params = SetDeviceMetricsOverrideParams::builder()
                .width(viewport.width)
                .height(viewport.height)
                .device_scale_factor(viewport.device_scale_factor)
                .mobile(viewport.mobile)
                .build()
                .map_err(ThumbnailError::UpstreamCapture)?;

            page.execute(emulation_params)
                .await
                .map_err(|e| capture_error(&url, e))?;

            page.goto(url.as_str())
                .await
                .map_err(|e| capture_error(&url, e))?;

            sleep(settings.delay).await;

            let params = ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build();
            page.screenshot(params)
                .await
                .map_err(|e| capture_error(&url, e))
        }
        .await;

        let _ = page.close().await;

        let png = result?;
        debug!("Captured {} ({} bytes)", url, png.len());
        Ok(Bytes::from(png))
    }
}

/// Await `fut` for at most `grace`, logging when it is given up on.
async fn within_grace<F: Future>(what: &str, fut: F, grace: Duration) -> Option<F::Output> {
    match timeout(grace, fut).await {
        Ok(output) => Some(output),
        Err(_) => {
            warn!("{} did not finish within {}", what, format_duration(grace));
            None
        }
    }
}

#[async_trait]
impl Capture for ChromeCapture {
    async fn capture(
        &self,
        url: &Url,
        settings: &CaptureSettings,
    ) -> Result<ByteStream, ThumbnailError> {
        if self.handler.is_finished() {
            return Err(ThumbnailError::UpstreamCapture(
                "browser is no longer running".to_string(),
            ));
        }

        let shot = Self::screenshot(self.browser.clone(), url.clone(), settings.clone());
        Ok(stream::once(shot).boxed())
    }

    fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }
}

fn capture_error(url: &Url, err: impl std::fmt::Display) -> ThumbnailError {
    ThumbnailError::UpstreamCapture(format!("{url}: {err}"))
}
