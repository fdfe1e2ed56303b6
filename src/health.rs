use crate::{format_duration, CacheStats, Capture, ThumbnailCache};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// Remaining lifetime below which the process reports a warning.
    pub lifetime_warning: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            lifetime_warning: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthLevel,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub lifetime_remaining_secs: u64,
    pub cache: CacheStats,
    pub capture_alive: bool,
}

pub struct HealthChecker {
    cache: ThumbnailCache,
    capture: Arc<dyn Capture>,
    started: Instant,
    started_at: DateTime<Utc>,
    max_lifetime: Duration,
    thresholds: HealthThresholds,
}

impl HealthChecker {
    pub fn new(cache: ThumbnailCache, capture: Arc<dyn Capture>, max_lifetime: Duration) -> Self {
        Self {
            cache,
            capture,
            started: Instant::now(),
            started_at: Utc::now(),
            max_lifetime,
            thresholds: HealthThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: HealthThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn check(&self) -> HealthReport {
        let uptime = self.started.elapsed();
        let remaining = self.max_lifetime.saturating_sub(uptime);
        let cache = self.cache.stats();
        let capture_alive = self.capture.is_alive();

        let status = determine_overall_health(&[
            self.check_capture(capture_alive),
            self.check_cache(&cache),
            self.check_lifetime(remaining),
        ]);

        HealthReport {
            status,
            started_at: self.started_at,
            uptime_secs: uptime.as_secs(),
            lifetime_remaining_secs: remaining.as_secs(),
            cache,
            capture_alive,
        }
    }

    fn check_capture(&self, alive: bool) -> HealthLevel {
        if alive {
            HealthLevel::Healthy
        } else {
            error!("Capture backend is no longer running");
            HealthLevel::Critical
        }
    }

    fn check_cache(&self, stats: &CacheStats) -> HealthLevel {
        // Only an oversized artifact surviving alone puts cost above capacity.
        if stats.cost > stats.capacity {
            warn!(
                "Cache over capacity: {} bytes held, {} allowed",
                stats.cost, stats.capacity
            );
            return HealthLevel::Warning;
        }
        HealthLevel::Healthy
    }

    fn check_lifetime(&self, remaining: Duration) -> HealthLevel {
        if remaining < self.thresholds.lifetime_warning {
            info!("Process exits in {}", format_duration(remaining));
            return HealthLevel::Warning;
        }
        HealthLevel::Healthy
    }
}

fn determine_overall_health(levels: &[HealthLevel]) -> HealthLevel {
    if levels.contains(&HealthLevel::Critical) {
        HealthLevel::Critical
    } else if levels.contains(&HealthLevel::Warning) {
        HealthLevel::Warning
    } else {
        HealthLevel::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CacheMetrics, Producer, ThumbnailError};
    use async_trait::async_trait;
    use bytes::Bytes;

    struct Fixed(usize);

    #[async_trait]
    impl Producer for Fixed {
        async fn produce(&self, _key: &str) -> Result<Bytes, ThumbnailError> {
            Ok(Bytes::from(vec![1u8; self.0]))
        }
    }

    struct Backend {
        alive: bool,
    }

    #[async_trait]
    impl Capture for Backend {
        async fn capture(
            &self,
            _url: &url::Url,
            _settings: &crate::CaptureSettings,
        ) -> Result<crate::ByteStream, ThumbnailError> {
            Err(ThumbnailError::UpstreamCapture("unused".to_string()))
        }

        fn is_alive(&self) -> bool {
            self.alive
        }
    }

    fn checker(artifact_len: usize, alive: bool, lifetime: Duration) -> HealthChecker {
        let cache = ThumbnailCache::new(1000, Arc::new(Fixed(artifact_len)), CacheMetrics::noop());
        HealthChecker::new(cache, Arc::new(Backend { alive }), lifetime)
    }

    #[test]
    fn test_fresh_process_is_healthy() {
        let report = checker(10, true, Duration::from_secs(3600)).check();
        assert_eq!(report.status, HealthLevel::Healthy);
        assert!(report.capture_alive);
        assert_eq!(report.cache.entries, 0);
        assert!(report.lifetime_remaining_secs > 3500);
    }

    #[test]
    fn test_dead_capture_is_critical() {
        let report = checker(10, false, Duration::from_secs(3600)).check();
        assert_eq!(report.status, HealthLevel::Critical);
    }

    #[test]
    fn test_expiring_lifetime_is_warning() {
        let report = checker(10, true, Duration::from_secs(60)).check();
        assert_eq!(report.status, HealthLevel::Warning);
    }

    #[test]
    fn test_custom_lifetime_threshold() {
        let strict = HealthThresholds {
            lifetime_warning: Duration::from_secs(30 * 60),
        };
        let report = checker(10, true, Duration::from_secs(20 * 60))
            .with_thresholds(strict)
            .check();
        assert_eq!(report.status, HealthLevel::Warning);

        let relaxed = HealthThresholds {
            lifetime_warning: Duration::from_secs(60),
        };
        let report = checker(10, true, Duration::from_secs(3 * 60))
            .with_thresholds(relaxed)
            .check();
        assert_eq!(report.status, HealthLevel::Healthy);
    }

    #[tokio::test]
    async fn test_oversized_survivor_is_warning() {
        let checker = checker(5000, true, Duration::from_secs(3600));
        checker.cache.get("huge@v1").await.unwrap();

        let report = checker.check();
        assert_eq!(report.cache.cost, 5000);
        assert_eq!(report.status, HealthLevel::Warning);
    }

    #[test]
    fn test_critical_outranks_warning() {
        assert_eq!(
            determine_overall_health(&[HealthLevel::Warning, HealthLevel::Critical]),
            HealthLevel::Critical
        );
        assert_eq!(determine_overall_health(&[]), HealthLevel::Healthy);
    }

    #[test]
    fn test_report_serializes_lowercase_status() {
        let json = serde_json::to_value(checker(10, true, Duration::from_secs(3600)).check()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["cache"]["capacity"], 1000);
    }
}
