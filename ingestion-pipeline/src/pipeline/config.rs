use std::time::Duration;

use common::utils::{config::AppConfig, upload_limits::UploadLimits};

use crate::{poller::PollSettings, progress::ProgressSettings, retry::RetryPolicy};

#[derive(Debug, Clone)]
pub struct IngestionTuning {
    pub progress_tick: Duration,
    pub progress: ProgressSettings,
    /// How long a ready session waits for a metadata write still in flight.
    pub metadata_grace: Duration,
}

impl Default for IngestionTuning {
    fn default() -> Self {
        Self {
            progress_tick: Duration::from_millis(200),
            progress: ProgressSettings::default(),
            metadata_grace: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub tuning: IngestionTuning,
    pub retry: RetryPolicy,
    pub poll: PollSettings,
    pub limits: UploadLimits,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

impl IngestionConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            tuning: IngestionTuning {
                progress_tick: Duration::from_millis(config.progress_tick_ms),
                ..IngestionTuning::default()
            },
            retry: RetryPolicy::fixed(
                config.max_retries,
                Duration::from_millis(config.retry_delay_ms),
            ),
            poll: PollSettings {
                interval: Duration::from_millis(config.poll_interval_ms),
                max_attempts: config.poll_max_attempts,
                timeout: Duration::from_millis(config.poll_timeout_ms),
            },
            limits: UploadLimits::from_app_config(config),
        }
    }
}
