//! Hot-reloadable model settings.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ModelSettings;
use crate::infrastructure::config::ConfigLoader;

/// Shared handle to the current model settings.
///
/// Each operation works on a snapshot taken when it starts, so a reload
/// never changes the rules halfway through a request.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<ModelSettings>>,
}

impl SettingsHandle {
    pub fn new(settings: ModelSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    pub async fn snapshot(&self) -> ModelSettings {
        self.inner.read().await.clone()
    }

    /// Validate and install new settings.
    pub async fn replace(&self, settings: ModelSettings) -> DomainResult<()> {
        ConfigLoader::validate_model_settings(&settings)
            .map_err(|e| DomainError::ValidationFailed(e.to_string()))?;
        *self.inner.write().await = settings;
        info!("model settings reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replace_validates() {
        let handle = SettingsHandle::default();

        let mut lowered = handle.snapshot().await;
        lowered.fit.min_observations = 3;
        handle.replace(lowered).await.unwrap();
        assert_eq!(handle.snapshot().await.fit.min_observations, 3);

        let mut broken = handle.snapshot().await;
        broken.trail.window_minutes = 0;
        assert!(matches!(
            handle.replace(broken).await,
            Err(DomainError::ValidationFailed(_))
        ));
        assert_eq!(handle.snapshot().await.trail.window_minutes, 60);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let handle = SettingsHandle::default();
        let other = handle.clone();

        let mut settings = handle.snapshot().await;
        settings.cache_enabled = false;
        other.replace(settings).await.unwrap();

        assert!(!handle.snapshot().await.cache_enabled);
    }
}
