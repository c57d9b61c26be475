//! Extension de pmoconfig pour le service vidéo

use crate::profile::ConsistencyMode;
use crate::service::Settings;
use crate::sync::{BackoffPolicy, SyncOptions};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Trait d'extension pour pmoconfig::Config
pub trait VideoConfigExt {
    /// Répertoire de données (créé s'il n'existe pas)
    fn video_data_dir(&self) -> crate::Result<PathBuf>;

    /// Mode de cohérence du stockage des profils
    fn video_consistency(&self) -> ConsistencyMode;

    /// Paramètres complets du service
    fn video_settings(&self) -> crate::Result<Settings>;

    /// Cadences et reculs de la boucle de synchronisation des écrans
    fn video_sync_options(&self) -> SyncOptions;
}

impl VideoConfigExt for pmoconfig::Config {
    fn video_data_dir(&self) -> crate::Result<PathBuf> {
        Ok(PathBuf::from(self.get_data_dir()?))
    }

    fn video_consistency(&self) -> ConsistencyMode {
        let raw = self.get_sync_consistency();
        raw.parse().unwrap_or_else(|_| {
            warn!(mode = %raw, "Unknown consistency mode, using last_writer_wins");
            ConsistencyMode::LastWriterWins
        })
    }

    fn video_settings(&self) -> crate::Result<Settings> {
        let mut settings = Settings::new(self.video_data_dir()?, self.get_video_directories());
        settings.default_video_directory = Some(self.get_default_video_directory());
        settings.extensions = self.get_video_extensions();
        settings.max_items = self.get_max_catalog_items()?;
        settings.page_size = self.get_catalog_page_size()?;
        settings.consistency = self.video_consistency();
        settings.signal_window = Duration::from_secs(self.get_signal_window_secs()?);
        Ok(settings)
    }

    fn video_sync_options(&self) -> SyncOptions {
        let defaults = SyncOptions::default();
        let policy = BackoffPolicy::default();
        SyncOptions {
            state_interval: self
                .get_state_poll_ms()
                .map(Duration::from_millis)
                .unwrap_or(defaults.state_interval),
            signal_interval: self
                .get_signal_poll_ms()
                .map(Duration::from_millis)
                .unwrap_or(defaults.signal_interval),
            request_timeout: defaults.request_timeout,
            backoff: BackoffPolicy {
                max: self
                    .get_sync_backoff_max_ms()
                    .map(Duration::from_millis)
                    .unwrap_or(policy.max),
                max_failures: self.get_sync_max_failures().unwrap_or(policy.max_failures),
                cooldown: self
                    .get_sync_cooldown_secs()
                    .map(Duration::from_secs)
                    .unwrap_or(policy.cooldown),
                ..policy
            },
        }
    }
}
