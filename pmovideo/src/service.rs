//! Façade des opérations logiques exposées aux collaborateurs
//!
//! Chaque appel est indépendant : aucun état partagé en mémoire, toute la
//! coordination passe par le répertoire de données.

use crate::catalog::{CatalogCache, CatalogIndex, CatalogScanner, VideoDescriptor};
use crate::catalog::scanner::{DEFAULT_EXTENSIONS, MAX_CATALOG_ITEMS};
use crate::clock::{Clock, SystemClock};
use crate::fs::{LocalFs, MediaFs};
use crate::order::{MoveDirection, OrderReconciler};
use crate::persistence::DataLayout;
use crate::profile::{
    ConsistencyMode, CurrentVideo, PlaybackState, ProfileId, ProfilePatch, ProfileState,
    ProfileStore, Toggle,
};
use crate::signal::{DEFAULT_SIGNAL_WINDOW, SignalChannel, SignalKind};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Taille de page par défaut de `list_catalog`
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Taille de page maximale acceptée
pub const MAX_PAGE_SIZE: usize = 500;

// Tentatives de mise à jour en mode compare-and-swap
const UPDATE_ATTEMPTS: usize = 3;

/// Paramètres du service
#[derive(Debug, Clone)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub video_directories: Vec<String>,
    pub default_video_directory: Option<String>,
    pub extensions: Vec<String>,
    pub max_items: usize,
    pub page_size: usize,
    pub consistency: ConsistencyMode,
    pub signal_window: Duration,
}

impl Settings {
    pub fn new(data_dir: impl Into<PathBuf>, video_directories: Vec<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            video_directories,
            default_video_directory: None,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            max_items: MAX_CATALOG_ITEMS,
            page_size: DEFAULT_PAGE_SIZE,
            consistency: ConsistencyMode::default(),
            signal_window: DEFAULT_SIGNAL_WINDOW,
        }
    }
}

/// Entrée du catalogue telle que vue par un client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub filename: String,
    pub dir_index: usize,
    pub key: String,
}

impl From<&VideoDescriptor> for CatalogEntry {
    fn from(d: &VideoDescriptor) -> Self {
        Self {
            filename: d.name.clone(),
            dir_index: d.dir_index,
            key: d.key(),
        }
    }
}

/// Une page du catalogue, dans l'ordre du profil
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub videos: Vec<CatalogEntry>,
}

/// Refuse les noms de fichier qui sortiraient du répertoire
pub fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(Error::validation("filename is empty"));
    }
    if filename.contains("..")
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains('\0')
    {
        return Err(Error::validation(format!("invalid filename '{filename}'")));
    }
    Ok(())
}

pub struct VideoSyncService {
    settings: Settings,
    clock: Arc<dyn Clock>,
    catalog: CatalogIndex,
    orders: OrderReconciler,
    profiles: ProfileStore,
    signals: SignalChannel,
}

impl VideoSyncService {
    /// Service sur le disque local et l'horloge système
    pub fn new(settings: Settings) -> Self {
        Self::with_backends(settings, Arc::new(LocalFs), Arc::new(SystemClock))
    }

    pub fn with_backends(settings: Settings, fs: Arc<dyn MediaFs>, clock: Arc<dyn Clock>) -> Self {
        let layout = DataLayout::new(settings.data_dir.clone());
        let scanner = CatalogScanner::new(settings.extensions.clone(), settings.max_items);
        let catalog = CatalogIndex::new(
            fs,
            clock.clone(),
            layout.clone(),
            settings.video_directories.clone(),
            settings.default_video_directory.clone(),
            scanner,
        );
        Self {
            orders: OrderReconciler::new(layout.clone()),
            profiles: ProfileStore::new(layout.clone(), settings.consistency),
            signals: SignalChannel::new(layout, clock.clone(), settings.signal_window),
            catalog,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn catalog_index(&self) -> &CatalogIndex {
        &self.catalog
    }

    pub fn orders(&self) -> &OrderReconciler {
        &self.orders
    }

    pub fn profiles(&self) -> &ProfileStore {
        &self.profiles
    }

    pub fn signals(&self) -> &SignalChannel {
        &self.signals
    }

    /// Résolution `d` / `profile` commune à toutes les opérations
    pub fn resolve_profile(dashboard: Option<i64>, name: Option<&str>) -> ProfileId {
        ProfileId::resolve(dashboard, name)
    }

    fn apply(&self, profile: &ProfileId, patch: ProfilePatch) -> Result<ProfileState> {
        match self.profiles.mode() {
            ConsistencyMode::LastWriterWins => self.profiles.update(profile, &patch),
            ConsistencyMode::CompareAndSwap => {
                self.profiles.update_with_retry(profile, &patch, UPDATE_ATTEMPTS)
            }
        }
    }

    /// État complet du profil
    pub fn state(&self, profile: &ProfileId) -> ProfileState {
        self.profiles.load(profile)
    }

    // --- Vidéo courante ---

    pub fn current_video(&self, profile: &ProfileId) -> Option<CurrentVideo> {
        self.profiles.load(profile).current_video
    }

    /// Sélectionne une vidéo ; un index de répertoire hors limites devient 0
    pub fn set_current_video(
        &self,
        profile: &ProfileId,
        filename: &str,
        dir_index: i64,
    ) -> Result<CurrentVideo> {
        validate_filename(filename)?;
        let dir_count = self.catalog.directories().len();
        let dir_index = match usize::try_from(dir_index) {
            Ok(i) if i < dir_count => i,
            _ => {
                debug!(profile = %profile, dir_index, "Directory index out of range, using 0");
                0
            }
        };

        let video = CurrentVideo::new(filename, dir_index);
        self.apply(profile, ProfilePatch::current_video(Some(video.clone())))?;
        Ok(video)
    }

    pub fn clear_current_video(&self, profile: &ProfileId) -> Result<()> {
        self.apply(profile, ProfilePatch::current_video(None))?;
        Ok(())
    }

    // --- Lecture ---

    pub fn set_playback(&self, profile: &ProfileId, state: PlaybackState) -> Result<PlaybackState> {
        Ok(self.apply(profile, ProfilePatch::playback(state))?.playback_state)
    }

    pub fn play(&self, profile: &ProfileId) -> Result<PlaybackState> {
        self.set_playback(profile, PlaybackState::Play)
    }

    pub fn pause(&self, profile: &ProfileId) -> Result<PlaybackState> {
        self.set_playback(profile, PlaybackState::Pause)
    }

    pub fn stop(&self, profile: &ProfileId) -> Result<PlaybackState> {
        self.set_playback(profile, PlaybackState::Stop)
    }

    pub fn playback_state(&self, profile: &ProfileId) -> PlaybackState {
        self.profiles.load(profile).playback_state
    }

    // --- Volume et muet ---

    pub fn volume(&self, profile: &ProfileId) -> u8 {
        self.profiles.load(profile).volume
    }

    /// Fixe le volume (borné à 0..=100) et lève le signal `volume`
    pub fn set_volume(&self, profile: &ProfileId, volume: i64) -> Result<u8> {
        let volume = volume.clamp(0, 100) as u8;
        let state = self.apply(profile, ProfilePatch::volume(volume))?;
        self.signals.raise(profile, SignalKind::Volume)?;
        Ok(state.volume)
    }

    pub fn muted(&self, profile: &ProfileId) -> bool {
        self.profiles.load(profile).muted
    }

    /// Inverse le muet et lève le signal `mute`
    pub fn toggle_mute(&self, profile: &ProfileId) -> Result<bool> {
        let muted = !self.profiles.load(profile).muted;
        let state = self.apply(profile, ProfilePatch::muted(muted))?;
        self.signals.raise(profile, SignalKind::Mute)?;
        Ok(state.muted)
    }

    // --- Modes ---

    pub fn loop_mode(&self, profile: &ProfileId) -> Toggle {
        self.profiles.load(profile).loop_mode
    }

    pub fn set_loop_mode(&self, profile: &ProfileId, mode: Toggle) -> Result<Toggle> {
        let patch = ProfilePatch {
            loop_mode: Some(mode),
            ..ProfilePatch::default()
        };
        Ok(self.apply(profile, patch)?.loop_mode)
    }

    pub fn play_all_mode(&self, profile: &ProfileId) -> Toggle {
        self.profiles.load(profile).play_all_mode
    }

    pub fn set_play_all_mode(&self, profile: &ProfileId, mode: Toggle) -> Result<Toggle> {
        let patch = ProfilePatch {
            play_all_mode: Some(mode),
            ..ProfilePatch::default()
        };
        Ok(self.apply(profile, patch)?.play_all_mode)
    }

    pub fn external_audio_mode(&self, profile: &ProfileId) -> Toggle {
        self.profiles.load(profile).external_audio_mode
    }

    pub fn set_external_audio_mode(&self, profile: &ProfileId, mode: Toggle) -> Result<Toggle> {
        let patch = ProfilePatch {
            external_audio_mode: Some(mode),
            ..ProfilePatch::default()
        };
        Ok(self.apply(profile, patch)?.external_audio_mode)
    }

    // --- Catalogue et ordre ---

    /// Catalogue à jour (rescanné si périmé)
    pub fn catalog(&self) -> CatalogCache {
        self.catalog.current()
    }

    /// Ordre réconcilié du profil, avec les descripteurs correspondants
    fn ordered_entries(&self, profile: &ProfileId) -> Vec<CatalogEntry> {
        let catalog = self.catalog.current();
        let order = self.orders.reconcile(profile, &catalog);

        let mut by_key: HashMap<String, &VideoDescriptor> = HashMap::new();
        for descriptor in &catalog.descriptors {
            by_key.entry(descriptor.key()).or_insert(descriptor);
        }

        order
            .iter()
            .filter_map(|key| by_key.get(key).map(|d| CatalogEntry::from(*d)))
            .collect()
    }

    /// Vidéo suivant la vidéo courante, en revenant au début après la dernière
    pub fn next_video(&self, profile: &ProfileId) -> Option<CatalogEntry> {
        let entries = self.ordered_entries(profile);
        if entries.is_empty() {
            return None;
        }

        let current = self.profiles.load(profile).current_video;
        let position = current.and_then(|video| {
            entries
                .iter()
                .position(|e| e.filename == video.filename && e.dir_index == video.dir_index)
        });

        let next = match position {
            Some(index) => (index + 1) % entries.len(),
            None => 0,
        };
        entries.into_iter().nth(next)
    }

    /// Déplace une vidéo d'un cran dans l'ordre du profil
    pub fn move_video(
        &self,
        profile: &ProfileId,
        filename: &str,
        dir_index: i64,
        direction: &str,
    ) -> Result<Vec<String>> {
        validate_filename(filename)?;
        let direction: MoveDirection = direction.parse()?;
        let dir_count = self.catalog.directories().len();
        let dir_index = usize::try_from(dir_index)
            .ok()
            .filter(|i| *i < dir_count)
            .ok_or_else(|| {
                Error::validation(format!(
                    "directory index {dir_index} out of range (0..{dir_count})"
                ))
            })?;

        let catalog = self.catalog.current();
        let key = catalog
            .find(filename, dir_index)
            .map(VideoDescriptor::key)
            .ok_or_else(|| {
                Error::not_found(format!("video '{filename}' in directory {dir_index}"))
            })?;

        self.orders.move_key(profile, &catalog, &key, direction)
    }

    /// Page du catalogue dans l'ordre du profil (pages numérotées à partir de 1)
    pub fn list_catalog(
        &self,
        profile: &ProfileId,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> CatalogPage {
        let page = page.unwrap_or(1).max(1) as usize;
        let limit = limit
            .map(|l| l.clamp(1, MAX_PAGE_SIZE as i64) as usize)
            .unwrap_or_else(|| self.settings.page_size.clamp(1, MAX_PAGE_SIZE));

        let entries = self.ordered_entries(profile);
        let total = entries.len();
        let total_pages = total.div_ceil(limit);
        let videos = entries
            .into_iter()
            .skip((page - 1).saturating_mul(limit))
            .take(limit)
            .collect();

        CatalogPage {
            page,
            limit,
            total,
            total_pages,
            videos,
        }
    }

    // --- Signaux ---

    /// Signal de configuration, consommé s'il est récent
    pub fn check_config_changes(&self, profile: &ProfileId) -> Result<bool> {
        self.signals.consume_recent(profile, SignalKind::ConfigChange)
    }

    /// Signal de rafraîchissement du dashboard, consommé s'il est récent
    pub fn check_refresh_signal(&self, profile: &ProfileId) -> Result<bool> {
        self.signals.consume_recent(profile, SignalKind::DashboardRefresh)
    }

    pub fn check_volume_signal(&self, profile: &ProfileId) -> i64 {
        self.signals.check(profile, SignalKind::Volume)
    }

    pub fn check_mute_signal(&self, profile: &ProfileId) -> i64 {
        self.signals.check(profile, SignalKind::Mute)
    }

    /// Lecture brute d'un marqueur, sans le consommer
    pub fn signal_marker(&self, profile: &ProfileId, kind: SignalKind) -> i64 {
        self.signals.check(profile, kind)
    }

    /// Demande aux dashboards du profil de se recharger
    pub fn trigger_dashboard_refresh(&self, profile: &ProfileId) -> Result<i64> {
        let timestamp = self.signals.raise(profile, SignalKind::DashboardRefresh)?;
        let patch = ProfilePatch {
            last_refresh_trigger: Some(timestamp),
            ..ProfilePatch::default()
        };
        self.apply(profile, patch)?;
        Ok(timestamp)
    }

    pub fn notify_config_change(&self, profile: &ProfileId) -> Result<i64> {
        self.signals.raise(profile, SignalKind::ConfigChange)
    }

    // --- Administration ---

    pub fn delete_profile(&self, profile: &ProfileId) -> Result<bool> {
        self.profiles.delete_profile(profile)
    }

    pub fn list_profiles(&self) -> Result<Vec<ProfileId>> {
        self.profiles.list_profiles()
    }

    /// Horodatage courant de l'horloge du service
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }
}
