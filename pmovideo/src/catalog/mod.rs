//! Catalogue des vidéos découvertes dans les répertoires configurés
//!
//! - [`scanner`] énumère les fichiers vidéo et produit un [`CatalogCache`]
//! - [`coherence`] décide si l'instantané persisté est périmé
//! - [`CatalogIndex`] assemble les deux autour du fichier de cache

pub mod coherence;
pub mod scanner;

use crate::clock::Clock;
use crate::fs::MediaFs;
use crate::persistence::{DataLayout, read_json, remove_if_exists, write_json_atomic};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use scanner::{CatalogScanner, MAX_CATALOG_ITEMS};

/// Séparateur de la clé d'ordre `chemin|nom`
pub const KEY_SEPARATOR: char = '|';

/// Clé d'identité d'une vidéo, ancrée sur le chemin absolu du répertoire
pub fn order_key(dir_path: &str, name: &str) -> String {
    format!("{dir_path}{KEY_SEPARATOR}{name}")
}

/// Une vidéo du catalogue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDescriptor {
    pub name: String,
    pub dir_index: usize,
    #[serde(rename = "path")]
    pub dir_path: String,
}

impl VideoDescriptor {
    pub fn new(name: impl Into<String>, dir_index: usize, dir_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dir_index,
            dir_path: dir_path.into(),
        }
    }

    pub fn key(&self) -> String {
        order_key(&self.dir_path, &self.name)
    }
}

/// Instantané du catalogue, remplacé en bloc à chaque scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogCache {
    #[serde(default)]
    pub last_scan_timestamp: i64,
    #[serde(default)]
    pub available_directories: Vec<String>,
    #[serde(default)]
    pub total_videos: usize,
    #[serde(default)]
    pub descriptors: Vec<VideoDescriptor>,
}

impl CatalogCache {
    pub fn new(
        last_scan_timestamp: i64,
        available_directories: Vec<String>,
        descriptors: Vec<VideoDescriptor>,
    ) -> Self {
        Self {
            last_scan_timestamp,
            available_directories,
            total_videos: descriptors.len(),
            descriptors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Clés distinctes, dans l'ordre du scan (la première occurrence l'emporte)
    pub fn keys(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.descriptors
            .iter()
            .map(VideoDescriptor::key)
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }

    /// Recherche par identité client `(filename, dir_index)`
    pub fn find(&self, filename: &str, dir_index: usize) -> Option<&VideoDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.name == filename && d.dir_index == dir_index)
    }
}

/// Cache du catalogue adossé au répertoire de données
///
/// Toute lecture passe par [`current`](Self::current) : le cache est
/// reconstruit de façon transparente dès que le prédicat de fraîcheur le
/// juge périmé. Aucune erreur de scan ne remonte à l'appelant.
pub struct CatalogIndex {
    fs: Arc<dyn MediaFs>,
    clock: Arc<dyn Clock>,
    layout: DataLayout,
    directories: Vec<String>,
    default_directory: Option<String>,
    scanner: CatalogScanner,
}

impl CatalogIndex {
    pub fn new(
        fs: Arc<dyn MediaFs>,
        clock: Arc<dyn Clock>,
        layout: DataLayout,
        directories: Vec<String>,
        default_directory: Option<String>,
        scanner: CatalogScanner,
    ) -> Self {
        Self {
            fs,
            clock,
            layout,
            directories,
            default_directory,
            scanner,
        }
    }

    /// Répertoires scannés, dans l'ordre des index
    ///
    /// Retombe sur le répertoire par défaut quand aucun répertoire
    /// configuré n'est accessible.
    pub fn directories(&self) -> Vec<String> {
        coherence::effective_directories(
            self.fs.as_ref(),
            &self.directories,
            self.default_directory.as_deref(),
        )
    }

    /// Cache persisté tel quel, sans contrôle de fraîcheur
    pub fn load_cached(&self) -> Option<CatalogCache> {
        let path = self.layout.catalog_cache_path();
        match read_json::<CatalogCache>(&path) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(path = %path.display(), "Ignoring unreadable catalog cache: {}", e);
                None
            }
        }
    }

    /// Vrai si le cache doit être reconstruit
    pub fn is_stale(&self) -> bool {
        let last_scan = self
            .load_cached()
            .map(|c| c.last_scan_timestamp)
            .unwrap_or(0);
        coherence::is_stale(
            self.fs.as_ref(),
            &self.directories,
            self.default_directory.as_deref(),
            last_scan,
        )
    }

    /// Catalogue à jour, rescanné si nécessaire
    pub fn current(&self) -> CatalogCache {
        let cached = self.load_cached();
        let last_scan = cached.as_ref().map(|c| c.last_scan_timestamp).unwrap_or(0);

        let stale = coherence::is_stale(
            self.fs.as_ref(),
            &self.directories,
            self.default_directory.as_deref(),
            last_scan,
        );

        match cached {
            Some(cache) if !stale => cache,
            previous => self.rebuild(previous),
        }
    }

    /// Force un nouveau scan (en conservant la règle de maintien en place)
    pub fn rescan(&self) -> CatalogCache {
        let previous = self.load_cached();
        self.rebuild(previous)
    }

    /// Supprime le cache persisté ; le prochain accès rescanne
    pub fn invalidate(&self) -> Result<()> {
        if remove_if_exists(&self.layout.catalog_cache_path())? {
            debug!("Catalog cache invalidated");
        }
        Ok(())
    }

    fn rebuild(&self, previous: Option<CatalogCache>) -> CatalogCache {
        let now = self.clock.now_millis();
        let directories = self.directories();
        let fresh = match self.scanner.scan(self.fs.as_ref(), &directories, now) {
            Ok(fresh) => fresh,
            Err(e) => {
                return match previous {
                    Some(previous) => {
                        warn!("Catalog scan failed, keeping previous cache: {}", e);
                        previous
                    }
                    None => {
                        warn!("Catalog scan failed and no previous cache exists: {}", e);
                        CatalogCache::default()
                    }
                };
            }
        };

        if let Some(previous) = previous {
            if fresh.is_empty() && !previous.is_empty() {
                warn!(
                    previous = previous.len(),
                    "Scan found no videos while the previous catalog was not empty, keeping it"
                );
                return previous;
            }
        }

        if let Err(e) = write_json_atomic(&self.layout.catalog_cache_path(), &fresh) {
            warn!("Failed to persist catalog cache: {}", e);
        }
        info!(
            videos = fresh.len(),
            directories = fresh.available_directories.len(),
            "Catalog rescanned"
        );
        fresh
    }
}
