//! Énumération des fichiers vidéo des répertoires configurés

use super::{CatalogCache, VideoDescriptor};
use crate::fs::MediaFs;
use crate::{Error, Result};
use tracing::{debug, warn};

/// Plafond de sécurité sur le nombre total d'entrées d'un scan
pub const MAX_CATALOG_ITEMS: usize = 10_000;

/// Extensions reconnues quand la configuration n'en fournit aucune
pub const DEFAULT_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "ogv", "mov", "mkv", "m4v"];

/// Scanner non récursif, un niveau par répertoire configuré
#[derive(Debug, Clone)]
pub struct CatalogScanner {
    extensions: Vec<String>,
    max_items: usize,
}

impl Default for CatalogScanner {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(), MAX_CATALOG_ITEMS)
    }
}

impl CatalogScanner {
    /// `extensions` sans point, comparées sans tenir compte de la casse
    pub fn new(extensions: Vec<String>, max_items: usize) -> Self {
        let extensions = extensions
            .into_iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self {
            extensions,
            max_items: max_items.clamp(1, MAX_CATALOG_ITEMS),
        }
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn accepts(&self, filename: &str) -> bool {
        if filename.starts_with('.') {
            return false;
        }
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            }
            _ => false,
        }
    }

    /// Construit un nouvel instantané horodaté `now`
    ///
    /// Les répertoires absents ou illisibles sont ignorés ; l'index de
    /// chaque entrée reste sa position dans `configured_dirs`. Échoue
    /// avec [`Error::ScanFailed`] si aucun répertoire n'a pu être lu.
    pub fn scan(
        &self,
        fs: &dyn MediaFs,
        configured_dirs: &[String],
        now: i64,
    ) -> Result<CatalogCache> {
        let mut descriptors = Vec::new();
        let mut available = Vec::new();

        'dirs: for (dir_index, configured) in configured_dirs.iter().enumerate() {
            let Some(resolved) = fs.resolve_dir(configured) else {
                warn!(dir = %configured, "Video directory not found, skipping");
                continue;
            };

            let mut names = match fs.list_files(&resolved) {
                Ok(names) => names,
                Err(e) => {
                    warn!(
                        dir = %resolved.display(),
                        "Cannot read video directory, skipping: {}", e
                    );
                    continue;
                }
            };
            names.sort();

            let dir_path = resolved.to_string_lossy().into_owned();
            available.push(dir_path.clone());

            for name in names.into_iter().filter(|n| self.accepts(n)) {
                if descriptors.len() >= self.max_items {
                    warn!(cap = self.max_items, "Catalog item cap reached, stopping scan");
                    break 'dirs;
                }
                descriptors.push(VideoDescriptor::new(name, dir_index, dir_path.clone()));
            }
            debug!(dir = %dir_path, dir_index, "Video directory scanned");
        }

        if available.is_empty() {
            return Err(Error::ScanFailed(format!(
                "none of the {} configured directories could be read",
                configured_dirs.len()
            )));
        }

        Ok(CatalogCache::new(now, available, descriptors))
    }
}
