//! Accès au système de fichiers des répertoires vidéo
//!
//! Le scanner et le prédicat de fraîcheur ne voient le disque qu'à travers
//! le trait [`MediaFs`] : lister un répertoire, lire sa date de
//! modification, résoudre un chemin configuré.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::UNIX_EPOCH;

/// Opérations disque nécessaires au catalogue
pub trait MediaFs: Send + Sync {
    /// Résout un répertoire configuré en chemin absolu existant
    fn resolve_dir(&self, path: &str) -> Option<PathBuf>;

    /// Date de modification (ms Unix) d'un répertoire résolu
    fn modified_millis(&self, path: &Path) -> Option<i64>;

    /// Noms des fichiers réguliers d'un répertoire (non récursif)
    fn list_files(&self, path: &Path) -> io::Result<Vec<String>>;
}

/// Implémentation sur le disque local
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFs;

impl MediaFs for LocalFs {
    fn resolve_dir(&self, path: &str) -> Option<PathBuf> {
        if path.trim().is_empty() {
            return None;
        }
        let resolved = std::fs::canonicalize(path).ok()?;
        resolved.is_dir().then_some(resolved)
    }

    fn modified_millis(&self, path: &Path) -> Option<i64> {
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        let since_epoch = modified.duration_since(UNIX_EPOCH).ok()?;
        i64::try_from(since_epoch.as_millis()).ok()
    }

    fn list_files(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            // metadata() suit les liens symboliques
            let is_file = std::fs::metadata(entry.path())
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => {
                    tracing::debug!(
                        dir = %path.display(),
                        name = ?raw,
                        "Skipping non UTF-8 file name"
                    );
                }
            }
        }
        Ok(names)
    }
}

#[derive(Debug, Clone)]
struct MemoryDir {
    modified: i64,
    files: Vec<String>,
    readable: bool,
}

/// Système de fichiers en mémoire
///
/// Chaque répertoire est identifié par son chemin absolu ; ajouter ou
/// retirer un fichier avance sa date de modification comme le ferait un
/// vrai système de fichiers.
#[derive(Debug, Default)]
pub struct MemoryFs {
    dirs: RwLock<BTreeMap<PathBuf, MemoryDir>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crée (ou remplace) un répertoire avec son contenu et sa date
    pub fn add_dir(&self, path: impl Into<PathBuf>, modified: i64, files: &[&str]) {
        let dir = MemoryDir {
            modified,
            files: files.iter().map(|f| f.to_string()).collect(),
            readable: true,
        };
        self.write().insert(path.into(), dir);
    }

    pub fn remove_dir(&self, path: impl AsRef<Path>) {
        self.write().remove(path.as_ref());
    }

    pub fn add_file(&self, dir: impl AsRef<Path>, name: &str, modified: i64) {
        if let Some(d) = self.write().get_mut(dir.as_ref()) {
            d.files.push(name.to_string());
            d.modified = modified;
        }
    }

    pub fn remove_file(&self, dir: impl AsRef<Path>, name: &str, modified: i64) {
        if let Some(d) = self.write().get_mut(dir.as_ref()) {
            d.files.retain(|f| f != name);
            d.modified = modified;
        }
    }

    pub fn set_modified(&self, dir: impl AsRef<Path>, modified: i64) {
        if let Some(d) = self.write().get_mut(dir.as_ref()) {
            d.modified = modified;
        }
    }

    /// Rend un répertoire illisible (il existe mais `list_files` échoue)
    pub fn set_readable(&self, dir: impl AsRef<Path>, readable: bool) {
        if let Some(d) = self.write().get_mut(dir.as_ref()) {
            d.readable = readable;
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<PathBuf, MemoryDir>> {
        self.dirs.write().unwrap_or_else(|p| p.into_inner())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<PathBuf, MemoryDir>> {
        self.dirs.read().unwrap_or_else(|p| p.into_inner())
    }
}

impl MediaFs for MemoryFs {
    fn resolve_dir(&self, path: &str) -> Option<PathBuf> {
        let candidate = PathBuf::from(path);
        self.read().contains_key(&candidate).then_some(candidate)
    }

    fn modified_millis(&self, path: &Path) -> Option<i64> {
        self.read().get(path).map(|d| d.modified)
    }

    fn list_files(&self, path: &Path) -> io::Result<Vec<String>> {
        match self.read().get(path) {
            Some(d) if d.readable => Ok(d.files.clone()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is not readable", path.display()),
            )),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )),
        }
    }
}

impl<T: MediaFs + ?Sized> MediaFs for std::sync::Arc<T> {
    fn resolve_dir(&self, path: &str) -> Option<PathBuf> {
        (**self).resolve_dir(path)
    }

    fn modified_millis(&self, path: &Path) -> Option<i64> {
        (**self).modified_millis(path)
    }

    fn list_files(&self, path: &Path) -> io::Result<Vec<String>> {
        (**self).list_files(path)
    }
}
