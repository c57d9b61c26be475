//! Persistance fichier : disposition du répertoire de données et écritures atomiques
//!
//! Chaque enregistrement est un fichier écrit dans un temporaire du même
//! répertoire puis renommé sur la cible. Un lecteur concurrent voit donc
//! soit l'ancienne version complète, soit la nouvelle.

use crate::profile::ProfileId;
use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};

const CATALOG_CACHE_FILE: &str = "catalog_cache.json";
const PROFILES_DIR: &str = "profiles";
const STATE_FILE: &str = "state.json";
const ORDER_FILE: &str = "video_order.json";
const SIGNALS_DIR: &str = "signals";

/// Disposition des fichiers sous le répertoire de données
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn catalog_cache_path(&self) -> PathBuf {
        self.root.join(CATALOG_CACHE_FILE)
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join(PROFILES_DIR)
    }

    pub fn profile_dir(&self, profile: &ProfileId) -> PathBuf {
        self.profiles_dir().join(profile.as_str())
    }

    pub fn state_path(&self, profile: &ProfileId) -> PathBuf {
        self.profile_dir(profile).join(STATE_FILE)
    }

    pub fn order_path(&self, profile: &ProfileId) -> PathBuf {
        self.profile_dir(profile).join(ORDER_FILE)
    }

    pub fn signal_path(&self, profile: &ProfileId, marker: &str) -> PathBuf {
        self.profile_dir(profile).join(SIGNALS_DIR).join(marker)
    }

    /// Fichier de l'ancien format (un petit fichier par champ)
    pub fn legacy_path(&self, profile: &ProfileId, name: &str) -> PathBuf {
        self.profile_dir(profile).join(name)
    }
}

/// Écrit `bytes` dans `path` via un temporaire renommé atomiquement
///
/// En cas d'échec, le temporaire est supprimé et la cible reste intacte.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".pmovideo-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|e| Error::io(parent, e))?;

    tmp.write_all(bytes).map_err(|e| Error::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io(tmp.path(), e))?;

    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    Ok(())
}

/// Sérialise en JSON puis écrit atomiquement
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes)
}

/// Lit un enregistrement JSON ; `Ok(None)` si le fichier n'existe pas
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Lit un petit fichier texte (anciens enregistrements, marqueurs)
pub fn read_text(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Supprime un fichier ; `Ok(false)` s'il n'existait pas
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_content_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("record.json");

        write_json_atomic(&target, &serde_json::json!({"v": 1})).unwrap();
        write_json_atomic(&target, &serde_json::json!({"v": 2})).unwrap();

        let value: serde_json::Value = read_json(&target).unwrap().unwrap();
        assert_eq!(value["v"], 2);

        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_failed_rename_keeps_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        // Une cible qui est un répertoire non vide ne peut pas être remplacée
        let target = dir.path().join("record.json");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"x").unwrap();

        let result = write_atomic(&target, b"new");
        assert!(matches!(result, Err(Error::Io { .. })));
        assert!(target.join("keep").exists());
    }

    #[test]
    fn test_read_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Option<serde_json::Value> = read_json(&dir.path().join("nope")).unwrap();
        assert!(missing.is_none());
        assert!(!remove_if_exists(&dir.path().join("nope")).unwrap());
    }
}
