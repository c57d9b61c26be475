//! Stockage durable de l'état des profils
//!
//! Un enregistrement unifié `state.json` par profil, écrit par
//! temporaire + renommage. Aucun verrou n'est pris en mode
//! [`ConsistencyMode::LastWriterWins`] : deux mises à jour partielles
//! concurrentes partant du même état de base se départagent au dernier
//! renommage, et les champs de la première sont perdus.
//! [`ConsistencyMode::CompareAndSwap`] refuse au contraire d'écrire si la
//! révision a bougé depuis la lecture.

use super::legacy::{RawCurrentVideo, normalize_timestamp, read_legacy_state};
use super::state::{DEFAULT_VOLUME, MAX_VOLUME, PlaybackState, ProfilePatch, ProfileState, Toggle};
use super::ProfileId;
use crate::persistence::{DataLayout, read_json, write_json_atomic};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

const LOCK_SUFFIX: &str = "lock";
const LOCK_TIMEOUT: Duration = Duration::from_secs(2);
const STALE_LOCK_AGE: Duration = Duration::from_secs(5);
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(5);

/// Politique face aux écritures concurrentes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsistencyMode {
    /// Le dernier renommage gagne, les mises à jour concurrentes peuvent être perdues
    #[default]
    LastWriterWins,
    /// Écriture conditionnée à la révision lue (sous verrou de fichier)
    CompareAndSwap,
}

impl FromStr for ConsistencyMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "last_writer_wins" | "lww" => Ok(ConsistencyMode::LastWriterWins),
            "compare_and_swap" | "cas" => Ok(ConsistencyMode::CompareAndSwap),
            other => Err(Error::validation(format!("unknown consistency mode '{other}'"))),
        }
    }
}

impl fmt::Display for ConsistencyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyMode::LastWriterWins => f.write_str("last_writer_wins"),
            ConsistencyMode::CompareAndSwap => f.write_str("compare_and_swap"),
        }
    }
}

/// État accompagné de la révision de l'enregistrement qui l'a fourni
///
/// La révision 0 désigne un profil sans enregistrement sur disque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedState {
    pub state: ProfileState,
    pub revision: u64,
}

#[derive(Serialize)]
struct StoredRecordOut<'a> {
    #[serde(flatten)]
    state: &'a ProfileState,
    revision: u64,
}

/// Lecture tolérante : chaque champ illisible retombe sur sa valeur par défaut
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredRecordIn {
    current_video: Option<RawCurrentVideo>,
    playback_state: Option<String>,
    volume: Option<serde_json::Value>,
    muted: Option<serde_json::Value>,
    loop_mode: Option<String>,
    play_all_mode: Option<String>,
    external_audio_mode: Option<String>,
    last_refresh_trigger: Option<i64>,
    revision: Option<u64>,
}

impl StoredRecordIn {
    fn into_versioned(self) -> VersionedState {
        let toggle = |v: Option<String>| {
            v.and_then(|s| s.parse::<Toggle>().ok())
                .unwrap_or_default()
        };

        let volume = match self.volume {
            Some(serde_json::Value::Number(n)) => n
                .as_f64()
                .map(|v| v.round().clamp(0.0, MAX_VOLUME as f64) as u8)
                .unwrap_or(DEFAULT_VOLUME),
            Some(serde_json::Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(|v| v.clamp(0, MAX_VOLUME as i64) as u8)
                .unwrap_or(DEFAULT_VOLUME),
            _ => DEFAULT_VOLUME,
        };

        let muted = match self.muted {
            Some(serde_json::Value::Bool(b)) => b,
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
            Some(serde_json::Value::String(s)) => matches!(s.trim(), "1" | "true" | "on"),
            _ => false,
        };

        VersionedState {
            state: ProfileState {
                current_video: self.current_video.and_then(RawCurrentVideo::normalize),
                playback_state: self
                    .playback_state
                    .and_then(|s| s.parse::<PlaybackState>().ok())
                    .unwrap_or_default(),
                volume,
                muted,
                loop_mode: toggle(self.loop_mode),
                play_all_mode: toggle(self.play_all_mode),
                external_audio_mode: toggle(self.external_audio_mode),
                last_refresh_trigger: self
                    .last_refresh_trigger
                    .map(normalize_timestamp)
                    .unwrap_or(0),
            },
            revision: self.revision.unwrap_or(1),
        }
    }
}

/// Verrou exclusif posé à côté de l'enregistrement (mode compare-and-swap)
///
/// Le fichier de verrou contient le jeton de son détenteur : on ne
/// supprime jamais un verrou qui porte un autre jeton.
struct RecordLock {
    path: PathBuf,
    token: String,
}

static LOCK_SEQ: AtomicU64 = AtomicU64::new(0);

fn lock_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!(
        "{}-{}-{}",
        std::process::id(),
        nanos,
        LOCK_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}

impl RecordLock {
    fn acquire(record: &Path) -> Result<Self> {
        let path = record.with_extension(LOCK_SUFFIX);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }

        let token = lock_token();
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(token.as_bytes()) {
                        let _ = std::fs::remove_file(&path);
                        return Err(Error::io(&path, e));
                    }
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale_lock(&path) {
                        break_stale_lock(&path, &token);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(Error::io(
                            &path,
                            std::io::Error::new(
                                std::io::ErrorKind::TimedOut,
                                "profile record is locked",
                            ),
                        ));
                    }
                    std::thread::sleep(LOCK_RETRY_DELAY);
                }
                Err(e) => return Err(Error::io(&path, e)),
            }
        }
    }
}

impl Drop for RecordLock {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(owner) if owner == self.token => {
                let _ = std::fs::remove_file(&self.path);
            }
            Ok(_) => warn!(lock = %self.path.display(), "Profile lock taken over, leaving it"),
            Err(_) => {}
        }
    }
}

fn is_stale_lock(path: &Path) -> bool {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_LOCK_AGE)
}

/// Écarte un verrou périmé sans risquer d'effacer un verrou frais
///
/// Le renommage vers un nom privé est atomique : un seul écrivain
/// récupère le fichier. S'il s'avère frais (posé entre le contrôle et
/// le renommage), il est remis en place par lien dur, qui n'écrase rien.
fn break_stale_lock(path: &Path, token: &str) {
    let aside = path.with_extension(format!("{LOCK_SUFFIX}.{token}"));
    if std::fs::rename(path, &aside).is_err() {
        // Déjà écarté par un autre écrivain
        return;
    }

    if is_stale_lock(&aside) {
        warn!(lock = %path.display(), "Breaking stale profile lock");
    } else if let Err(e) = std::fs::hard_link(&aside, path) {
        warn!(lock = %path.display(), "Could not restore a live profile lock: {}", e);
    }
    let _ = std::fs::remove_file(&aside);
}

/// Stockage des états de profils
#[derive(Debug, Clone)]
pub struct ProfileStore {
    layout: DataLayout,
    mode: ConsistencyMode,
}

impl ProfileStore {
    pub fn new(layout: DataLayout, mode: ConsistencyMode) -> Self {
        Self { layout, mode }
    }

    pub fn mode(&self) -> ConsistencyMode {
        self.mode
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// État courant du profil, jamais en erreur
    ///
    /// Un profil neuf renvoie les valeurs par défaut sans rien écrire.
    pub fn load(&self, profile: &ProfileId) -> ProfileState {
        self.load_versioned(profile).state
    }

    /// État courant et révision de l'enregistrement
    pub fn load_versioned(&self, profile: &ProfileId) -> VersionedState {
        let path = self.layout.state_path(profile);
        match read_json::<StoredRecordIn>(&path) {
            Ok(Some(record)) => record.into_versioned(),
            Ok(None) => self.migrate_or_default(profile),
            Err(e) => {
                warn!(profile = %profile, "Unreadable profile state, using defaults: {}", e);
                VersionedState {
                    state: ProfileState::default(),
                    revision: self.read_revision(&path),
                }
            }
        }
    }

    fn migrate_or_default(&self, profile: &ProfileId) -> VersionedState {
        let legacy = match read_legacy_state(&self.layout, profile) {
            Ok(legacy) => legacy,
            Err(e) => {
                warn!(profile = %profile, "Failed to read legacy profile files: {}", e);
                None
            }
        };

        let Some(state) = legacy else {
            return VersionedState {
                state: ProfileState::default(),
                revision: 0,
            };
        };

        let path = self.layout.state_path(profile);
        match write_record(&path, &state, 1) {
            Ok(()) => {
                info!(profile = %profile, "Migrated legacy profile files to unified state record");
                VersionedState { state, revision: 1 }
            }
            Err(e) => {
                warn!(profile = %profile, "Failed to persist migrated profile state: {}", e);
                VersionedState { state, revision: 0 }
            }
        }
    }

    /// Révision sur disque, 0 si absente ou illisible
    fn read_revision(&self, path: &Path) -> u64 {
        match read_json::<serde_json::Value>(path) {
            Ok(Some(value)) => value.get("revision").and_then(|r| r.as_u64()).unwrap_or(1),
            _ => 0,
        }
    }

    /// Remplace l'état complet du profil
    pub fn save(&self, profile: &ProfileId, state: &ProfileState) -> Result<()> {
        let path = self.layout.state_path(profile);
        match self.mode {
            ConsistencyMode::LastWriterWins => {
                let revision = self.read_revision(&path) + 1;
                write_record(&path, state, revision)
            }
            ConsistencyMode::CompareAndSwap => {
                let _lock = RecordLock::acquire(&path)?;
                let revision = self.read_revision(&path) + 1;
                write_record(&path, state, revision)
            }
        }
    }

    /// Remplace l'état seulement si la révision sur disque vaut `expected`
    ///
    /// Prend le verrou de l'enregistrement quel que soit le mode.
    pub fn save_if_revision(
        &self,
        profile: &ProfileId,
        state: &ProfileState,
        expected: u64,
    ) -> Result<u64> {
        let path = self.layout.state_path(profile);
        let _lock = RecordLock::acquire(&path)?;
        let found = self.read_revision(&path);
        if found != expected {
            return Err(Error::Conflict {
                profile: profile.to_string(),
                expected,
                found,
            });
        }
        write_record(&path, state, expected + 1)?;
        Ok(expected + 1)
    }

    /// Applique `patch` sur l'état `base` lu précédemment et l'écrit
    ///
    /// En mode last-writer-wins l'écriture est inconditionnelle ; en mode
    /// compare-and-swap elle échoue avec [`Error::Conflict`] si un autre
    /// écrivain est passé depuis la lecture de `base`.
    pub fn commit(
        &self,
        profile: &ProfileId,
        base: &VersionedState,
        patch: &ProfilePatch,
    ) -> Result<VersionedState> {
        let next = patch.apply(&base.state);
        let revision = match self.mode {
            ConsistencyMode::LastWriterWins => {
                let path = self.layout.state_path(profile);
                let revision = base.revision + 1;
                write_record(&path, &next, revision)?;
                revision
            }
            ConsistencyMode::CompareAndSwap => {
                self.save_if_revision(profile, &next, base.revision)?
            }
        };
        debug!(profile = %profile, revision, "Profile state updated");
        Ok(VersionedState {
            state: next,
            revision,
        })
    }

    /// Lecture, application du patch, remplacement atomique
    pub fn update(&self, profile: &ProfileId, patch: &ProfilePatch) -> Result<ProfileState> {
        let base = self.load_versioned(profile);
        Ok(self.commit(profile, &base, patch)?.state)
    }

    /// Comme [`update`](Self::update), en relisant l'état après chaque conflit
    pub fn update_with_retry(
        &self,
        profile: &ProfileId,
        patch: &ProfilePatch,
        attempts: usize,
    ) -> Result<ProfileState> {
        let mut last_error = None;
        for attempt in 0..attempts.max(1) {
            match self.update(profile, patch) {
                Err(Error::Conflict { expected, found, .. }) => {
                    warn!(
                        profile = %profile,
                        attempt,
                        expected,
                        found,
                        "Concurrent profile update, retrying"
                    );
                    last_error = Some(Error::Conflict {
                        profile: profile.to_string(),
                        expected,
                        found,
                    });
                }
                other => return other,
            }
        }
        Err(last_error.unwrap_or_else(|| Error::validation("no update attempt made")))
    }

    /// Suppression administrative du répertoire complet du profil
    pub fn delete_profile(&self, profile: &ProfileId) -> Result<bool> {
        let dir = self.layout.profile_dir(profile);
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!(profile = %profile, "Profile deleted");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(dir, e)),
        }
    }

    /// Profils présents sur disque, triés
    pub fn list_profiles(&self) -> Result<Vec<ProfileId>> {
        let dir = self.layout.profiles_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(dir, e)),
        };

        let mut profiles: Vec<ProfileId> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| ProfileId::sanitize(name).as_str() == name)
            .map(|name| ProfileId::sanitize(&name))
            .collect();
        profiles.sort();
        Ok(profiles)
    }
}

fn write_record(path: &Path, state: &ProfileState, revision: u64) -> Result<()> {
    write_json_atomic(path, &StoredRecordOut { state, revision })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn age_file(path: &Path, age: Duration) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let temp_dir = tempfile::tempdir().unwrap();
        let record = temp_dir.path().join("state.json");
        let lock_path = record.with_extension(LOCK_SUFFIX);
        std::fs::write(&lock_path, "crashed-writer").unwrap();
        age_file(&lock_path, STALE_LOCK_AGE * 2);

        let lock = RecordLock::acquire(&record).unwrap();
        assert_eq!(std::fs::read_to_string(&lock_path).unwrap(), lock.token);
        drop(lock);
        assert!(!lock_path.exists());

        // Aucun fichier écarté ne traîne
        let leftovers = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_live_lock_survives_a_late_breaker() {
        let temp_dir = tempfile::tempdir().unwrap();
        let record = temp_dir.path().join("state.json");
        let lock = RecordLock::acquire(&record).unwrap();

        // Un écrivain qui a vu l'ancien verrou périmé arrive trop tard
        break_stale_lock(&lock.path, "late-writer");

        assert_eq!(std::fs::read_to_string(&lock.path).unwrap(), lock.token);
        assert!(RecordLock::acquire(&record).is_err());
        drop(lock);
        assert!(!record.with_extension(LOCK_SUFFIX).exists());
    }

    #[test]
    fn test_drop_keeps_a_lock_owned_by_another_writer() {
        let temp_dir = tempfile::tempdir().unwrap();
        let record = temp_dir.path().join("state.json");
        let lock = RecordLock::acquire(&record).unwrap();

        std::fs::write(&lock.path, "other-writer").unwrap();
        let path = lock.path.clone();
        drop(lock);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "other-writer");
    }
}
