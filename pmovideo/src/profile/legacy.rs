//! Migration depuis l'ancien format (un fichier par champ)
//!
//! Les anciennes installations stockaient chaque champ dans un petit
//! fichier texte du répertoire du profil. La vidéo courante y apparaît
//! sous deux formes : un nom de fichier nu (répertoire 0) ou un objet
//! JSON `{filename, dirIndex}`. Les deux formes sont normalisées ici et
//! ne dépassent jamais cette frontière.

use super::state::{CurrentVideo, DEFAULT_VOLUME, MAX_VOLUME, ProfileState, Toggle};
use super::ProfileId;
use crate::persistence::{DataLayout, read_text};
use crate::Result;
use serde::Deserialize;

pub const CURRENT_VIDEO_FILE: &str = "current_video.txt";
pub const PLAYBACK_STATE_FILE: &str = "playback_state.txt";
pub const VOLUME_FILE: &str = "volume.txt";
pub const MUTE_FILE: &str = "mute_state.txt";
pub const LOOP_MODE_FILE: &str = "loop_mode.txt";
pub const PLAY_ALL_MODE_FILE: &str = "play_all_mode.txt";
pub const EXTERNAL_AUDIO_MODE_FILE: &str = "external_audio_mode.txt";
pub const REFRESH_TRIGGER_FILE: &str = "last_refresh_trigger.txt";

pub const LEGACY_FILES: &[&str] = &[
    CURRENT_VIDEO_FILE,
    PLAYBACK_STATE_FILE,
    VOLUME_FILE,
    MUTE_FILE,
    LOOP_MODE_FILE,
    PLAY_ALL_MODE_FILE,
    EXTERNAL_AUDIO_MODE_FILE,
    REFRESH_TRIGGER_FILE,
];

// En dessous, un horodatage est en secondes (avant l'an 5138 en ms)
const SECONDS_THRESHOLD: i64 = 100_000_000_000;

/// Forme brute d'une vidéo courante persistée
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawCurrentVideo {
    Name(String),
    Record {
        #[serde(default)]
        filename: String,
        #[serde(default, rename = "dirIndex", alias = "dir_index", alias = "dir")]
        dir_index: Option<serde_json::Value>,
    },
}

impl RawCurrentVideo {
    pub(crate) fn normalize(self) -> Option<CurrentVideo> {
        let (filename, dir_index) = match self {
            RawCurrentVideo::Name(name) => (name, 0),
            RawCurrentVideo::Record {
                filename,
                dir_index,
            } => (filename, dir_index.as_ref().map(index_from_json).unwrap_or(0)),
        };
        let filename = filename.trim().to_string();
        if filename.is_empty() {
            None
        } else {
            Some(CurrentVideo::new(filename, dir_index))
        }
    }
}

fn index_from_json(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(|v| v as usize).unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn parse_current_video(text: &str) -> Option<CurrentVideo> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') || trimmed.starts_with('"') {
        match serde_json::from_str::<RawCurrentVideo>(trimmed) {
            Ok(raw) => return raw.normalize(),
            Err(e) => {
                tracing::warn!("Unreadable legacy current video record, ignoring it: {}", e);
                return None;
            }
        }
    }
    RawCurrentVideo::Name(trimmed.to_string()).normalize()
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" | "muted" => Some(true),
        "0" | "false" | "off" | "no" | "unmuted" | "" => Some(false),
        _ => None,
    }
}

/// Normalise un horodatage hérité (secondes) en millisecondes
pub(crate) fn normalize_timestamp(value: i64) -> i64 {
    if value > 0 && value < SECONDS_THRESHOLD {
        value * 1000
    } else {
        value.max(0)
    }
}

/// Lit l'ancien format ; `Ok(None)` si aucun fichier hérité n'existe
pub fn read_legacy_state(layout: &DataLayout, profile: &ProfileId) -> Result<Option<ProfileState>> {
    let mut found = false;
    let mut state = ProfileState::default();

    let mut read = |name: &str| -> Result<Option<String>> {
        let text = read_text(&layout.legacy_path(profile, name))?;
        found |= text.is_some();
        Ok(text)
    };

    if let Some(text) = read(CURRENT_VIDEO_FILE)? {
        state.current_video = parse_current_video(&text);
    }

    if let Some(text) = read(PLAYBACK_STATE_FILE)? {
        state.playback_state = text.parse().unwrap_or_default();
    }

    if let Some(text) = read(VOLUME_FILE)? {
        state.volume = text
            .trim()
            .parse::<i64>()
            .map(|v| v.clamp(0, MAX_VOLUME as i64) as u8)
            .unwrap_or(DEFAULT_VOLUME);
    }

    if let Some(text) = read(MUTE_FILE)? {
        state.muted = parse_flag(&text).unwrap_or(false);
    }

    for (name, slot) in [
        (LOOP_MODE_FILE, &mut state.loop_mode),
        (PLAY_ALL_MODE_FILE, &mut state.play_all_mode),
        (EXTERNAL_AUDIO_MODE_FILE, &mut state.external_audio_mode),
    ] {
        if let Some(text) = read(name)? {
            *slot = Toggle::from(parse_flag(&text).unwrap_or(false));
        }
    }

    if let Some(text) = read(REFRESH_TRIGGER_FILE)? {
        state.last_refresh_trigger = text.trim().parse().map(normalize_timestamp).unwrap_or(0);
    }

    Ok(found.then_some(state))
}
