//! État de contrôle d'un profil

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Volume appliqué à un profil neuf
pub const DEFAULT_VOLUME: u8 = 50;

/// Volume maximal
pub const MAX_VOLUME: u8 = 100;

/// Intention de lecture, reflétée sans validation de transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Play,
    Pause,
    #[default]
    Stop,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackState::Play => "play",
            PlaybackState::Pause => "pause",
            PlaybackState::Stop => "stop",
        }
    }
}

impl FromStr for PlaybackState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "play" | "playing" => Ok(PlaybackState::Play),
            "pause" | "paused" => Ok(PlaybackState::Pause),
            "stop" | "stopped" => Ok(PlaybackState::Stop),
            other => Err(Error::validation(format!("unknown playback state '{other}'"))),
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drapeau on/off (boucle, lecture enchaînée, audio externe)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Toggle {
    On,
    #[default]
    Off,
}

impl Toggle {
    pub fn is_on(&self) -> bool {
        matches!(self, Toggle::On)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Toggle::On => "on",
            Toggle::Off => "off",
        }
    }
}

impl From<bool> for Toggle {
    fn from(value: bool) -> Self {
        if value { Toggle::On } else { Toggle::Off }
    }
}

impl FromStr for Toggle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(Toggle::On),
            "off" => Ok(Toggle::Off),
            other => Err(Error::validation(format!("expected 'on' or 'off', got '{other}'"))),
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Vidéo sélectionnée ; `(filename, dir_index)` est son identité côté client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct CurrentVideo {
    pub filename: String,
    pub dir_index: usize,
}

impl CurrentVideo {
    pub fn new(filename: impl Into<String>, dir_index: usize) -> Self {
        Self {
            filename: filename.into(),
            dir_index,
        }
    }
}

/// État complet d'un profil
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "api", derive(utoipa::ToSchema))]
#[serde(rename_all = "camelCase")]
pub struct ProfileState {
    pub current_video: Option<CurrentVideo>,
    pub playback_state: PlaybackState,
    pub volume: u8,
    pub muted: bool,
    pub loop_mode: Toggle,
    pub play_all_mode: Toggle,
    pub external_audio_mode: Toggle,
    pub last_refresh_trigger: i64,
}

impl Default for ProfileState {
    fn default() -> Self {
        Self {
            current_video: None,
            playback_state: PlaybackState::Stop,
            volume: DEFAULT_VOLUME,
            muted: false,
            loop_mode: Toggle::Off,
            play_all_mode: Toggle::Off,
            external_audio_mode: Toggle::Off,
            last_refresh_trigger: 0,
        }
    }
}

/// Mise à jour partielle : seuls les champs renseignés sont écrits
///
/// `current_video: Some(None)` efface la vidéo courante.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub current_video: Option<Option<CurrentVideo>>,
    pub playback_state: Option<PlaybackState>,
    pub volume: Option<u8>,
    pub muted: Option<bool>,
    pub loop_mode: Option<Toggle>,
    pub play_all_mode: Option<Toggle>,
    pub external_audio_mode: Option<Toggle>,
    pub last_refresh_trigger: Option<i64>,
}

impl ProfilePatch {
    pub fn current_video(video: Option<CurrentVideo>) -> Self {
        Self {
            current_video: Some(video),
            ..Self::default()
        }
    }

    pub fn playback(state: PlaybackState) -> Self {
        Self {
            playback_state: Some(state),
            ..Self::default()
        }
    }

    pub fn volume(volume: u8) -> Self {
        Self {
            volume: Some(volume.min(MAX_VOLUME)),
            ..Self::default()
        }
    }

    pub fn muted(muted: bool) -> Self {
        Self {
            muted: Some(muted),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applique le patch sur une copie de `state`
    pub fn apply(&self, state: &ProfileState) -> ProfileState {
        let mut next = state.clone();
        if let Some(video) = &self.current_video {
            next.current_video = video.clone();
        }
        if let Some(playback) = self.playback_state {
            next.playback_state = playback;
        }
        if let Some(volume) = self.volume {
            next.volume = volume.min(MAX_VOLUME);
        }
        if let Some(muted) = self.muted {
            next.muted = muted;
        }
        if let Some(mode) = self.loop_mode {
            next.loop_mode = mode;
        }
        if let Some(mode) = self.play_all_mode {
            next.play_all_mode = mode;
        }
        if let Some(mode) = self.external_audio_mode {
            next.external_audio_mode = mode;
        }
        if let Some(trigger) = self.last_refresh_trigger {
            next.last_refresh_trigger = trigger;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let state = ProfileState::default();
        assert_eq!(state.playback_state, PlaybackState::Stop);
        assert_eq!(state.volume, 50);
        assert!(!state.muted);
        assert_eq!(state.loop_mode, Toggle::Off);
        assert_eq!(state.play_all_mode, Toggle::Off);
        assert_eq!(state.external_audio_mode, Toggle::Off);
        assert!(state.current_video.is_none());
    }

    #[test]
    fn test_patch_touches_only_given_fields() {
        let mut base = ProfileState::default();
        base.muted = true;
        base.current_video = Some(CurrentVideo::new("a.mp4", 1));

        let patched = ProfilePatch::volume(140).apply(&base);
        assert_eq!(patched.volume, 100);
        assert!(patched.muted);
        assert_eq!(patched.current_video, base.current_video);

        let cleared = ProfilePatch::current_video(None).apply(&base);
        assert!(cleared.current_video.is_none());
    }

    #[test]
    fn test_any_playback_transition_is_accepted() {
        let mut state = ProfileState::default();
        for target in [
            PlaybackState::Pause,
            PlaybackState::Play,
            PlaybackState::Stop,
            PlaybackState::Pause,
        ] {
            state = ProfilePatch::playback(target).apply(&state);
            assert_eq!(state.playback_state, target);
        }
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("Play".parse::<PlaybackState>().unwrap(), PlaybackState::Play);
        assert!("rewind".parse::<PlaybackState>().is_err());
        assert_eq!(" ON ".parse::<Toggle>().unwrap(), Toggle::On);
        assert!("maybe".parse::<Toggle>().is_err());
    }

    #[test]
    fn test_json_shape_is_camel_case() {
        let mut state = ProfileState::default();
        state.current_video = Some(CurrentVideo::new("clip.webm", 2));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["currentVideo"]["dirIndex"], 2);
        assert_eq!(json["playbackState"], "stop");
        assert_eq!(json["playAllMode"], "off");
    }
}
