//! Profils : un espace de noms par couple dashboard/écran

pub mod legacy;
pub mod state;
pub mod store;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use state::{CurrentVideo, PlaybackState, ProfilePatch, ProfileState, Toggle};
pub use store::{ConsistencyMode, ProfileStore, VersionedState};

/// Identifiant de profil, limité à `[A-Za-z0-9_-]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(String);

impl ProfileId {
    pub const DEFAULT: &'static str = "default";

    /// Le profil `default`
    pub fn default_profile() -> Self {
        ProfileId(Self::DEFAULT.to_string())
    }

    /// Filtre les caractères interdits ; un résultat vide donne `default`
    ///
    /// ```
    /// use pmovideo::ProfileId;
    ///
    /// assert_eq!(ProfileId::sanitize("../../etc").as_str(), "etc");
    /// assert_eq!(ProfileId::sanitize("***").as_str(), "default");
    /// ```
    pub fn sanitize(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if cleaned.is_empty() {
            Self::default_profile()
        } else {
            ProfileId(cleaned)
        }
    }

    /// Paramètre numérique court : `0` → `default`, `n >= 1` → `dashboard{n}`
    pub fn from_dashboard_number(n: i64) -> Self {
        if n >= 1 {
            ProfileId(format!("dashboard{n}"))
        } else {
            Self::default_profile()
        }
    }

    /// Règle de résolution commune à toutes les opérations
    ///
    /// Un nom explicite l'emporte sur le numéro de dashboard.
    pub fn resolve(dashboard: Option<i64>, name: Option<&str>) -> Self {
        match (name, dashboard) {
            (Some(name), _) => Self::sanitize(name),
            (None, Some(n)) => Self::from_dashboard_number(n),
            (None, None) => Self::default_profile(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl Default for ProfileId {
    fn default() -> Self {
        Self::default_profile()
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
